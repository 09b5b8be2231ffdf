mod error;
pub use error::{Error, FromUriError, Result};

pub mod config;
pub mod connectors;
pub mod protocol;
