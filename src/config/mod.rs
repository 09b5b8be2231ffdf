//! Request level configuration.
//!
//! [`RequestOptions`] is assembled per request from the process wide
//! predefined options followed by the call site options, so the request
//! always has the last word.
mod file;
mod predefined;
mod request_option;

pub use file::RequestOptionsConfig;
pub use predefined::{new_request_options, set_predefined_opts, PredefinedOptions};
pub use request_option::{
    with_dial_timeout, with_read_timeout, with_sd, with_tag, with_write_timeout, RequestOption,
    RequestOptions,
};
