use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("convert from uri error {0}")]
    FromUri(#[from] FromUriError),
    #[error("http header error")]
    Http(#[from] http::Error),
    #[error("io error {0}")]
    Io(#[from] std::io::Error),
    #[error("rustls error {0}")]
    Tls(#[from] monoio_rustls::TlsError),
    #[error("serde_json error {0}")]
    Json(#[from] serde_json::Error),
    #[error("H2 error {0}")]
    H2Error(#[from] monoio_http::h2::Error),
    #[error("Http crate error {0}")]
    HttpError(#[from] monoio_http::common::error::HttpError),
    #[error("invalid client option: {0}")]
    InvalidOption(String),
    #[error("server did not negotiate {0} via ALPN")]
    AlpnMismatch(crate::protocol::Protocol),
    #[error("{0} timeout elapsed")]
    Timeout(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(ThisError, Debug)]
pub enum FromUriError {
    #[error("Invalid dns name {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),
    #[error("Scheme not supported")]
    UnsupportScheme,
    #[error("Missing authority in uri")]
    NoAuthority,
}
