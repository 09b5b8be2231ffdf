//! Protocol pluggable host clients.
//!
//! A [`ClientFactory`] binds one protocol specific option bundle and hands out
//! [`HostClient`]s for it, so calling code can pick a wire protocol without
//! naming the protocol's concrete client type.
pub mod http1;
pub mod http2;
mod unified;

use std::{fmt::Display, future::Future, net::Ipv6Addr, str::FromStr, time::Duration};

use http::{HeaderValue, Request, Response, Uri};
use monoio_http::common::body::HttpBody;
use smol_str::SmolStr;
pub use http1::{Http1ClientFactory, Http1ClientOption, Http1HostClient};
pub use http2::{Http2ClientFactory, Http2ClientOption, Http2HostClient};
pub use unified::{UnifiedClientFactory, UnifiedHostClient};

use crate::{
    config::RequestOptions,
    connectors::{CertificateDer, Endpoint, ServerName},
    Error, FromUriError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http1,
    Http2,
}

impl Protocol {
    /// ALPN protocol id.
    #[inline]
    pub const fn alpn(&self) -> &'static str {
        match self {
            Protocol::Http1 => "http/1.1",
            Protocol::Http2 => "h2",
        }
    }
}

impl Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.alpn())
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http/1.1" | "http1" | "h1" => Ok(Protocol::Http1),
            "h2" | "http2" | "http/2" => Ok(Protocol::Http2),
            _ => Err(Error::InvalidOption(format!("unknown protocol {s}"))),
        }
    }
}

/// A client able to execute requests against one host over one wire protocol.
pub trait HostClient {
    fn protocol(&self) -> Protocol;

    fn endpoint(&self) -> &Endpoint;

    /// Send a request. Non zero timeouts in `opts` override the client level ones.
    fn send_request(
        &self,
        request: Request<HttpBody>,
        opts: &RequestOptions,
    ) -> impl Future<Output = Result<Response<HttpBody>>>;
}

/// Produces [`HostClient`]s from the settings bound at construction.
///
/// Construction does no IO; connections are made by the client on demand.
/// Failure means the bound settings cannot produce a client, retrying is up
/// to the caller.
pub trait ClientFactory {
    type Client: HostClient;

    fn new_host_client(&self) -> Result<Self::Client>;
}

/// Settings shared by every protocol: where to dial and client level timeouts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostOption {
    pub host: SmolStr,
    pub port: u16,
    pub tls: bool,
    /// Name checked against the server certificate, defaults to `host`.
    pub server_name: Option<SmolStr>,
    /// Trusted in addition to the webpki roots.
    pub root_certs: Vec<CertificateDer<'static>>,
    pub no_delay: bool,

    pub dial_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
}

impl HostOption {
    /// `host` may be an IPv6 literal with or without brackets.
    pub fn new(host: impl Into<SmolStr>, port: u16) -> Self {
        let host = host.into();
        let host = match host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            Some(inner) => SmolStr::new(inner),
            None => host,
        };
        Self {
            host,
            port,
            tls: false,
            server_name: None,
            root_certs: Vec::new(),
            no_delay: true,
            dial_timeout: Duration::ZERO,
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
        }
    }

    pub fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    pub fn server_name(mut self, server_name: impl Into<SmolStr>) -> Self {
        self.server_name = Some(server_name.into());
        self
    }

    pub fn add_root_certificate(mut self, cert: CertificateDer<'static>) -> Self {
        self.root_certs.push(cert);
        self
    }

    pub fn no_delay(mut self, no_delay: bool) -> Self {
        self.no_delay = no_delay;
        self
    }

    pub fn dial_timeout(mut self, t: Duration) -> Self {
        self.dial_timeout = t;
        self
    }

    pub fn read_timeout(mut self, t: Duration) -> Self {
        self.read_timeout = t;
        self
    }

    pub fn write_timeout(mut self, t: Duration) -> Self {
        self.write_timeout = t;
        self
    }

    /// Effective timeouts for one request.
    pub fn timeouts(&self, opts: &RequestOptions) -> Timeouts {
        Timeouts {
            dial: opts.dial_timeout_or(self.dial_timeout),
            read: opts.read_timeout_or(self.read_timeout),
            write: opts.write_timeout_or(self.write_timeout),
        }
    }

    pub(crate) fn endpoint(&self) -> Result<Endpoint> {
        if self.host.is_empty() {
            return Err(Error::InvalidOption("empty host".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidOption(format!("port 0 for host {}", self.host)));
        }
        let server_name = if self.tls {
            let name = self.server_name.as_ref().unwrap_or(&self.host);
            Some(ServerName::try_from(name.to_string()).map_err(FromUriError::from)?)
        } else {
            None
        };
        Ok(Endpoint {
            host: self.host.clone(),
            port: self.port,
            server_name,
        })
    }

    /// `Host` header value, the port is omitted when it is the scheme default.
    /// IPv6 literals are bracketed.
    pub(crate) fn host_header(&self) -> Result<HeaderValue> {
        let host = if self.host.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]", self.host)
        } else {
            self.host.to_string()
        };
        let default_port = if self.tls { 443 } else { 80 };
        let value = if self.port == default_port {
            HeaderValue::from_str(&host)
        } else {
            HeaderValue::from_str(&format!("{}:{}", host, self.port))
        };
        value.map_err(|e| Error::Http(e.into()))
    }
}

impl TryFrom<&Uri> for HostOption {
    type Error = FromUriError;

    #[inline]
    fn try_from(uri: &Uri) -> std::result::Result<Self, Self::Error> {
        let host = match uri.host() {
            Some(a) => a,
            None => return Err(FromUriError::NoAuthority),
        };

        let (tls, default_port) = match uri.scheme() {
            Some(scheme) if scheme == &http::uri::Scheme::HTTP => (false, 80),
            Some(scheme) if scheme == &http::uri::Scheme::HTTPS => (true, 443),
            _ => return Err(FromUriError::UnsupportScheme),
        };
        let port = uri.port_u16().unwrap_or(default_port);

        Ok(HostOption::new(host, port).tls(tls))
    }
}

impl TryFrom<Uri> for HostOption {
    type Error = FromUriError;

    #[inline]
    fn try_from(uri: Uri) -> std::result::Result<Self, Self::Error> {
        Self::try_from(&uri)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timeouts {
    pub dial: Duration,
    pub read: Duration,
    pub write: Duration,
}

#[cfg(feature = "time")]
pub(crate) async fn with_timeout<F: Future>(
    dur: Duration,
    phase: &'static str,
    fut: F,
) -> Result<F::Output> {
    if dur.is_zero() {
        return Ok(fut.await);
    }
    monoio::time::timeout(dur, fut)
        .await
        .map_err(|_| Error::Timeout(phase))
}

#[cfg(not(feature = "time"))]
pub(crate) async fn with_timeout<F: Future>(
    _dur: Duration,
    _phase: &'static str,
    fut: F,
) -> Result<F::Output> {
    Ok(fut.await)
}
