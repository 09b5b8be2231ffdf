mod l4_connector;
mod tls_connector;

use std::{
    fmt::Display,
    future::Future,
    io,
    net::{Ipv6Addr, ToSocketAddrs},
};

pub use l4_connector::*;
use monoio::{
    buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut},
    io::{AsyncReadRent, AsyncWriteRent, Split},
    net::TcpStream,
    BufResult,
};
use smol_str::SmolStr;
pub use tls_connector::*;

pub trait Connector<K> {
    type Connection;
    type Error;

    fn connect(&self, key: K) -> impl Future<Output = Result<Self::Connection, Self::Error>>;
}

/// Where a host client dials. `server_name` is set iff the endpoint speaks TLS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub host: SmolStr,
    pub port: u16,
    pub server_name: Option<ServerName<'static>>,
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl ToSocketAddrs for Endpoint {
    type Iter = std::vec::IntoIter<std::net::SocketAddr>;

    #[inline]
    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}

/// Dials an [`Endpoint`] over plain TCP or TLS over TCP.
#[derive(Clone, Debug)]
pub struct HostConnector {
    tcp: TcpConnector,
    tls: TlsConnector<TcpConnector>,
}

impl HostConnector {
    /// `alpn` is advertised on TLS connections only. `extra_roots` are trusted
    /// in addition to the webpki roots.
    pub fn new(no_delay: bool, alpn: &[&str], extra_roots: &[CertificateDer<'static>]) -> Self {
        let tcp = TcpConnector { no_delay };
        let alpn = (!alpn.is_empty()).then(|| alpn.to_vec());
        Self {
            tcp,
            tls: TlsConnector::new_with_roots(tcp, extra_roots, alpn),
        }
    }
}

impl<'e> Connector<&'e Endpoint> for HostConnector {
    type Connection = HostStream;
    type Error = crate::Error;

    async fn connect(&self, endpoint: &'e Endpoint) -> Result<Self::Connection, Self::Error> {
        match &endpoint.server_name {
            Some(sn) => self
                .tls
                .connect(TlsAddr { endpoint, sn })
                .await
                .map(HostStream::Tls)
                .map_err(Into::into),
            None => self
                .tcp
                .connect(endpoint)
                .await
                .map(HostStream::Plain)
                .map_err(Into::into),
        }
    }
}

pub enum HostStream {
    Plain(TcpStream),
    Tls(TlsStream<TcpStream>),
}

impl std::fmt::Debug for HostStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plain(_) => write!(f, "Plain"),
            Self::Tls(_) => write!(f, "Tls"),
        }
    }
}

impl AsyncReadRent for HostStream {
    #[inline]
    async fn read<T: IoBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        match self {
            HostStream::Plain(s) => s.read(buf).await,
            HostStream::Tls(s) => s.read(buf).await,
        }
    }

    #[inline]
    async fn readv<T: IoVecBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
        match self {
            HostStream::Plain(s) => s.readv(buf).await,
            HostStream::Tls(s) => s.readv(buf).await,
        }
    }
}

impl AsyncWriteRent for HostStream {
    #[inline]
    async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
        match self {
            HostStream::Plain(s) => s.write(buf).await,
            HostStream::Tls(s) => s.write(buf).await,
        }
    }

    #[inline]
    async fn writev<T: IoVecBuf>(&mut self, buf_vec: T) -> BufResult<usize, T> {
        match self {
            HostStream::Plain(s) => s.writev(buf_vec).await,
            HostStream::Tls(s) => s.writev(buf_vec).await,
        }
    }

    #[inline]
    async fn flush(&mut self) -> io::Result<()> {
        match self {
            HostStream::Plain(s) => s.flush().await,
            HostStream::Tls(s) => s.flush().await,
        }
    }

    #[inline]
    async fn shutdown(&mut self) -> io::Result<()> {
        match self {
            HostStream::Plain(s) => s.shutdown().await,
            HostStream::Tls(s) => s.shutdown().await,
        }
    }
}

unsafe impl Split for HostStream {}
