use std::{fmt::Debug, net::ToSocketAddrs};

use monoio::io::{AsyncReadRent, AsyncWriteRent};
pub use monoio_rustls::{TlsConnector as MonoioTlsConnector, TlsError};

use super::{Connector, Endpoint};

pub type TlsStream<C> = monoio_rustls::ClientTlsStream<C>;

pub type ServerName<'a> = rustls::pki_types::ServerName<'a>;

pub type CertificateDer<'a> = rustls::pki_types::CertificateDer<'a>;

/// A connector for establishing TLS connections over an inner connector.
///
/// This connector wraps another connector (typically a TCP connector) and
/// adds TLS encryption to the connection.
#[derive(Clone)]
pub struct TlsConnector<C> {
    inner_connector: C,
    tls_connector: MonoioTlsConnector,
}

impl<C: Debug> std::fmt::Debug for TlsConnector<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TlsConnector, inner: {:?}", self.inner_connector)
    }
}

impl<C> TlsConnector<C> {
    pub const fn new(inner_connector: C, tls_connector: MonoioTlsConnector) -> Self {
        Self {
            inner_connector,
            tls_connector,
        }
    }

    // Create a new `TlsConnector` with webpki roots and custom ALPN protocols.
    #[inline]
    pub fn new_with_tls_default(inner_connector: C, alpn: Option<Vec<&str>>) -> Self {
        Self::new_with_roots(inner_connector, &[], alpn)
    }

    /// Like [`TlsConnector::new_with_tls_default`], additionally trusting
    /// `extra_roots`. Unparsable certificates are skipped.
    pub fn new_with_roots(
        inner_connector: C,
        extra_roots: &[CertificateDer<'static>],
        alpn: Option<Vec<&str>>,
    ) -> Self {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let (_added, _ignored) = root_store.add_parsable_certificates(extra_roots.iter().cloned());
        #[cfg(feature = "logging")]
        if _ignored > 0 {
            tracing::warn!("{} extra root certificates ignored", _ignored);
        }

        let mut cfg = rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        // Set ALPN from client side
        if let Some(alpn) = alpn {
            let alpn: Vec<Vec<u8>> = alpn.iter().map(|a| a.as_bytes().to_vec()).collect();
            cfg.alpn_protocols = alpn;
        }

        TlsConnector::new(inner_connector, cfg.into())
    }

    #[inline]
    pub fn inner_connector(&self) -> &C {
        &self.inner_connector
    }
}

impl<C, T, CN> Connector<T> for TlsConnector<C>
where
    T: AsRef<ServerName<'static>>,
    for<'a> C: Connector<&'a T, Error = std::io::Error, Connection = CN>,
    CN: AsyncReadRent + AsyncWriteRent,
{
    type Connection = TlsStream<CN>;
    type Error = TlsError;

    #[inline]
    async fn connect(&self, key: T) -> Result<Self::Connection, Self::Error> {
        let stream = self.inner_connector.connect(&key).await?;
        let server_name = key.as_ref();
        let tls_stream = self
            .tls_connector
            .connect(server_name.clone(), stream)
            .await?;
        Ok(tls_stream)
    }
}

/// An endpoint address paired with the name its certificate is checked against.
pub(crate) struct TlsAddr<'a> {
    pub(crate) endpoint: &'a Endpoint,
    pub(crate) sn: &'a ServerName<'static>,
}

impl AsRef<ServerName<'static>> for TlsAddr<'_> {
    #[inline]
    fn as_ref(&self) -> &ServerName<'static> {
        self.sn
    }
}

impl ToSocketAddrs for TlsAddr<'_> {
    type Iter = std::vec::IntoIter<std::net::SocketAddr>;

    #[inline]
    fn to_socket_addrs(&self) -> std::io::Result<Self::Iter> {
        self.endpoint.to_socket_addrs()
    }
}
