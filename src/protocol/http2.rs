//! HTTP/2 host client.
//!
//! The client handshakes lazily and keeps the multiplexed sender for later
//! requests until the connection reports an error or
//! [`Http2HostClient::close_idle_connections`] drops it.
use std::{cell::RefCell, sync::Arc};

use bytes::Bytes;
use http::{uri::Scheme, Request, Response, Uri};
use monoio_http::{
    common::body::{Body, HttpBody},
    h2::client::{Builder, ResponseFuture, SendRequest},
};

use super::{with_timeout, ClientFactory, HostClient, HostOption, Protocol};
use crate::{
    config::RequestOptions,
    connectors::{Connector, Endpoint, HostConnector, HostStream},
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http2ClientOption {
    pub host: HostOption,
    /// Allow h2 over plaintext TCP (prior knowledge). TLS is required otherwise.
    pub allow_http: bool,
    pub initial_window_size: Option<u32>,
}

impl Http2ClientOption {
    pub fn new(host: HostOption) -> Self {
        Self {
            host,
            allow_http: false,
            initial_window_size: None,
        }
    }

    pub fn allow_http(mut self, allow_http: bool) -> Self {
        self.allow_http = allow_http;
        self
    }

    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.initial_window_size = Some(size);
        self
    }
}

/// Hands out a fresh [`Http2HostClient`] per call, all sharing one option.
/// Clients do not share connections with each other.
#[derive(Clone, Debug)]
pub struct Http2ClientFactory {
    option: Arc<Http2ClientOption>,
}

impl Http2ClientFactory {
    pub fn new(option: Http2ClientOption) -> Self {
        Self {
            option: Arc::new(option),
        }
    }

    #[inline]
    pub fn option(&self) -> &Http2ClientOption {
        &self.option
    }
}

impl ClientFactory for Http2ClientFactory {
    type Client = Http2HostClient;

    fn new_host_client(&self) -> Result<Self::Client> {
        let host = &self.option.host;
        if !host.tls && !self.option.allow_http {
            return Err(Error::InvalidOption(format!(
                "h2 over plaintext to {}:{} is not allowed",
                host.host, host.port
            )));
        }
        let endpoint = host.endpoint()?;
        let authority = host.host_header()?;
        let authority = authority
            .to_str()
            .map_err(|_| Error::InvalidOption(format!("invalid authority {:?}", authority)))?
            .to_owned();
        let connector = HostConnector::new(
            host.no_delay,
            &[Protocol::Http2.alpn()],
            &host.root_certs,
        );

        #[cfg(feature = "logging")]
        tracing::debug!("new h2 host client for {}", endpoint);
        Ok(Http2HostClient {
            option: self.option.clone(),
            endpoint,
            authority,
            connector,
            sender: RefCell::new(None),
        })
    }
}

pub struct Http2HostClient {
    option: Arc<Http2ClientOption>,
    endpoint: Endpoint,
    authority: String,
    connector: HostConnector,
    // TODO: single flight concurrent handshakes on the same client.
    sender: RefCell<Option<SendRequest<Bytes>>>,
}

impl std::fmt::Debug for Http2HostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Http2HostClient, endpoint: {}, connected: {}",
            self.endpoint,
            self.sender.borrow().is_some()
        )
    }
}

impl Http2HostClient {
    /// Drop the cached connection, the next request handshakes again.
    pub fn close_idle_connections(&self) {
        self.sender.borrow_mut().take();
    }

    fn ready_sender(&self) -> Option<SendRequest<Bytes>> {
        let mut sender = self.sender.borrow_mut();
        match sender.as_ref() {
            Some(tx) if !tx.has_conn_error() => Some(tx.clone()),
            Some(_) => {
                #[cfg(feature = "logging")]
                tracing::debug!("h2 connection to {} broken, reconnecting", self.endpoint);
                sender.take();
                None
            }
            None => None,
        }
    }

    async fn handshake(&self) -> Result<SendRequest<Bytes>> {
        let io = self.connector.connect(&self.endpoint).await?;
        if let HostStream::Tls(tls) = &io {
            check_alpn(tls.alpn_protocol().as_deref(), Protocol::Http2)?;
        }

        let mut builder = Builder::new();
        if let Some(size) = self.option.initial_window_size {
            builder.initial_window_size(size);
        }
        let (tx, conn) = builder.handshake::<_, Bytes>(io).await?;
        monoio::spawn(async move {
            if let Err(_e) = conn.await {
                #[cfg(feature = "logging")]
                tracing::error!("h2 connection error {:?}", _e);
            }
        });
        *self.sender.borrow_mut() = Some(tx.clone());
        Ok(tx)
    }

    /// h2 needs scheme and authority, fill them in for origin form uris.
    fn absolute_uri(&self, uri: &Uri) -> Result<Uri> {
        if uri.authority().is_some() {
            return Ok(uri.clone());
        }
        let scheme = if self.option.host.tls {
            Scheme::HTTPS
        } else {
            Scheme::HTTP
        };
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Uri::builder()
            .scheme(scheme)
            .authority(self.authority.as_str())
            .path_and_query(path_and_query)
            .build()
            .map_err(Into::into)
    }
}

impl HostClient for Http2HostClient {
    #[inline]
    fn protocol(&self) -> Protocol {
        Protocol::Http2
    }

    #[inline]
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send_request(
        &self,
        mut request: Request<HttpBody>,
        opts: &RequestOptions,
    ) -> Result<Response<HttpBody>> {
        let timeouts = self.option.host.timeouts(opts);
        #[cfg(feature = "logging")]
        tracing::debug!(
            "h2 request to {}, sd: {}, tags: {:?}, timeouts: {:?}",
            self.endpoint,
            opts.is_sd(),
            opts.tags(),
            timeouts
        );

        *request.uri_mut() = self.absolute_uri(request.uri())?;
        let tx = match self.ready_sender() {
            Some(tx) => tx,
            None => with_timeout(timeouts.dial, "dial", self.handshake()).await??,
        };

        let mut conn = Http2Connection::new(tx);
        let response = with_timeout(timeouts.write, "write", conn.send(request)).await??;
        with_timeout(timeouts.read, "read", Http2Connection::recv(response)).await?
    }
}

/// A TLS peer must have picked `expected` via ALPN, no negotiation fails too.
fn check_alpn(negotiated: Option<&[u8]>, expected: Protocol) -> Result<()> {
    if negotiated == Some(expected.alpn().as_bytes()) {
        return Ok(());
    }
    #[cfg(feature = "logging")]
    tracing::warn!(
        "ALPN mismatch, expected {}, negotiated {:?}",
        expected,
        negotiated.map(String::from_utf8_lossy)
    );
    Err(Error::AlpnMismatch(expected))
}

struct Http2Connection {
    tx: SendRequest<Bytes>,
}

impl Http2Connection {
    fn new(tx: SendRequest<Bytes>) -> Self {
        Self { tx }
    }

    async fn send(&mut self, request: Request<HttpBody>) -> Result<ResponseFuture> {
        let mut client = self.tx.clone().ready().await?;

        let (parts, mut body) = request.into_parts();
        let h2_request = Request::from_parts(parts, ());
        let (response, mut send_stream) = client.send_request(h2_request, false)?;

        while let Some(data) = body.next_data().await {
            match data {
                Ok(data) => {
                    if let Err(e) = send_stream.send_data(data, false) {
                        #[cfg(feature = "logging")]
                        tracing::error!("H2 client body send error {:?}", e);
                        return Err(e.into());
                    }
                }
                Err(e) => {
                    #[cfg(feature = "logging")]
                    tracing::error!("H2 request body stream error {:?}", e);
                    return Err(e.into());
                }
            }
        }
        // Mark end of stream
        if let Err(e) = send_stream.send_data(Bytes::new(), true) {
            #[cfg(feature = "logging")]
            tracing::error!("H2 client end of stream send error {:?}", e);
            return Err(e.into());
        }
        Ok(response)
    }

    async fn recv(response: ResponseFuture) -> Result<Response<HttpBody>> {
        let response = match response.await {
            Ok(response) => response,
            Err(e) => {
                #[cfg(feature = "logging")]
                tracing::error!("H2 client response error {:?}", e);
                return Err(e.into());
            }
        };
        let (parts, body) = response.into_parts();
        Ok(Response::from_parts(parts, body.into()))
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::Cell, rc::Rc, time::Duration};

    use monoio::net::{TcpListener, TcpStream};
    use monoio_http::{
        common::body::BodyExt,
        h1::payload::{FixedPayload, Payload},
    };
    use rustls::pki_types::{PrivateKeyDer, PrivatePkcs8KeyDer};

    use super::*;
    use crate::config::{new_request_options, with_read_timeout};

    fn get(path: &str) -> Request<HttpBody> {
        Request::builder()
            .uri(path)
            .body(HttpBody::H1(Payload::None))
            .unwrap()
    }

    async fn serve_h2(io: TcpStream) -> std::result::Result<(), monoio_http::h2::Error> {
        let mut connection = monoio_http::h2::server::handshake(io).await?;
        while let Some(result) = connection.accept().await {
            let (_request, mut respond) = result?;
            let mut send = respond.send_response(Response::new(()), false)?;
            send.send_data(Bytes::from_static(b"hello"), true)?;
        }
        Ok(())
    }

    /// Accepts streams and never answers them.
    async fn serve_h2_silent(io: TcpStream) -> std::result::Result<(), monoio_http::h2::Error> {
        let mut connection = monoio_http::h2::server::handshake(io).await?;
        let mut unanswered = Vec::new();
        while let Some(result) = connection.accept().await {
            let (_request, respond) = result?;
            unanswered.push(respond);
        }
        Ok(())
    }

    /// h2c server counting accepted tcp connections.
    fn spawn_server() -> (u16, Rc<Cell<usize>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Rc::new(Cell::new(0));
        let counter = accepted.clone();
        monoio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                counter.set(counter.get() + 1);
                monoio::spawn(serve_h2(socket));
            }
        });
        (port, accepted)
    }

    #[test]
    fn plaintext_requires_allow_http() {
        let host = HostOption::new("example.com", 80);
        let factory = Http2ClientFactory::new(Http2ClientOption::new(host.clone()));
        assert!(matches!(
            factory.new_host_client(),
            Err(Error::InvalidOption(_))
        ));

        let factory = Http2ClientFactory::new(Http2ClientOption::new(host).allow_http(true));
        let client = factory.new_host_client().unwrap();
        assert_eq!(client.protocol(), Protocol::Http2);
        assert!(client.endpoint().server_name.is_none());
    }

    #[test]
    fn tls_factory() {
        let factory = Http2ClientFactory::new(
            Http2ClientOption::new(HostOption::new("example.com", 443).tls(true))
                .initial_window_size(1 << 20),
        );
        let client = factory.new_host_client().unwrap();
        assert!(client.endpoint().server_name.is_some());
        assert_eq!(factory.option().initial_window_size, Some(1 << 20));

        let factory = Http2ClientFactory::new(Http2ClientOption::new(
            HostOption::new("", 443).tls(true),
        ));
        assert!(factory.new_host_client().is_err());
    }

    #[test]
    fn origin_form_uri_made_absolute() {
        let factory = Http2ClientFactory::new(Http2ClientOption::new(
            HostOption::new("example.com", 8443).tls(true),
        ));
        let client = factory.new_host_client().unwrap();

        let uri = client.absolute_uri(&"/get?a=1".parse().unwrap()).unwrap();
        assert_eq!(uri, "https://example.com:8443/get?a=1");

        let absolute: Uri = "http://other.com/x".parse().unwrap();
        assert_eq!(client.absolute_uri(&absolute).unwrap(), absolute);

        let factory = Http2ClientFactory::new(Http2ClientOption::new(
            HostOption::new("[::1]", 8443).tls(true),
        ));
        let client = factory.new_host_client().unwrap();
        let uri = client.absolute_uri(&"/get".parse().unwrap()).unwrap();
        assert_eq!(uri, "https://[::1]:8443/get");
    }

    #[test]
    fn alpn_must_select_h2() {
        assert!(check_alpn(Some(&b"h2"[..]), Protocol::Http2).is_ok());
        assert!(matches!(
            check_alpn(Some(&b"http/1.1"[..]), Protocol::Http2),
            Err(Error::AlpnMismatch(Protocol::Http2))
        ));
        assert!(matches!(
            check_alpn(None, Protocol::Http2),
            Err(Error::AlpnMismatch(Protocol::Http2))
        ));
    }

    #[monoio::test(enable_timer = true)]
    async fn tls_server_without_h2_rejected() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert = certified.cert.der().clone();
        let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));
        // no ALPN configured, the server never selects a protocol
        let server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert.clone()], key)
            .unwrap();
        let acceptor: monoio_rustls::TlsAcceptor = server_config.into();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        monoio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            if let Ok(stream) = acceptor.accept(socket).await {
                monoio::time::sleep(Duration::from_secs(1)).await;
                drop(stream);
            }
        });

        let host = HostOption::new("127.0.0.1", port)
            .tls(true)
            .server_name("localhost")
            .add_root_certificate(cert);
        let client = Http2ClientFactory::new(Http2ClientOption::new(host))
            .new_host_client()
            .unwrap();
        let err = client
            .send_request(get("/get"), &new_request_options(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlpnMismatch(Protocol::Http2)));
        assert!(client.sender.borrow().is_none());
    }

    #[monoio::test(enable_timer = true)]
    async fn request_read_timeout_overrides_client() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        monoio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                monoio::spawn(serve_h2_silent(socket));
            }
        });

        let factory = Http2ClientFactory::new(
            Http2ClientOption::new(
                HostOption::new("127.0.0.1", port).read_timeout(Duration::from_secs(30)),
            )
            .allow_http(true),
        );
        let client = factory.new_host_client().unwrap();
        let opts = new_request_options(&[with_read_timeout(Duration::from_millis(50))]);

        let err = client.send_request(get("/slow"), &opts).await.unwrap_err();
        assert!(matches!(err, Error::Timeout("read")));
    }

    #[monoio::test(enable_timer = true)]
    async fn request_body_ends_stream() {
        let (port, _) = spawn_server();
        let factory = Http2ClientFactory::new(
            Http2ClientOption::new(HostOption::new("127.0.0.1", port)).allow_http(true),
        );
        let client = factory.new_host_client().unwrap();
        let request = Request::builder()
            .method("POST")
            .uri("/post")
            .body(HttpBody::H1(Payload::Fixed(FixedPayload::new(
                Bytes::from_static(b"ping"),
            ))))
            .unwrap();

        let resp = client
            .send_request(request, &new_request_options(&[]))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body = resp.into_body().bytes().await.unwrap();
        assert_eq!(&body[..], b"hello");
    }

    #[monoio::test(enable_timer = true)]
    async fn h2c_reuses_connection() {
        let (port, accepted) = spawn_server();
        let factory = Http2ClientFactory::new(
            Http2ClientOption::new(HostOption::new("127.0.0.1", port)).allow_http(true),
        );
        let client = factory.new_host_client().unwrap();

        for _ in 0..2 {
            let resp = client
                .send_request(get("/get"), &new_request_options(&[]))
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body = resp.into_body().bytes().await.unwrap();
            assert_eq!(&body[..], b"hello");
        }
        assert_eq!(accepted.get(), 1);

        client.close_idle_connections();
        let resp = client
            .send_request(get("/get"), &new_request_options(&[]))
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(accepted.get(), 2);
    }
}
