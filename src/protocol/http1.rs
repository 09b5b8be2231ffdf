//! HTTP/1.1 host client.
//!
//! Every request runs on its own connection; the response payload is read
//! fully before the connection is dropped.
use std::sync::Arc;

use http::{
    header::{HOST, USER_AGENT},
    HeaderValue, Request, Response,
};
use monoio::io::{
    sink::{Sink, SinkExt},
    stream::Stream,
};
use monoio_http::{
    common::{
        body::{Body, HttpBody},
        error::HttpError,
        IntoParts,
    },
    h1::{
        codec::{
            decoder::{DecodeError, PayloadDecoder},
            ClientCodec,
        },
        payload::{fixed_payload_pair, stream_payload_pair, Payload},
    },
};
use smol_str::SmolStr;

use super::{with_timeout, ClientFactory, HostClient, HostOption, Protocol};
use crate::{
    config::RequestOptions,
    connectors::{Connector, Endpoint, HostConnector, HostStream},
    Error, Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Http1ClientOption {
    pub host: HostOption,
    /// Sent as `User-Agent` when the request has none.
    pub name: Option<SmolStr>,
}

impl Http1ClientOption {
    pub fn new(host: HostOption) -> Self {
        Self { host, name: None }
    }

    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Hands out a fresh [`Http1HostClient`] per call, all sharing one option.
#[derive(Clone, Debug)]
pub struct Http1ClientFactory {
    option: Arc<Http1ClientOption>,
}

impl Http1ClientFactory {
    pub fn new(option: Http1ClientOption) -> Self {
        Self {
            option: Arc::new(option),
        }
    }

    #[inline]
    pub fn option(&self) -> &Http1ClientOption {
        &self.option
    }
}

impl ClientFactory for Http1ClientFactory {
    type Client = Http1HostClient;

    fn new_host_client(&self) -> Result<Self::Client> {
        let host = &self.option.host;
        let endpoint = host.endpoint()?;
        let host_header = host.host_header()?;
        let user_agent = self
            .option
            .name
            .as_ref()
            .map(|name| HeaderValue::from_str(name).map_err(|e| Error::Http(e.into())))
            .transpose()?;
        let connector = HostConnector::new(
            host.no_delay,
            &[Protocol::Http1.alpn()],
            &host.root_certs,
        );

        #[cfg(feature = "logging")]
        tracing::debug!("new h1 host client for {}", endpoint);
        Ok(Http1HostClient {
            option: self.option.clone(),
            endpoint,
            host_header,
            user_agent,
            connector,
        })
    }
}

#[derive(Debug)]
pub struct Http1HostClient {
    option: Arc<Http1ClientOption>,
    endpoint: Endpoint,
    host_header: HeaderValue,
    user_agent: Option<HeaderValue>,
    connector: HostConnector,
}

impl HostClient for Http1HostClient {
    #[inline]
    fn protocol(&self) -> Protocol {
        Protocol::Http1
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
            "h1 request to {}, sd: {}, tags: {:?}, timeouts: {:?}",
            self.endpoint,
            opts.is_sd(),
            opts.tags(),
            timeouts
        );

        let headers = request.headers_mut();
        if !headers.contains_key(HOST) {
            headers.insert(HOST, self.host_header.clone());
        }
        if let Some(ua) = &self.user_agent {
            if !headers.contains_key(USER_AGENT) {
                headers.insert(USER_AGENT, ua.clone());
            }
        }

        let io = with_timeout(
            timeouts.dial,
            "dial",
            self.connector.connect(&self.endpoint),
        )
        .await??;
        let mut conn = Http1Connection::new(ClientCodec::new(io));
        with_timeout(timeouts.write, "write", conn.send(request)).await??;
        let response = with_timeout(timeouts.read, "read", conn.recv()).await??;
        Ok(response)
    }
}

struct Http1Connection {
    framed: ClientCodec<HostStream>,
}

impl Http1Connection {
    fn new(framed: ClientCodec<HostStream>) -> Self {
        Self { framed }
    }

    async fn send<R, E>(&mut self, request: R) -> std::result::Result<(), HttpError>
    where
        ClientCodec<HostStream>: Sink<R, Error = E>,
        E: std::fmt::Debug + Into<HttpError>,
    {
        if let Err(e) = self.framed.send_and_flush(request).await {
            #[cfg(feature = "logging")]
            tracing::error!("send upstream request error {:?}", e);
            return Err(e.into());
        }
        Ok(())
    }

    async fn recv(&mut self) -> std::result::Result<Response<HttpBody>, HttpError> {
        let handle = &mut self.framed;
        match handle.next().await {
            Some(Ok(resp)) => {
                let (parts, payload_decoder) = resp.into_parts();
                match payload_decoder {
                    PayloadDecoder::None => {
                        let payload = Payload::None;
                        Ok(Response::from_parts(parts, payload.into()))
                    }
                    PayloadDecoder::Fixed(_) => {
                        let mut framed_payload = payload_decoder.with_io(handle);
                        let (payload, payload_sender) = fixed_payload_pair();
                        if let Some(data) = framed_payload.next_data().await {
                            payload_sender.feed(data)
                        }
                        let payload = Payload::Fixed(payload);
                        Ok(Response::from_parts(parts, payload.into()))
                    }
                    PayloadDecoder::Streamed(_) => {
                        let mut framed_payload = payload_decoder.with_io(handle);
                        let (payload, mut payload_sender) = stream_payload_pair();
                        loop {
                            match framed_payload.next_data().await {
                                Some(Ok(data)) => payload_sender.feed_data(Some(data)),
                                Some(Err(e)) => {
                                    #[cfg(feature = "logging")]
                                    tracing::error!("decode upstream response error {:?}", e);
                                    return Err(e);
                                }
                                None => {
                                    payload_sender.feed_data(None);
                                    break;
                                }
                            }
                        }
                        let payload = Payload::Stream(payload);
                        Ok(Response::from_parts(parts, payload.into()))
                    }
                }
            }
            Some(Err(e)) => {
                #[cfg(feature = "logging")]
                tracing::error!("decode upstream response error {:?}", e);
                Err(e)
            }
            None => {
                #[cfg(feature = "logging")]
                tracing::error!("upstream return eof");
                Err(DecodeError::UnexpectedEof.into())
            }
        }
    }
}
