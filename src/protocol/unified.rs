use http::{Request, Response};
use monoio_http::common::body::HttpBody;

use super::{
    http1::{Http1ClientFactory, Http1ClientOption, Http1HostClient},
    http2::{Http2ClientFactory, Http2ClientOption, Http2HostClient},
    ClientFactory, HostClient, Protocol,
};
use crate::{config::RequestOptions, connectors::Endpoint, Result};

/// A factory for any supported protocol, picked by the option type it is built from.
#[derive(Clone, Debug)]
pub enum UnifiedClientFactory {
    Http1(Http1ClientFactory),
    Http2(Http2ClientFactory),
}

impl UnifiedClientFactory {
    #[inline]
    pub fn protocol(&self) -> Protocol {
        match self {
            Self::Http1(_) => Protocol::Http1,
            Self::Http2(_) => Protocol::Http2,
        }
    }
}

impl From<Http1ClientOption> for UnifiedClientFactory {
    #[inline]
    fn from(option: Http1ClientOption) -> Self {
        Self::Http1(Http1ClientFactory::new(option))
    }
}

impl From<Http2ClientOption> for UnifiedClientFactory {
    #[inline]
    fn from(option: Http2ClientOption) -> Self {
        Self::Http2(Http2ClientFactory::new(option))
    }
}

impl ClientFactory for UnifiedClientFactory {
    type Client = UnifiedHostClient;

    fn new_host_client(&self) -> Result<Self::Client> {
        match self {
            Self::Http1(f) => f.new_host_client().map(UnifiedHostClient::Http1),
            Self::Http2(f) => f.new_host_client().map(UnifiedHostClient::Http2),
        }
    }
}

#[derive(Debug)]
pub enum UnifiedHostClient {
    Http1(Http1HostClient),
    Http2(Http2HostClient),
}

impl HostClient for UnifiedHostClient {
    #[inline]
    fn protocol(&self) -> Protocol {
        match self {
            Self::Http1(c) => c.protocol(),
            Self::Http2(c) => c.protocol(),
        }
    }

    #[inline]
    fn endpoint(&self) -> &Endpoint {
        match self {
            Self::Http1(c) => c.endpoint(),
            Self::Http2(c) => c.endpoint(),
        }
    }

    async fn send_request(
        &self,
        request: Request<HttpBody>,
        opts: &RequestOptions,
    ) -> Result<Response<HttpBody>> {
        match self {
            Self::Http1(c) => c.send_request(request, opts).await,
            Self::Http2(c) => c.send_request(request, opts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{protocol::HostOption, Error};

    #[test]
    fn selected_by_option_type() {
        let host = HostOption::new("example.com", 443).tls(true);

        let factory = UnifiedClientFactory::from(Http1ClientOption::new(host.clone()));
        assert_eq!(factory.protocol(), Protocol::Http1);
        let client = factory.new_host_client().unwrap();
        assert!(matches!(client, UnifiedHostClient::Http1(_)));
        assert_eq!(client.protocol(), Protocol::Http1);

        let factory = UnifiedClientFactory::from(Http2ClientOption::new(host));
        let client = factory.new_host_client().unwrap();
        assert_eq!(client.protocol(), Protocol::Http2);
        assert_eq!(client.endpoint().port, 443);
    }

    #[test]
    fn failure_yields_no_client() {
        let factory =
            UnifiedClientFactory::from(Http2ClientOption::new(HostOption::new("example.com", 80)));
        assert!(matches!(
            factory.new_host_client(),
            Err(Error::InvalidOption(_))
        ));
    }
}
