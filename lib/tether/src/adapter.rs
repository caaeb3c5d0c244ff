//! Adapters: the terminal stage of every pipeline.
//!
//! An [`Adapter`] names the [`Transport`] a connection dispatches through.
//! The default is [`HyperTransport`], a pooled `hyper-util` client over a
//! rustls connector. [`Adapter::custom`] plugs in anything else, typically a
//! [`transport_fn`](crate::transport_fn) stub in tests.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use tower_service::Service;

use crate::connector::https_connector;
use crate::middleware::ServiceFuture;
use crate::{Body, Error, Headers, Request, Response, ResponseFuture, Result, Transport};

/// Transport selection of a client configuration.
#[derive(Clone, Default)]
pub enum Adapter {
    /// Pooled hyper client, created when the connection is built.
    #[default]
    Hyper,
    /// A user-supplied transport.
    Custom(Arc<dyn Transport>),
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Adapter {
    /// Select a user-supplied transport.
    pub fn custom(transport: impl Transport) -> Self {
        Self::Custom(Arc::new(transport))
    }

    /// Short name, for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Hyper => "hyper",
            Self::Custom(_) => "custom",
        }
    }

    /// Create the transport this adapter names.
    ///
    /// A hyper transport bounds connection establishment by `timeout` too.
    #[must_use]
    pub fn transport(&self, timeout: Duration) -> Arc<dyn Transport> {
        match self {
            Self::Hyper => Arc::new(HyperTransport::with_connect_timeout(timeout)),
            Self::Custom(transport) => Arc::clone(transport),
        }
    }
}

/// HTTP transport using hyper-util with connection pooling and TLS.
#[derive(Clone)]
pub struct HyperTransport {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::from_connector(https_connector(None))
    }
}

impl HyperTransport {
    /// Create a transport with its own connection pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport giving up on connecting after `timeout`.
    #[must_use]
    pub fn with_connect_timeout(timeout: Duration) -> Self {
        Self::from_connector(https_connector(Some(timeout)))
    }

    fn from_connector(connector: HttpsConnector<HttpConnector>) -> Self {
        let inner = Client::builder(TokioExecutor::new()).build(connector);
        Self { inner }
    }

    /// Build a hyper request from an encoded request.
    fn build_hyper_request(request: Request) -> Result<http::Request<Full<Bytes>>> {
        let (method, url, _query, headers, body) = request.into_parts();

        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());

        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = match body {
            Some(Body::Bytes(bytes)) => Full::new(bytes),
            Some(_) => return Err(Error::invalid_request("request body was not encoded")),
            None => Full::default(),
        };

        builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))
    }

    /// Extract response headers as a map.
    fn extract_headers(headers: &http::HeaderMap) -> Headers {
        headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect()
    }

    async fn execute(&self, request: Request) -> Result<Response> {
        let hyper_request = Self::build_hyper_request(request)?;

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(Self::map_hyper_error)?;

        let status = response.status().as_u16();
        let headers = Self::extract_headers(response.headers());

        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        Ok(Response::new(status, headers, body))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
        let msg = err.to_string();

        if err.is_connect() {
            return Error::connection(msg);
        }

        if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
            return Error::tls(msg);
        }

        Error::connection(msg)
    }
}

impl Transport for HyperTransport {
    fn dispatch(&self, request: Request) -> ResponseFuture {
        let transport = self.clone();
        Box::pin(async move { transport.execute(request).await })
    }
}

/// Terminal service: dispatches through a transport, one timeout per attempt.
#[derive(Clone)]
pub struct AdapterService {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl fmt::Debug for AdapterService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AdapterService {
    /// Create the terminal service.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

impl Service<Request> for AdapterService {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if !request.is_encoded() {
            return Box::pin(async {
                Err::<Response, _>(Error::invalid_request(
                    "request reached the adapter without passing the encoding stage",
                ))
            });
        }

        let timeout = self.timeout;
        let dispatch = self.transport.dispatch(request);
        Box::pin(async move {
            tokio::time::timeout(timeout, dispatch)
                .await
                .map_err(|_| Error::timeout(timeout))?
        })
    }
}
