//! Request encoding stage.
//!
//! Serializes pending query pairs into the URL and structured bodies into
//! bytes. Runs outermost, so every later stage (and every retry) sees the
//! request exactly as it goes on the wire.

use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::middleware::ServiceFuture;
use crate::{Body, Error, Request, Response, Result, insert_header};

/// Layer that encodes requests before they enter the rest of the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlEncodingLayer {
    _private: (),
}

impl UrlEncodingLayer {
    /// Create a new encoding layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for UrlEncodingLayer {
    type Service = UrlEncoding<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UrlEncoding { inner }
    }
}

/// Service that encodes query pairs and bodies.
#[derive(Debug, Clone)]
pub struct UrlEncoding<S> {
    inner: S,
}

/// Move query pairs into the URL and turn the body into bytes.
///
/// A structured body sets `Content-Type` to the media type of its encoding,
/// replacing whatever the client defaults put there.
pub(crate) fn encode_request(request: Request) -> Result<Request> {
    let (method, mut url, query, mut headers, body) = request.into_parts();

    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(&query);
    }

    let body = match body {
        Some(body) => {
            let (bytes, content_type) = body.encode()?;
            if let Some(content_type) = content_type {
                insert_header(&mut headers, "Content-Type", content_type);
            }
            Some(Body::Bytes(bytes))
        }
        None => None,
    };

    Ok(Request::from_parts(method, url, Vec::new(), headers, body))
}

impl<S> Service<Request> for UrlEncoding<S>
where
    S: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let request = encode_request(request)?;
            inner.call(request).await
        })
    }
}
