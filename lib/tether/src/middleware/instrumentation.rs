//! Request instrumentation.
//!
//! Runs each request inside an `http_request` span and records its outcome
//! and duration as a DEBUG event, so subscribers can time the calls a
//! service makes to its dependencies.

use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};
use tracing::{Instrument, Level, debug, span};

use crate::logger::redact;
use crate::middleware::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Layer that instruments requests with `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentationLayer {
    _private: (),
}

impl InstrumentationLayer {
    /// Create a new instrumentation layer.
    #[must_use]
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl<S> Layer<S> for InstrumentationLayer {
    type Service = Instrumentation<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Instrumentation { inner }
    }
}

/// Service that wraps requests in a span.
#[derive(Debug, Clone)]
pub struct Instrumentation<S> {
    inner: S,
}

impl<S> Service<Request> for Instrumentation<S>
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
        let method = request.method();
        let url = request.url().to_string();
        let span = span!(Level::INFO, "http_request", %method, %url);

        let mut inner = self.inner.clone();
        Box::pin(
            async move {
                let start = Instant::now();
                let result = inner.call(request).await;
                let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

                match &result {
                    Ok(response) => {
                        debug!(status = response.status(), elapsed_ms, "request completed");
                    }
                    Err(err) => {
                        let error = redact(&err.to_string());
                        debug!(%error, elapsed_ms, "request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
