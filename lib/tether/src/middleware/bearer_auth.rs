//! Bearer token authentication middleware.
//!
//! Adds an `Authorization: Bearer <token>` header to every outgoing request.
//! Register it on a [`ClientConfig`](crate::ClientConfig) and list its name
//! among the middlewares to put it in the pipeline.

use std::sync::Arc;
use std::task::{Context, Poll};

use tower::{Layer, Service};

use crate::middleware::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Layer that adds bearer token authentication to requests.
///
/// # Example
///
/// ```
/// use tether::ClientConfig;
/// use tether::middleware::BearerAuthLayer;
///
/// let config = ClientConfig::builder()
///     .register_layer("auth", BearerAuthLayer::new("my-secret-token"))
///     .middleware("auth")
///     .build();
/// # let _ = config;
/// ```
#[derive(Clone)]
pub struct BearerAuthLayer {
    token: Arc<str>,
}

impl std::fmt::Debug for BearerAuthLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthLayer").finish_non_exhaustive()
    }
}

impl BearerAuthLayer {
    /// Create a new bearer auth layer with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl<S> Layer<S> for BearerAuthLayer {
    type Service = BearerAuth<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BearerAuth {
            inner,
            token: Arc::clone(&self.token),
        }
    }
}

/// Service that adds bearer token authentication to requests.
#[derive(Clone)]
pub struct BearerAuth<S> {
    inner: S,
    token: Arc<str>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for BearerAuth<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request> for BearerAuth<S>
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

    fn call(&mut self, mut request: Request) -> Self::Future {
        request.set_header("Authorization", format!("Bearer {}", self.token));

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}
