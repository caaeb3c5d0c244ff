//! Request start stamping.
//!
//! Sets a header to the dispatch time in milliseconds since the Unix epoch,
//! so the receiving service can measure how long a request queued before it
//! was picked up. The header defaults to [`REQUEST_START_HEADER`]; services
//! whose APM agent reads another name register a layer built with
//! [`RequestStartLayer::with_header`].

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{SystemTime, UNIX_EPOCH};

use tower::{Layer, Service};

use crate::middleware::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// Name of the stamped header.
pub const REQUEST_START_HEADER: &str = "X-Request-Faraday-Start";

/// Layer that stamps the dispatch time on each attempt.
///
/// # Example
///
/// ```
/// use tether::ClientConfig;
/// use tether::middleware::RequestStartLayer;
///
/// let config = ClientConfig::builder()
///     .register_layer("queue_time", RequestStartLayer::with_header("X-Request-Start"))
///     .middleware("queue_time")
///     .build();
/// # let _ = config;
/// ```
#[derive(Debug, Clone)]
pub struct RequestStartLayer {
    header: Arc<str>,
}

impl Default for RequestStartLayer {
    fn default() -> Self {
        Self::with_header(REQUEST_START_HEADER)
    }
}

impl RequestStartLayer {
    /// Stamp [`REQUEST_START_HEADER`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `header` instead.
    #[must_use]
    pub fn with_header(header: impl Into<Arc<str>>) -> Self {
        Self {
            header: header.into(),
        }
    }
}

impl<S> Layer<S> for RequestStartLayer {
    type Service = RequestStart<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestStart {
            inner,
            header: Arc::clone(&self.header),
        }
    }
}

/// Service that stamps the dispatch time.
#[derive(Debug, Clone)]
pub struct RequestStart<S> {
    inner: S,
    header: Arc<str>,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

impl<S> Service<Request> for RequestStart<S>
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
        request.set_header(self.header.as_ref(), now_millis().to_string());

        let mut inner = self.inner.clone();
        Box::pin(async move { inner.call(request).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::{Headers, Method};

    async fn stamped(layer: &RequestStartLayer, header: &'static str) -> Option<String> {
        let seen = Arc::new(Mutex::new(None));
        let terminal = {
            let seen = Arc::clone(&seen);
            tower::service_fn(move |request: Request| {
                let seen = Arc::clone(&seen);
                async move {
                    *seen.lock().expect("lock") = request.header(header).map(str::to_string);
                    Ok::<_, Error>(Response::new(200, Headers::new(), ""))
                }
            })
        };

        let request =
            Request::builder(Method::Get, Url::parse("http://svc/").expect("valid URL")).build();
        layer.layer(terminal).oneshot(request).await.expect("response");

        seen.lock().expect("lock").clone()
    }

    #[tokio::test]
    async fn stamps_dispatch_time_in_millis() {
        let before = now_millis();
        let value = stamped(&RequestStartLayer::new(), "x-request-faraday-start")
            .await
            .expect("header set");

        let millis: u128 = value.parse().expect("plain milliseconds");
        assert!(millis >= before);
        assert!(millis <= now_millis());
    }

    #[tokio::test]
    async fn header_name_can_be_changed() {
        let layer = RequestStartLayer::with_header("X-Request-Start");

        let value = stamped(&layer, "x-request-start").await;
        assert!(value.is_some());
        assert_eq!(stamped(&layer, "x-request-faraday-start").await, None);
    }
}
