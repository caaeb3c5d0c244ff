//! Redacting request logger stage.
//!
//! Sits right above the adapter, so it sees the request exactly as it is
//! dispatched (every header set by the stages above it, encoded body) and
//! the raw response before decoding. Emits one [`LogRecord`](crate::logger::LogRecord)
//! per attempt and never fails the request.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use tower::{Layer, Service};

use crate::logger::{LogSink, fallback_record, format_record};
use crate::middleware::ServiceFuture;
use crate::{Error, Request, Response, Result};

/// What the logger stage records, and where to.
#[derive(Clone)]
pub struct LogOptions {
    /// Include request and response bodies.
    pub log_bodies: bool,
    /// Record destination.
    pub sink: Arc<dyn LogSink>,
}

impl fmt::Debug for LogOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogOptions")
            .field("log_bodies", &self.log_bodies)
            .finish_non_exhaustive()
    }
}

/// Layer that logs every exchange with credentials redacted.
#[derive(Debug, Clone)]
pub struct LoggerLayer {
    options: LogOptions,
}

impl LoggerLayer {
    /// Create a logger layer.
    #[must_use]
    pub fn new(options: LogOptions) -> Self {
        Self { options }
    }
}

impl<S> Layer<S> for LoggerLayer {
    type Service = Logger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Logger {
            inner,
            options: self.options.clone(),
        }
    }
}

/// Service that logs requests and responses.
#[derive(Debug, Clone)]
pub struct Logger<S> {
    inner: S,
    options: LogOptions,
}

impl<S> Service<Request> for Logger<S>
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
        let logged = request.clone();
        let options = self.options.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let start = Instant::now();
            let result = inner.call(request).await;
            let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

            let record = format_record(&logged, result.as_ref(), elapsed_ms, options.log_bodies)
                .unwrap_or_else(|err| fallback_record(&logged, &err));
            options.sink.emit(&record);

            result
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert2::{check, let_assert};
    use tower::ServiceExt;
    use tower::util::BoxCloneService;
    use url::Url;

    use super::*;
    use crate::Headers;
    use crate::logger::LogRecord;

    #[derive(Default)]
    struct Capture(Mutex<Vec<LogRecord>>);

    impl LogSink for Capture {
        fn emit(&self, record: &LogRecord) {
            self.0.lock().expect("lock").push(record.clone());
        }
    }

    fn logger(
        capture: &Arc<Capture>,
        log_bodies: bool,
        status: u16,
    ) -> Logger<crate::middleware::BoxedService> {
        let terminal = BoxCloneService::new(tower::service_fn(move |_request: Request| async move {
            Ok::<_, Error>(Response::new(
                status,
                Headers::from([("WWW-Authenticate".to_string(), "Bearer".to_string())]),
                "body",
            ))
        }));
        LoggerLayer::new(LogOptions {
            log_bodies,
            sink: Arc::clone(capture) as Arc<dyn LogSink>,
        })
        .layer(terminal)
    }

    fn request() -> Request {
        Request::builder(
            crate::Method::Get,
            Url::parse("http://svc/widgets?id=7").expect("valid URL"),
        )
        .header("authorization", "Bearer s3cr3t")
        .build()
    }

    #[tokio::test]
    async fn emits_one_redacted_record_per_call() {
        let capture = Arc::new(Capture::default());
        let service = logger(&capture, true, 200);

        let_assert!(Ok(response) = service.oneshot(request()).await);
        check!(response.status() == 200);

        let records = capture.0.lock().expect("lock");
        check!(records.len() == 1);
        let_assert!(Some(record) = records.first());
        check!(record.get_str("url") == Some("http://svc/widgets?id=7"));
        check!(record.get_str("response_body") == Some("body"));
        check!(!record.to_string().contains("s3cr3t"));
    }

    #[tokio::test]
    async fn failures_are_logged_and_returned() {
        let capture = Arc::new(Capture::default());
        let terminal = BoxCloneService::new(tower::service_fn(|_request: Request| async {
            Err::<Response, _>(Error::connection("refused"))
        }));
        let service = LoggerLayer::new(LogOptions {
            log_bodies: false,
            sink: Arc::clone(&capture) as Arc<dyn LogSink>,
        })
        .layer(terminal);

        let_assert!(Err(err) = service.oneshot(request()).await);
        check!(err.is_connection());

        let records = capture.0.lock().expect("lock");
        let_assert!(Some(record) = records.first());
        check!(record.get("error").is_some());
    }

    #[tokio::test]
    async fn bodies_follow_the_flag() {
        let capture = Arc::new(Capture::default());
        let service = logger(&capture, false, 404);

        let_assert!(Ok(_) = service.oneshot(request()).await);

        let records = capture.0.lock().expect("lock");
        let_assert!(Some(record) = records.first());
        check!(record.get("response_body").is_none());
        check!(record.get("status") == Some(&serde_json::Value::from(404)));
    }
}
