//! Failure reporting.
//!
//! When a response is classified as a failure, the client hands a
//! [`FailureContext`] to its [`ErrorReporter`] before returning the response
//! to the caller. The default [`LogReporter`] logs it; services plug in their
//! own reporter to page, count, or forward failures.

use serde::Serialize;
use tracing::error;

use crate::{Headers, Response};

/// What is known about a failed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureContext {
    /// URI of the failed request, query included.
    pub request_uri: String,
    /// HTTP status of the response.
    pub response_status: u16,
    /// Response headers.
    pub response_headers: Headers,
    /// Response body, lossily decoded as UTF-8.
    pub response_body: String,
}

impl FailureContext {
    /// Capture the context of `response`, returned for `request_uri`.
    #[must_use]
    pub fn new(request_uri: impl Into<String>, response: &Response) -> Self {
        Self {
            request_uri: request_uri.into(),
            response_status: response.status(),
            response_headers: response.headers().clone(),
            response_body: response.text_lossy(),
        }
    }
}

/// Hook invoked once per response classified as a failure.
pub trait ErrorReporter: Send + Sync + 'static {
    /// Report a failure. Must not panic.
    fn report(&self, context: &FailureContext);
}

/// Reporter that emits an ERROR `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, context: &FailureContext) {
        let headers = serde_json::to_string(&context.response_headers).unwrap_or_default();
        error!(
            request_uri = %context.request_uri,
            response_status = context.response_status,
            response_headers = %headers,
            response_body = %context.response_body,
            "service request failed"
        );
    }
}

impl<F> ErrorReporter for F
where
    F: Fn(&FailureContext) + Send + Sync + 'static,
{
    fn report(&self, context: &FailureContext) {
        self(context);
    }
}
