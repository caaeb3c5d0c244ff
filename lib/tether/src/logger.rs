//! Structured request log records and their destination.
//!
//! The logging stage turns each request/response exchange into one
//! [`LogRecord`] and hands it to a [`LogSink`]. Records never carry
//! credentials: header blocks and bodies go through [`redact`] first.

use std::fmt::{self, Write};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::info;

use crate::{Error, Headers, Request, Response};

/// Replacement for the value of a redacted credential.
pub const REDACTED: &str = "[REDACTED]";

// Any `...authorization: value` line, quoted or not, in any casing.
#[allow(clippy::expect_used)]
static AUTHORIZATION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(authorization["']?[ \t]*:[ \t]*).*"#).expect("valid redaction pattern")
});

/// Scrub the value of every `Authorization`-like line in `text`.
///
/// # Example
///
/// ```
/// use tether::logger::redact;
///
/// let scrubbed = redact("Accept: */*\nAuthorization: Bearer secret");
/// assert_eq!(scrubbed, "Accept: */*\nAuthorization: [REDACTED]");
/// ```
#[must_use]
pub fn redact(text: &str) -> String {
    AUTHORIZATION_LINE
        .replace_all(text, format!("${{1}}{REDACTED}"))
        .into_owned()
}

/// One structured log record: an ordered set of named fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogRecord {
    fields: Map<String, Value>,
}

impl LogRecord {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Field value by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Field value by name, if it is a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// All fields.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.fields.clone()))
    }
}

/// Destination of request log records.
pub trait LogSink: Send + Sync + 'static {
    /// Emit one record.
    fn emit(&self, record: &LogRecord);
}

/// Sink that emits records as `tracing` events at INFO level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        info!(target: "tether::requests", record = %record, "http exchange");
    }
}

impl<F> LogSink for F
where
    F: Fn(&LogRecord) + Send + Sync + 'static,
{
    fn emit(&self, record: &LogRecord) {
        self(record);
    }
}

/// Serialize headers as sorted `Name: value` lines.
fn header_block(headers: &Headers) -> Result<String, fmt::Error> {
    let mut entries: Vec<_> = headers.iter().collect();
    entries.sort_by(|(a, _), (b, _)| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));

    let mut block = String::new();
    for (name, value) in entries {
        writeln!(block, "{name}: {value}")?;
    }
    Ok(block)
}

fn body_text(bytes: &[u8]) -> String {
    redact(&String::from_utf8_lossy(bytes))
}

/// Build the record for one exchange.
///
/// `request` is the request as it left for the adapter, so its body is
/// already encoded.
pub(crate) fn format_record(
    request: &Request,
    outcome: Result<&Response, &Error>,
    elapsed_ms: u64,
    log_bodies: bool,
) -> Result<LogRecord, fmt::Error> {
    let mut record = LogRecord::new()
        .with("method", request.method().to_string())
        .with("url", request.url().as_str())
        .with("request_headers", redact(&header_block(request.headers())?))
        .with("elapsed_ms", elapsed_ms);

    if log_bodies
        && let Some(body) = request.body().and_then(|body| body.as_bytes())
    {
        record.insert("request_body", body_text(body));
    }

    match outcome {
        Ok(response) => {
            record.insert("status", response.status());
            record.insert("response_headers", redact(&header_block(response.headers())?));
            if log_bodies {
                record.insert("response_body", body_text(response.body()));
            }
        }
        Err(error) => record.insert("error", redact(&error.to_string())),
    }

    Ok(record)
}

/// Minimal record emitted when [`format_record`] fails.
pub(crate) fn fallback_record(request: &Request, error: &fmt::Error) -> LogRecord {
    LogRecord::new()
        .with("method", request.method().to_string())
        .with("url", request.url().as_str())
        .with("log_error", error.to_string())
}
