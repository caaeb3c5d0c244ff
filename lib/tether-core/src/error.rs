//! Error types for tether.

use std::time::Duration;

use derive_more::{Display, Error, From};

/// Network-level failures raised by the adapter stage.
///
/// These are the only errors the retry stage considers retryable.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Network/connection errors.
    #[display("connection error: {_0}")]
    Connection(#[error(not(source))] String),

    /// TLS/SSL errors.
    #[display("TLS error: {_0}")]
    Tls(#[error(not(source))] String),

    /// The attempt did not complete within the configured timeout.
    #[display("request timed out after {}ms", _0.as_millis())]
    Timeout(#[error(not(source))] Duration),
}

/// Main error type for tether operations.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Missing or invalid client configuration, raised while resolving.
    #[display("configuration error: {_0}")]
    #[from(skip)]
    Configuration(#[error(not(source))] String),

    /// Invalid pipeline assembly, raised when the connection is first built.
    #[display("pipeline build error: {_0}")]
    #[from(skip)]
    Build(#[error(not(source))] String),

    /// Network failure or timeout, after retries are exhausted.
    #[display("transport error: {_0}")]
    #[from]
    Transport(TransportError),

    /// Invalid request configuration.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// Response body could not be decoded (decompression or charset).
    #[display("response decoding error: {_0}")]
    #[from(skip)]
    Decoding(#[error(not(source))] String),

    /// JSON serialization error.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// JSON deserialization error with path context.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// JSON path to the error (e.g., "user.address.city").
        path: String,
        /// Error message.
        message: String,
    },

    /// Query string or form serialization error.
    #[display("query serialization error: {_0}")]
    #[from]
    QuerySerialization(serde_html_form::ser::Error),

    /// URL parsing error.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),
}

/// Result type alias using [`crate::Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a pipeline build error.
    #[must_use]
    pub fn build(message: impl Into<String>) -> Self {
        Self::Build(message.into())
    }

    /// Create a connection error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::Connection(message.into()))
    }

    /// Create a TLS error.
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Transport(TransportError::Tls(message.into()))
    }

    /// Create a timeout error for an attempt bounded by `after`.
    #[must_use]
    pub const fn timeout(after: Duration) -> Self {
        Self::Transport(TransportError::Timeout(after))
    }

    /// Create an invalid request error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Create a response decoding error.
    #[must_use]
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding(message.into())
    }

    /// Create a JSON deserialization error with path context.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this is a transport-level failure.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns `true` if this is a timeout error.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Timeout(_)))
    }

    /// Returns `true` if this is a connection error.
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Transport(TransportError::Connection(_)))
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// Returns `true` if this is a pipeline build error.
    #[must_use]
    pub const fn is_build(&self) -> bool {
        matches!(self, Self::Build(_))
    }
}
