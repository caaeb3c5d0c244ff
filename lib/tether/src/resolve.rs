//! Merging shared defaults with instance overrides.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::adapter::Adapter;
use crate::config::{ClientConfig, ClientOptions, LayerRegistry, RetryOptions};
use crate::logger::LogSink;
use crate::report::ErrorReporter;
use crate::{Error, Headers, Params, ResponseType, Result, merge_headers};

/// Per-instance configuration after merging [`ClientOptions`] into a [`ClientConfig`].
///
/// Scalars come from the options when given and from the defaults otherwise.
/// Headers and parameters are merged with the instance winning on collision,
/// and the middleware set is a union that always contains the defaults.
#[derive(Clone)]
pub struct ResolvedConfig {
    service_uri: Url,
    base_path: String,
    base_url: Url,
    timeout: Duration,
    headers: Headers,
    parameters: Params,
    middlewares: Vec<String>,
    layers: LayerRegistry,
    response_type: ResponseType,
    adapter: Adapter,
    retry: RetryOptions,
    log_requests: bool,
    log_request_bodies: bool,
    logger: Arc<dyn LogSink>,
    reporter: Arc<dyn ErrorReporter>,
}

impl fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("headers", &self.headers)
            .field("parameters", &self.parameters)
            .field("middlewares", &self.middlewares)
            .field("response_type", &self.response_type)
            .field("adapter", &self.adapter)
            .field("retry", &self.retry)
            .field("log_requests", &self.log_requests)
            .finish_non_exhaustive()
    }
}

impl ResolvedConfig {
    /// Resolve `options` against `defaults`.
    ///
    /// `defaults` is only read; the same value can back any number of clients.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the service URI is missing, cannot
    /// be parsed, or cannot serve as a base URL, or if the base path cannot be
    /// joined onto it.
    pub fn resolve(defaults: &ClientConfig, options: ClientOptions) -> Result<Self> {
        let ClientOptions {
            service_uri,
            base_path,
            timeout,
            http_headers,
            parameters,
            middlewares,
            layers,
            response_type,
        } = options;

        let service_uri =
            parse_service_uri(service_uri.as_deref().unwrap_or(&defaults.service_uri))?;
        let base_path = base_path.unwrap_or_else(|| defaults.base_path.clone());
        let base_url = service_uri.join(&base_path).map_err(|err| {
            Error::configuration(format!("cannot join base path `{base_path}`: {err}"))
        })?;

        let mut merged_parameters = defaults.default_parameters.clone();
        merged_parameters.extend(parameters);

        let mut merged_layers = defaults.layers.clone();
        merged_layers.extend(layers);

        Ok(Self {
            service_uri,
            base_path,
            base_url,
            timeout: timeout.unwrap_or(defaults.timeout),
            headers: merge_headers(&defaults.default_headers, &http_headers),
            parameters: merged_parameters,
            middlewares: union_middlewares(&middlewares, &defaults.middlewares),
            layers: merged_layers,
            response_type: response_type.unwrap_or(defaults.expected_response_type),
            adapter: defaults.adapter.clone(),
            retry: defaults.retry.clone(),
            log_requests: defaults.log_requests,
            log_request_bodies: defaults.log_request_bodies,
            logger: Arc::clone(&defaults.logger),
            reporter: Arc::clone(&defaults.reporter),
        })
    }

    /// Parsed service URI.
    #[must_use]
    pub fn service_uri(&self) -> &Url {
        &self.service_uri
    }

    /// Base path as configured.
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Service URI joined with the base path.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Per-attempt timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Merged headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Merged query parameters.
    #[must_use]
    pub fn parameters(&self) -> &Params {
        &self.parameters
    }

    /// Middleware identifiers, instance ones first, defaults always included.
    #[must_use]
    pub fn middlewares(&self) -> &[String] {
        &self.middlewares
    }

    /// Registered custom layers.
    #[must_use]
    pub fn layers(&self) -> &LayerRegistry {
        &self.layers
    }

    /// Expected response type.
    #[must_use]
    pub const fn response_type(&self) -> ResponseType {
        self.response_type
    }

    /// Selected transport adapter.
    #[must_use]
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Retry policy.
    #[must_use]
    pub fn retry(&self) -> &RetryOptions {
        &self.retry
    }

    /// Whether the logging stage is installed.
    #[must_use]
    pub const fn log_requests(&self) -> bool {
        self.log_requests
    }

    /// Whether logged records include bodies.
    #[must_use]
    pub const fn log_request_bodies(&self) -> bool {
        self.log_request_bodies
    }

    /// Destination of request log records.
    #[must_use]
    pub fn logger(&self) -> &Arc<dyn LogSink> {
        &self.logger
    }

    /// Failure reporting hook.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn ErrorReporter> {
        &self.reporter
    }
}

fn parse_service_uri(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::configuration("service URI is missing"));
    }

    let uri = Url::parse(raw)
        .map_err(|err| Error::configuration(format!("invalid service URI `{raw}`: {err}")))?;

    if uri.cannot_be_a_base() || uri.host().is_none() {
        return Err(Error::configuration(format!(
            "service URI `{raw}` has no host"
        )));
    }

    Ok(uri)
}

fn union_middlewares(instance: &[String], defaults: &[String]) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::with_capacity(instance.len() + defaults.len());
    for name in instance.iter().chain(defaults) {
        if !resolved.contains(name) {
            resolved.push(name.clone());
        }
    }
    resolved
}
