//! Client configuration types.
//!
//! [`ClientConfig`] holds the shared defaults of a service client, the values
//! every instance starts from. [`ClientOptions`] is the construction-time
//! override bundle. Neither is ever mutated by a running client; the two are
//! merged into a [`ResolvedConfig`](crate::ResolvedConfig).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tower::Layer;
use tower_service::Service;

use crate::adapter::Adapter;
use crate::logger::{LogSink, TracingSink};
use crate::middleware::{BoxedService, CustomLayer, Middleware};
use crate::report::{ErrorReporter, LogReporter};
use crate::{Error, Headers, Params, Request, Response, ResponseType, insert_header};

/// Named custom layers, looked up when middleware identifiers are resolved.
pub type LayerRegistry = BTreeMap<String, CustomLayer>;

/// Retry policy parameters for the retry stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOptions {
    /// Maximum number of retries after the first attempt.
    pub max: u32,
    /// Delay before the first retry.
    pub interval: Duration,
    /// Upper bound for a single delay, before jitter.
    pub max_interval: Option<Duration>,
    /// Jitter: each delay is scaled by a random factor in `[1 - r, 1 + r]`.
    pub interval_randomness: f64,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Response statuses that are retried like transport failures.
    pub retry_statuses: Vec<u16>,
    /// Whether POST and PATCH requests are retried too.
    pub retry_non_idempotent: bool,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max: 2,
            interval: Duration::from_millis(50),
            max_interval: None,
            interval_randomness: 0.5,
            backoff_factor: 2.0,
            retry_statuses: Vec::new(),
            retry_non_idempotent: false,
        }
    }
}

impl RetryOptions {
    /// Options that never retry.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default().with_max(0)
    }

    /// Set the maximum number of retries.
    #[must_use]
    pub fn with_max(mut self, max: u32) -> Self {
        self.max = max;
        self
    }

    /// Set the base interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Cap a single delay.
    #[must_use]
    pub fn with_max_interval(mut self, max_interval: Duration) -> Self {
        self.max_interval = Some(max_interval);
        self
    }

    /// Set the jitter randomness factor, clamped to `[0, 1]`.
    ///
    /// NaN disables jitter.
    #[must_use]
    pub fn with_interval_randomness(mut self, randomness: f64) -> Self {
        self.interval_randomness = if randomness.is_nan() {
            0.0
        } else {
            randomness.clamp(0.0, 1.0)
        };
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Retry responses with these statuses.
    #[must_use]
    pub fn with_retry_statuses(mut self, statuses: impl IntoIterator<Item = u16>) -> Self {
        self.retry_statuses = statuses.into_iter().collect();
        self
    }

    /// Opt POST and PATCH requests into retries.
    #[must_use]
    pub fn with_non_idempotent(mut self, retry: bool) -> Self {
        self.retry_non_idempotent = retry;
        self
    }
}

/// Shared defaults of a service client.
///
/// Build one per service, usually in a `static`, and hand it to every
/// [`ApiClient`](crate::ApiClient) of that service.
#[derive(Clone)]
pub struct ClientConfig {
    /// Transport the adapter stage dispatches through.
    pub adapter: Adapter,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// Service base URI, e.g. `http://localhost:8080`.
    pub service_uri: String,
    /// Path joined onto the service URI, e.g. `/v1`.
    pub base_path: String,
    /// Headers sent with every request.
    pub default_headers: Headers,
    /// Query parameters sent with every request.
    pub default_parameters: Params,
    /// Middleware identifiers always present in the pipeline.
    pub middlewares: Vec<String>,
    /// Custom layers addressable by identifier.
    pub layers: LayerRegistry,
    /// Whether the logging stage is installed.
    pub log_requests: bool,
    /// Whether logged records include bodies.
    pub log_request_bodies: bool,
    /// Destination of request log records.
    pub logger: Arc<dyn LogSink>,
    /// Retry policy of the retry stage.
    pub retry: RetryOptions,
    /// Response type the service is expected to answer with.
    pub expected_response_type: ResponseType,
    /// Hook invoked for responses classified as failures.
    pub reporter: Arc<dyn ErrorReporter>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("adapter", &self.adapter)
            .field("timeout", &self.timeout)
            .field("service_uri", &self.service_uri)
            .field("base_path", &self.base_path)
            .field("default_headers", &self.default_headers)
            .field("default_parameters", &self.default_parameters)
            .field("middlewares", &self.middlewares)
            .field("layers", &self.layers.keys().collect::<Vec<_>>())
            .field("log_requests", &self.log_requests)
            .field("log_request_bodies", &self.log_request_bodies)
            .field("retry", &self.retry)
            .field("expected_response_type", &self.expected_response_type)
            .finish_non_exhaustive()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            adapter: Adapter::default(),
            timeout: Duration::from_secs(3),
            service_uri: "http://localhost:8080".to_string(),
            base_path: "/".to_string(),
            default_headers: Headers::from([
                ("Accept".to_string(), "application/json".to_string()),
                ("Content-Type".to_string(), "application/json".to_string()),
            ]),
            default_parameters: Params::new(),
            middlewares: vec![Middleware::INSTRUMENTATION.to_string()],
            layers: LayerRegistry::new(),
            log_requests: true,
            log_request_bodies: true,
            logger: Arc::new(TracingSink),
            retry: RetryOptions::default(),
            expected_response_type: ResponseType::Json,
            reporter: Arc::new(LogReporter),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }
}

/// Builder for [`ClientConfig`].
///
/// Unset fields fall back to [`ClientConfig::default`].
#[derive(Default)]
pub struct ClientConfigBuilder {
    adapter: Option<Adapter>,
    timeout: Option<Duration>,
    service_uri: Option<String>,
    base_path: Option<String>,
    default_headers: Option<Headers>,
    default_parameters: Option<Params>,
    middlewares: Option<Vec<String>>,
    layers: LayerRegistry,
    log_requests: Option<bool>,
    log_request_bodies: Option<bool>,
    logger: Option<Arc<dyn LogSink>>,
    retry: Option<RetryOptions>,
    expected_response_type: Option<ResponseType>,
    reporter: Option<Arc<dyn ErrorReporter>>,
}

impl fmt::Debug for ClientConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfigBuilder")
            .field("service_uri", &self.service_uri)
            .field("base_path", &self.base_path)
            .field("middlewares", &self.middlewares)
            .field("layers_count", &self.layers.len())
            .finish_non_exhaustive()
    }
}

impl ClientConfigBuilder {
    /// Select the transport adapter.
    #[must_use]
    pub fn adapter(mut self, adapter: Adapter) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Set the per-attempt request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the service base URI.
    #[must_use]
    pub fn service_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = Some(uri.into());
        self
    }

    /// Set the base path joined onto the service URI.
    #[must_use]
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Replace the default headers.
    #[must_use]
    pub fn default_headers(mut self, headers: Headers) -> Self {
        self.default_headers = Some(headers);
        self
    }

    /// Add one default header on top of the current defaults.
    #[must_use]
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let headers = self
            .default_headers
            .get_or_insert_with(|| ClientConfig::default().default_headers);
        insert_header(headers, name, value);
        self
    }

    /// Replace the default query parameters.
    #[must_use]
    pub fn default_parameters(mut self, parameters: Params) -> Self {
        self.default_parameters = Some(parameters);
        self
    }

    /// Add one default query parameter.
    #[must_use]
    pub fn default_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_parameters
            .get_or_insert_with(Params::new)
            .insert(name.into(), value.into());
        self
    }

    /// Replace the default middleware set.
    #[must_use]
    pub fn middlewares<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.middlewares = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Append a middleware identifier to the default set.
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        let names = self
            .middlewares
            .get_or_insert_with(|| ClientConfig::default().middlewares);
        let name = name.into();
        if !names.contains(&name) {
            names.push(name);
        }
        self
    }

    /// Register a Tower layer under `name`, so middleware sets can refer to it.
    ///
    /// Registering does not add the layer to the pipeline; list its name with
    /// [`middleware`](Self::middleware) or in [`ClientOptions::middleware`].
    #[must_use]
    pub fn register_layer<L>(mut self, name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers.insert(name.into(), CustomLayer::from_layer(layer));
        self
    }

    /// Register a function wrapping the service below it under `name`.
    #[must_use]
    pub fn register_fn<F>(mut self, name: impl Into<String>, wrap: F) -> Self
    where
        F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
    {
        self.layers.insert(name.into(), CustomLayer::from_fn(wrap));
        self
    }

    /// Enable or disable request logging.
    #[must_use]
    pub fn log_requests(mut self, enabled: bool) -> Self {
        self.log_requests = Some(enabled);
        self
    }

    /// Enable or disable bodies in request log records.
    #[must_use]
    pub fn log_request_bodies(mut self, enabled: bool) -> Self {
        self.log_request_bodies = Some(enabled);
        self
    }

    /// Set the destination of request log records.
    #[must_use]
    pub fn logger(mut self, sink: impl LogSink) -> Self {
        self.logger = Some(Arc::new(sink));
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, options: RetryOptions) -> Self {
        self.retry = Some(options);
        self
    }

    /// Set the expected response type.
    #[must_use]
    pub fn expected_response_type(mut self, response_type: ResponseType) -> Self {
        self.expected_response_type = Some(response_type);
        self
    }

    /// Set the failure reporting hook.
    #[must_use]
    pub fn reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Some(Arc::new(reporter));
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        let defaults = ClientConfig::default();
        ClientConfig {
            adapter: self.adapter.unwrap_or(defaults.adapter),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            service_uri: self.service_uri.unwrap_or(defaults.service_uri),
            base_path: self.base_path.unwrap_or(defaults.base_path),
            default_headers: self.default_headers.unwrap_or(defaults.default_headers),
            default_parameters: self
                .default_parameters
                .unwrap_or(defaults.default_parameters),
            middlewares: self.middlewares.unwrap_or(defaults.middlewares),
            layers: self.layers,
            log_requests: self.log_requests.unwrap_or(defaults.log_requests),
            log_request_bodies: self
                .log_request_bodies
                .unwrap_or(defaults.log_request_bodies),
            logger: self.logger.unwrap_or(defaults.logger),
            retry: self.retry.unwrap_or(defaults.retry),
            expected_response_type: self
                .expected_response_type
                .unwrap_or(defaults.expected_response_type),
            reporter: self.reporter.unwrap_or(defaults.reporter),
        }
    }
}

/// Construction-time overrides for a single client instance.
///
/// Scalars replace the shared defaults; headers, parameters, middlewares, and
/// registered layers are merged with them.
#[derive(Default)]
pub struct ClientOptions {
    pub(crate) service_uri: Option<String>,
    pub(crate) base_path: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) http_headers: Headers,
    pub(crate) parameters: Params,
    pub(crate) middlewares: Vec<String>,
    pub(crate) layers: LayerRegistry,
    pub(crate) response_type: Option<ResponseType>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("service_uri", &self.service_uri)
            .field("base_path", &self.base_path)
            .field("timeout", &self.timeout)
            .field("http_headers", &self.http_headers)
            .field("parameters", &self.parameters)
            .field("middlewares", &self.middlewares)
            .field("layers", &self.layers.keys().collect::<Vec<_>>())
            .field("response_type", &self.response_type)
            .finish()
    }
}

impl ClientOptions {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the service base URI.
    #[must_use]
    pub fn service_uri(mut self, uri: impl Into<String>) -> Self {
        self.service_uri = Some(uri.into());
        self
    }

    /// Override the base path.
    #[must_use]
    pub fn base_path(mut self, path: impl Into<String>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Override the per-attempt timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Add an instance header; wins over a default header of the same name.
    #[must_use]
    pub fn http_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        insert_header(&mut self.http_headers, name, value);
        self
    }

    /// Add instance headers.
    #[must_use]
    pub fn http_headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        for (name, value) in headers {
            insert_header(&mut self.http_headers, name, value);
        }
        self
    }

    /// Add an instance query parameter.
    #[must_use]
    pub fn parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Add instance query parameters.
    #[must_use]
    pub fn parameters(mut self, parameters: impl IntoIterator<Item = (String, String)>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    /// Add a middleware identifier; defaults are kept.
    #[must_use]
    pub fn middleware(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.middlewares.contains(&name) {
            self.middlewares.push(name);
        }
        self
    }

    /// Register an instance-only layer under `name`.
    #[must_use]
    pub fn register_layer<L>(mut self, name: impl Into<String>, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers.insert(name.into(), CustomLayer::from_layer(layer));
        self
    }

    /// Register an instance-only wrapping function under `name`.
    #[must_use]
    pub fn register_fn<F>(mut self, name: impl Into<String>, wrap: F) -> Self
    where
        F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
    {
        self.layers.insert(name.into(), CustomLayer::from_fn(wrap));
        self
    }

    /// Override the expected response type.
    #[must_use]
    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::find_header;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(3));
        assert_eq!(config.service_uri, "http://localhost:8080");
        assert_eq!(config.base_path, "/");
        assert_eq!(
            find_header(&config.default_headers, "accept"),
            Some("application/json")
        );
        assert_eq!(config.middlewares, vec!["instrumentation".to_string()]);
        assert!(config.log_requests);
        assert_eq!(config.expected_response_type, ResponseType::Json);
    }

    #[test]
    fn default_retry_options() {
        let retry = RetryOptions::default();
        assert_eq!(retry.max, 2);
        assert_eq!(retry.interval, Duration::from_millis(50));
        assert!((retry.interval_randomness - 0.5).abs() < f64::EPSILON);
        assert!((retry.backoff_factor - 2.0).abs() < f64::EPSILON);
        assert!(!retry.retry_non_idempotent);
        assert_eq!(RetryOptions::disabled().max, 0);
    }

    #[test]
    fn builder_overrides() {
        let config = ClientConfig::builder()
            .service_uri("http://widgets.internal")
            .base_path("/v1")
            .timeout(Duration::from_secs(10))
            .default_header("X-Service", "widgets")
            .middleware("request_start_header")
            .log_requests(false)
            .build();

        assert_eq!(config.service_uri, "http://widgets.internal");
        assert_eq!(config.base_path, "/v1");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(
            find_header(&config.default_headers, "x-service"),
            Some("widgets")
        );
        assert_eq!(
            find_header(&config.default_headers, "accept"),
            Some("application/json")
        );
        assert_eq!(
            config.middlewares,
            vec![
                "instrumentation".to_string(),
                "request_start_header".to_string()
            ]
        );
        assert!(!config.log_requests);
    }

    #[test]
    fn options_deduplicate_middlewares() {
        let options = ClientOptions::new()
            .middleware("auth")
            .middleware("auth")
            .middleware("instrumentation");

        assert_eq!(
            options.middlewares,
            vec!["auth".to_string(), "instrumentation".to_string()]
        );
    }

    #[test]
    fn randomness_is_clamped() {
        let high = RetryOptions::default().with_interval_randomness(3.0);
        assert!((high.interval_randomness - 1.0).abs() < f64::EPSILON);

        let low = RetryOptions::default().with_interval_randomness(-1.0);
        assert!(low.interval_randomness.abs() < f64::EPSILON);

        let nan = RetryOptions::default().with_interval_randomness(f64::NAN);
        assert!(nan.interval_randomness.abs() < f64::EPSILON);
    }
}
