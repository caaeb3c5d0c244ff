//! The client instance concrete service clients are built on.
//!
//! # Example
//!
//! ```no_run
//! use tether::{ApiClient, ClientConfig, ClientOptions, Headers, Params};
//!
//! # async fn run() -> tether::Result<()> {
//! let defaults = ClientConfig::builder()
//!     .service_uri("http://widgets.internal")
//!     .base_path("/v1")
//!     .build();
//!
//! let client = ApiClient::new(&defaults, ClientOptions::new())?;
//! let params = Params::from([("id".to_string(), "7".to_string())]);
//! let outcome = client.get("/widgets", &params, &Headers::new()).await?;
//! if let Some(payload) = outcome.payload() {
//!     println!("{payload:?}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::debug;

use crate::chain::ChainBuilder;
use crate::classify::{Classification, Outcome, Payload, classify};
use crate::config::{ClientConfig, ClientOptions};
use crate::connection::Connection;
use crate::report::{ErrorReporter, FailureContext};
use crate::resolve::ResolvedConfig;
use crate::{
    Body, Headers, Method, Params, Response, ResponseType, Result, insert_header, merge_headers,
};

/// A configured client of one service.
///
/// Owns its resolved configuration and a connection that is built on first
/// use, at most once, even when the first requests race.
pub struct ApiClient {
    config: ResolvedConfig,
    http_headers: Headers,
    expected_response_type: ResponseType,
    reporter: Arc<dyn ErrorReporter>,
    connection: OnceCell<Connection>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("http_headers", &self.http_headers)
            .field("expected_response_type", &self.expected_response_type)
            .field("connected", &self.connection.get().is_some())
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client from shared defaults and instance overrides.
    ///
    /// No connection is built yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`](crate::Error::Configuration) if the
    /// configuration cannot be resolved.
    pub fn new(defaults: &ClientConfig, options: ClientOptions) -> Result<Self> {
        let config = ResolvedConfig::resolve(defaults, options)?;
        Ok(Self {
            http_headers: config.headers().clone(),
            expected_response_type: config.response_type(),
            reporter: Arc::clone(config.reporter()),
            config,
            connection: OnceCell::new(),
        })
    }

    /// Create a client that uses the shared defaults as they are.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_defaults(defaults: &ClientConfig) -> Result<Self> {
        Self::new(defaults, ClientOptions::default())
    }

    /// Replace the failure reporter of this instance.
    #[must_use]
    pub fn with_reporter(mut self, reporter: impl ErrorReporter) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    /// Resolved configuration.
    #[must_use]
    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    /// Headers sent with every request of this instance.
    #[must_use]
    pub fn http_headers(&self) -> &Headers {
        &self.http_headers
    }

    /// Response type successes are decoded as.
    #[must_use]
    pub const fn expected_response_type(&self) -> ResponseType {
        self.expected_response_type
    }

    /// The connection, built on first call.
    ///
    /// Concurrent first callers all get the same connection; the pipeline is
    /// assembled once. A failed build is not cached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`](crate::Error::Build) if the pipeline cannot
    /// be assembled.
    pub fn connection(&self) -> Result<&Connection> {
        self.connection
            .get_or_try_init(|| ChainBuilder::new(&self.config).build())
    }

    /// Ask for HTML from now on.
    pub fn expect_html_response(&mut self) {
        self.expect(ResponseType::Html);
    }

    /// Ask for JSON from now on.
    pub fn expect_json_response(&mut self) {
        self.expect(ResponseType::Json);
    }

    fn expect(&mut self, response_type: ResponseType) {
        if let Some(accept) = response_type.accept() {
            insert_header(&mut self.http_headers, "Accept", accept);
        }
        self.expected_response_type = response_type;
    }

    /// Send a request and classify its response.
    ///
    /// # Errors
    ///
    /// Returns build and transport errors, and a JSON error if a successful
    /// response does not hold the expected JSON. An unsuccessful status is
    /// not an error: it is reported and returned as [`Outcome::Failure`].
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        headers: &Headers,
        body: Option<Body>,
    ) -> Result<Outcome> {
        let connection = self.connection()?;
        let request_uri = connection.request_uri(path, params)?;
        let headers = merge_headers(&self.http_headers, headers);

        let response = connection.issue(method, path, params, &headers, body).await?;
        debug!(%method, uri = %request_uri, status = response.status(), "received response");

        self.handle_response(request_uri.as_str(), response)
    }

    /// Classify `response`, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if a successful response does not hold the
    /// expected JSON.
    pub fn handle_response(&self, request_uri: &str, response: Response) -> Result<Outcome> {
        match classify(&response) {
            Classification::Success => {
                let payload = Payload::decode(self.expected_response_type, response.into_body())?;
                Ok(Outcome::Success(payload))
            }
            Classification::Failure => {
                self.reporter
                    .report(&FailureContext::new(request_uri, &response));
                Ok(Outcome::Failure(response))
            }
        }
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn get(&self, path: &str, params: &Params, headers: &Headers) -> Result<Outcome> {
        self.request(Method::Get, path, params, headers, None).await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn delete(&self, path: &str, params: &Params, headers: &Headers) -> Result<Outcome> {
        self.request(Method::Delete, path, params, headers, None).await
    }

    /// `HEAD path`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn head(&self, path: &str, params: &Params, headers: &Headers) -> Result<Outcome> {
        self.request(Method::Head, path, params, headers, None).await
    }

    /// `POST path` with `body`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn post(
        &self,
        path: &str,
        body: impl Into<Body>,
        headers: &Headers,
    ) -> Result<Outcome> {
        self.request(Method::Post, path, &Params::new(), headers, Some(body.into()))
            .await
    }

    /// `PUT path` with `body`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn put(
        &self,
        path: &str,
        body: impl Into<Body>,
        headers: &Headers,
    ) -> Result<Outcome> {
        self.request(Method::Put, path, &Params::new(), headers, Some(body.into()))
            .await
    }

    /// `PATCH path` with `body`.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn patch(
        &self,
        path: &str,
        body: impl Into<Body>,
        headers: &Headers,
    ) -> Result<Outcome> {
        self.request(Method::Patch, path, &Params::new(), headers, Some(body.into()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert2::{check, let_assert};

    use super::*;
    use crate::adapter::Adapter;
    use crate::{Request, find_header, transport_fn};

    fn stub_config(status: u16, body: &'static str) -> crate::config::ClientConfigBuilder {
        let stub = transport_fn(move |_request: Request| async move {
            Ok(Response::new(status, Headers::new(), body))
        });
        ClientConfig::builder()
            .service_uri("http://svc")
            .base_path("/v1")
            .adapter(Adapter::custom(stub))
            .log_requests(false)
    }

    #[test]
    fn construction_does_not_connect() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let defaults = stub_config(200, "{}")
            .register_fn("count", move |service| {
                counter.fetch_add(1, Ordering::SeqCst);
                service
            })
            .middleware("count")
            .build();

        let client = ApiClient::from_defaults(&defaults).expect("client");
        check!(builds.load(Ordering::SeqCst) == 0);

        let_assert!(Ok(first) = client.connection());
        let_assert!(Ok(second) = client.connection());
        check!(std::ptr::eq(first, second));
        check!(builds.load(Ordering::SeqCst) == 1);
    }

    #[test]
    fn concurrent_first_use_builds_once() {
        let builds = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&builds);
        let defaults = stub_config(200, "{}")
            .register_fn("count", move |service| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                service
            })
            .middleware("count")
            .build();
        let client = ApiClient::from_defaults(&defaults).expect("client");

        let addresses: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        client
                            .connection()
                            .map(|connection| std::ptr::from_ref(connection) as usize)
                            .expect("connection")
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("thread"))
                .collect()
        });

        check!(builds.load(Ordering::SeqCst) == 1);
        check!(addresses.len() == 16);
        let_assert!(Some(first) = addresses.first());
        check!(addresses.iter().all(|address| address == first));
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let defaults = stub_config(200, "{}").build();
        let client =
            ApiClient::new(&defaults, ClientOptions::new().middleware("missing")).expect("client");

        let_assert!(Err(first) = client.connection());
        check!(first.is_build());
        let_assert!(Err(second) = client.connection());
        check!(second.is_build());
    }

    #[test]
    fn expect_html_then_json() {
        let defaults = stub_config(200, "{}").build();
        let mut client = ApiClient::from_defaults(&defaults).expect("client");

        client.expect_html_response();
        check!(client.expected_response_type() == ResponseType::Html);
        check!(find_header(client.http_headers(), "accept") == Some("text/html"));

        client.expect_json_response();
        check!(client.expected_response_type() == ResponseType::Json);
        check!(find_header(client.http_headers(), "accept") == Some("application/json"));
    }

    #[tokio::test]
    async fn success_decodes_payload_without_report() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let defaults = stub_config(200, r#"{"name":"foo"}"#).build();
        let client = ApiClient::from_defaults(&defaults)
            .expect("client")
            .with_reporter(move |context: &FailureContext| {
                sink.lock().expect("lock").push(context.clone());
            });

        let_assert!(Ok(outcome) = client.get("/widgets", &Params::new(), &Headers::new()).await);

        let_assert!(Some(Payload::Json(value)) = outcome.payload());
        check!(value["name"] == "foo");
        check!(reports.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn failure_is_reported_once_and_returned() {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&reports);
        let defaults = stub_config(404, "not found").build();
        let client = ApiClient::from_defaults(&defaults)
            .expect("client")
            .with_reporter(move |context: &FailureContext| {
                sink.lock().expect("lock").push(context.clone());
            });
        let params = Params::from([("id".to_string(), "7".to_string())]);

        let_assert!(Ok(outcome) = client.get("/widgets", &params, &Headers::new()).await);

        let_assert!(Some(response) = outcome.failure());
        check!(response.status() == 404);
        let reports = reports.lock().expect("lock");
        check!(reports.len() == 1);
        let_assert!(Some(report) = reports.first());
        check!(report.response_status == 404);
        check!(report.request_uri == "http://svc/v1/widgets?id=7");
        check!(report.response_body == "not found");
    }

    #[tokio::test]
    async fn html_successes_are_text() {
        let defaults = stub_config(200, "<p>hi</p>").build();
        let mut client = ApiClient::from_defaults(&defaults).expect("client");
        client.expect_html_response();

        let_assert!(Ok(outcome) = client.get("/page", &Params::new(), &Headers::new()).await);
        let_assert!(Some(payload) = outcome.payload());
        check!(payload.as_html() == Some("<p>hi</p>"));
    }
}
