//! A built pipeline bound to a base URL.

use std::fmt;
use std::sync::{Arc, Mutex};

use tower_service::Service;
use url::Url;

use crate::middleware::{BoxedService, ServiceFuture};
use crate::resolve::ResolvedConfig;
use crate::{Body, Error, Headers, Method, Params, Request, Response, Result, merge_headers};

/// Thread-safe wrapper for `BoxedService`.
///
/// `BoxCloneService` is `Send` but not `Sync`; every call clones the service
/// out of the mutex, so the lock is never held across a request.
#[derive(Clone)]
struct SyncService {
    inner: Arc<Mutex<BoxedService>>,
}

impl SyncService {
    fn new(service: BoxedService) -> Self {
        Self {
            inner: Arc::new(Mutex::new(service)),
        }
    }

    fn call(&self, request: Request) -> ServiceFuture {
        let mut service = self
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();

        Box::pin(async move {
            std::future::poll_fn(|cx| service.poll_ready(cx)).await?;
            service.call(request).await
        })
    }
}

/// An immutable, ready-to-use pipeline.
///
/// Built once per client by [`ChainBuilder`](crate::ChainBuilder) and shared
/// by every request of that client. No state survives a call.
#[derive(Clone)]
pub struct Connection {
    base_url: Url,
    headers: Headers,
    params: Params,
    stage_names: Vec<String>,
    service: SyncService,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("base_url", &self.base_url.as_str())
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("stage_names", &self.stage_names)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub(crate) fn new(
        config: &ResolvedConfig,
        stage_names: Vec<String>,
        service: BoxedService,
    ) -> Self {
        Self {
            base_url: config.base_url().clone(),
            headers: config.headers().clone(),
            params: config.parameters().clone(),
            stage_names,
            service: SyncService::new(service),
        }
    }

    /// URL every relative path is resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Default headers of every request.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Default query parameters of every request.
    #[must_use]
    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Names of the pipeline stages, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    /// Resolve `path` against the base URL.
    ///
    /// Relative paths, with or without a leading `/`, stay under the base
    /// path: with a base of `http://svc/v1`, `/widgets` and `widgets` both
    /// give `http://svc/v1/widgets`. Absolute URLs are used as they are.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the result is not a valid URL.
    pub fn resolve_path(&self, path: &str) -> Result<Url> {
        if let Ok(absolute) = Url::parse(path)
            && absolute.has_host()
        {
            return Ok(absolute);
        }

        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let with_slash = format!("{}/", base.path());
            base.set_path(&with_slash);
        }
        // `./` keeps a first segment like `widgets:search` from reading as a scheme
        let relative = format!("./{}", path.trim_start_matches('/'));
        Ok(base.join(&relative)?)
    }

    /// Default parameters overlaid with `params`, sorted by name.
    fn query_pairs(&self, params: &Params) -> Vec<(String, String)> {
        let mut merged = self.params.clone();
        merged.extend(params.iter().map(|(name, value)| (name.clone(), value.clone())));

        let mut pairs: Vec<_> = merged.into_iter().collect();
        pairs.sort();
        pairs
    }

    /// The full URI a call to `path` with `params` is sent to.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the path cannot be resolved.
    pub fn request_uri(&self, path: &str, params: &Params) -> Result<Url> {
        let mut url = self.resolve_path(path)?;
        let pairs = self.query_pairs(params);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(&pairs);
        }
        Ok(url)
    }

    /// Send one request through the pipeline.
    ///
    /// Call headers and parameters win over the connection defaults. The raw
    /// response is returned whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the request could not be completed
    /// after retries, and other errors for requests that cannot be built,
    /// encoded, or decoded.
    pub async fn issue(
        &self,
        method: Method,
        path: &str,
        params: &Params,
        headers: &Headers,
        body: Option<Body>,
    ) -> Result<Response> {
        let url = self.resolve_path(path)?;
        let request = Request::builder(method, url)
            .headers(merge_headers(&self.headers, headers))
            .query_pairs(self.query_pairs(params))
            .maybe_body(body)
            .build();

        self.dispatch(request).await
    }

    /// Send an already built request through the pipeline.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub async fn dispatch(&self, request: Request) -> Result<Response> {
        self.service.call(request).await
    }
}

impl Service<Request> for Connection {
    type Response = Response;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        self.service.call(request)
    }
}
