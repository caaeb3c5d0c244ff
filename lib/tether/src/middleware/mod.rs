//! Pipeline stages as Tower layers.
//!
//! Every stage of a [`Connection`](crate::Connection) is a Tower layer over a
//! [`BoxedService`]. The chain builder owns the fixed stages (encoding, retry,
//! decoding, logging, adapter); the stages in between are [`Middleware`]s,
//! selected by identifier from the client configuration.
//!
//! Identifiers resolve to:
//!
//! | identifier | stage |
//! |------------|-------|
//! | `instrumentation` | [`InstrumentationLayer`], a `tracing` span per request |
//! | `request_start_header` | [`RequestStartLayer`], stamps `X-Request-Faraday-Start` |
//! | any registered name | the layer registered under that name |
//!
//! # Example
//!
//! ```
//! use tether::ClientConfig;
//! use tether::middleware::BearerAuthLayer;
//!
//! let config = ClientConfig::builder()
//!     .register_layer("auth", BearerAuthLayer::new("my-token"))
//!     .middleware("auth")
//!     .build();
//! # let _ = config;
//! ```

mod bearer_auth;
mod decoding;
mod encoding;
mod instrumentation;
mod logging;
mod request_start;
mod retry;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tower::Layer;
use tower::util::BoxCloneService;
use tower_service::Service;

use crate::config::LayerRegistry;
use crate::{Error, Request, Response, Result};

pub use bearer_auth::{BearerAuth, BearerAuthLayer};
pub use decoding::{Decoding, DecodingLayer};
pub use encoding::{UrlEncoding, UrlEncodingLayer};
pub use instrumentation::{Instrumentation, InstrumentationLayer};
pub use logging::{LogOptions, Logger, LoggerLayer};
pub use request_start::{REQUEST_START_HEADER, RequestStart, RequestStartLayer};
pub use retry::RetryPolicy;

pub use tower::retry::RetryLayer;

/// Type-erased service every stage wraps.
pub type BoxedService = BoxCloneService<Request, Response, Error>;

/// Future type returned by the stages.
pub type ServiceFuture = Pin<Box<dyn Future<Output = Result<Response>> + Send + 'static>>;

/// A named, type-erased layer registered in a client configuration.
#[derive(Clone)]
pub struct CustomLayer {
    wrap: Arc<dyn Fn(BoxedService) -> BoxedService + Send + Sync>,
}

impl fmt::Debug for CustomLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomLayer").finish_non_exhaustive()
    }
}

impl CustomLayer {
    /// Erase a Tower layer.
    pub fn from_layer<L>(layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        Self {
            wrap: Arc::new(move |service| BoxCloneService::new(layer.layer(service))),
        }
    }

    /// Wrap a function from the inner service to the wrapped one.
    pub fn from_fn<F>(wrap: F) -> Self
    where
        F: Fn(BoxedService) -> BoxedService + Send + Sync + 'static,
    {
        Self {
            wrap: Arc::new(wrap),
        }
    }

    /// Wrap `inner`.
    #[must_use]
    pub fn apply(&self, inner: BoxedService) -> BoxedService {
        (self.wrap)(inner)
    }
}

/// A custom stage, placed between the retry and decoding stages.
#[derive(Debug, Clone)]
pub enum Middleware {
    /// Opens a `tracing` span around every request.
    Instrumentation,
    /// Stamps the dispatch time into [`REQUEST_START_HEADER`].
    RequestStartHeader,
    /// A layer registered under a name.
    Registered {
        /// Registration name.
        name: String,
        /// The layer itself.
        layer: CustomLayer,
    },
}

impl Middleware {
    /// Identifier of [`Middleware::Instrumentation`].
    pub const INSTRUMENTATION: &'static str = "instrumentation";

    /// Identifier of [`Middleware::RequestStartHeader`].
    pub const REQUEST_START_HEADER: &'static str = "request_start_header";

    /// Resolve an identifier, built-in names first, then `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if the identifier is unknown.
    pub fn resolve(name: &str, registry: &LayerRegistry) -> Result<Self> {
        match name {
            Self::INSTRUMENTATION => Ok(Self::Instrumentation),
            Self::REQUEST_START_HEADER => Ok(Self::RequestStartHeader),
            _ => registry
                .get(name)
                .map(|layer| Self::Registered {
                    name: name.to_string(),
                    layer: layer.clone(),
                })
                .ok_or_else(|| Error::build(format!("unknown middleware `{name}`"))),
        }
    }

    /// Identifier of this middleware.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Instrumentation => Self::INSTRUMENTATION,
            Self::RequestStartHeader => Self::REQUEST_START_HEADER,
            Self::Registered { name, .. } => name,
        }
    }

    /// Wrap `inner` with this middleware.
    #[must_use]
    pub fn wrap(&self, inner: BoxedService) -> BoxedService {
        match self {
            Self::Instrumentation => BoxCloneService::new(InstrumentationLayer::new().layer(inner)),
            Self::RequestStartHeader => BoxCloneService::new(RequestStartLayer::new().layer(inner)),
            Self::Registered { layer, .. } => layer.apply(inner),
        }
    }
}
