//! Service client chassis for internal HTTP services.
//!
//! A service client is a shared [`ClientConfig`] (the defaults of one service)
//! plus one [`ApiClient`] per use site, optionally tweaked with
//! [`ClientOptions`]. The client lazily builds a [`Connection`]: an ordered
//! pipeline of Tower stages that encodes the request, retries transport
//! failures, runs the configured middlewares, decodes the response, logs the
//! exchange with credentials redacted, and dispatches through the adapter.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::LazyLock;
//!
//! use tether::prelude::*;
//!
//! static WIDGETS: LazyLock<ClientConfig> = LazyLock::new(|| {
//!     ClientConfig::builder()
//!         .service_uri("http://widgets.internal")
//!         .base_path("/v1")
//!         .retry(RetryOptions::default().with_max(3))
//!         .build()
//! });
//!
//! #[derive(Debug, Deserialize)]
//! struct Widget {
//!     name: String,
//! }
//!
//! # async fn run() -> tether::Result<()> {
//! let client = ApiClient::from_defaults(&WIDGETS)?;
//! let params = Params::from([("id".to_string(), "7".to_string())]);
//!
//! match client.get("/widgets", &params, &Headers::new()).await? {
//!     Outcome::Success(payload) => {
//!         let widget: Widget = payload.deserialize()?;
//!         println!("{}", widget.name);
//!     }
//!     Outcome::Failure(response) => println!("widget service said {}", response.status()),
//! }
//! # Ok(())
//! # }
//! ```

mod adapter;
mod api_client;
mod chain;
mod classify;
mod config;
mod connection;
mod connector;
pub mod logger;
pub mod middleware;
pub mod prelude;
mod report;
mod resolve;

pub use adapter::{Adapter, AdapterService, HyperTransport};
pub use api_client::ApiClient;
pub use chain::{ChainBuilder, Stage, assemble};
pub use classify::{Classification, Outcome, Payload, classify, is_success_status};
pub use config::{ClientConfig, ClientConfigBuilder, ClientOptions, LayerRegistry, RetryOptions};
pub use connection::Connection;
pub use connector::https_connector;
pub use logger::{LogRecord, LogSink, TracingSink};
pub use report::{ErrorReporter, FailureContext, LogReporter};
pub use resolve::ResolvedConfig;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use tether_core::{
    Body, Error, Headers, Method, Params, Request, RequestBuilder, Response, ResponseFuture,
    ResponseType, Result, Transport, TransportError, TransportFn, find_header, from_json,
    insert_header, merge_headers, to_form, to_json, to_query_string, transport_fn,
};

// Re-export http types for status codes and headers
pub use tether_core::{StatusCode, header};

pub use url;
