//! Pipeline assembly.
//!
//! A connection is an ordered list of [`Stage`]s, outermost first, folded
//! into one [`BoxedService`]. The order is fixed:
//!
//! 1. `url_encoded`: query pairs and structured bodies are encoded
//! 2. `retry`: transport failures are retried with backoff
//! 3. custom middlewares, in resolved order
//! 4. `encoding`: responses are decompressed and brought to UTF-8
//! 5. `logger`: one redacted record per attempt (only with `log_requests`)
//! 6. `adapter`: dispatch with the per-attempt timeout
//!
//! Retry sits above the middlewares so each attempt is decorated afresh;
//! the logger sits right above the adapter so it sees the final request.

use std::time::Duration;

use tower::Layer;
use tower::retry::RetryLayer;
use tower::util::BoxCloneService;

use crate::adapter::{Adapter, AdapterService};
use crate::config::RetryOptions;
use crate::connection::Connection;
use crate::middleware::{
    BoxedService, DecodingLayer, LogOptions, LoggerLayer, Middleware, RetryPolicy, UrlEncodingLayer,
};
use crate::resolve::ResolvedConfig;
use crate::{Error, Result};

/// One stage of a pipeline.
#[derive(Debug, Clone)]
pub enum Stage {
    /// Encodes query pairs and bodies.
    UrlEncoding,
    /// Retries transport failures.
    Retry(RetryOptions),
    /// A custom middleware.
    Custom(Middleware),
    /// Decodes response bodies.
    Decoding,
    /// Logs exchanges with credentials redacted.
    Logging(LogOptions),
    /// Dispatches through the transport; always last.
    Adapter {
        /// Selected transport.
        adapter: Adapter,
        /// Per-attempt timeout.
        timeout: Duration,
    },
}

impl Stage {
    /// Stable name of the stage.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::UrlEncoding => "url_encoded",
            Self::Retry(_) => "retry",
            Self::Custom(middleware) => middleware.name(),
            Self::Decoding => "encoding",
            Self::Logging(_) => "logger",
            Self::Adapter { .. } => "adapter",
        }
    }

    /// Returns `true` for the adapter stage.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Adapter { .. })
    }

    /// Wrap `inner` with this stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] for the adapter stage, which wraps nothing.
    pub fn wrap(&self, inner: BoxedService) -> Result<BoxedService> {
        let service = match self {
            Self::UrlEncoding => BoxCloneService::new(UrlEncodingLayer::new().layer(inner)),
            Self::Retry(options) => {
                let layer = RetryLayer::new(RetryPolicy::new(options.clone()));
                BoxCloneService::new(layer.layer(inner))
            }
            Self::Custom(middleware) => middleware.wrap(inner),
            Self::Decoding => BoxCloneService::new(DecodingLayer::new().layer(inner)),
            Self::Logging(options) => {
                BoxCloneService::new(LoggerLayer::new(options.clone()).layer(inner))
            }
            Self::Adapter { .. } => {
                return Err(Error::build("the adapter stage must be the last stage"));
            }
        };
        Ok(service)
    }

    /// The service of a terminal stage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] for any stage but the adapter.
    pub fn service(&self) -> Result<BoxedService> {
        match self {
            Self::Adapter { adapter, timeout } => Ok(BoxCloneService::new(AdapterService::new(
                adapter.transport(*timeout),
                *timeout,
            ))),
            other => Err(Error::build(format!(
                "stage `{}` cannot terminate a pipeline",
                other.name()
            ))),
        }
    }
}

/// Fold `stages`, outermost first, into one service.
///
/// # Errors
///
/// Returns [`Error::Build`] if the list is empty, does not end with the
/// adapter, or has the adapter anywhere else.
pub fn assemble(stages: &[Stage]) -> Result<BoxedService> {
    let (terminal, wrappers) = stages
        .split_last()
        .ok_or_else(|| Error::build("a pipeline needs at least an adapter stage"))?;

    let mut service = terminal.service()?;
    for stage in wrappers.iter().rev() {
        service = stage.wrap(service)?;
    }
    Ok(service)
}

/// Builds the [`Connection`] of a resolved configuration.
#[derive(Debug)]
pub struct ChainBuilder<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> ChainBuilder<'a> {
    /// Create a builder over `config`.
    #[must_use]
    pub const fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    /// The stages of the pipeline, outermost first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if a middleware identifier is unknown.
    pub fn stages(&self) -> Result<Vec<Stage>> {
        let config = self.config;
        let mut stages = vec![Stage::UrlEncoding, Stage::Retry(config.retry().clone())];

        for name in config.middlewares() {
            stages.push(Stage::Custom(Middleware::resolve(name, config.layers())?));
        }

        stages.push(Stage::Decoding);
        if config.log_requests() {
            stages.push(Stage::Logging(LogOptions {
                log_bodies: config.log_request_bodies(),
                sink: config.logger().clone(),
            }));
        }
        stages.push(Stage::Adapter {
            adapter: config.adapter().clone(),
            timeout: config.timeout(),
        });

        Ok(stages)
    }

    /// Assemble the pipeline. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Build`] if the pipeline cannot be assembled.
    pub fn build(self) -> Result<Connection> {
        let stages = self.stages()?;
        let service = assemble(&stages)?;
        let stage_names: Vec<String> =
            stages.iter().map(|stage| stage.name().to_string()).collect();

        tracing::debug!(
            base_url = %self.config.base_url(),
            adapter = self.config.adapter().name(),
            stages = ?stage_names,
            "built connection"
        );

        Ok(Connection::new(self.config, stage_names, service))
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;
    use crate::config::{ClientConfig, ClientOptions};
    use crate::middleware::BearerAuthLayer;
    use crate::{Headers, Response, transport_fn};

    fn config(
        builder: crate::config::ClientConfigBuilder,
        options: ClientOptions,
    ) -> ResolvedConfig {
        let stub = transport_fn(|_request| async { Ok(Response::new(200, Headers::new(), "")) });
        let defaults = builder.adapter(Adapter::custom(stub)).build();
        ResolvedConfig::resolve(&defaults, options).expect("resolve")
    }

    #[test]
    fn stage_order() {
        let resolved = config(
            ClientConfig::builder().register_layer("auth", BearerAuthLayer::new("token")),
            ClientOptions::new().middleware("auth"),
        );

        let_assert!(Ok(connection) = ChainBuilder::new(&resolved).build());

        let expected = [
            "url_encoded",
            "retry",
            "auth",
            "instrumentation",
            "encoding",
            "logger",
            "adapter",
        ];
        check!(connection.stage_names() == expected);
    }

    #[test]
    fn logger_follows_log_requests() {
        let resolved = config(ClientConfig::builder().log_requests(false), ClientOptions::new());

        let_assert!(Ok(connection) = ChainBuilder::new(&resolved).build());

        let expected = ["url_encoded", "retry", "instrumentation", "encoding", "adapter"];
        check!(connection.stage_names() == expected);
    }

    #[test]
    fn identical_configs_build_identical_pipelines() {
        let resolved = config(
            ClientConfig::builder().middleware("request_start_header"),
            ClientOptions::new(),
        );

        let_assert!(Ok(first) = ChainBuilder::new(&resolved).build());
        let_assert!(Ok(second) = ChainBuilder::new(&resolved).build());

        check!(first.stage_names() == second.stage_names());
    }

    #[test]
    fn unknown_middleware_fails_the_build() {
        let resolved = config(ClientConfig::builder(), ClientOptions::new().middleware("missing"));

        let_assert!(Err(err) = ChainBuilder::new(&resolved).build());
        check!(err.is_build());
    }

    #[test]
    fn adapter_must_be_last() {
        let stub = transport_fn(|_request| async { Ok(Response::new(200, Headers::new(), "")) });
        let adapter = Stage::Adapter {
            adapter: Adapter::custom(stub),
            timeout: Duration::from_secs(1),
        };

        let_assert!(Err(err) = assemble(&[]));
        check!(err.is_build());

        let_assert!(Err(err) = assemble(&[Stage::UrlEncoding]));
        check!(err.is_build());

        let_assert!(Err(err) = assemble(&[adapter.clone(), adapter]));
        check!(err.is_build());
    }
}
