//! Widget service client demo.
//!
//! Shows one shared service configuration, a thin typed wrapper over
//! [`ApiClient`], and how successes and failures come back.

#![allow(missing_docs)]
#![allow(clippy::print_stdout)]

use std::sync::LazyLock;
use std::time::Duration;

use tether::middleware::BearerAuthLayer;
use tether::prelude::*;
use tracing_subscriber::EnvFilter;

static WIDGETS: LazyLock<ClientConfig> = LazyLock::new(|| {
    let uri = std::env::var("WIDGETS_URI").unwrap_or_else(|_| "http://localhost:8080".to_string());
    ClientConfig::builder()
        .service_uri(uri)
        .base_path("/v1")
        .timeout(Duration::from_secs(2))
        .default_header("User-Agent", "widget-service-demo/0.1.0")
        .register_layer(
            "auth",
            BearerAuthLayer::new(std::env::var("WIDGETS_TOKEN").unwrap_or_default()),
        )
        .middlewares(["auth", "instrumentation"])
        .retry(
            RetryOptions::default()
                .with_max(3)
                .with_retry_statuses([502, 503]),
        )
        .build()
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Widget {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewWidget {
    pub name: String,
}

/// Typed access to the widget service.
#[derive(Debug)]
pub struct WidgetService {
    client: ApiClient,
}

impl WidgetService {
    pub fn new(defaults: &ClientConfig) -> Result<Self> {
        let client = ApiClient::from_defaults(defaults)?;
        Ok(Self { client })
    }

    /// `None` when the service answers with a failure status.
    pub async fn find(&self, id: u64) -> Result<Option<Widget>> {
        let params = Params::from([("id".to_string(), id.to_string())]);
        match self.client.get("/widgets", &params, &Headers::new()).await? {
            Outcome::Success(payload) => payload.deserialize().map(Some),
            Outcome::Failure(_) => Ok(None),
        }
    }

    pub async fn create(&self, widget: &NewWidget) -> Result<Option<Widget>> {
        let outcome = self
            .client
            .post("/widgets", Body::json(widget)?, &Headers::new())
            .await?;
        outcome
            .into_payload()
            .ok()
            .map(|payload| payload.deserialize())
            .transpose()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let service = WidgetService::new(&WIDGETS)?;
    match service.find(7).await {
        Ok(Some(widget)) => println!("found {widget:?}"),
        Ok(None) => println!("widget 7 is not there"),
        Err(err) if err.is_transport() => println!("widget service unreachable: {err}"),
        Err(err) => return Err(err),
    }

    Ok(())
}
