use std::sync::Arc;

use tokio::task::JoinError;

use stockline_infra::config::{AppConfig, ForecastConfig};
use stockline_infra::external::{AuthenticatedTransport, ForecastClient, HttpTransport, StaticCredentials};
use stockline_infra::fulfillment::InMemoryFulfillmentService;

pub type HttpForecastClient = ForecastClient<AuthenticatedTransport<HttpTransport, StaticCredentials>>;

/// Services shared by all handlers.
#[derive(Debug)]
pub struct AppServices {
    pub fulfillment: InMemoryFulfillmentService,
    /// Absent when no forecast collaborator is configured.
    pub forecast: Option<HttpForecastClient>,
}

impl AppServices {
    pub fn in_memory(config: &AppConfig) -> Self {
        Self {
            fulfillment: InMemoryFulfillmentService::in_memory(&config.dispatch),
            forecast: forecast_client(&config.forecast),
        }
    }

    /// Run a synchronous service call on the blocking pool.
    ///
    /// Commands take std locks and the forecast transport blocks on I/O, so
    /// neither may run on an async worker.
    pub async fn run<T, F>(self: &Arc<Self>, f: F) -> Result<T, JoinError>
    where
        F: FnOnce(&AppServices) -> T + Send + 'static,
        T: Send + 'static,
    {
        let services = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&services)).await
    }
}

fn forecast_client(config: &ForecastConfig) -> Option<HttpForecastClient> {
    let base_url = config.base_url.as_deref()?;
    tracing::info!(%base_url, "forecast collaborator configured");
    Some(ForecastClient::new(AuthenticatedTransport::new(
        HttpTransport::new(base_url, config.timeout()),
        StaticCredentials::new(config.api_token.clone()),
    )))
}
