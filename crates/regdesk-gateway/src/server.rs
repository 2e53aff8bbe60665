use std::future::Future;
use std::sync::Arc;

use regdesk_common::Result;
use regdesk_config::AppConfig;
use regdesk_db::{Connector, NativeConnector, RegistrationStore, StartupOrchestrator};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::router::build_router;
use crate::shutdown::{ShutdownTrigger, shutdown_signal};
use crate::state::AppState;

/// Brings the database to `Ready`, then binds and serves the HTTP API.
pub struct GatewayServer {
    config: AppConfig,
    connector: Arc<dyn Connector>,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            connector: Arc::new(NativeConnector),
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(self) -> Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves. Resolving during startup aborts it
    /// before anything is bound.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let trigger = ShutdownTrigger::spawn(shutdown);

        let mut orchestrator =
            StartupOrchestrator::new(&self.config.database, self.connector.clone())?;
        orchestrator.run_until(trigger.wait()).await?;

        let store = RegistrationStore::connect(self.connector.as_ref(), orchestrator.endpoint()).await?;
        info!("{} registration(s) on record", store.count().await?);

        let addr = format!("{}:{}", self.config.gateway.host, self.config.gateway.port);
        let state = Arc::new(AppState::new(self.config, store));
        if !state.api_key.is_configured() {
            warn!("no api key configured, registration listing will refuse every request");
        }
        let app = build_router(state);

        let listener = TcpListener::bind(&addr).await?;
        info!("regdesk gateway listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(trigger.wait())
            .await
            .map_err(|e| regdesk_common::Error::Gateway(format!("server error: {e}")))?;

        info!("gateway stopped");
        Ok(())
    }
}
