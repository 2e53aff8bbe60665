use std::sync::Arc;

use regdesk_config::AppConfig;
use regdesk_db::RegistrationStore;
use regdesk_security::ApiKeyGuard;

/// Shared application state accessible from all request handlers.
pub struct AppState {
    pub config: AppConfig,
    pub store: RegistrationStore,
    pub api_key: ApiKeyGuard,
}

impl AppState {
    pub fn new(config: AppConfig, store: RegistrationStore) -> Self {
        let api_key = ApiKeyGuard::new(config.gateway.api_key.clone());
        Self {
            config,
            store,
            api_key,
        }
    }
}

pub type SharedState = Arc<AppState>;
