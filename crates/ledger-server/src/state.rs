use ledger_core::config::AppConfig;
use ledger_core::Ledger;
use std::sync::Arc;

/// Shared application state for the server.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub ledger: Arc<Ledger>,
}

impl AppState {
    pub fn new(config: AppConfig, ledger: Arc<Ledger>) -> Self {
        Self { config, ledger }
    }
}
