//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use treehouse_billing::{BillingConfig, Reconciler};

use crate::config::ApiConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: ApiConfig,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(pool: PgPool, config: ApiConfig, billing: BillingConfig) -> Self {
        tracing::info!(
            active_provider = %billing.active_provider,
            "Billing reconciler initialized"
        );
        let reconciler = Arc::new(Reconciler::new(billing, pool.clone()));
        Self {
            pool,
            config,
            reconciler,
        }
    }
}
