//! Treehouse API server
//!
//! Serves the billing webhook endpoint and the health probe.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing::info;
use treehouse_api::{routes, ApiConfig, AppState};
use treehouse_billing::BillingConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Treehouse API");

    let config = ApiConfig::from_env()?;
    let billing = BillingConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;
    info!("Database pool created");

    sqlx::migrate!("../../migrations").run(&pool).await?;
    info!("Migrations applied");

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(pool, config, billing);
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Listening");
    axum::serve(listener, app).await?;

    Ok(())
}
