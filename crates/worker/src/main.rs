//! Treehouse Background Worker
//!
//! Handles scheduled jobs including:
//! - AV30 usage aggregation across all tenants (daily at 02:10 UTC)
//! - Retention sweep across all tenants (daily at 03:40 UTC)
//! - Health check heartbeat (every 5 minutes)
//!
//! Both jobs are idempotent: re-running with an unchanged dataset updates the
//! same counter rows and deletes nothing new.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};
use treehouse_jobs::{RetentionConfig, RetentionSweeper, UsageAggregator};
use treehouse_shared::CoreConfig;
use treehouse_tenancy::ScopeManager;
use uuid::Uuid;

/// Create a database connection pool
async fn create_db_pool(config: &CoreConfig) -> anyhow::Result<sqlx::PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await?;

    info!("Database pool created");
    Ok(pool)
}

/// One AV30 aggregation pass over every tenant in the directory.
async fn run_usage_aggregation(pool: &sqlx::PgPool) {
    let tenant_ids: Vec<Uuid> = match sqlx::query_as::<_, (Uuid,)>("SELECT id FROM tenants")
        .fetch_all(pool)
        .await
    {
        Ok(rows) => rows.into_iter().map(|(id,)| id).collect(),
        Err(e) => {
            error!(error = %e, "Failed to list tenants for aggregation");
            return;
        }
    };

    let aggregator = UsageAggregator::new(ScopeManager::new(pool.clone()), pool.clone());
    let now = OffsetDateTime::now_utc();

    let contexts = match aggregator.resolve_contexts(&tenant_ids).await {
        Ok(contexts) => contexts,
        Err(e) => {
            // Fail-fast by contract: one inaccessible tenant aborts the batch
            // so alerting fires instead of a tenant quietly dropping out.
            error!(error = %e, "Tenant context resolution failed; aggregation aborted");
            return;
        }
    };

    match aggregator.compute_for_tenants(&contexts, now).await {
        Ok(usages) => {
            info!(
                tenants = contexts.len(),
                orgs = usages.len(),
                "Usage aggregation cycle complete"
            );
        }
        Err(e) => {
            error!(error = %e, "Usage aggregation failed");
        }
    }
}

/// One retention sweep over every tenant.
async fn run_retention_sweep(pool: &sqlx::PgPool, enforce: bool) {
    let sweeper = RetentionSweeper::new(
        ScopeManager::new(pool.clone()),
        pool.clone(),
        RetentionConfig { enforce },
    );

    match sweeper.run(OffsetDateTime::now_utc()).await {
        Ok(report) if report.skipped => {
            info!("Retention sweep reported skipped (enforcement disabled)");
        }
        Ok(report) => {
            info!(
                tenants_processed = report.tenants_processed,
                tenants_failed = report.tenants_failed,
                "Retention sweep complete"
            );
        }
        Err(e) => {
            error!(error = %e, "Retention sweep failed");
        }
    }
}

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

    info!("Starting Treehouse Worker");

    let config = CoreConfig::from_env()?;
    let pool = create_db_pool(&config).await?;

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: AV30 usage aggregation, daily after the overnight activity lull
    let usage_pool = pool.clone();
    scheduler
        .add(Job::new_async("0 10 2 * * *", move |_uuid, _l| {
            let pool = usage_pool.clone();
            Box::pin(async move {
                info!("Running scheduled AV30 usage aggregation");
                run_usage_aggregation(&pool).await;
            })
        })?)
        .await?;
    info!("Scheduled: AV30 usage aggregation (daily at 02:10 UTC)");

    // Job 2: Retention sweep, daily, after aggregation has read what it needs
    let sweep_pool = pool.clone();
    let enforce = config.retention_enforcement;
    scheduler
        .add(Job::new_async("0 40 3 * * *", move |_uuid, _l| {
            let pool = sweep_pool.clone();
            Box::pin(async move {
                info!("Running scheduled retention sweep");
                run_retention_sweep(&pool, enforce).await;
            })
        })?)
        .await?;
    info!("Scheduled: Retention sweep (daily at 03:40 UTC)");

    // Job 3: Health check heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    scheduler.start().await?;

    // Park the main task; jobs run on the scheduler's tasks.
    loop {
        tokio::time::sleep(Duration::from_secs(3600)).await;
    }
}
