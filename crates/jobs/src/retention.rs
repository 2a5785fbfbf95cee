//! Retention sweeping
//!
//! Deletes rows older than the applicable per-org policy window, one tenant
//! at a time, inside each tenant's scope. Tenants fail independently: an
//! error on one site never aborts the rest of the run.
//!
//! Deletion is hard-delete today. The `ExpiryStrategy` seam exists so the
//! safeguarding-adjacent categories (attendance, audit) can move to
//! anonymisation without touching the scheduling logic, pending legal and
//! product review.

use std::sync::Arc;

use futures::future::BoxFuture;
use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use treehouse_shared::RetentionCategory;
use treehouse_tenancy::{ScopeManager, TenantScope};
use uuid::Uuid;

use crate::error::{JobError, JobResult};

/// Retention windows in days, per data category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RetentionPolicy {
    pub activity_days: i64,
    pub attendance_days: i64,
    pub audit_days: i64,
}

impl Default for RetentionPolicy {
    /// Fixed defaults applied when an org has no explicit policy row.
    fn default() -> Self {
        Self {
            activity_days: 365,
            attendance_days: 730,
            audit_days: 365,
        }
    }
}

impl RetentionPolicy {
    pub fn days_for(&self, category: RetentionCategory) -> i64 {
        match category {
            RetentionCategory::StaffActivity => self.activity_days,
            RetentionCategory::Attendance => self.attendance_days,
            RetentionCategory::Audit => self.audit_days,
        }
    }

    /// Rows strictly older than the returned instant are expired.
    pub fn cutoff_for(&self, category: RetentionCategory, now: OffsetDateTime) -> OffsetDateTime {
        now - Duration::days(self.days_for(category))
    }
}

/// How expired rows are disposed of within a tenant scope.
pub trait ExpiryStrategy: Send + Sync {
    fn expire<'s>(
        &'s self,
        scope: &'s mut TenantScope,
        category: RetentionCategory,
        cutoff: OffsetDateTime,
    ) -> BoxFuture<'s, Result<u64, sqlx::Error>>;
}

/// Current behaviour: hard delete, no undo window.
pub struct HardDelete;

impl ExpiryStrategy for HardDelete {
    fn expire<'s>(
        &'s self,
        scope: &'s mut TenantScope,
        category: RetentionCategory,
        cutoff: OffsetDateTime,
    ) -> BoxFuture<'s, Result<u64, sqlx::Error>> {
        Box::pin(async move {
            // Table and column names come from the closed category enum, not
            // caller input.
            let sql = format!(
                "DELETE FROM {} WHERE {} < $1",
                category.table(),
                category.timestamp_column()
            );
            let result = sqlx::query(&sql).bind(cutoff).execute(scope.conn()).await?;
            Ok(result.rows_affected())
        })
    }
}

/// Rows deleted per category for one tenant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DeletedCounts {
    pub staff_activity: u64,
    pub attendance: u64,
    pub audit: u64,
}

impl DeletedCounts {
    fn record(&mut self, category: RetentionCategory, count: u64) {
        match category {
            RetentionCategory::StaffActivity => self.staff_activity = count,
            RetentionCategory::Attendance => self.attendance = count,
            RetentionCategory::Audit => self.audit = count,
        }
    }
}

/// Outcome for one tenant in a sweep run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepOutcome {
    pub tenant_id: Uuid,
    pub org_id: Uuid,
    pub deleted: DeletedCounts,
    pub error: Option<String>,
}

/// Result of one sweep invocation.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SweepReport {
    pub swept_at: OffsetDateTime,
    /// True when enforcement was disabled and nothing was touched.
    pub skipped: bool,
    pub tenants_processed: usize,
    pub tenants_failed: usize,
    pub outcomes: Vec<SweepOutcome>,
}

impl SweepReport {
    fn skipped(now: OffsetDateTime) -> Self {
        Self {
            swept_at: now,
            skipped: true,
            tenants_processed: 0,
            tenants_failed: 0,
            outcomes: Vec::new(),
        }
    }
}

/// Sweeper configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub enforce: bool,
}

/// Periodic deletion of expired rows across all tenants.
pub struct RetentionSweeper {
    scopes: ScopeManager,
    pool: PgPool,
    config: RetentionConfig,
    strategy: Arc<dyn ExpiryStrategy>,
}

impl RetentionSweeper {
    pub fn new(scopes: ScopeManager, pool: PgPool, config: RetentionConfig) -> Self {
        Self::with_strategy(scopes, pool, config, Arc::new(HardDelete))
    }

    pub fn with_strategy(
        scopes: ScopeManager,
        pool: PgPool,
        config: RetentionConfig,
        strategy: Arc<dyn ExpiryStrategy>,
    ) -> Self {
        Self {
            scopes,
            pool,
            config,
            strategy,
        }
    }

    /// Sweep every tenant. Re-running with the same `now` is safe: rows
    /// matching the cutoffs are already gone.
    pub async fn run(&self, now: OffsetDateTime) -> JobResult<SweepReport> {
        if !self.config.enforce {
            // Compliance-relevant control: a disabled sweep must be loud.
            tracing::warn!("Retention enforcement is disabled; sweep skipped, nothing deleted");
            return Ok(SweepReport::skipped(now));
        }

        let tenants: Vec<(Uuid, Uuid)> =
            sqlx::query_as("SELECT id, org_id FROM tenants ORDER BY created_at")
                .fetch_all(&self.pool)
                .await?;

        let mut outcomes = Vec::with_capacity(tenants.len());
        let mut tenants_failed = 0usize;

        for (tenant_id, org_id) in tenants {
            match self.sweep_tenant(tenant_id, org_id, now).await {
                Ok(deleted) => {
                    tracing::info!(
                        tenant_id = %tenant_id,
                        org_id = %org_id,
                        staff_activity = deleted.staff_activity,
                        attendance = deleted.attendance,
                        audit = deleted.audit,
                        "Tenant sweep complete"
                    );
                    outcomes.push(SweepOutcome {
                        tenant_id,
                        org_id,
                        deleted,
                        error: None,
                    });
                }
                Err(e) => {
                    // Ids only, never personal data.
                    tracing::error!(
                        tenant_id = %tenant_id,
                        org_id = %org_id,
                        error = %e,
                        "Tenant sweep failed; continuing with remaining tenants"
                    );
                    tenants_failed += 1;
                    outcomes.push(SweepOutcome {
                        tenant_id,
                        org_id,
                        deleted: DeletedCounts::default(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        Ok(SweepReport {
            swept_at: now,
            skipped: false,
            tenants_processed: outcomes.len(),
            tenants_failed,
            outcomes,
        })
    }

    async fn sweep_tenant(
        &self,
        tenant_id: Uuid,
        org_id: Uuid,
        now: OffsetDateTime,
    ) -> JobResult<DeletedCounts> {
        let policy = self.policy_for_org(org_id).await?;
        let strategy = Arc::clone(&self.strategy);

        self.scopes
            .run_scoped(tenant_id, Some(org_id), |scope| {
                Box::pin(async move {
                    let mut deleted = DeletedCounts::default();
                    for &category in RetentionCategory::SWEEP_ORDER {
                        let cutoff = policy.cutoff_for(category, now);
                        let count = strategy
                            .expire(scope, category, cutoff)
                            .await
                            .map_err(JobError::from)?;
                        deleted.record(category, count);
                    }
                    Ok::<_, JobError>(deleted)
                })
            })
            .await
    }

    async fn policy_for_org(&self, org_id: Uuid) -> JobResult<RetentionPolicy> {
        let row: Option<(i64, i64, i64)> = sqlx::query_as(
            r#"
            SELECT activity_days, attendance_days, audit_days
            FROM retention_policies
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some((activity_days, attendance_days, audit_days)) => RetentionPolicy {
                activity_days,
                attendance_days,
                audit_days,
            },
            None => RetentionPolicy::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    #[test]
    fn defaults_are_730_for_attendance_and_365_elsewhere() {
        let policy = RetentionPolicy::default();
        assert_eq!(policy.days_for(RetentionCategory::StaffActivity), 365);
        assert_eq!(policy.days_for(RetentionCategory::Attendance), 730);
        assert_eq!(policy.days_for(RetentionCategory::Audit), 365);
    }

    #[test]
    fn cutoff_is_now_minus_window() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let policy = RetentionPolicy::default();
        assert_eq!(
            policy.cutoff_for(RetentionCategory::Attendance, now),
            now - Duration::days(730)
        );
    }

    #[tokio::test]
    async fn disabled_enforcement_skips_without_touching_storage() {
        // Lazy pool: never connects. If the sweeper touched storage on the
        // disabled path, this test would error rather than report a skip.
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/never_connected")
            .unwrap();
        let sweeper = RetentionSweeper::new(
            ScopeManager::new(pool.clone()),
            pool,
            RetentionConfig { enforce: false },
        );

        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let report = sweeper.run(now).await.unwrap();

        assert!(report.skipped);
        assert_eq!(report.tenants_processed, 0);
        assert!(report.outcomes.is_empty());
    }
}
