//! AV30 usage aggregation
//!
//! For each org, the count of distinct staff/volunteer users with at least
//! one qualifying activity in the trailing 30 days. Activity is read per
//! tenant inside that tenant's scope, then unioned per org: a staff member
//! active at two sites of the same org counts once.
//!
//! Counters are current snapshots, updated in place. Callers that need a
//! history must snapshot `usage_counters` externally.

use std::collections::{HashMap, HashSet};

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use treehouse_shared::ActivityKind;
use treehouse_tenancy::{ScopeManager, TenancyError};
use uuid::Uuid;

use crate::error::{JobError, JobResult};

/// A resolved (tenant, org) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub org_id: Uuid,
}

/// One org's computed counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct OrgUsage {
    pub org_id: Uuid,
    pub av30: i64,
    pub calculated_at: OffsetDateTime,
}

/// Start of the trailing window: exactly 30 x 24h before `now`, not calendar
/// months. Events at the boundary itself are inside the window (`>=`).
pub fn window_start(now: OffsetDateTime) -> OffsetDateTime {
    now - Duration::days(30)
}

/// Drop repeated tenant ids, keeping first occurrence order. A tenant passed
/// twice must not be double-counted.
fn dedupe_contexts(contexts: &[TenantContext]) -> Vec<TenantContext> {
    let mut seen = HashSet::new();
    contexts
        .iter()
        .filter(|c| seen.insert(c.tenant_id))
        .copied()
        .collect()
}

/// Union per-tenant distinct subject sets into per-org counts.
///
/// Every org present in `contexts` gets an entry, zero included — orgs with
/// no qualifying activity must not be silently omitted. Orgs listed in
/// `failed_orgs` are excluded entirely: persisting an undercount for an org
/// whose tenant read failed would be worse than persisting nothing.
fn union_by_org(
    contexts: &[TenantContext],
    per_tenant_subjects: &HashMap<Uuid, Vec<Uuid>>,
    failed_orgs: &HashSet<Uuid>,
    calculated_at: OffsetDateTime,
) -> Vec<OrgUsage> {
    let mut subjects_by_org: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    let mut org_order: Vec<Uuid> = Vec::new();

    for ctx in contexts {
        if failed_orgs.contains(&ctx.org_id) {
            continue;
        }
        let entry = subjects_by_org.entry(ctx.org_id).or_insert_with(|| {
            org_order.push(ctx.org_id);
            HashSet::new()
        });
        if let Some(subjects) = per_tenant_subjects.get(&ctx.tenant_id) {
            entry.extend(subjects.iter().copied());
        }
    }

    org_order
        .into_iter()
        .map(|org_id| OrgUsage {
            org_id,
            av30: subjects_by_org[&org_id].len() as i64,
            calculated_at,
        })
        .collect()
}

/// Computes and persists AV30 counters.
pub struct UsageAggregator {
    scopes: ScopeManager,
    pool: PgPool,
}

impl UsageAggregator {
    pub fn new(scopes: ScopeManager, pool: PgPool) -> Self {
        Self { scopes, pool }
    }

    /// Resolve each tenant id to its org. Fail-fast: any inaccessible tenant
    /// aborts the whole resolution so a batch can never silently drop one.
    pub async fn resolve_contexts(&self, tenant_ids: &[Uuid]) -> JobResult<Vec<TenantContext>> {
        let mut contexts = Vec::with_capacity(tenant_ids.len());
        for &tenant_id in tenant_ids {
            let org_id: Uuid = self
                .scopes
                .run_scoped(tenant_id, None, |scope| {
                    let org_id = scope.org_id();
                    Box::pin(async move { Ok::<_, JobError>(org_id) })
                })
                .await
                .map_err(|e| match e {
                    JobError::Tenancy(TenancyError::ScopeViolation { .. }) => {
                        JobError::TenantNotAccessible { tenant_id }
                    }
                    other => other,
                })?;
            contexts.push(TenantContext { tenant_id, org_id });
        }
        Ok(contexts)
    }

    /// Compute AV30 per org over `contexts` and persist one counter per org.
    ///
    /// A failed read for one tenant does not abort siblings, but its org is
    /// withheld from the persist step and surfaced in the error log; the
    /// previously stored counter for that org stays untouched.
    pub async fn compute_for_tenants(
        &self,
        contexts: &[TenantContext],
        now: OffsetDateTime,
    ) -> JobResult<Vec<OrgUsage>> {
        let contexts = dedupe_contexts(contexts);
        let from = window_start(now);
        let qualifying = ActivityKind::qualifying_strs();

        let mut per_tenant_subjects: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        let mut failed_orgs: HashSet<Uuid> = HashSet::new();

        for ctx in &contexts {
            let kinds = qualifying.clone();
            let result: JobResult<Vec<Uuid>> = self
                .scopes
                .run_scoped(ctx.tenant_id, Some(ctx.org_id), |scope| {
                    Box::pin(async move {
                        let rows: Vec<(Uuid,)> = sqlx::query_as(
                            r#"
                            SELECT DISTINCT subject_user_id
                            FROM activity_events
                            WHERE occurred_at >= $1 AND kind = ANY($2)
                            "#,
                        )
                        .bind(from)
                        .bind(&kinds)
                        .fetch_all(scope.conn())
                        .await?;
                        Ok(rows.into_iter().map(|(id,)| id).collect())
                    })
                })
                .await;

            match result {
                Ok(subjects) => {
                    per_tenant_subjects.insert(ctx.tenant_id, subjects);
                }
                Err(e) => {
                    tracing::error!(
                        tenant_id = %ctx.tenant_id,
                        org_id = %ctx.org_id,
                        error = %e,
                        "Activity read failed; withholding org from this aggregation run"
                    );
                    failed_orgs.insert(ctx.org_id);
                }
            }
        }

        let usages = union_by_org(&contexts, &per_tenant_subjects, &failed_orgs, now);
        self.persist_counters(&usages).await?;

        tracing::info!(
            orgs = usages.len(),
            orgs_withheld = failed_orgs.len(),
            allowlist_version = treehouse_shared::ACTIVITY_ALLOWLIST_VERSION,
            "AV30 aggregation complete"
        );

        Ok(usages)
    }

    /// Upsert counters: existing rows are updated in place so the table holds
    /// current state, not a time series.
    async fn persist_counters(&self, usages: &[OrgUsage]) -> JobResult<()> {
        for usage in usages {
            sqlx::query(
                r#"
                INSERT INTO usage_counters (org_id, av30, calculated_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (org_id) DO UPDATE SET
                    av30 = EXCLUDED.av30,
                    calculated_at = EXCLUDED.calculated_at
                "#,
            )
            .bind(usage.org_id)
            .bind(usage.av30)
            .bind(usage.calculated_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}
