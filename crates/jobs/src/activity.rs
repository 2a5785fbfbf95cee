//! Activity producer entry point
//!
//! Any code path performing a qualifying staff/volunteer action calls
//! [`record_activity`] inside its tenant scope. Rows are immutable once
//! written; only the aggregator and the retention sweeper ever read them.

use time::OffsetDateTime;
use treehouse_shared::{ActivityKind, UserRole};
use treehouse_tenancy::TenantScope;
use uuid::Uuid;

use crate::error::JobResult;

/// Write one activity row for `subject_user_id` inside the caller's scope.
///
/// Returns `Ok(true)` when a row was written. Subjects whose role does not
/// count toward usage (parents, unknown ids) are skipped silently with
/// `Ok(false)` — producers must not fail a user-facing action because the
/// actor happens to be outside the metered population.
pub async fn record_activity(
    scope: &mut TenantScope,
    kind: ActivityKind,
    subject_user_id: Uuid,
    occurred_at: Option<OffsetDateTime>,
) -> JobResult<bool> {
    let role: Option<(String,)> = sqlx::query_as("SELECT role FROM users WHERE id = $1")
        .bind(subject_user_id)
        .fetch_optional(scope.conn())
        .await?;

    let qualifies = role
        .as_ref()
        .and_then(|(r,)| UserRole::from_str(r))
        .is_some_and(|r| r.counts_toward_usage());

    if !qualifies {
        tracing::debug!(
            tenant_id = %scope.tenant_id(),
            subject_user_id = %subject_user_id,
            "Skipping activity for non-staff subject"
        );
        return Ok(false);
    }

    let occurred_at = occurred_at.unwrap_or_else(OffsetDateTime::now_utc);
    let tenant_id = scope.tenant_id();
    let org_id = scope.org_id();

    sqlx::query(
        r#"
        INSERT INTO activity_events (id, tenant_id, org_id, subject_user_id, kind, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(org_id)
    .bind(subject_user_id)
    .bind(kind.as_str())
    .bind(occurred_at)
    .execute(scope.conn())
    .await?;

    Ok(true)
}
