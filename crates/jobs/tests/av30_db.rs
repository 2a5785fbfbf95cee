// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! AV30 end-to-end scenario against a real database.
//!
//! Needs a Postgres with the workspace migrations applied:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/treehouse_test cargo test -p treehouse-jobs -- --ignored
//! ```

use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use treehouse_jobs::{record_activity, UsageAggregator};
use treehouse_shared::ActivityKind;
use treehouse_tenancy::{ScopeManager, TenancyError};
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a migrated test database");
    PgPool::connect(&url).await.unwrap()
}

async fn seed_tenant(pool: &PgPool) -> (Uuid, Uuid) {
    let org_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO orgs (id, name, plan_code, billing_provider) VALUES ($1, $2, 'standard', 'stripe')",
    )
    .bind(org_id)
    .bind(format!("org-{org_id}"))
    .execute(pool)
    .await
    .unwrap();
    sqlx::query("INSERT INTO tenants (id, org_id, name, slug) VALUES ($1, $2, $3, $4)")
        .bind(tenant_id)
        .bind(org_id)
        .bind("test site")
        .bind(format!("site-{tenant_id}"))
        .execute(pool)
        .await
        .unwrap();
    (tenant_id, org_id)
}

async fn seed_user(scopes: &ScopeManager, tenant_id: Uuid, role: &str) -> Uuid {
    let user_id = Uuid::new_v4();
    let role = role.to_string();
    scopes
        .run_scoped(tenant_id, None, |scope| {
            Box::pin(async move {
                let org_id = scope.org_id();
                let tenant_id = scope.tenant_id();
                sqlx::query(
                    "INSERT INTO users (id, tenant_id, org_id, email, role) VALUES ($1, $2, $3, $4, $5)",
                )
                .bind(user_id)
                .bind(tenant_id)
                .bind(org_id)
                .bind(format!("{user_id}@example.test"))
                .bind(role)
                .execute(scope.conn())
                .await?;
                Ok::<_, TenancyError>(())
            })
        })
        .await
        .unwrap();
    user_id
}

async fn record(scopes: &ScopeManager, tenant_id: Uuid, subject: Uuid, at: OffsetDateTime) -> bool {
    scopes
        .run_scoped(tenant_id, None, |scope| {
            Box::pin(async move {
                record_activity(scope, ActivityKind::AttendanceRecorded, subject, Some(at)).await
            })
        })
        .await
        .unwrap()
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn av30_scenario_counts_update_in_place() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());
    let aggregator = UsageAggregator::new(scopes.clone(), pool.clone());

    let (tenant, org) = seed_tenant(&pool).await;
    let staff_recent = seed_user(&scopes, tenant, "staff").await;
    let staff_stale = seed_user(&scopes, tenant, "volunteer").await;

    let now = OffsetDateTime::now_utc();
    assert!(record(&scopes, tenant, staff_recent, now - Duration::days(5)).await);
    assert!(record(&scopes, tenant, staff_stale, now - Duration::days(40)).await);

    let contexts = aggregator.resolve_contexts(&[tenant]).await.unwrap();
    let usages = aggregator.compute_for_tenants(&contexts, now).await.unwrap();
    let usage = usages.iter().find(|u| u.org_id == org).unwrap();
    assert_eq!(usage.av30, 1, "only the recently active staff member counts");

    // The stale user becomes active again; the counter row is updated in
    // place, not appended.
    assert!(record(&scopes, tenant, staff_stale, now - Duration::days(1)).await);
    let usages = aggregator.compute_for_tenants(&contexts, now).await.unwrap();
    let usage = usages.iter().find(|u| u.org_id == org).unwrap();
    assert_eq!(usage.av30, 2);

    let (rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM usage_counters WHERE org_id = $1")
            .bind(org)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn parent_activity_is_skipped_silently() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());

    let (tenant, _) = seed_tenant(&pool).await;
    let parent = seed_user(&scopes, tenant, "parent").await;

    let now = OffsetDateTime::now_utc();
    let written = record(&scopes, tenant, parent, now).await;
    assert!(!written, "parent activity must be skipped, not recorded");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn same_org_two_sites_dedupes_subject() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());
    let aggregator = UsageAggregator::new(scopes.clone(), pool.clone());

    let (site_a, org) = seed_tenant(&pool).await;
    let site_b = Uuid::new_v4();
    sqlx::query("INSERT INTO tenants (id, org_id, name, slug) VALUES ($1, $2, $3, $4)")
        .bind(site_b)
        .bind(org)
        .bind("second site")
        .bind(format!("site-{site_b}"))
        .execute(&pool)
        .await
        .unwrap();

    // Same human, stable global id, registered at both sites.
    let roving_staff = seed_user(&scopes, site_a, "staff").await;
    scopes
        .run_scoped(site_b, None, |scope| {
            Box::pin(async move {
                let org_id = scope.org_id();
                sqlx::query(
                    "INSERT INTO users (id, tenant_id, org_id, email, role) VALUES ($1, $2, $3, $4, 'staff')",
                )
                .bind(roving_staff)
                .bind(scope.tenant_id())
                .bind(org_id)
                .bind(format!("{roving_staff}-b@example.test"))
                .execute(scope.conn())
                .await?;
                Ok::<_, TenancyError>(())
            })
        })
        .await
        .unwrap();

    let now = OffsetDateTime::now_utc();
    record(&scopes, site_a, roving_staff, now - Duration::days(2)).await;
    record(&scopes, site_b, roving_staff, now - Duration::days(3)).await;

    let contexts = aggregator.resolve_contexts(&[site_a, site_b]).await.unwrap();
    let usages = aggregator.compute_for_tenants(&contexts, now).await.unwrap();
    let usage = usages.iter().find(|u| u.org_id == org).unwrap();
    assert_eq!(usage.av30, 1, "one person active at two sites counts once");
}
