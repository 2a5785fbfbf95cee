// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Cross-tenant isolation probes.
//!
//! These tests need a Postgres database with the workspace migrations
//! applied. Point `DATABASE_URL` at one and run with `--ignored`:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/treehouse_test cargo test -p treehouse-tenancy -- --ignored
//! ```
//!
//! The pool is pinned to a single connection on purpose: it forces every
//! scoped unit of work onto the same recycled session, which is exactly the
//! reuse path the scoping contract has to survive.

use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use treehouse_tenancy::{ScopeManager, TenancyError, TenantScope};
use uuid::Uuid;

async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a migrated test database");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .unwrap()
}

async fn seed_tenant(pool: &PgPool) -> (Uuid, Uuid) {
    let org_id = Uuid::new_v4();
    let tenant_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO orgs (id, name, plan_code, billing_provider) VALUES ($1, $2, 'starter', 'stripe')",
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

fn insert_activity<'s>(
    scope: &'s mut TenantScope,
    subject: Uuid,
) -> BoxFuture<'s, Result<(), TenancyError>> {
    Box::pin(async move {
        let tenant_id = scope.tenant_id();
        let org_id = scope.org_id();
        sqlx::query(
            "INSERT INTO activity_events (id, tenant_id, org_id, subject_user_id, kind, occurred_at)
             VALUES ($1, $2, $3, $4, 'attendance_recorded', NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(org_id)
        .bind(subject)
        .execute(scope.conn())
        .await?;
        Ok(())
    })
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn scoped_work_cannot_see_other_tenants_rows() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());

    let (tenant_a, _) = seed_tenant(&pool).await;
    let (tenant_b, _) = seed_tenant(&pool).await;

    scopes
        .run_scoped(tenant_a, None, |scope| insert_activity(scope, Uuid::new_v4()))
        .await
        .unwrap();

    // Tenant B's scope runs on the same recycled connection and must see
    // nothing of tenant A's data.
    let visible: i64 = scopes
        .run_scoped(tenant_b, None, |scope| {
            Box::pin(async move {
                let (count,): (i64,) =
                    sqlx::query_as("SELECT COUNT(*) FROM activity_events")
                        .fetch_one(scope.conn())
                        .await?;
                Ok::<_, TenancyError>(count)
            })
        })
        .await
        .unwrap();

    assert_eq!(visible, 0, "tenant B observed tenant A's rows");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn scope_markers_do_not_survive_connection_reuse() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());

    let (tenant_a, _) = seed_tenant(&pool).await;
    scopes
        .run_scoped(tenant_a, None, |scope| insert_activity(scope, Uuid::new_v4()))
        .await
        .unwrap();

    // Same single connection, now unscoped: the marker must be gone and the
    // RLS policies must hide every tenant row.
    let (marker,): (Option<String>,) =
        sqlx::query_as("SELECT NULLIF(current_setting('app.current_tenant_id', true), '')")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(marker, None, "tenant marker leaked onto the pooled connection");

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM activity_events")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0, "unscoped session observed tenant rows");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn unknown_tenant_is_a_scope_violation() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());

    let missing = Uuid::new_v4();
    let result: Result<(), TenancyError> = scopes
        .run_scoped(missing, None, |_scope| Box::pin(async move { Ok(()) }))
        .await;

    assert!(matches!(
        result,
        Err(TenancyError::ScopeViolation { tenant_id }) if tenant_id == missing
    ));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL pointing at a migrated Postgres"]
async fn org_mismatch_is_a_scope_violation() {
    let pool = test_pool().await;
    let scopes = ScopeManager::new(pool.clone());

    let (tenant_a, _) = seed_tenant(&pool).await;
    let (_, other_org) = seed_tenant(&pool).await;

    let result: Result<(), TenancyError> = scopes
        .run_scoped(tenant_a, Some(other_org), |_scope| {
            Box::pin(async move { Ok(()) })
        })
        .await;

    assert!(matches!(result, Err(TenancyError::ScopeViolation { .. })));
}
