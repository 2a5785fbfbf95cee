//! Scoped units of work
//!
//! [`ScopeManager::run_scoped`] is the only entry point for touching tenant
//! data. It opens one transaction, sets the RLS session markers
//! transaction-locally, verifies the tenant resolves, runs the caller's work
//! against the scoped connection, then commits or rolls back.
//!
//! The markers are set with `set_config(..., true)` (transaction-local), so
//! commit and rollback both clear them before the connection returns to the
//! pool. A later caller on a recycled connection starts with no scope at all,
//! and the RLS policies hide every tenant row from an unscoped session.

use futures::future::BoxFuture;
use sqlx::postgres::PgConnection;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::TenancyError;

/// Capability handle for one tenant-scoped unit of work.
///
/// The wrapped transaction is the only executor business logic can reach;
/// there is no way to obtain an unscoped connection from a scope.
pub struct TenantScope {
    tx: Transaction<'static, Postgres>,
    tenant_id: Uuid,
    org_id: Uuid,
}

impl TenantScope {
    pub fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    pub fn org_id(&self) -> Uuid {
        self.org_id
    }

    /// The scoped connection. Every query issued here runs inside the scope's
    /// transaction with the RLS markers applied.
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

/// Opens and tears down tenant-scoped units of work.
#[derive(Clone)]
pub struct ScopeManager {
    pool: PgPool,
}

impl ScopeManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute `work` inside a scope for `tenant_id`.
    ///
    /// When `expected_org` is given, the tenant must belong to that org or
    /// the call fails with [`TenancyError::ScopeViolation`] before `work`
    /// runs. The resolved org id is available on the scope either way.
    ///
    /// Each call takes its own pooled connection, so re-entrant calls for
    /// different tenants cannot bleed scope into each other. A scope must not
    /// be shared across tasks; the markers are bound to its session.
    pub async fn run_scoped<T, E, F>(
        &self,
        tenant_id: Uuid,
        expected_org: Option<Uuid>,
        work: F,
    ) -> Result<T, E>
    where
        E: From<TenancyError>,
        F: for<'s> FnOnce(&'s mut TenantScope) -> BoxFuture<'s, Result<T, E>>,
    {
        let mut tx = self.pool.begin().await.map_err(TenancyError::from)?;

        // Transaction-local: cleared on commit AND rollback, so the marker
        // can never survive onto a recycled pool connection.
        sqlx::query("SELECT set_config('app.current_tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(TenancyError::from)?;

        let row: Option<(Uuid,)> = sqlx::query_as("SELECT org_id FROM tenants WHERE id = $1")
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(TenancyError::from)?;

        let org_id = match row {
            Some((org_id,)) => org_id,
            None => return Err(TenancyError::ScopeViolation { tenant_id }.into()),
        };

        if let Some(expected) = expected_org {
            if expected != org_id {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    expected_org = %expected,
                    actual_org = %org_id,
                    "Tenant does not belong to the expected org"
                );
                return Err(TenancyError::ScopeViolation { tenant_id }.into());
            }
        }

        sqlx::query("SELECT set_config('app.current_org_id', $1, true)")
            .bind(org_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(TenancyError::from)?;

        let mut scope = TenantScope {
            tx,
            tenant_id,
            org_id,
        };

        match work(&mut scope).await {
            Ok(value) => {
                scope.tx.commit().await.map_err(TenancyError::from)?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = scope.tx.rollback().await {
                    tracing::error!(
                        tenant_id = %tenant_id,
                        error = %rollback_err,
                        "Failed to roll back scoped transaction"
                    );
                }
                Err(e)
            }
        }
    }
}
