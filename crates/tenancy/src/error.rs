//! Tenancy errors

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TenancyError {
    /// Tenant id did not resolve to an existing, accessible tenant, or the
    /// caller's expected org did not match the tenant's org. Fatal to the
    /// calling unit of work; never retried silently.
    #[error("tenant {tenant_id} is not accessible in this scope")]
    ScopeViolation { tenant_id: Uuid },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type TenancyResult<T> = Result<T, TenancyError>;
