//! Job errors

use thiserror::Error;
use treehouse_tenancy::TenancyError;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JobError {
    /// Context resolution failed for a tenant id. Aborts the whole batch
    /// rather than silently dropping the tenant.
    #[error("tenant {tenant_id} is not accessible")]
    TenantNotAccessible { tenant_id: Uuid },

    #[error(transparent)]
    Tenancy(#[from] TenancyError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type JobResult<T> = Result<T, JobError>;
