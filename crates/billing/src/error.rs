//! Billing errors

use thiserror::Error;
use treehouse_shared::BillingProvider;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BillingError {
    /// Signature header absent, unparseable, stale, or mismatched. Rejected
    /// before any business field of the payload is read.
    #[error("webhook signature missing or invalid")]
    InvalidSignature,

    /// Signature checked out but the payload is not a usable event.
    #[error("webhook payload malformed: {0}")]
    MalformedPayload(String),

    #[error("no webhook secret configured for provider {0}")]
    ProviderNotConfigured(BillingProvider),

    #[error("unknown billing provider: {0}")]
    UnknownProvider(String),

    #[error("organisation {0} not found")]
    OrgNotFound(Uuid),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type BillingResult<T> = Result<T, BillingError>;
