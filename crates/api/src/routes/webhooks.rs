//! Billing webhook endpoint
//!
//! Accepts raw provider deliveries, hands them to the reconciler, and maps
//! outcomes to the status codes providers key their retry behaviour on:
//! 2xx stops retries (including for duplicates), 4xx marks a delivery the
//! provider should not resend, 5xx asks for a retry.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use time::OffsetDateTime;
use treehouse_billing::{BillingError, DeliveryOutcome};
use treehouse_shared::BillingProvider;

use crate::state::AppState;

pub async fn receive(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let Some(provider) = BillingProvider::from_str(&provider) else {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "unknown provider" })),
        );
    };

    let signature = headers
        .get(provider.signature_header())
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let now = OffsetDateTime::now_utc();
    match state
        .reconciler
        .handle_delivery(provider, &body, signature, now)
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "received": true,
                "duplicate": outcome == DeliveryOutcome::Duplicate,
            })),
        ),
        Err(e) => {
            let status = status_for(&e);
            // 5xx failures must stay visible to operators; 4xx is provider
            // noise the provider will handle by its own policy.
            if status.is_server_error() {
                tracing::error!(provider = %provider, error = %e, "Webhook processing failed");
            } else {
                tracing::warn!(provider = %provider, error = %e, "Webhook delivery rejected");
            }
            (status, Json(serde_json::json!({ "error": e.to_string() })))
        }
    }
}

fn status_for(error: &BillingError) -> StatusCode {
    match error {
        BillingError::InvalidSignature => StatusCode::UNAUTHORIZED,
        BillingError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        BillingError::ProviderNotConfigured(_) | BillingError::UnknownProvider(_) => {
            StatusCode::NOT_FOUND
        }
        BillingError::OrgNotFound(_) => StatusCode::BAD_REQUEST,
        BillingError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use treehouse_shared::BillingProvider;

    #[test]
    fn signature_failures_are_unauthorized_not_retryable() {
        assert_eq!(
            status_for(&BillingError::InvalidSignature),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&BillingError::MalformedPayload("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn storage_failures_ask_the_provider_to_retry() {
        let e = BillingError::Database(sqlx::Error::PoolClosed);
        assert_eq!(status_for(&e), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unconfigured_provider_is_not_found() {
        assert_eq!(
            status_for(&BillingError::ProviderNotConfigured(
                BillingProvider::Gocardless
            )),
            StatusCode::NOT_FOUND
        );
    }
}
