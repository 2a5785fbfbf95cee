//! Webhook idempotency ledger
//!
//! Records which provider event ids have been applied. The claim uses a
//! single atomic `INSERT ... ON CONFLICT ... RETURNING` so that of any number
//! of concurrent deliveries of the same event, exactly one obtains processing
//! rights; the rest observe a duplicate. Events stuck in `processing` past a
//! timeout can be re-claimed, covering a worker that died mid-apply.

use sqlx::PgPool;
use treehouse_shared::BillingProvider;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::event::CanonicalEvent;

const PROCESSING_TIMEOUT_MINUTES: i32 = 30;

#[derive(Clone)]
pub struct EventLedger {
    pool: PgPool,
}

impl EventLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically claim exclusive processing rights for `event`.
    ///
    /// Returns the ledger row id on success, `None` when another delivery
    /// already holds or completed the event.
    pub async fn claim(&self, event: &CanonicalEvent) -> BillingResult<Option<Uuid>> {
        let claimed: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO billing_webhook_events
                (id, provider, provider_event_id, event_kind, event_timestamp,
                 processing_result, processing_started_at)
            VALUES ($1, $2, $3, $4, $5, 'processing', NOW())
            ON CONFLICT (provider, provider_event_id) DO UPDATE SET
                processing_result = 'processing',
                processing_started_at = NOW(),
                error_message = CONCAT('Recovered from stuck state at ', NOW()::TEXT)
            WHERE billing_webhook_events.processing_result = 'processing'
              AND billing_webhook_events.processing_started_at < NOW() - ($6 || ' minutes')::INTERVAL
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(event.provider.as_str())
        .bind(&event.event_id)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .bind(PROCESSING_TIMEOUT_MINUTES)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                provider = %event.provider,
                event_id = %event.event_id,
                error = %e,
                "Failed to claim webhook event for processing"
            );
            BillingError::Database(e)
        })?;

        Ok(claimed.map(|(id,)| id))
    }

    /// Why a claim was refused, for the duplicate log line.
    pub async fn refusal_reason(
        &self,
        provider: BillingProvider,
        event_id: &str,
    ) -> &'static str {
        let existing: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT processing_result FROM billing_webhook_events
            WHERE provider = $1 AND provider_event_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await
        .ok()
        .flatten();

        match existing {
            Some((status,)) if status == "success" => "already processed successfully",
            Some((status,)) if status == "processing" => {
                "currently being processed by another worker"
            }
            Some(_) => "exists with another status",
            None => "unknown (race condition?)",
        }
    }

    /// Record the processing outcome. The audit row matters for idempotency,
    /// so a failed update is retried once before giving up loudly.
    pub async fn finalize(
        &self,
        provider: BillingProvider,
        event_id: &str,
        processing_result: &str,
        error_message: Option<&str>,
    ) {
        let update = sqlx::query(
            r#"
            UPDATE billing_webhook_events
            SET processing_result = $1, error_message = $2
            WHERE provider = $3 AND provider_event_id = $4
            "#,
        )
        .bind(processing_result)
        .bind(error_message)
        .bind(provider.as_str())
        .bind(event_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = update {
            tracing::warn!(
                event_id = %event_id,
                error = %e,
                "First attempt to update webhook event failed, retrying..."
            );

            if let Err(retry_err) = sqlx::query(
                r#"
                UPDATE billing_webhook_events
                SET processing_result = $1, error_message = $2
                WHERE provider = $3 AND provider_event_id = $4
                "#,
            )
            .bind(processing_result)
            .bind(error_message)
            .bind(provider.as_str())
            .bind(event_id)
            .execute(&self.pool)
            .await
            {
                tracing::error!(
                    provider = %provider,
                    event_id = %event_id,
                    processing_result = %processing_result,
                    first_error = %e,
                    retry_error = %retry_err,
                    "CRITICAL: Failed to update webhook audit record after retry. \
                     Event may appear stuck in 'processing' state. \
                     Manual intervention may be required."
                );
            }
        }
    }
}
