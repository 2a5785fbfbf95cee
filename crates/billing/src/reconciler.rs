//! Webhook reconciliation
//!
//! Delivery is at-least-once; application is exactly-once. The path is:
//! adapter verifies and normalises, the ledger claims the event id
//! atomically, then the state transition is applied and the ledger row
//! finalised. A delivery that loses the claim is a successful no-op, and a
//! unique-constraint race during apply is folded into the same duplicate
//! outcome.

use std::collections::HashMap;

use sqlx::PgPool;
use time::OffsetDateTime;
use treehouse_shared::BillingProvider;
use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::{BillingError, BillingResult};
use crate::event::{CanonicalEvent, EventKind};
use crate::ledger::EventLedger;
use crate::providers::{GocardlessAdapter, ProviderAdapter, StripeAdapter};
use crate::subscription::{merge_subscription, SubscriptionState, SubscriptionStatus};

/// How a delivery was resolved. Both variants are HTTP-success to the
/// provider; `Duplicate` means the event had already been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Applied,
    Duplicate,
}

/// Applies canonical billing events to subscription state, exactly once per
/// provider event id.
pub struct Reconciler {
    pool: PgPool,
    ledger: EventLedger,
    adapters: HashMap<BillingProvider, Box<dyn ProviderAdapter>>,
    active_provider: BillingProvider,
}

impl Reconciler {
    pub fn new(config: BillingConfig, pool: PgPool) -> Self {
        let mut adapters: HashMap<BillingProvider, Box<dyn ProviderAdapter>> = HashMap::new();
        if let Some(secret) = &config.stripe_webhook_secret {
            adapters.insert(
                BillingProvider::Stripe,
                Box::new(StripeAdapter::new(secret.clone())),
            );
        }
        if let Some(secret) = &config.gocardless_webhook_secret {
            adapters.insert(
                BillingProvider::Gocardless,
                Box::new(GocardlessAdapter::new(secret.clone())),
            );
        }

        let ledger = EventLedger::new(pool.clone());
        Self {
            pool,
            ledger,
            adapters,
            active_provider: config.active_provider,
        }
    }

    /// Provider new checkouts are routed through.
    pub fn active_provider(&self) -> BillingProvider {
        self.active_provider
    }

    /// Handle one inbound webhook delivery end to end.
    pub async fn handle_delivery(
        &self,
        provider: BillingProvider,
        raw_body: &str,
        signature_header: &str,
        now: OffsetDateTime,
    ) -> BillingResult<DeliveryOutcome> {
        let adapter = self
            .adapters
            .get(&provider)
            .ok_or(BillingError::ProviderNotConfigured(provider))?;

        let event = adapter.verify_and_parse(raw_body, signature_header, now)?;

        if self.ledger.claim(&event).await?.is_none() {
            let reason = self.ledger.refusal_reason(provider, &event.event_id).await;
            tracing::info!(
                provider = %provider,
                event_id = %event.event_id,
                event_kind = %event.kind,
                reason = %reason,
                "Duplicate webhook event - atomic idempotency check"
            );
            return Ok(DeliveryOutcome::Duplicate);
        }

        tracing::info!(
            provider = %provider,
            event_id = %event.event_id,
            event_kind = %event.kind,
            "Processing webhook event (claimed exclusive processing rights)"
        );

        let result = match self.apply_event(&event).await {
            // A racing duplicate that slipped past the claim surfaces as a
            // unique violation; the event was applied by the racer.
            Err(BillingError::Database(e)) if is_unique_violation(&e) => {
                tracing::info!(
                    provider = %provider,
                    event_id = %event.event_id,
                    "Unique-key race during apply; treating as duplicate"
                );
                Ok(())
            }
            other => other,
        };

        let (processing_result, error_message) = match &result {
            Ok(()) => ("success", None),
            Err(e) => ("error", Some(e.to_string())),
        };
        self.ledger
            .finalize(provider, &event.event_id, processing_result, error_message.as_deref())
            .await;

        result.map(|()| DeliveryOutcome::Applied)
    }

    async fn apply_event(&self, event: &CanonicalEvent) -> BillingResult<()> {
        match event.kind {
            EventKind::SubscriptionCreated
            | EventKind::SubscriptionUpdated
            | EventKind::SubscriptionCanceled => self.upsert_subscription(event).await,
            EventKind::InvoicePaid | EventKind::InvoicePaymentFailed => {
                self.apply_invoice(event).await
            }
            EventKind::Unknown => {
                // Recorded in the ledger for auditability; nothing to mutate.
                tracing::debug!(
                    provider = %event.provider,
                    event_id = %event.event_id,
                    "Unknown event kind recorded without state change"
                );
                Ok(())
            }
        }
    }

    async fn upsert_subscription(&self, event: &CanonicalEvent) -> BillingResult<()> {
        let (org_id, subscription_id) = required_ids(event)?;

        let current = self.fetch_subscription(event.provider, subscription_id).await?;
        let next = merge_subscription(current.as_ref(), event, org_id, subscription_id);
        self.persist_subscription(&next).await?;

        tracing::info!(
            org_id = %next.org_id,
            provider = %next.provider,
            subscription_id = %next.provider_subscription_id,
            status = %next.status,
            "Subscription state applied"
        );
        Ok(())
    }

    /// Invoice events drive downstream notifications; subscription fields
    /// only move when the canonical event names them explicitly.
    async fn apply_invoice(&self, event: &CanonicalEvent) -> BillingResult<()> {
        let (org_id, subscription_id) = required_ids(event)?;

        match self.fetch_subscription(event.provider, subscription_id).await? {
            Some(current) => {
                let next = merge_subscription(Some(&current), event, org_id, subscription_id);
                self.persist_subscription(&next).await?;
                tracing::info!(
                    org_id = %org_id,
                    subscription_id = %subscription_id,
                    event_kind = %event.kind,
                    status = %next.status,
                    "Invoice event applied"
                );
            }
            None => {
                // The subscription's own created/updated event may still be
                // in flight; the invoice is already in the ledger.
                tracing::warn!(
                    org_id = %org_id,
                    subscription_id = %subscription_id,
                    event_kind = %event.kind,
                    "Invoice event for unknown subscription; recorded only"
                );
            }
        }
        Ok(())
    }

    async fn fetch_subscription(
        &self,
        provider: BillingProvider,
        subscription_id: &str,
    ) -> BillingResult<Option<SubscriptionState>> {
        let row: Option<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT org_id, provider, provider_subscription_id, plan_code, status,
                   current_period_start, current_period_end, cancel_at_period_end,
                   pending_order_id, last_event_id
            FROM subscriptions
            WHERE provider = $1 AND provider_subscription_id = $2
            "#,
        )
        .bind(provider.as_str())
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRow::into_state).transpose()
    }

    async fn persist_subscription(&self, state: &SubscriptionState) -> BillingResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, org_id, provider, provider_subscription_id, plan_code, status,
                 current_period_start, current_period_end, cancel_at_period_end,
                 pending_order_id, last_event_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            ON CONFLICT (provider, provider_subscription_id) DO UPDATE SET
                plan_code = EXCLUDED.plan_code,
                status = EXCLUDED.status,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                pending_order_id = EXCLUDED.pending_order_id,
                last_event_id = EXCLUDED.last_event_id,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(state.org_id)
        .bind(state.provider.as_str())
        .bind(&state.provider_subscription_id)
        .bind(state.plan_code.map(|p| p.as_str()))
        .bind(state.status.as_str())
        .bind(state.current_period_start)
        .bind(state.current_period_end)
        .bind(state.cancel_at_period_end)
        .bind(state.pending_order_id.as_ref())
        .bind(state.last_event_id.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

fn required_ids(event: &CanonicalEvent) -> BillingResult<(Uuid, &str)> {
    let org_id = event.org_id.ok_or_else(|| {
        BillingError::MalformedPayload("event kind requires an org id".to_string())
    })?;
    let subscription_id = event.subscription_id.as_deref().ok_or_else(|| {
        BillingError::MalformedPayload("event kind requires a subscription id".to_string())
    })?;
    Ok((org_id, subscription_id))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    org_id: Uuid,
    provider: String,
    provider_subscription_id: String,
    plan_code: Option<String>,
    status: String,
    current_period_start: Option<OffsetDateTime>,
    current_period_end: Option<OffsetDateTime>,
    cancel_at_period_end: bool,
    pending_order_id: Option<String>,
    last_event_id: Option<String>,
}

impl SubscriptionRow {
    fn into_state(self) -> BillingResult<SubscriptionState> {
        let provider = BillingProvider::from_str(&self.provider).ok_or_else(|| {
            BillingError::MalformedPayload(format!(
                "stored subscription has unknown provider {}",
                self.provider
            ))
        })?;
        let status = SubscriptionStatus::from_provider_str(&self.status).ok_or_else(|| {
            BillingError::MalformedPayload(format!(
                "stored subscription has unknown status {}",
                self.status
            ))
        })?;
        Ok(SubscriptionState {
            org_id: self.org_id,
            provider,
            provider_subscription_id: self.provider_subscription_id,
            plan_code: self
                .plan_code
                .as_deref()
                .and_then(treehouse_shared::PlanCode::from_str),
            status,
            current_period_start: self.current_period_start,
            current_period_end: self.current_period_end,
            cancel_at_period_end: self.cancel_at_period_end,
            pending_order_id: self.pending_order_id,
            last_event_id: self.last_event_id,
        })
    }
}
