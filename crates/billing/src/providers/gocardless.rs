//! GoCardless webhook adapter
//!
//! Signature scheme: the `Webhook-Signature` header is the hex HMAC-SHA256 of
//! the raw body under the endpoint secret. The scheme embeds no timestamp, so
//! there is no replay-window check here; replays are already harmless because
//! application is idempotent per event id.

use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;
use treehouse_shared::{BillingProvider, PlanCode};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::event::{CanonicalEvent, EventKind};
use crate::providers::{hmac_sha256_hex, ProviderAdapter};
use crate::subscription::SubscriptionStatus;

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    resource_type: String,
    action: String,
    created_at: String,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    details: Details,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    #[serde(default)]
    subscription: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Details {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    plan_code: Option<String>,
    #[serde(default)]
    start_date: Option<String>,
    #[serde(default)]
    end_date: Option<String>,
    #[serde(default)]
    cancel_at_period_end: Option<bool>,
}

pub struct GocardlessAdapter {
    webhook_secret: String,
}

impl GocardlessAdapter {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    fn parse(&self, payload: &str) -> BillingResult<CanonicalEvent> {
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

        let occurred_at = OffsetDateTime::parse(
            &envelope.created_at,
            &time::format_description::well_known::Rfc3339,
        )
        .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

        let kind = match (envelope.resource_type.as_str(), envelope.action.as_str()) {
            ("subscriptions", "created") => EventKind::SubscriptionCreated,
            ("subscriptions", "amended" | "updated") => EventKind::SubscriptionUpdated,
            ("subscriptions", "cancelled" | "finished") => EventKind::SubscriptionCanceled,
            ("payments", "confirmed" | "paid_out") => EventKind::InvoicePaid,
            ("payments", "failed") => EventKind::InvoicePaymentFailed,
            (resource_type, action) => {
                tracing::info!(
                    resource_type = %resource_type,
                    action = %action,
                    event_id = %envelope.id,
                    "Received unhandled GoCardless event - recording without state change"
                );
                return Ok(CanonicalEvent {
                    provider: BillingProvider::Gocardless,
                    event_id: envelope.id,
                    kind: EventKind::Unknown,
                    org_id: None,
                    subscription_id: None,
                    plan_code: None,
                    status: None,
                    period_start: None,
                    period_end: None,
                    cancel_at_period_end: None,
                    pending_order_id: None,
                    occurred_at,
                });
            }
        };

        let subscription_id = envelope.links.subscription.ok_or_else(|| {
            BillingError::MalformedPayload("event without subscription link".to_string())
        })?;

        let org_id = envelope
            .metadata
            .get("org_id")
            .and_then(|id| Uuid::parse_str(id).ok())
            .ok_or_else(|| {
                BillingError::MalformedPayload("org_id not found in metadata".to_string())
            })?;

        // Payment failures name the subscription status explicitly when the
        // mandate is exhausted; absent that, status is untouched downstream.
        let status = match kind {
            EventKind::SubscriptionCanceled => Some(SubscriptionStatus::Canceled),
            _ => envelope
                .details
                .status
                .as_deref()
                .and_then(SubscriptionStatus::from_provider_str),
        };

        Ok(CanonicalEvent {
            provider: BillingProvider::Gocardless,
            event_id: envelope.id,
            kind,
            org_id: Some(org_id),
            subscription_id: Some(subscription_id),
            plan_code: envelope
                .details
                .plan_code
                .as_deref()
                .and_then(PlanCode::from_str),
            status,
            period_start: rfc3339_opt(envelope.details.start_date.as_deref()),
            period_end: rfc3339_opt(envelope.details.end_date.as_deref()),
            cancel_at_period_end: envelope.details.cancel_at_period_end,
            pending_order_id: envelope.metadata.get("pending_order_id").cloned(),
            occurred_at,
        })
    }
}

impl ProviderAdapter for GocardlessAdapter {
    fn provider(&self) -> BillingProvider {
        BillingProvider::Gocardless
    }

    fn verify_and_parse(
        &self,
        raw_body: &str,
        signature_header: &str,
        _now: OffsetDateTime,
    ) -> BillingResult<CanonicalEvent> {
        let computed = hmac_sha256_hex(&self.webhook_secret, raw_body);
        if signature_header.trim() != computed {
            tracing::warn!("GoCardless webhook signature mismatch");
            return Err(BillingError::InvalidSignature);
        }
        self.parse(raw_body)
    }
}

fn rfc3339_opt(s: Option<&str>) -> Option<OffsetDateTime> {
    s.and_then(|v| {
        OffsetDateTime::parse(v, &time::format_description::well_known::Rfc3339).ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "gc_endpoint_secret";

    fn body(org_id: Uuid, action: &str) -> String {
        serde_json::json!({
            "id": "EV0001",
            "resource_type": "subscriptions",
            "action": action,
            "created_at": "2023-11-14T22:13:20Z",
            "links": { "subscription": "SB0001" },
            "details": { "status": "active", "plan_code": "starter" },
            "metadata": { "org_id": org_id.to_string() }
        })
        .to_string()
    }

    #[test]
    fn verifies_and_parses_subscription_created() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = body(org_id, "created");
        let adapter = GocardlessAdapter::new(SECRET);

        let event = adapter
            .verify_and_parse(&payload, &hmac_sha256_hex(SECRET, &payload), now)
            .unwrap();

        assert_eq!(event.kind, EventKind::SubscriptionCreated);
        assert_eq!(event.provider, BillingProvider::Gocardless);
        assert_eq!(event.org_id, Some(org_id));
        assert_eq!(event.subscription_id.as_deref(), Some("SB0001"));
        assert_eq!(event.plan_code, Some(PlanCode::Starter));
    }

    #[test]
    fn wrong_signature_is_rejected() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = body(org_id, "created");
        let adapter = GocardlessAdapter::new(SECRET);

        let result = adapter.verify_and_parse(&payload, &hmac_sha256_hex("wrong", &payload), now);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn cancellation_carries_forced_canceled_status() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = body(org_id, "cancelled");
        let adapter = GocardlessAdapter::new(SECRET);

        let event = adapter
            .verify_and_parse(&payload, &hmac_sha256_hex(SECRET, &payload), now)
            .unwrap();
        assert_eq!(event.kind, EventKind::SubscriptionCanceled);
        assert_eq!(event.status, Some(SubscriptionStatus::Canceled));
    }

    #[test]
    fn unhandled_resource_maps_to_unknown() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = serde_json::json!({
            "id": "EV0002",
            "resource_type": "mandates",
            "action": "expired",
            "created_at": "2023-11-14T22:13:20Z"
        })
        .to_string();
        let adapter = GocardlessAdapter::new(SECRET);

        let event = adapter
            .verify_and_parse(&payload, &hmac_sha256_hex(SECRET, &payload), now)
            .unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.subscription_id, None);
    }
}
