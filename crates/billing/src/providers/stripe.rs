//! Stripe webhook adapter
//!
//! Signature scheme: the `Stripe-Signature` header carries
//! `t=<unix>,v1=<hex hmac>` pairs; the signed payload is `"{t}.{body}"`.
//! Deliveries older than the tolerance window are rejected even when
//! correctly signed.

use std::collections::HashMap;

use serde::Deserialize;
use time::OffsetDateTime;
use treehouse_shared::{BillingProvider, PlanCode};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::event::{CanonicalEvent, EventKind};
use crate::providers::{hmac_sha256_hex, ProviderAdapter};
use crate::subscription::SubscriptionStatus;

/// Maximum accepted skew between the signature timestamp and `now`.
const TOLERANCE_SECONDS: i64 = 300;

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    cancel_at_period_end: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct InvoiceObject {
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    period_start: Option<i64>,
    #[serde(default)]
    period_end: Option<i64>,
}

pub struct StripeAdapter {
    webhook_secret: String,
}

impl StripeAdapter {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Parse the `t=...,v1=...` header and check the HMAC plus the replay
    /// window. Every failure collapses to `InvalidSignature`; callers get no
    /// oracle about which part failed.
    fn verify(&self, payload: &str, signature: &str, now: OffsetDateTime) -> BillingResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<String> = None;

        for part in signature.split(',') {
            let kv: Vec<&str> = part.splitn(2, '=').collect();
            if kv.len() == 2 {
                match kv[0].trim() {
                    "t" => timestamp = kv[1].parse().ok(),
                    "v1" => v1_signature = Some(kv[1].to_string()),
                    _ => {}
                }
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::warn!("Missing timestamp in Stripe signature header");
            BillingError::InvalidSignature
        })?;

        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::warn!("Missing v1 signature in Stripe signature header");
            BillingError::InvalidSignature
        })?;

        if (now.unix_timestamp() - timestamp).abs() > TOLERANCE_SECONDS {
            tracing::warn!(
                timestamp = timestamp,
                now = now.unix_timestamp(),
                "Stripe webhook timestamp outside tolerance window"
            );
            return Err(BillingError::InvalidSignature);
        }

        // The secret's "whsec_" prefix is not part of the key material.
        let secret_key = self
            .webhook_secret
            .strip_prefix("whsec_")
            .unwrap_or(&self.webhook_secret);
        let signed_payload = format!("{}.{}", timestamp, payload);
        let computed = hmac_sha256_hex(secret_key, &signed_payload);

        if computed != v1_signature {
            tracing::warn!("Stripe webhook signature mismatch");
            return Err(BillingError::InvalidSignature);
        }

        Ok(())
    }

    fn parse(&self, payload: &str) -> BillingResult<CanonicalEvent> {
        let envelope: Envelope = serde_json::from_str(payload)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

        let occurred_at = OffsetDateTime::from_unix_timestamp(envelope.created)
            .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

        match envelope.event_type.as_str() {
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.deleted" => {
                let kind = match envelope.event_type.as_str() {
                    "customer.subscription.created" => EventKind::SubscriptionCreated,
                    "customer.subscription.updated" => EventKind::SubscriptionUpdated,
                    _ => EventKind::SubscriptionCanceled,
                };
                let object: SubscriptionObject =
                    serde_json::from_value(envelope.data.object)
                        .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

                let subscription_id = object.id.clone().ok_or_else(|| {
                    BillingError::MalformedPayload("subscription object without id".to_string())
                })?;
                let org_id = org_id_from_metadata(&object.metadata)?;

                Ok(CanonicalEvent {
                    provider: BillingProvider::Stripe,
                    event_id: envelope.id,
                    kind,
                    org_id: Some(org_id),
                    subscription_id: Some(subscription_id),
                    plan_code: object
                        .metadata
                        .get("plan_code")
                        .and_then(|s| PlanCode::from_str(s)),
                    status: object
                        .status
                        .as_deref()
                        .and_then(SubscriptionStatus::from_provider_str),
                    period_start: unix_opt(object.current_period_start),
                    period_end: unix_opt(object.current_period_end),
                    cancel_at_period_end: object.cancel_at_period_end,
                    pending_order_id: object.metadata.get("pending_order_id").cloned(),
                    occurred_at,
                })
            }
            "invoice.paid" | "invoice.payment_failed" => {
                let kind = if envelope.event_type == "invoice.paid" {
                    EventKind::InvoicePaid
                } else {
                    EventKind::InvoicePaymentFailed
                };
                let object: InvoiceObject = serde_json::from_value(envelope.data.object)
                    .map_err(|e| BillingError::MalformedPayload(e.to_string()))?;

                match object.subscription {
                    Some(subscription_id) => {
                        let org_id = org_id_from_metadata(&object.metadata)?;
                        Ok(CanonicalEvent {
                            provider: BillingProvider::Stripe,
                            event_id: envelope.id,
                            kind,
                            org_id: Some(org_id),
                            subscription_id: Some(subscription_id),
                            plan_code: None,
                            // Stripe signals past_due via a follow-up
                            // subscription.updated event, not on the invoice.
                            status: None,
                            period_start: unix_opt(object.period_start),
                            period_end: unix_opt(object.period_end),
                            cancel_at_period_end: None,
                            pending_order_id: None,
                            occurred_at,
                        })
                    }
                    // One-off invoices have no subscription to reconcile;
                    // record and move on.
                    None => Ok(unknown_event(envelope.id, occurred_at)),
                }
            }
            other => {
                tracing::info!(
                    event_type = %other,
                    event_id = %envelope.id,
                    "Received unhandled Stripe event type - recording without state change"
                );
                Ok(unknown_event(envelope.id, occurred_at))
            }
        }
    }
}

impl ProviderAdapter for StripeAdapter {
    fn provider(&self) -> BillingProvider {
        BillingProvider::Stripe
    }

    fn verify_and_parse(
        &self,
        raw_body: &str,
        signature_header: &str,
        now: OffsetDateTime,
    ) -> BillingResult<CanonicalEvent> {
        self.verify(raw_body, signature_header, now)?;
        self.parse(raw_body)
    }
}

fn unknown_event(event_id: String, occurred_at: OffsetDateTime) -> CanonicalEvent {
    CanonicalEvent {
        provider: BillingProvider::Stripe,
        event_id,
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
    }
}

fn org_id_from_metadata(metadata: &HashMap<String, String>) -> BillingResult<Uuid> {
    metadata
        .get("org_id")
        .and_then(|id| Uuid::parse_str(id).ok())
        .ok_or_else(|| BillingError::MalformedPayload("org_id not found in metadata".to_string()))
}

fn unix_opt(ts: Option<i64>) -> Option<OffsetDateTime> {
    ts.and_then(|t| OffsetDateTime::from_unix_timestamp(t).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(body: &str, at: OffsetDateTime) -> String {
        let t = at.unix_timestamp();
        let payload = format!("{}.{}", t, body);
        let sig = hmac_sha256_hex("test_secret", &payload);
        format!("t={},v1={}", t, sig)
    }

    fn subscription_body(org_id: Uuid) -> String {
        serde_json::json!({
            "id": "evt_123",
            "type": "customer.subscription.updated",
            "created": 1_700_000_000,
            "data": {
                "object": {
                    "id": "sub_123",
                    "status": "active",
                    "cancel_at_period_end": false,
                    "current_period_start": 1_699_000_000,
                    "current_period_end": 1_701_592_000,
                    "metadata": { "org_id": org_id.to_string(), "plan_code": "standard" }
                }
            }
        })
        .to_string()
    }

    #[test]
    fn verifies_and_parses_subscription_update() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = subscription_body(org_id);
        let adapter = StripeAdapter::new(SECRET);

        let event = adapter.verify_and_parse(&body, &sign(&body, now), now).unwrap();

        assert_eq!(event.kind, EventKind::SubscriptionUpdated);
        assert_eq!(event.event_id, "evt_123");
        assert_eq!(event.org_id, Some(org_id));
        assert_eq!(event.subscription_id.as_deref(), Some("sub_123"));
        assert_eq!(event.status, Some(SubscriptionStatus::Active));
        assert_eq!(event.plan_code, Some(PlanCode::Standard));
        assert_eq!(event.cancel_at_period_end, Some(false));
    }

    #[test]
    fn tampered_body_is_rejected_before_parsing() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = subscription_body(org_id);
        let signature = sign(&body, now);
        let adapter = StripeAdapter::new(SECRET);

        let tampered = body.replace("sub_123", "sub_999");
        let result = adapter.verify_and_parse(&tampered, &signature, now);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn stale_signature_is_rejected() {
        let org_id = Uuid::new_v4();
        let signed_at = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = subscription_body(org_id);
        let signature = sign(&body, signed_at);
        let adapter = StripeAdapter::new(SECRET);

        // Ten minutes later: correctly signed, but outside the window.
        let now = signed_at + time::Duration::minutes(10);
        let result = adapter.verify_and_parse(&body, &signature, now);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn missing_signature_header_is_rejected() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = subscription_body(org_id);
        let adapter = StripeAdapter::new(SECRET);

        let result = adapter.verify_and_parse(&body, "", now);
        assert!(matches!(result, Err(BillingError::InvalidSignature)));
    }

    #[test]
    fn unhandled_event_type_maps_to_unknown() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = serde_json::json!({
            "id": "evt_odd",
            "type": "customer.tax_id.created",
            "created": 1_700_000_000,
            "data": { "object": {} }
        })
        .to_string();
        let adapter = StripeAdapter::new(SECRET);

        let event = adapter.verify_and_parse(&body, &sign(&body, now), now).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.org_id, None);
    }

    #[test]
    fn unknown_provider_status_is_dropped_not_fatal() {
        let org_id = Uuid::new_v4();
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = subscription_body(org_id).replace("\"active\"", "\"paused\"");
        let adapter = StripeAdapter::new(SECRET);

        let event = adapter.verify_and_parse(&body, &sign(&body, now), now).unwrap();
        assert_eq!(event.status, None);
    }

    #[test]
    fn one_off_invoice_without_subscription_is_unknown() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let body = serde_json::json!({
            "id": "evt_inv",
            "type": "invoice.paid",
            "created": 1_700_000_000,
            "data": { "object": { "metadata": {} } }
        })
        .to_string();
        let adapter = StripeAdapter::new(SECRET);

        let event = adapter.verify_and_parse(&body, &sign(&body, now), now).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
    }
}
