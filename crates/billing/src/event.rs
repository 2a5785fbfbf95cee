//! Canonical webhook events
//!
//! Provider adapters normalise their wire payloads into this one shape, so
//! the reconciler applies state transitions without knowing which processor
//! delivered the event.

use time::OffsetDateTime;
use treehouse_shared::{BillingProvider, PlanCode};
use uuid::Uuid;

use crate::subscription::SubscriptionStatus;

/// What a provider event means, as a closed set. A new provider event type
/// the system does not understand maps to `Unknown`, which is recorded but
/// never mutates state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    SubscriptionCreated,
    SubscriptionUpdated,
    SubscriptionCanceled,
    InvoicePaid,
    InvoicePaymentFailed,
    Unknown,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SubscriptionCreated => "subscription_created",
            EventKind::SubscriptionUpdated => "subscription_updated",
            EventKind::SubscriptionCanceled => "subscription_canceled",
            EventKind::InvoicePaid => "invoice_paid",
            EventKind::InvoicePaymentFailed => "invoice_payment_failed",
            EventKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider-agnostic representation of one webhook delivery.
///
/// Optional fields are genuinely optional on the wire: a partial update event
/// carries only what changed, and the reconciler must never null out known
/// state because a field is absent here.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    pub provider: BillingProvider,
    /// Provider-assigned event id; the idempotency key.
    pub event_id: String,
    pub kind: EventKind,
    /// Owning org. Adapters guarantee `Some` for every kind except
    /// `Unknown`; a known-kind payload without it is rejected as malformed.
    pub org_id: Option<Uuid>,
    /// Provider-side subscription id. Same presence guarantee as `org_id`.
    pub subscription_id: Option<String>,
    pub plan_code: Option<PlanCode>,
    pub status: Option<SubscriptionStatus>,
    pub period_start: Option<OffsetDateTime>,
    pub period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: Option<bool>,
    /// Links a checkout flow to the subscription it produced.
    pub pending_order_id: Option<String>,
    /// Provider's own timestamp for the event, for temporal ordering in the
    /// ledger.
    pub occurred_at: OffsetDateTime,
}
