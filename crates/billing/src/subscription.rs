//! Subscription state
//!
//! One row per provider subscription, org-scoped (not tenant-row-scoped).
//! All mutation flows through the reconciler; the merge logic here is pure so
//! the transition rules are testable without a database.

use time::OffsetDateTime;
use treehouse_shared::{BillingProvider, PlanCode};
use uuid::Uuid;

use crate::event::{CanonicalEvent, EventKind};

/// Subscription lifecycle status.
///
/// `Incomplete -> Trialing -> Active <-> PastDue -> Canceled`, with
/// `Active`/`PastDue` also allowed to jump straight to `Canceled`.
/// `Canceled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Incomplete,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Parse a provider status string. Unknown/unmapped values return `None`,
    /// which downstream treats as "no status change" rather than corrupting
    /// state.
    pub fn from_provider_str(s: &str) -> Option<Self> {
        match s {
            "incomplete" | "incomplete_expired" | "pending_customer_approval" => {
                Some(SubscriptionStatus::Incomplete)
            }
            "trialing" => Some(SubscriptionStatus::Trialing),
            "active" => Some(SubscriptionStatus::Active),
            "past_due" | "unpaid" => Some(SubscriptionStatus::PastDue),
            "canceled" | "cancelled" | "finished" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition(self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        if self == next {
            return true;
        }
        match self {
            Incomplete => matches!(next, Trialing | Active | Canceled),
            Trialing => matches!(next, Active | PastDue | Canceled),
            Active => matches!(next, PastDue | Canceled),
            PastDue => matches!(next, Active | Canceled),
            // Terminal.
            Canceled => false,
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stored subscription row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionState {
    pub org_id: Uuid,
    pub provider: BillingProvider,
    pub provider_subscription_id: String,
    pub plan_code: Option<PlanCode>,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<OffsetDateTime>,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub pending_order_id: Option<String>,
    /// Last provider event id applied to this row.
    pub last_event_id: Option<String>,
}

/// Merge a canonical event into the current state (or build a fresh row when
/// none exists yet).
///
/// Rules:
/// - fields absent from the event keep their stored values; partial events
///   never erase known state
/// - a `SubscriptionCanceled` event forces `Canceled` regardless of the
///   payload's own status field
/// - an explicit status only applies when the state machine permits the
///   transition; invalid moves are kept out and logged
/// - invoice events touch status only when the event carries one explicitly
pub fn merge_subscription(
    current: Option<&SubscriptionState>,
    event: &CanonicalEvent,
    org_id: Uuid,
    subscription_id: &str,
) -> SubscriptionState {
    let base = current.cloned().unwrap_or(SubscriptionState {
        org_id,
        provider: event.provider,
        provider_subscription_id: subscription_id.to_string(),
        plan_code: None,
        status: SubscriptionStatus::Incomplete,
        current_period_start: None,
        current_period_end: None,
        cancel_at_period_end: false,
        pending_order_id: None,
        last_event_id: None,
    });

    let status = if event.kind == EventKind::SubscriptionCanceled {
        SubscriptionStatus::Canceled
    } else {
        match event.status {
            Some(next) if base.status.can_transition(next) => next,
            Some(next) => {
                tracing::warn!(
                    provider = %event.provider,
                    subscription_id = %subscription_id,
                    from = %base.status,
                    to = %next,
                    "Ignoring status change the state machine does not permit"
                );
                base.status
            }
            None => base.status,
        }
    };

    SubscriptionState {
        org_id: base.org_id,
        provider: base.provider,
        provider_subscription_id: base.provider_subscription_id,
        plan_code: event.plan_code.or(base.plan_code),
        status,
        current_period_start: event.period_start.or(base.current_period_start),
        current_period_end: event.period_end.or(base.current_period_end),
        cancel_at_period_end: event.cancel_at_period_end.unwrap_or(base.cancel_at_period_end),
        pending_order_id: event.pending_order_id.clone().or(base.pending_order_id),
        last_event_id: Some(event.event_id.clone()),
    }
}
