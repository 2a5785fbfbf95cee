// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Treehouse Billing
//!
//! Reconciles payment-provider webhooks into internal subscription state.
//!
//! ## Design
//!
//! - **Provider adapters** verify each delivery's signature, then normalise
//!   the payload into one canonical event shape
//! - **Idempotency ledger** guarantees at most one application per provider
//!   event id, despite retries, out-of-order delivery, and races
//! - **Reconciler** applies the canonical event to `subscriptions`; partial
//!   events never erase known fields, cancellations are forced terminal,
//!   unknown event kinds are recorded but inert
//!
//! Billing entities are org-scoped, not tenant-row-scoped, so this crate
//! does not use the tenancy scope manager; it shares the same idempotency
//! discipline as the batch jobs.

pub mod config;
pub mod error;
pub mod event;
pub mod ledger;
pub mod providers;
pub mod reconciler;
pub mod subscription;

// Config
pub use config::BillingConfig;

// Error
pub use error::{BillingError, BillingResult};

// Events
pub use event::{CanonicalEvent, EventKind};

// Ledger
pub use ledger::EventLedger;

// Providers
pub use providers::{GocardlessAdapter, ProviderAdapter, StripeAdapter};

// Reconciler
pub use reconciler::{DeliveryOutcome, Reconciler};

// Subscriptions
pub use subscription::{merge_subscription, SubscriptionState, SubscriptionStatus};
