// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Treehouse Jobs
//!
//! Tenant-scoped batch work:
//!
//! - **Activity recording**: the producer entry point that writes immutable
//!   staff/volunteer activity rows inside the caller's scope
//! - **AV30 aggregation**: rolling 30-day distinct-active-user counts per
//!   org, persisted idempotently as current snapshots
//! - **Retention sweeping**: per-tenant deletion of expired rows under
//!   per-org policies
//!
//! Both jobs are invoked as discrete cron-style runs from the worker binary;
//! re-running with the same `now` is safe.

pub mod activity;
pub mod av30;
pub mod error;
pub mod retention;

pub use activity::record_activity;
pub use av30::{OrgUsage, TenantContext, UsageAggregator};
pub use error::{JobError, JobResult};
pub use retention::{
    ExpiryStrategy, HardDelete, RetentionConfig, RetentionPolicy, RetentionSweeper, SweepOutcome,
    SweepReport,
};
