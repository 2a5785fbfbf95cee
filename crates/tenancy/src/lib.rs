//! Treehouse Tenancy
//!
//! Tenant-scoped execution contexts backed by Postgres row-level security.
//!
//! Every storage operation against tenant data must run inside a
//! [`TenantScope`] obtained from [`ScopeManager::run_scoped`]. The scope wraps
//! a single transaction whose session markers (`app.current_tenant_id`,
//! `app.current_org_id`) drive the RLS policies declared in the schema
//! migrations. Business logic never sees a raw pool connection, so a missed
//! `WHERE tenant_id = ...` clause cannot leak another site's rows.

pub mod error;
pub mod scope;

pub use error::TenancyError;
pub use scope::{ScopeManager, TenantScope};
