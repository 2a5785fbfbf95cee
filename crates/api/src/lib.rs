// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Treehouse API
//!
//! The inbound HTTP surface of the core: the billing webhook endpoint plus a
//! health probe. Everything else the product serves over HTTP (pages, forms,
//! DTOs) lives outside this workspace and calls into the core crates.

pub mod config;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use state::AppState;
