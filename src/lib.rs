//! jiralink - Per-user Jira Cloud connections for a task manager
//!
//! Each user links one Jira Cloud site over OAuth 2.0 (3LO). Issues assigned
//! to the user are imported as local tasks, and status changes flow both ways
//! through workflow transitions.
//!
//! # Architecture
//!
//! - **auth**: OAuth authorization flow and the single-flight token refresh guard
//! - **jira**: REST gateway (allow-listed actions) and issue normalization
//! - **storage**: SQLite connections, tracked projects, mapping ledger, sessions
//! - **sync**: Import reconciliation and push/pull status sync
//! - **server**: HTTP surface (OAuth callback, proxy, import and sync endpoints)
//! - **session**: Per-user service object tying the pieces together
//! - **metrics**: Prometheus counters for calls, refreshes and sync batches

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod storage;

// Components
pub mod auth;
pub mod jira;
pub mod server;
pub mod session;
pub mod sync;

#[cfg(test)]
mod testing;

// Re-exports
pub use error::{JiraLinkError, Result};
