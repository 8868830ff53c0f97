//! Durable storage
//!
//! A single SQLite database holds connections, tracked projects, the task
//! mapping ledger, API sessions and pending OAuth states.

mod connections;
mod database;
mod ledger;
mod projects;
mod sessions;

pub use connections::{Connection, ConnectionStore, NewConnection};
pub use database::Database;
pub use ledger::{Mapping, TaskMappingLedger};
pub use projects::{Project, ProjectStore};
pub use sessions::{OAuthStateStore, SessionStore};

#[cfg(test)]
pub(crate) use connections::tests::new_connection;
