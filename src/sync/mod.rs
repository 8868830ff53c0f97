//! Import and status synchronization between Jira issues and local tasks
//!
//! Nothing here runs on a schedule; every batch is started by a caller.

mod import;
mod status;
mod translate;

pub use import::{ImportFailure, ImportReconciler, ImportResult};
pub use status::{PullReport, PushOutcome, StatusSyncEngine, StatusUpdate, SyncFailure};
pub use translate::{completion_for, local_priority, local_status, push_target};
