//! Error types for jiralink
//!
//! One enum covers every failure mode. The first six variants are the domain
//! taxonomy; the rest wrap the libraries underneath.

use thiserror::Error;

/// Result type alias for jiralink operations
pub type Result<T> = std::result::Result<T, JiraLinkError>;

/// Comprehensive error type for jiralink operations
#[derive(Error, Debug)]
pub enum JiraLinkError {
    /// Expired or revoked credential; the user must reconnect
    #[error("Authentication error: {0}")]
    Auth(String),

    /// No connection for the user (or it was removed mid-call)
    #[error("Not found: connection {0}")]
    ConnectionNotFound(String),

    /// No project or mapping
    #[error("Not found: {0}")]
    NotFound(String),

    /// Non-2xx response from the tracker
    #[error("Jira API error: HTTP {status}: {body}")]
    RemoteApi { status: u16, body: String },

    /// Ledger uniqueness violation
    #[error("Duplicate mapping: task {task_id} or remote issue {remote_issue_id} is already linked")]
    DuplicateMapping {
        task_id: String,
        remote_issue_id: String,
    },

    /// The remote workflow offers no transition into the target category
    #[error("No transition for {issue_key} into status category '{target}'")]
    NoTransition { issue_key: String, target: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage errors that are not SQLite errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the task application
    #[error("Task store error: {0}")]
    Task(#[from] tasks::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),

    /// Anyhow errors (for more context)
    #[error("{0}")]
    Anyhow(#[from] anyhow::Error),
}

impl JiraLinkError {
    /// True when the user has to reconnect before anything else will work.
    ///
    /// A 401 from the tracker means the access token was refused even after the
    /// refresh guard vouched for it.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            JiraLinkError::Auth(_) | JiraLinkError::RemoteApi { status: 401, .. }
        )
    }

    /// True for failures that make every further call for this user pointless.
    ///
    /// Batch operations abort on these instead of logging and moving on.
    pub fn is_connection_level(&self) -> bool {
        self.is_auth_failure() || matches!(self, JiraLinkError::ConnectionNotFound(_))
    }

    pub(crate) fn connection_not_found(user_id: &str) -> Self {
        JiraLinkError::ConnectionNotFound(format!("for user {}", user_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_classification() {
        assert!(JiraLinkError::Auth("revoked".into()).is_auth_failure());
        assert!(JiraLinkError::RemoteApi {
            status: 401,
            body: String::new()
        }
        .is_auth_failure());
        assert!(!JiraLinkError::RemoteApi {
            status: 500,
            body: String::new()
        }
        .is_auth_failure());
    }

    #[test]
    fn test_connection_level_classification() {
        assert!(JiraLinkError::connection_not_found("u1").is_connection_level());
        assert!(!JiraLinkError::NotFound("mapping m1".into()).is_connection_level());
        assert!(!JiraLinkError::NotFound("connection-like project".into()).is_connection_level());
        assert!(JiraLinkError::ConnectionNotFound("c1".into()).is_connection_level());
        assert!(!JiraLinkError::NoTransition {
            issue_key: "P-1".into(),
            target: "done".into()
        }
        .is_connection_level());
    }

    #[test]
    fn test_remote_api_message() {
        let err = JiraLinkError::RemoteApi {
            status: 404,
            body: "{\"errorMessages\":[\"Issue does not exist\"]}".into(),
        };
        assert!(err.to_string().contains("HTTP 404"));
        assert!(err.to_string().contains("Issue does not exist"));
    }
}
