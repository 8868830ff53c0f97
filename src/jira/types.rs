//! Wire types for the Jira Cloud REST API (v3) and the Atlassian OAuth endpoints
//!
//! Every field the tracker may omit is an `Option` or carries a serde default,
//! so deserialization never fails on sparse payloads.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The tracker's coarse workflow bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusCategory {
    New,
    Indeterminate,
    Done,
}

impl StatusCategory {
    /// Parse a status category key; anything outside the closed set is `None`
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "new" => Some(Self::New),
            "indeterminate" => Some(Self::Indeterminate),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Indeterminate => "indeterminate",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Issue as returned by `/issue/{key}` and `/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: JiraFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<Description>,
    #[serde(default)]
    pub status: Option<JiraStatus>,
    #[serde(default)]
    pub priority: Option<JiraNamed>,
    #[serde(default)]
    pub parent: Option<JiraParent>,
    #[serde(rename = "issuetype", default)]
    pub issue_type: Option<JiraNamed>,
}

/// Issue description: a rich document on v3, plain text on older payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Description {
    Text(String),
    Document(AdfNode),
}

/// A node of an Atlassian Document Format tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdfNode {
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<AdfNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatus {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "statusCategory", default)]
    pub status_category: Option<JiraStatusCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraStatusCategory {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Priority or issue type: only the name matters downstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraNamed {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraParent {
    pub id: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraSearchResponse {
    #[serde(default)]
    pub total: u32,
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "maxResults", default)]
    pub max_results: u32,
    #[serde(default)]
    pub issues: Vec<JiraIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraTransition {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub to: JiraStatus,
}

impl JiraTransition {
    /// Status category the transition lands in
    pub fn target_category(&self) -> Option<StatusCategory> {
        self.to
            .status_category
            .as_ref()
            .and_then(|c| c.key.as_deref())
            .and_then(StatusCategory::from_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraTransitionsResponse {
    #[serde(default)]
    pub transitions: Vec<JiraTransition>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JiraTransitionRequest {
    pub transition: JiraTransitionId,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct JiraTransitionId {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraProject {
    pub id: String,
    pub key: String,
    pub name: String,
}

/// Page of `/project/search`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraProjectPage {
    #[serde(default)]
    pub total: u32,
    #[serde(rename = "startAt", default)]
    pub start_at: u32,
    #[serde(rename = "isLast", default)]
    pub is_last: bool,
    #[serde(default)]
    pub values: Vec<JiraProject>,
}

/// Site the token can reach (`/oauth/token/accessible-resources`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibleResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_category_keys() {
        assert_eq!(StatusCategory::from_key("done"), Some(StatusCategory::Done));
        assert_eq!(StatusCategory::from_key("undefined"), None);
        assert_eq!(StatusCategory::Indeterminate.to_string(), "indeterminate");
        assert_eq!(
            serde_json::to_string(&StatusCategory::New).unwrap(),
            "\"new\""
        );
    }

    #[test]
    fn test_sparse_issue_deserializes() {
        let issue: JiraIssue =
            serde_json::from_value(serde_json::json!({ "id": "10001", "key": "P-1" })).unwrap();
        assert!(issue.fields.summary.is_none());
        assert!(issue.fields.status.is_none());
    }

    #[test]
    fn test_transition_target_category() {
        let transition: JiraTransition = serde_json::from_value(serde_json::json!({
            "id": "31",
            "name": "Done",
            "to": { "name": "Done", "statusCategory": { "key": "done", "name": "Done" } }
        }))
        .unwrap();
        assert_eq!(transition.target_category(), Some(StatusCategory::Done));
    }
}
