//! Normalization of tracker issues into flat records

use super::types::{AdfNode, Description, JiraIssue, StatusCategory};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Normalized remote issue; transient, never persisted as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteIssue {
    pub id: String,
    pub key: String,
    pub summary: String,
    pub description: String,
    pub status_name: String,
    /// `None` when the tracker sent no category or one outside the closed set
    pub status_category: Option<StatusCategory>,
    pub priority: String,
    pub parent_remote_id: Option<String>,
    pub issue_type: String,
}

pub const DEFAULT_PRIORITY: &str = "Medium";
pub const DEFAULT_ISSUE_TYPE: &str = "Task";

/// Flatten a tracker issue. Never fails on missing optional fields.
pub fn normalize(issue: &JiraIssue) -> RemoteIssue {
    let fields = &issue.fields;

    let status_name = fields
        .status
        .as_ref()
        .and_then(|s| s.name.clone())
        .unwrap_or_default();

    let status_category = fields
        .status
        .as_ref()
        .and_then(|s| s.status_category.as_ref())
        .and_then(|c| c.key.as_deref())
        .and_then(StatusCategory::from_key);

    let priority = fields
        .priority
        .as_ref()
        .and_then(|p| p.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_PRIORITY.to_string());

    let issue_type = fields
        .issue_type
        .as_ref()
        .and_then(|t| t.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_ISSUE_TYPE.to_string());

    RemoteIssue {
        id: issue.id.clone(),
        key: issue.key.clone(),
        summary: fields.summary.clone().unwrap_or_default(),
        description: fields
            .description
            .as_ref()
            .map(description_text)
            .unwrap_or_default(),
        status_name,
        status_category,
        priority,
        parent_remote_id: fields.parent.as_ref().map(|p| p.id.clone()),
        issue_type,
    }
}

/// Normalize an issue straight from a JSON payload
pub fn normalize_value(value: serde_json::Value) -> Result<RemoteIssue> {
    let issue: JiraIssue = serde_json::from_value(value)?;
    Ok(normalize(&issue))
}

/// Plain text of a description
pub fn description_text(description: &Description) -> String {
    match description {
        Description::Text(text) => text.clone(),
        Description::Document(doc) => flatten(doc),
    }
}

/// Concatenate the text leaves of a document tree.
///
/// Inline siblings (text, hard breaks, mentions) run together; block siblings
/// (paragraphs, headings, list items) are joined with newlines.
pub fn flatten(node: &AdfNode) -> String {
    if let Some(ref text) = node.text {
        return text.clone();
    }
    if node.node_type == "hardBreak" {
        return "\n".to_string();
    }
    if node.content.is_empty() {
        return String::new();
    }

    let separator = if node.content.iter().all(is_inline) {
        ""
    } else {
        "\n"
    };

    node.content
        .iter()
        .map(flatten)
        .collect::<Vec<_>>()
        .join(separator)
}

fn is_inline(node: &AdfNode) -> bool {
    node.content.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(fields: serde_json::Value) -> JiraIssue {
        serde_json::from_value(json!({ "id": "10001", "key": "PROJ-1", "fields": fields }))
            .unwrap()
    }

    #[test]
    fn test_full_issue() {
        let issue = raw(json!({
            "summary": "Fix login",
            "description": {
                "type": "doc",
                "version": 1,
                "content": [
                    { "type": "paragraph", "content": [
                        { "type": "text", "text": "First " },
                        { "type": "text", "text": "line", "marks": [{ "type": "strong" }] }
                    ]},
                    { "type": "paragraph", "content": [
                        { "type": "text", "text": "Second line" }
                    ]}
                ]
            },
            "status": { "name": "In Progress", "statusCategory": { "key": "indeterminate" } },
            "priority": { "name": "High" },
            "parent": { "id": "10000", "key": "PROJ-0" },
            "issuetype": { "name": "Story" }
        }));

        let normalized = normalize(&issue);
        assert_eq!(normalized.summary, "Fix login");
        assert_eq!(normalized.description, "First line\nSecond line");
        assert_eq!(normalized.status_name, "In Progress");
        assert_eq!(normalized.status_category, Some(StatusCategory::Indeterminate));
        assert_eq!(normalized.priority, "High");
        assert_eq!(normalized.parent_remote_id.as_deref(), Some("10000"));
        assert_eq!(normalized.issue_type, "Story");
    }

    #[test]
    fn test_missing_fields_default() {
        let normalized = normalize(&raw(json!({ "summary": "Bare" })));
        assert_eq!(normalized.description, "");
        assert_eq!(normalized.status_category, None);
        assert_eq!(normalized.status_name, "");
        assert_eq!(normalized.priority, DEFAULT_PRIORITY);
        assert_eq!(normalized.issue_type, DEFAULT_ISSUE_TYPE);
        assert!(normalized.parent_remote_id.is_none());
    }

    #[test]
    fn test_null_description_and_empty_doc() {
        let normalized = normalize(&raw(json!({ "description": null })));
        assert_eq!(normalized.description, "");

        let normalized = normalize(&raw(json!({
            "description": { "type": "doc", "version": 1, "content": [] }
        })));
        assert_eq!(normalized.description, "");
    }

    #[test]
    fn test_nested_lists_and_hard_breaks() {
        let doc: AdfNode = serde_json::from_value(json!({
            "type": "doc",
            "content": [
                { "type": "bulletList", "content": [
                    { "type": "listItem", "content": [
                        { "type": "paragraph", "content": [{ "type": "text", "text": "one" }] }
                    ]},
                    { "type": "listItem", "content": [
                        { "type": "paragraph", "content": [{ "type": "text", "text": "two" }] }
                    ]}
                ]},
                { "type": "paragraph", "content": [
                    { "type": "text", "text": "a" },
                    { "type": "hardBreak" },
                    { "type": "text", "text": "b" }
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(flatten(&doc), "one\ntwo\na\nb");
    }

    #[test]
    fn test_plain_text_description() {
        let normalized = normalize(&raw(json!({ "description": "legacy text" })));
        assert_eq!(normalized.description, "legacy text");
    }

    #[test]
    fn test_unknown_status_category() {
        let normalized = normalize(&raw(json!({
            "status": { "name": "Odd", "statusCategory": { "key": "undefined" } }
        })));
        assert_eq!(normalized.status_category, None);
        assert_eq!(normalized.status_name, "Odd");
    }

    #[test]
    fn test_normalize_value_requires_id_and_key() {
        assert!(normalize_value(json!({ "fields": {} })).is_err());
        assert!(normalize_value(json!({ "id": "1", "key": "P-1" })).is_ok());
    }
}
