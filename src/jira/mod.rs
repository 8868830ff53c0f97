//! Jira Cloud: wire types, issue normalization and the authenticated gateway

mod gateway;
mod mapper;
mod types;

pub use gateway::{assigned_open_issues_jql, success_sentinel, JiraAction, JiraGateway, ISSUE_FIELDS};
pub use mapper::{
    description_text, flatten, normalize, normalize_value, RemoteIssue, DEFAULT_ISSUE_TYPE,
    DEFAULT_PRIORITY,
};
pub use types::{
    AccessibleResource, AdfNode, Description, JiraFields, JiraIssue, JiraNamed, JiraParent,
    JiraProject, JiraProjectPage, JiraSearchResponse, JiraStatus, JiraStatusCategory,
    JiraTransition, JiraTransitionsResponse, StatusCategory,
};
