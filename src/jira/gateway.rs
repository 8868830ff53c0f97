//! Authenticated access to the Jira Cloud REST API
//!
//! Every call resolves the user's connection, asks the refresh guard for a
//! usable access token and then talks to
//! `{api_base}/ex/jira/{cloud_id}/rest/api/3`.

use super::types::{
    AccessibleResource, JiraIssue, JiraProjectPage, JiraSearchResponse, JiraTransition,
    JiraTransitionId, JiraTransitionRequest, JiraTransitionsResponse,
};
use crate::auth::TokenRefreshGuard;
use crate::config::ApiConfig;
use crate::metrics;
use crate::storage::{Connection, ConnectionStore};
use crate::{JiraLinkError, Result};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for search/list operations
const SEARCH_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-request timeout for single issue fetches
const GET_TIMEOUT: Duration = Duration::from_secs(10);
/// Per-request timeout for transitions
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Fields requested for every issue; nothing else is used downstream
pub const ISSUE_FIELDS: &str = "summary,description,status,priority,parent,issuetype";

/// The closed set of operations exposed to callers
///
/// Serialized as `{"action": "get-issues", "projectKey": "WEB", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum JiraAction {
    GetSites,
    GetProjects {
        #[serde(rename = "startAt", default, skip_serializing_if = "Option::is_none")]
        start_at: Option<u32>,
        #[serde(rename = "maxResults", default, skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
    },
    GetIssues {
        #[serde(rename = "projectKey")]
        project_key: String,
        #[serde(rename = "startAt", default, skip_serializing_if = "Option::is_none")]
        start_at: Option<u32>,
        #[serde(rename = "maxResults", default, skip_serializing_if = "Option::is_none")]
        max_results: Option<u32>,
    },
    GetIssue {
        #[serde(rename = "issueKey")]
        issue_key: String,
    },
    GetTransitions {
        #[serde(rename = "issueKey")]
        issue_key: String,
    },
    TransitionIssue {
        #[serde(rename = "issueKey")]
        issue_key: String,
        #[serde(rename = "transitionId")]
        transition_id: String,
    },
}

impl JiraAction {
    pub fn name(&self) -> &'static str {
        match self {
            JiraAction::GetSites => "get-sites",
            JiraAction::GetProjects { .. } => "get-projects",
            JiraAction::GetIssues { .. } => "get-issues",
            JiraAction::GetIssue { .. } => "get-issue",
            JiraAction::GetTransitions { .. } => "get-transitions",
            JiraAction::TransitionIssue { .. } => "transition-issue",
        }
    }
}

/// Body returned for calls that answer `204 No Content`
pub fn success_sentinel() -> Value {
    json!({ "success": true })
}

/// Search query for a project's open issues assigned to the caller
pub fn assigned_open_issues_jql(project_key: &str) -> Result<String> {
    let safe_key = sanitize_project_key(project_key);
    if safe_key.is_empty() {
        return Err(JiraLinkError::Other(format!(
            "Invalid project key '{}'",
            project_key
        )));
    }
    Ok(format!(
        "project = \"{}\" AND assignee = currentUser() AND statusCategory != Done ORDER BY updated DESC",
        safe_key
    ))
}

/// Project keys are uppercase alphanumerics; strip anything else so a key can
/// never break out of the JQL string literal.
fn sanitize_project_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Jira client bound to one user's connection
#[derive(Clone)]
pub struct JiraGateway {
    http: Client,
    api_base: String,
    connections: ConnectionStore,
    guard: Arc<TokenRefreshGuard>,
    user_id: String,
    page_size: u32,
}

impl JiraGateway {
    pub fn new(
        http: Client,
        api: &ApiConfig,
        connections: ConnectionStore,
        guard: Arc<TokenRefreshGuard>,
        user_id: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            http,
            api_base: api.base_url.trim_end_matches('/').to_string(),
            connections,
            guard,
            user_id: user_id.into(),
            page_size,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Run one action and return the provider's JSON body
    ///
    /// A `204` becomes [`success_sentinel`]; any other non-2xx is `RemoteApi`.
    pub async fn call(&self, action: &JiraAction) -> Result<Value> {
        let connection = self.connections.require_for_user(&self.user_id)?;
        let token = self.guard.ensure_valid_token(&connection).await?;

        debug!(user_id = %self.user_id, action = action.name(), "Jira call");

        let request = match action {
            JiraAction::GetSites => self
                .http
                .get(format!("{}/oauth/token/accessible-resources", self.api_base))
                .timeout(GET_TIMEOUT),
            JiraAction::GetProjects {
                start_at,
                max_results,
            } => self
                .http
                .get(self.site_url(&connection, "/project/search"))
                .query(&[
                    ("startAt", start_at.unwrap_or(0).to_string()),
                    ("maxResults", max_results.unwrap_or(self.page_size).to_string()),
                    ("orderBy", "key".to_string()),
                ])
                .timeout(SEARCH_TIMEOUT),
            JiraAction::GetIssues {
                project_key,
                start_at,
                max_results,
            } => {
                let jql = assigned_open_issues_jql(project_key)?;
                self.http
                    .get(self.site_url(&connection, "/search"))
                    .query(&[
                        ("jql", jql),
                        ("fields", ISSUE_FIELDS.to_string()),
                        ("startAt", start_at.unwrap_or(0).to_string()),
                        ("maxResults", max_results.unwrap_or(self.page_size).to_string()),
                    ])
                    .timeout(SEARCH_TIMEOUT)
            }
            JiraAction::GetIssue { issue_key } => self
                .http
                .get(self.site_url(&connection, &format!("/issue/{}", encode(issue_key))))
                .query(&[("fields", ISSUE_FIELDS)])
                .timeout(GET_TIMEOUT),
            JiraAction::GetTransitions { issue_key } => self
                .http
                .get(self.site_url(
                    &connection,
                    &format!("/issue/{}/transitions", encode(issue_key)),
                ))
                .query(&[("expand", "transitions.fields")])
                .timeout(GET_TIMEOUT),
            JiraAction::TransitionIssue {
                issue_key,
                transition_id,
            } => {
                info!(issue_key = %issue_key, transition_id = %transition_id, "Transitioning Jira issue");
                self.http
                    .post(self.site_url(
                        &connection,
                        &format!("/issue/{}/transitions", encode(issue_key)),
                    ))
                    .json(&JiraTransitionRequest {
                        transition: JiraTransitionId {
                            id: transition_id.clone(),
                        },
                    })
                    .timeout(WRITE_TIMEOUT)
            }
        };

        let result = self.send(request.bearer_auth(token)).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(JiraLinkError::RemoteApi { .. }) => "remote_error",
            Err(_) => "error",
        };
        metrics::record_jira_call(action.name(), outcome);
        result
    }

    fn site_url(&self, connection: &Connection, path: &str) -> String {
        format!(
            "{}/ex/jira/{}/rest/api/3{}",
            self.api_base,
            encode(&connection.remote_site_id),
            path
        )
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request.header("Accept", "application/json").send().await?;

        match response.status() {
            StatusCode::NO_CONTENT => Ok(success_sentinel()),
            status if status.is_success() => {
                let body = response.text().await?;
                if body.trim().is_empty() {
                    Ok(success_sentinel())
                } else {
                    Ok(serde_json::from_str(&body)?)
                }
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                debug!(user_id = %self.user_id, status = %status, "Jira call failed");
                Err(JiraLinkError::RemoteApi {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Sites reachable with the stored token
    pub async fn sites(&self) -> Result<Vec<AccessibleResource>> {
        let value = self.call(&JiraAction::GetSites).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of the site's projects
    pub async fn projects(&self, start_at: u32) -> Result<JiraProjectPage> {
        let value = self
            .call(&JiraAction::GetProjects {
                start_at: Some(start_at),
                max_results: None,
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// One page of open issues assigned to the caller in `project_key`
    pub async fn assigned_issues(&self, project_key: &str, start_at: u32) -> Result<JiraSearchResponse> {
        let value = self
            .call(&JiraAction::GetIssues {
                project_key: project_key.to_string(),
                start_at: Some(start_at),
                max_results: None,
            })
            .await?;
        let page: JiraSearchResponse = serde_json::from_value(value)?;
        info!(
            project = %project_key,
            total = page.total,
            returned = page.issues.len(),
            "Jira search complete"
        );
        Ok(page)
    }

    pub async fn issue(&self, issue_key: &str) -> Result<JiraIssue> {
        let value = self
            .call(&JiraAction::GetIssue {
                issue_key: issue_key.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn transitions(&self, issue_key: &str) -> Result<Vec<JiraTransition>> {
        let value = self
            .call(&JiraAction::GetTransitions {
                issue_key: issue_key.to_string(),
            })
            .await?;
        let response: JiraTransitionsResponse = serde_json::from_value(value)?;
        Ok(response.transitions)
    }

    pub async fn transition(&self, issue_key: &str, transition_id: &str) -> Result<()> {
        self.call(&JiraAction::TransitionIssue {
            issue_key: issue_key.to_string(),
            transition_id: transition_id.to_string(),
        })
        .await?;
        Ok(())
    }
}

fn encode(segment: &str) -> std::borrow::Cow<'_, str> {
    urlencoding::encode(segment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::OAuthClient;
    use crate::config::OAuthConfig;
    use crate::storage::{new_connection, Database};
    use axum::{
        extract::{Path, Query},
        http::StatusCode as AxumStatus,
        response::IntoResponse,
        routing::get,
        Json, Router,
    };
    use std::collections::HashMap;

    async fn spawn_site() -> String {
        let app = Router::new()
            .route(
                "/ex/jira/{cloud}/rest/api/3/search",
                get(|Path(cloud): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "total": 1, "startAt": 0, "maxResults": 50,
                        "cloud": cloud,
                        "jql": q.get("jql"),
                        "fields": q.get("fields"),
                        "issues": [{"id": "10001", "key": "WEB-1", "fields": {"summary": "Fix login"}}]
                    }))
                }),
            )
            .route(
                "/ex/jira/{cloud}/rest/api/3/issue/{key}",
                get(|Path((_cloud, key)): Path<(String, String)>| async move {
                    if key == "WEB-404" {
                        (AxumStatus::NOT_FOUND, "Issue does not exist").into_response()
                    } else {
                        Json(json!({"id": "10001", "key": key, "fields": {}})).into_response()
                    }
                }),
            )
            .route(
                "/ex/jira/{cloud}/rest/api/3/issue/{key}/transitions",
                get(|| async {
                    Json(json!({"transitions": [
                        {"id": "31", "name": "Done", "to": {"name": "Done", "statusCategory": {"key": "done"}}}
                    ]}))
                })
                .post(|| async { AxumStatus::NO_CONTENT }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn gateway(db: &Database, base_url: &str, user_id: &str) -> JiraGateway {
        let api = ApiConfig {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        let connections = ConnectionStore::new(db.clone());
        let oauth = OAuthClient::new(reqwest::Client::new(), OAuthConfig::default(), &api)
            .with_client_secret("secret");
        let guard = Arc::new(TokenRefreshGuard::new(
            oauth,
            connections.clone(),
            chrono::Duration::minutes(5),
        ));
        JiraGateway::new(reqwest::Client::new(), &api, connections, guard, user_id, 50)
    }

    #[test]
    fn test_action_wire_format() {
        let action: JiraAction = serde_json::from_value(json!({
            "action": "transition-issue", "issueKey": "WEB-1", "transitionId": "31"
        }))
        .unwrap();
        assert_eq!(
            action,
            JiraAction::TransitionIssue {
                issue_key: "WEB-1".into(),
                transition_id: "31".into()
            }
        );

        let action: JiraAction = serde_json::from_value(json!({"action": "get-sites"})).unwrap();
        assert_eq!(action.name(), "get-sites");

        let action: JiraAction =
            serde_json::from_value(json!({"action": "get-issues", "projectKey": "WEB", "maxResults": 10}))
                .unwrap();
        assert_eq!(
            action,
            JiraAction::GetIssues {
                project_key: "WEB".into(),
                start_at: None,
                max_results: Some(10)
            }
        );

        assert!(serde_json::from_value::<JiraAction>(json!({"action": "delete-issue"})).is_err());
    }

    #[test]
    fn test_jql() {
        assert_eq!(
            assigned_open_issues_jql("WEB").unwrap(),
            "project = \"WEB\" AND assignee = currentUser() AND statusCategory != Done ORDER BY updated DESC"
        );
        assert_eq!(
            assigned_open_issues_jql("WEB\" OR 1=1").unwrap(),
            "project = \"WEBOR11\" AND assignee = currentUser() AND statusCategory != Done ORDER BY updated DESC"
        );
        assert!(assigned_open_issues_jql("\"\"").is_err());
    }

    #[tokio::test]
    async fn test_search_uses_site_and_fields() {
        let base = spawn_site().await;
        let db = Database::open_in_memory().unwrap();
        ConnectionStore::new(db.clone())
            .upsert(new_connection("u1", "cloud-a"))
            .unwrap();

        let value = gateway(&db, &base, "u1")
            .call(&JiraAction::GetIssues {
                project_key: "WEB".into(),
                start_at: None,
                max_results: None,
            })
            .await
            .unwrap();

        assert_eq!(value["cloud"], "cloud-a");
        assert_eq!(value["fields"], ISSUE_FIELDS);
        assert!(value["jql"].as_str().unwrap().contains("assignee = currentUser()"));
        assert_eq!(value["issues"][0]["key"], "WEB-1");
    }

    #[tokio::test]
    async fn test_no_content_is_success_sentinel() {
        let base = spawn_site().await;
        let db = Database::open_in_memory().unwrap();
        ConnectionStore::new(db.clone())
            .upsert(new_connection("u1", "cloud-a"))
            .unwrap();

        let value = gateway(&db, &base, "u1")
            .call(&JiraAction::TransitionIssue {
                issue_key: "WEB-1".into(),
                transition_id: "31".into(),
            })
            .await
            .unwrap();
        assert_eq!(value, success_sentinel());
    }

    #[tokio::test]
    async fn test_non_success_is_remote_api_error() {
        let base = spawn_site().await;
        let db = Database::open_in_memory().unwrap();
        ConnectionStore::new(db.clone())
            .upsert(new_connection("u1", "cloud-a"))
            .unwrap();

        let err = gateway(&db, &base, "u1").issue("WEB-404").await.unwrap_err();
        match err {
            JiraLinkError::RemoteApi { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "Issue does not exist");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_typed_transitions() {
        let base = spawn_site().await;
        let db = Database::open_in_memory().unwrap();
        ConnectionStore::new(db.clone())
            .upsert(new_connection("u1", "cloud-a"))
            .unwrap();

        let transitions = gateway(&db, &base, "u1").transitions("WEB-1").await.unwrap();
        assert_eq!(transitions.len(), 1);
        assert_eq!(
            transitions[0].target_category(),
            Some(crate::jira::StatusCategory::Done)
        );
    }

    #[tokio::test]
    async fn test_missing_connection() {
        let db = Database::open_in_memory().unwrap();
        let err = gateway(&db, "http://127.0.0.1:9", "nobody")
            .call(&JiraAction::GetSites)
            .await
            .unwrap_err();
        assert!(err.is_connection_level());
    }
}
