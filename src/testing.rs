//! In-process fake of the Atlassian endpoints used by unit tests

use crate::auth::{OAuthClient, TokenRefreshGuard};
use crate::config::{ApiConfig, OAuthConfig};
use crate::jira::JiraGateway;
use crate::storage::{ConnectionStore, Database};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub(crate) struct FakeState {
    /// Issues by id
    pub issues: BTreeMap<String, Value>,
    pub token_calls: usize,
    pub search_calls: usize,
    pub issue_calls: usize,
    pub transition_gets: usize,
    pub transition_posts: usize,
    /// Offered transitions: (id, name, target category)
    pub transitions: Vec<(String, String, String)>,
}

pub(crate) type Shared = Arc<Mutex<FakeState>>;

pub(crate) fn issue_json(id: &str, key: &str, category: &str) -> Value {
    json!({
        "id": id,
        "key": key,
        "fields": {
            "summary": format!("Summary of {}", key),
            "status": {"name": category, "statusCategory": {"key": category}},
            "priority": {"name": "Medium"},
            "issuetype": {"name": "Task"}
        }
    })
}

pub(crate) fn default_transitions() -> Vec<(String, String, String)> {
    vec![
        ("11".into(), "To Do".into(), "new".into()),
        ("21".into(), "In Progress".into(), "indeterminate".into()),
        ("31".into(), "Done".into(), "done".into()),
    ]
}

fn find_issue<'a>(state: &'a FakeState, id_or_key: &str) -> Option<&'a Value> {
    state
        .issues
        .get(id_or_key)
        .or_else(|| state.issues.values().find(|i| i["key"] == id_or_key))
}

async fn token(State(state): State<Shared>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.token_calls += 1;
    let n = state.token_calls + 1;
    Json(json!({
        "access_token": format!("access-{}", n),
        "refresh_token": format!("refresh-{}", n),
        "expires_in": 3600
    }))
}

async fn search(State(state): State<Shared>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.search_calls += 1;
    let issues: Vec<Value> = state.issues.values().cloned().collect();
    Json(json!({"total": issues.len(), "startAt": 0, "maxResults": 50, "issues": issues}))
}

async fn issue(State(state): State<Shared>, Path((_cloud, id)): Path<(String, String)>) -> Response {
    let mut state = state.lock().unwrap();
    state.issue_calls += 1;
    match find_issue(&state, &id) {
        Some(issue) => Json(issue.clone()).into_response(),
        None => (StatusCode::NOT_FOUND, "Issue does not exist").into_response(),
    }
}

async fn list_transitions(State(state): State<Shared>) -> Json<Value> {
    let mut state = state.lock().unwrap();
    state.transition_gets += 1;
    let transitions: Vec<Value> = state
        .transitions
        .iter()
        .map(|(id, name, category)| {
            json!({"id": id, "name": name, "to": {"name": name, "statusCategory": {"key": category}}})
        })
        .collect();
    Json(json!({ "transitions": transitions }))
}

async fn do_transition(
    State(state): State<Shared>,
    Path((_cloud, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut state = state.lock().unwrap();
    state.transition_posts += 1;
    let Some(category) = state
        .transitions
        .iter()
        .find(|(tid, _, _)| body["transition"]["id"] == tid.as_str())
        .map(|(_, _, category)| category.clone())
    else {
        return StatusCode::BAD_REQUEST;
    };
    let Some(issue_id) = find_issue(&state, &id).map(|i| i["id"].as_str().unwrap_or_default().to_string())
    else {
        return StatusCode::NOT_FOUND;
    };
    match state.issues.get_mut(&issue_id) {
        Some(issue) => {
            issue["fields"]["status"]["statusCategory"]["key"] = json!(category);
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

/// Start the fake; returns its base URL and shared state
pub(crate) async fn spawn_fake() -> (String, Shared) {
    let state: Shared = Arc::new(Mutex::new(FakeState {
        transitions: default_transitions(),
        ..Default::default()
    }));
    let app = Router::new()
        .route("/oauth/token", post(token))
        .route(
            "/oauth/token/accessible-resources",
            get(|| async { Json(json!([{"id": "cloud-a", "name": "Acme", "url": "https://acme.atlassian.net"}])) }),
        )
        .route("/me", get(|| async { Json(json!({"email": "dev@example.com"})) }))
        .route("/ex/jira/{cloud}/rest/api/3/search", get(search))
        .route("/ex/jira/{cloud}/rest/api/3/issue/{id}", get(issue))
        .route(
            "/ex/jira/{cloud}/rest/api/3/issue/{id}/transitions",
            get(list_transitions).post(do_transition),
        )
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{}", addr), state)
}

/// Gateway for `user_id` pointed at the fake
pub(crate) fn fake_gateway(db: &Database, base_url: &str, user_id: &str) -> JiraGateway {
    let api = ApiConfig {
        base_url: base_url.to_string(),
        ..Default::default()
    };
    let oauth_config = OAuthConfig {
        client_id: "client".to_string(),
        token_url: format!("{}/oauth/token", base_url),
        ..Default::default()
    };
    let connections = ConnectionStore::new(db.clone());
    let oauth =
        OAuthClient::new(reqwest::Client::new(), oauth_config, &api).with_client_secret("secret");
    let guard = Arc::new(TokenRefreshGuard::new(
        oauth,
        connections.clone(),
        chrono::Duration::minutes(5),
    ));
    JiraGateway::new(reqwest::Client::new(), &api, connections, guard, user_id, 50)
}
