//! Per-user service object
//!
//! [`AppContext`] holds what every request shares (config, database, HTTP
//! client, refresh guard). [`JiraSession`] binds it to one user and hands out
//! the user-scoped components.

use crate::auth::{self, CallbackError, OAuthClient, TokenRefreshGuard};
use crate::config::JiraLinkConfig;
use crate::jira::{normalize, JiraGateway, JiraProject, RemoteIssue};
use crate::storage::{
    Connection, ConnectionStore, Database, OAuthStateStore, Project, ProjectStore, SessionStore,
    TaskMappingLedger,
};
use crate::sync::{ImportReconciler, StatusSyncEngine};
use crate::{JiraLinkError, Result};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tasks::{HttpTaskStore, TaskStore};

/// Shared state behind every user session
pub struct AppContext {
    config: JiraLinkConfig,
    db: Database,
    http: Client,
    oauth: OAuthClient,
    guard: Arc<TokenRefreshGuard>,
    connections: ConnectionStore,
    sessions: SessionStore,
    oauth_states: OAuthStateStore,
}

impl AppContext {
    /// Open the configured database and build the context
    pub fn open(config: JiraLinkConfig) -> Result<Self> {
        let db = Database::open(&config.storage.path)?;
        Self::new(config, db)
    }

    /// Build a context over an already opened database
    pub fn new(config: JiraLinkConfig, db: Database) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()?;
        let oauth = OAuthClient::new(http.clone(), config.oauth.clone(), &config.api);
        Ok(Self::assemble(config, db, http, oauth))
    }

    /// Replace the client secret normally read from the environment
    pub fn with_client_secret(self, secret: impl Into<String>) -> Self {
        let oauth = self.oauth.with_client_secret(secret);
        Self::assemble(self.config, self.db, self.http, oauth)
    }

    fn assemble(config: JiraLinkConfig, db: Database, http: Client, oauth: OAuthClient) -> Self {
        let connections = ConnectionStore::new(db.clone());
        let guard = Arc::new(TokenRefreshGuard::new(
            oauth.clone(),
            connections.clone(),
            config.sync.refresh_threshold(),
        ));
        Self {
            sessions: SessionStore::new(db.clone()),
            oauth_states: OAuthStateStore::new(db.clone(), config.oauth.state_ttl()),
            connections,
            guard,
            oauth,
            http,
            db,
            config,
        }
    }

    pub fn config(&self) -> &JiraLinkConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn connections(&self) -> &ConnectionStore {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Session for one user
    pub fn session(&self, user_id: impl Into<String>) -> JiraSession {
        let user_id = user_id.into();
        JiraSession {
            gateway: JiraGateway::new(
                self.http.clone(),
                &self.config.api,
                self.connections.clone(),
                self.guard.clone(),
                user_id.clone(),
                self.config.sync.search_page_size,
            ),
            connections: self.connections.clone(),
            db: self.db.clone(),
            user_id,
        }
    }

    /// Start the OAuth flow for `user_id`; returns the provider URL
    pub fn begin_authorization(&self, user_id: &str) -> Result<String> {
        if let Err(e) = self.oauth_states.purge_expired() {
            tracing::debug!(error = %e, "Could not purge expired OAuth states");
        }
        let state = self.oauth_states.issue(user_id)?;
        Ok(self.oauth.authorize_url(&state))
    }

    /// Finish the OAuth flow from the provider's callback parameters
    pub async fn complete_authorization(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> std::result::Result<Connection, CallbackError> {
        auth::complete_authorization(&self.oauth, &self.oauth_states, &self.connections, code, state)
            .await
    }

    /// Task store configured under `tasks:`
    pub fn task_store(&self) -> Result<Arc<dyn TaskStore>> {
        let base_url = self.config.tasks.base_url.as_deref().ok_or_else(|| {
            JiraLinkError::Config("tasks.base_url is not configured".to_string())
        })?;
        let mut store = HttpTaskStore::new(base_url)?;
        if let Some(token) = self.config.tasks.token() {
            store = store.with_token(token);
        }
        Ok(Arc::new(store))
    }
}

/// Everything one user can do with their Jira connection
pub struct JiraSession {
    user_id: String,
    gateway: JiraGateway,
    connections: ConnectionStore,
    db: Database,
}

impl JiraSession {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn connection(&self) -> Result<Option<Connection>> {
        self.connections.get_for_user(&self.user_id)
    }

    pub fn gateway(&self) -> &JiraGateway {
        &self.gateway
    }

    pub fn ledger(&self) -> TaskMappingLedger {
        TaskMappingLedger::new(self.db.clone(), self.user_id.clone())
    }

    pub fn projects(&self) -> ProjectStore {
        ProjectStore::new(self.db.clone(), self.user_id.clone())
    }

    pub fn importer(&self, tasks: Arc<dyn TaskStore>) -> ImportReconciler {
        ImportReconciler::new(self.ledger(), tasks)
    }

    pub fn status_sync(&self, tasks: Arc<dyn TaskStore>) -> StatusSyncEngine {
        StatusSyncEngine::new(self.gateway.clone(), self.ledger(), tasks)
    }

    /// Track a remote project given its id, key and name
    pub fn track_project(
        &self,
        remote_project_id: &str,
        project_key: &str,
        project_name: &str,
    ) -> Result<Project> {
        let connection = self.connections.require_for_user(&self.user_id)?;
        self.projects()
            .add(&connection, remote_project_id, project_key, project_name)
    }

    /// Look a project up on the site by key and track it
    pub async fn track_project_by_key(&self, project_key: &str) -> Result<Project> {
        let remote = self
            .find_remote_project(project_key)
            .await?
            .ok_or_else(|| JiraLinkError::NotFound(format!("Jira project {}", project_key)))?;
        self.track_project(&remote.id, &remote.key, &remote.name)
    }

    async fn find_remote_project(&self, project_key: &str) -> Result<Option<JiraProject>> {
        let mut start_at = 0;
        loop {
            let page = self.gateway.projects(start_at).await?;
            let count = page.values.len() as u32;
            if let Some(found) = page
                .values
                .into_iter()
                .find(|p| p.key.eq_ignore_ascii_case(project_key))
            {
                return Ok(Some(found));
            }
            if page.is_last || count == 0 {
                return Ok(None);
            }
            start_at += count;
        }
    }

    /// Every open issue assigned to the user in `project_key`, normalized
    pub async fn remote_issues(&self, project_key: &str) -> Result<Vec<RemoteIssue>> {
        let mut issues = Vec::new();
        let mut start_at = 0;
        loop {
            let page = self.gateway.assigned_issues(project_key, start_at).await?;
            let count = page.issues.len() as u32;
            issues.extend(page.issues.iter().map(normalize));
            start_at += count;
            if count == 0 || start_at >= page.total {
                return Ok(issues);
            }
        }
    }

    /// Remove the connection, tracked projects and mappings
    pub fn disconnect(&self) -> Result<bool> {
        self.connections.delete_for_user(&self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{issue_json, spawn_fake};
    use std::collections::HashMap;
    use tasks::MemoryTaskStore;

    fn context(base_url: &str) -> AppContext {
        let mut config = JiraLinkConfig::default();
        config.api.base_url = base_url.to_string();
        config.oauth.client_id = "client".to_string();
        config.oauth.token_url = format!("{}/oauth/token", base_url);
        AppContext::new(config, Database::open_in_memory().unwrap())
            .unwrap()
            .with_client_secret("secret")
    }

    #[tokio::test]
    async fn test_authorization_round_trip() {
        let (base, fake) = spawn_fake().await;
        let ctx = context(&base);

        let url = ctx.begin_authorization("u1").unwrap();
        let state = url
            .split("state=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .to_string();

        let connection = ctx
            .complete_authorization(Some("code-1"), Some(&state))
            .await
            .unwrap();
        assert_eq!(connection.user_id, "u1");
        assert_eq!(connection.remote_site_id, "cloud-a");
        assert_eq!(connection.account_email.as_deref(), Some("dev@example.com"));
        assert_eq!(fake.lock().unwrap().token_calls, 1);

        // The nonce is spent.
        let again = ctx.complete_authorization(Some("code-1"), Some(&state)).await;
        assert!(matches!(again, Err(CallbackError::MissingParams)));
    }

    #[tokio::test]
    async fn test_import_then_disconnect() {
        let (base, fake) = spawn_fake().await;
        {
            let mut fake = fake.lock().unwrap();
            fake.issues.insert("1".into(), issue_json("1", "WEB-1", "new"));
            fake.issues.insert("2".into(), issue_json("2", "WEB-2", "indeterminate"));
        }
        let ctx = context(&base);
        ctx.connections()
            .upsert(crate::storage::new_connection("u1", "cloud-a"))
            .unwrap();

        let session = ctx.session("u1");
        let project = session.track_project("10010", "WEB", "Website").unwrap();
        let issues = session.remote_issues("WEB").await.unwrap();
        assert_eq!(issues.len(), 2);

        let store = Arc::new(MemoryTaskStore::new());
        let result = session
            .importer(store.clone())
            .import_issues(&issues, &HashMap::new(), &project.id)
            .await
            .unwrap();
        assert_eq!(result.imported, 2);

        assert!(session.disconnect().unwrap());
        assert!(session.ledger().list_for_user().unwrap().is_empty());
        assert!(session.projects().list().unwrap().is_empty());
        assert!(session.connection().unwrap().is_none());
    }

    #[test]
    fn test_task_store_requires_config() {
        let ctx = AppContext::new(JiraLinkConfig::default(), Database::open_in_memory().unwrap())
            .unwrap();
        assert!(matches!(ctx.task_store(), Err(JiraLinkError::Config(_))));
    }
}
