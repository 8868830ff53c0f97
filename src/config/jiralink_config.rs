//! jiralink configuration file handling
//!
//! Loads and manages ~/.config/jiralink/config.yaml.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// OAuth 2.0 (3LO) client settings for the Atlassian provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client id registered with the provider
    #[serde(default)]
    pub client_id: String,

    /// Name of the environment variable holding the client secret
    #[serde(default = "default_client_secret_env")]
    pub client_secret_env: String,

    /// Callback URL registered with the provider
    #[serde(default)]
    pub redirect_uri: String,

    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    #[serde(default = "default_token_url")]
    pub token_url: String,

    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// How long an issued `state` nonce stays redeemable
    #[serde(default = "default_state_ttl_secs")]
    pub state_ttl_secs: u64,
}

fn default_client_secret_env() -> String {
    "JIRALINK_CLIENT_SECRET".to_string()
}

fn default_authorize_url() -> String {
    "https://auth.atlassian.com/authorize".to_string()
}

fn default_token_url() -> String {
    "https://auth.atlassian.com/oauth/token".to_string()
}

fn default_scopes() -> Vec<String> {
    [
        "read:jira-work",
        "write:jira-work",
        "read:jira-user",
        "read:me",
        "offline_access",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_state_ttl_secs() -> u64 {
    600
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret_env: default_client_secret_env(),
            redirect_uri: String::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            state_ttl_secs: default_state_ttl_secs(),
        }
    }
}

impl OAuthConfig {
    /// Read the client secret from its environment variable
    pub fn client_secret(&self) -> Result<String> {
        std::env::var(self.client_secret_env.trim_start_matches('$')).map_err(|_| {
            crate::JiraLinkError::Config(format!(
                "Client secret env var {} is not set",
                self.client_secret_env
            ))
        })
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

/// Remote API location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Gateway host; Jira Cloud REST lives under `{base_url}/ex/jira/{cloudId}`
    #[serde(default = "default_api_base")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://api.atlassian.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database holding connections, projects and mappings
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Always use ~/.config for consistency across platforms (macOS, Linux)
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("jiralink");
        path.push("jiralink.db");
        Self { path }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Where the OAuth callback sends the browser once it is done
    #[serde(default = "default_app_redirect")]
    pub app_redirect_url: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_app_redirect() -> String {
    "http://localhost:5173/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            app_redirect_url: default_app_redirect(),
        }
    }
}

/// Sync tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Refresh the access token when it expires within this many seconds
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,

    /// Default page size for issue searches
    #[serde(default = "default_page_size")]
    pub search_page_size: u32,
}

fn default_refresh_threshold_secs() -> u64 {
    300
}

fn default_page_size() -> u32 {
    50
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            refresh_threshold_secs: default_refresh_threshold_secs(),
            search_page_size: default_page_size(),
        }
    }
}

impl SyncConfig {
    pub fn refresh_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.refresh_threshold_secs as i64)
    }
}

/// Location of the task application's REST API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TasksConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Env var holding a bearer token for the task API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

impl TasksConfig {
    pub fn token(&self) -> Option<String> {
        self.token_env
            .as_ref()
            .and_then(|env_var| std::env::var(env_var.trim_start_matches('$')).ok())
    }
}

/// jiralink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JiraLinkConfig {
    #[serde(default)]
    pub oauth: OAuthConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub tasks: TasksConfig,
}

impl JiraLinkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the default path (~/.config/jiralink/config.yaml)
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::JiraLinkError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading jiralink configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            api = %config.api.base_url,
            db = %config.storage.path.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving jiralink configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/jiralink/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("jiralink");
        path.push("config.yaml");
        path
    }
}
