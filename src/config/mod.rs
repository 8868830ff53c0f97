//! Configuration system
//!
//! Loads ~/.config/jiralink/config.yaml with support for:
//! - OAuth client settings (secret read from an env var)
//! - Remote API location and timeouts
//! - Database path, server bind address, sync tuning

mod jiralink_config;
pub mod validation;

pub use jiralink_config::{
    ApiConfig, JiraLinkConfig, OAuthConfig, ServerConfig, StorageConfig, SyncConfig, TasksConfig,
};
pub use validation::{validate_config, validate_config_result, ValidationError};
