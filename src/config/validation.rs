//! Configuration validation
//!
//! Checks the settings the OAuth flow and the gateway cannot run without.

use super::jiralink_config::JiraLinkConfig;
use crate::JiraLinkError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Validate a jiralink configuration
pub fn validate_config(config: &JiraLinkConfig) -> ValidationResult {
    let mut errors = Vec::new();

    if config.oauth.client_id.trim().is_empty() {
        errors.push(ValidationError::new("oauth.client_id", "Client id is required"));
    }

    if !is_http_url(&config.oauth.redirect_uri) {
        errors.push(ValidationError::new(
            "oauth.redirect_uri",
            format!("Invalid redirect URI: '{}'", config.oauth.redirect_uri),
        ));
    }

    for (field, url) in [
        ("oauth.authorize_url", &config.oauth.authorize_url),
        ("oauth.token_url", &config.oauth.token_url),
        ("api.base_url", &config.api.base_url),
    ] {
        if !is_http_url(url) {
            errors.push(ValidationError::new(field, format!("Invalid URL: '{}'", url)));
        }
    }

    if config.oauth.scopes.is_empty() {
        errors.push(ValidationError::new("oauth.scopes", "At least one scope is required"));
    }

    if config.sync.search_page_size == 0 || config.sync.search_page_size > 100 {
        errors.push(ValidationError::new(
            "sync.search_page_size",
            "Page size must be between 1 and 100",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate and collapse the problems into a single error
pub fn validate_config_result(config: &JiraLinkConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        JiraLinkError::Config(messages.join("; "))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> JiraLinkConfig {
        let mut config = JiraLinkConfig::new();
        config.oauth.client_id = "client".to_string();
        config.oauth.redirect_uri = "http://localhost:8787/oauth/callback".to_string();
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_client_id_and_redirect() {
        let errors = validate_config(&JiraLinkConfig::new()).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"oauth.client_id"));
        assert!(fields.contains(&"oauth.redirect_uri"));
    }

    #[test]
    fn test_page_size_bounds() {
        let mut config = valid_config();
        config.sync.search_page_size = 500;
        let err = validate_config_result(&config).unwrap_err();
        assert!(err.to_string().contains("sync.search_page_size"));
    }
}
