//! Atlassian OAuth 2.0 (3LO) authorization code flow
//!
//! The browser is sent to the provider with a single-use `state` nonce; the
//! callback redeems the nonce, exchanges the code, picks the first accessible
//! site and stores the connection for the user.

use crate::config::{ApiConfig, OAuthConfig};
use crate::jira::AccessibleResource;
use crate::storage::{Connection, ConnectionStore, NewConnection, OAuthStateStore};
use crate::{JiraLinkError, Result};
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const TOKEN_TIMEOUT: Duration = Duration::from_secs(15);

/// Token endpoint response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the provider does not rotate refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

#[derive(Debug, Serialize)]
#[serde(tag = "grant_type", rename_all = "snake_case")]
enum TokenRequest<'a> {
    AuthorizationCode {
        client_id: &'a str,
        client_secret: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    },
    RefreshToken {
        client_id: &'a str,
        client_secret: &'a str,
        refresh_token: &'a str,
    },
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    email: Option<String>,
}

/// HTTP client for the provider's authorize/token/identity endpoints
#[derive(Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    api_base: String,
    client_secret: Option<String>,
}

impl OAuthClient {
    /// Create a client; the secret is read from `config.client_secret_env`
    pub fn new(http: Client, config: OAuthConfig, api: &ApiConfig) -> Self {
        let client_secret = config.client_secret().ok();
        Self {
            http,
            config,
            api_base: api.base_url.trim_end_matches('/').to_string(),
            client_secret,
        }
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    fn secret(&self) -> Result<&str> {
        self.client_secret.as_deref().ok_or_else(|| {
            JiraLinkError::Config(format!(
                "Client secret env var {} is not set",
                self.config.client_secret_env
            ))
        })
    }

    /// Provider URL the browser is redirected to
    pub fn authorize_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        format!(
            "{}?audience=api.atlassian.com&client_id={}&scope={}&redirect_uri={}&state={}&response_type=code&prompt=consent",
            self.config.authorize_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.config.redirect_uri),
            urlencoding::encode(state),
        )
    }

    async fn token_request(&self, body: &TokenRequest<'_>) -> Result<TokenResponse> {
        let response = self
            .http
            .post(&self.config.token_url)
            .json(body)
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            Err(JiraLinkError::Auth(format!(
                "token endpoint rejected the grant: HTTP {}: {}",
                status, body
            )))
        } else {
            Err(JiraLinkError::RemoteApi {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// Exchange an authorization code for a token pair
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        tracing::debug!("Exchanging authorization code");
        self.token_request(&TokenRequest::AuthorizationCode {
            client_id: &self.config.client_id,
            client_secret: self.secret()?,
            code,
            redirect_uri: &self.config.redirect_uri,
        })
        .await
    }

    /// Exchange a refresh token for a new token pair
    ///
    /// A 4xx from the provider (revoked or expired refresh token) is `Auth`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse> {
        self.token_request(&TokenRequest::RefreshToken {
            client_id: &self.config.client_id,
            client_secret: self.secret()?,
            refresh_token,
        })
        .await
    }

    /// Sites the token can reach
    pub async fn accessible_resources(&self, access_token: &str) -> Result<Vec<AccessibleResource>> {
        let url = format!("{}/oauth/token/accessible-resources", self.api_base);
        self.get_json(&url, access_token).await
    }

    /// Email of the account that granted access, when the scope allows it
    pub async fn profile_email(&self, access_token: &str) -> Result<Option<String>> {
        let url = format!("{}/me", self.api_base);
        let profile: Profile = self.get_json(&url, access_token).await?;
        Ok(profile.email)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .timeout(TOKEN_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(JiraLinkError::RemoteApi {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

/// Why a callback did not produce a connection
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("callback is missing code or state")]
    MissingParams,

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("the account has no accessible Jira sites")]
    NoSites,

    #[error("could not store the connection: {0}")]
    DbError(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl CallbackError {
    /// Flag appended to the application redirect
    pub fn as_flag(&self) -> &'static str {
        match self {
            CallbackError::MissingParams => "missing_params",
            CallbackError::TokenExchangeFailed(_) => "token_exchange_failed",
            CallbackError::NoSites => "no_sites",
            CallbackError::DbError(_) => "db_error",
            CallbackError::Unexpected(_) => "unexpected",
        }
    }
}

/// Handle the provider callback end to end
pub async fn complete_authorization(
    oauth: &OAuthClient,
    states: &OAuthStateStore,
    connections: &ConnectionStore,
    code: Option<&str>,
    state: Option<&str>,
) -> std::result::Result<Connection, CallbackError> {
    let (code, state) = match (code, state) {
        (Some(code), Some(state)) if !code.is_empty() && !state.is_empty() => (code, state),
        _ => return Err(CallbackError::MissingParams),
    };

    let user_id = states
        .consume(state)
        .map_err(|e| CallbackError::DbError(e.to_string()))?
        .ok_or(CallbackError::MissingParams)?;

    let tokens = oauth.exchange_code(code).await.map_err(|e| {
        tracing::warn!(user_id = %user_id, error = %e, "Authorization code exchange failed");
        CallbackError::TokenExchangeFailed(e.to_string())
    })?;

    let sites = oauth
        .accessible_resources(&tokens.access_token)
        .await
        .map_err(|e| CallbackError::Unexpected(e.to_string()))?;
    let site = sites.into_iter().next().ok_or(CallbackError::NoSites)?;

    let account_email = match oauth.profile_email(&tokens.access_token).await {
        Ok(email) => email,
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Could not fetch profile email");
            None
        }
    };

    let refresh_token = tokens.refresh_token.ok_or_else(|| {
        CallbackError::TokenExchangeFailed("no refresh token granted (is offline_access in scope?)".to_string())
    })?;

    let connection = connections
        .upsert(NewConnection {
            user_id: user_id.clone(),
            remote_site_id: site.id,
            site_name: site.name,
            site_url: site.url,
            account_email,
            access_token: tokens.access_token,
            refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(tokens.expires_in),
        })
        .map_err(|e| CallbackError::DbError(e.to_string()))?;

    tracing::info!(user_id = %user_id, site = %connection.site_name, "Jira connected");
    Ok(connection)
}
