//! Access token refresh
//!
//! Every outbound call goes through [`TokenRefreshGuard::ensure_valid_token`].
//! Refreshes are serialized per connection: concurrent callers for the same
//! connection wait for the first refresh and then read its result from storage.

use super::oauth::OAuthClient;
use crate::storage::{Connection, ConnectionStore};
use crate::{JiraLinkError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Keeps stored access tokens usable
pub struct TokenRefreshGuard {
    oauth: OAuthClient,
    connections: ConnectionStore,
    threshold: chrono::Duration,
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenRefreshGuard {
    pub fn new(oauth: OAuthClient, connections: ConnectionStore, threshold: chrono::Duration) -> Self {
        Self {
            oauth,
            connections,
            threshold,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// True when the token expires within the threshold (or already has)
    pub fn needs_refresh(&self, connection: &Connection, now: DateTime<Utc>) -> bool {
        connection.time_to_expiry(now) <= self.threshold
    }

    /// Return an access token that is valid for at least the threshold
    ///
    /// The rotated pair is persisted before the new token is returned. A
    /// rejected refresh surfaces as `Auth`; an outage or network failure keeps
    /// its own error. Either way the stored tokens are left alone.
    pub async fn ensure_valid_token(&self, connection: &Connection) -> Result<String> {
        if !self.needs_refresh(connection, Utc::now()) {
            return Ok(connection.access_token.clone());
        }

        let lock = self.lock_for(&connection.id);
        let result = {
            let _held = lock.lock().await;
            self.refresh_locked(&connection.id).await
        };
        self.release(&connection.id, lock);
        result
    }

    async fn refresh_locked(&self, connection_id: &str) -> Result<String> {
        // Another caller may have refreshed while we waited for the lock.
        let current = self
            .connections
            .get(connection_id)?
            .ok_or_else(|| JiraLinkError::ConnectionNotFound(connection_id.to_string()))?;
        if !self.needs_refresh(&current, Utc::now()) {
            return Ok(current.access_token);
        }

        tracing::debug!(
            connection_id = %connection_id,
            expires_at = %current.expires_at,
            "Refreshing Jira access token"
        );

        let tokens = self.oauth.refresh(&current.refresh_token).await.map_err(|e| {
            tracing::warn!(connection_id = %connection_id, error = %e, "Token refresh failed");
            crate::metrics::record_token_refresh("failed");
            e
        })?;

        let refresh_token = tokens
            .refresh_token
            .unwrap_or_else(|| current.refresh_token.clone());
        let expires_at = Utc::now() + chrono::Duration::seconds(tokens.expires_in);

        self.connections
            .update_tokens(connection_id, &tokens.access_token, &refresh_token, expires_at)?;

        crate::metrics::record_token_refresh("ok");
        tracing::info!(connection_id = %connection_id, expires_at = %expires_at, "Access token refreshed");
        Ok(tokens.access_token)
    }

    fn lock_for(&self, connection_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        inflight
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release(&self, connection_id: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
        // The map holds one reference and we hold the other: nobody is waiting.
        if Arc::strong_count(&lock) == 2 {
            inflight.remove(connection_id);
        }
    }

    #[cfg(test)]
    fn inflight_len(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }
}
