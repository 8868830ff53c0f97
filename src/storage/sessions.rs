//! Bearer credentials and OAuth `state` nonces
//!
//! Both map an opaque random string to a user id. Sessions live until revoked;
//! OAuth states are single-use and expire.

use super::database::{from_millis, to_millis, Database};
use crate::Result;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::time::Duration;

/// Bearer credentials identifying the calling user
#[derive(Debug, Clone)]
pub struct SessionStore {
    db: Database,
}

impl SessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Mint a new credential for `user_id`
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let token = format!("jl_{}", uuid::Uuid::new_v4().simple());
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO api_sessions (token, user_id, created_at) VALUES (?, ?, ?)",
                params![&token, user_id, to_millis(Utc::now())],
            )?;
            Ok(())
        })?;
        tracing::info!(user_id = %user_id, "Issued API session");
        Ok(token)
    }

    /// User id behind a credential
    pub fn resolve(&self, token: &str) -> Result<Option<String>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id FROM api_sessions WHERE token = ?",
                    [token],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn revoke(&self, token: &str) -> Result<bool> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM api_sessions WHERE token = ?", [token])?)
        })?;
        Ok(removed > 0)
    }
}

/// Single-use `state` values for the OAuth redirect
#[derive(Debug, Clone)]
pub struct OAuthStateStore {
    db: Database,
    ttl: Duration,
}

impl OAuthStateStore {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Create a fresh nonce bound to `user_id`
    pub fn issue(&self, user_id: &str) -> Result<String> {
        let state = uuid::Uuid::new_v4().simple().to_string();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO oauth_states (state, user_id, created_at) VALUES (?, ?, ?)",
                params![&state, user_id, to_millis(Utc::now())],
            )?;
            Ok(())
        })?;
        Ok(state)
    }

    /// Redeem a nonce. Returns the bound user id, or `None` if the nonce is
    /// unknown, already used, or expired. The nonce is gone afterwards either way.
    pub fn consume(&self, state: &str) -> Result<Option<String>> {
        let found: Option<(String, i64)> = self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT user_id, created_at FROM oauth_states WHERE state = ?",
                    [state],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            tx.execute("DELETE FROM oauth_states WHERE state = ?", [state])?;
            tx.commit()?;
            Ok(row)
        })?;

        let Some((user_id, created_at)) = found else {
            return Ok(None);
        };

        let age = Utc::now() - from_millis(created_at);
        if age.to_std().map(|age| age > self.ttl).unwrap_or(false) {
            tracing::warn!(user_id = %user_id, "Expired OAuth state presented");
            return Ok(None);
        }
        Ok(Some(user_id))
    }

    /// Drop nonces older than the TTL
    pub fn purge_expired(&self) -> Result<usize> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM oauth_states WHERE created_at < ?",
                [to_millis(cutoff)],
            )?)
        })
    }
}
