//! Per-user OAuth connections
//!
//! At most one connection exists per user. A new OAuth completion replaces the
//! stored one in place; disconnecting removes it together with everything the
//! user tracked through it.

use super::database::{from_millis, to_millis, Database};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::Serialize;

/// A user's link to one Jira Cloud site
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub user_id: String,
    /// Cloud id of the site; used as a path segment on every API call
    pub remote_site_id: String,
    pub site_name: String,
    pub site_url: String,
    pub account_email: Option<String>,
    #[serde(skip)]
    pub access_token: String,
    #[serde(skip)]
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("remote_site_id", &self.remote_site_id)
            .field("site_name", &self.site_name)
            .field("account_email", &self.account_email)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Connection {
    /// Time left before the access token expires (negative once expired)
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.expires_at - now
    }
}

/// Fields of a connection produced by a successful OAuth exchange
#[derive(Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub remote_site_id: String,
    pub site_name: String,
    pub site_url: String,
    pub account_email: Option<String>,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

const CONNECTION_COLUMNS: &str = "id, user_id, remote_site_id, site_name, site_url, account_email, \
     access_token, refresh_token, expires_at";

fn row_to_connection(row: &Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        user_id: row.get(1)?,
        remote_site_id: row.get(2)?,
        site_name: row.get(3)?,
        site_url: row.get(4)?,
        account_email: row.get(5)?,
        access_token: row.get(6)?,
        refresh_token: row.get(7)?,
        expires_at: from_millis(row.get(8)?),
    })
}

/// Store of OAuth connections, one per user
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    db: Database,
}

impl ConnectionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert or replace the connection for `new.user_id`
    ///
    /// The row id survives a reconnect to the same site. Reconnecting to a
    /// different site drops the projects and mappings of the old one.
    pub fn upsert(&self, new: NewConnection) -> Result<Connection> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let now = to_millis(Utc::now());

            let existing = tx
                .query_row(
                    &format!("SELECT {} FROM connections WHERE user_id = ?", CONNECTION_COLUMNS),
                    [&new.user_id],
                    row_to_connection,
                )
                .optional()?;

            let id = match existing {
                Some(old) => {
                    if old.remote_site_id != new.remote_site_id {
                        tracing::warn!(
                            user_id = %new.user_id,
                            old_site = %old.remote_site_id,
                            new_site = %new.remote_site_id,
                            "Reconnected to a different site, dropping tracked projects"
                        );
                        delete_children(&tx, &new.user_id)?;
                    }
                    tx.execute(
                        r#"
                        UPDATE connections SET
                            remote_site_id = ?, site_name = ?, site_url = ?, account_email = ?,
                            access_token = ?, refresh_token = ?, expires_at = ?, updated_at = ?
                        WHERE id = ?
                        "#,
                        params![
                            &new.remote_site_id,
                            &new.site_name,
                            &new.site_url,
                            new.account_email.as_deref(),
                            &new.access_token,
                            &new.refresh_token,
                            to_millis(new.expires_at),
                            now,
                            &old.id,
                        ],
                    )?;
                    old.id
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    tx.execute(
                        r#"
                        INSERT INTO connections (
                            id, user_id, remote_site_id, site_name, site_url, account_email,
                            access_token, refresh_token, expires_at, created_at, updated_at
                        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                        params![
                            &id,
                            &new.user_id,
                            &new.remote_site_id,
                            &new.site_name,
                            &new.site_url,
                            new.account_email.as_deref(),
                            &new.access_token,
                            &new.refresh_token,
                            to_millis(new.expires_at),
                            now,
                            now,
                        ],
                    )?;
                    id
                }
            };

            tx.commit()?;
            tracing::info!(user_id = %new.user_id, site = %new.site_name, "Stored Jira connection");

            Ok(Connection {
                id,
                user_id: new.user_id,
                remote_site_id: new.remote_site_id,
                site_name: new.site_name,
                site_url: new.site_url,
                account_email: new.account_email,
                access_token: new.access_token,
                refresh_token: new.refresh_token,
                expires_at: new.expires_at,
            })
        })
    }

    /// Connection for a user, if any
    pub fn get_for_user(&self, user_id: &str) -> Result<Option<Connection>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM connections WHERE user_id = ?", CONNECTION_COLUMNS),
                    [user_id],
                    row_to_connection,
                )
                .optional()?)
        })
    }

    /// Connection for a user, or `NotFound`
    pub fn require_for_user(&self, user_id: &str) -> Result<Connection> {
        self.get_for_user(user_id)?
            .ok_or_else(|| crate::JiraLinkError::connection_not_found(user_id))
    }

    /// Connection by row id
    pub fn get(&self, connection_id: &str) -> Result<Option<Connection>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {} FROM connections WHERE id = ?", CONNECTION_COLUMNS),
                    [connection_id],
                    row_to_connection,
                )
                .optional()?)
        })
    }

    /// Persist a rotated token pair and its expiry in one statement
    ///
    /// Fails with `NotFound` if the connection was removed in the meantime.
    pub fn update_tokens(
        &self,
        connection_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE connections SET access_token = ?, refresh_token = ?, expires_at = ?, updated_at = ? WHERE id = ?",
                params![
                    access_token,
                    refresh_token,
                    to_millis(expires_at),
                    to_millis(Utc::now()),
                    connection_id
                ],
            )?)
        })?;

        if changed == 0 {
            return Err(crate::JiraLinkError::ConnectionNotFound(
                connection_id.to_string(),
            ));
        }
        Ok(())
    }

    /// Remove a user's connection, its projects and its mappings
    ///
    /// Returns false when the user had no connection.
    pub fn delete_for_user(&self, user_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let (projects, mappings) = delete_children(&tx, user_id)?;
            let removed = tx.execute("DELETE FROM connections WHERE user_id = ?", [user_id])?;
            tx.commit()?;

            tracing::info!(
                user_id = %user_id,
                projects,
                mappings,
                "Deleted Jira connection"
            );
            Ok(removed > 0)
        })
    }
}

/// Mappings first, then projects: children before parent
fn delete_children(tx: &Transaction<'_>, user_id: &str) -> rusqlite::Result<(usize, usize)> {
    let mappings = tx.execute("DELETE FROM mappings WHERE user_id = ?", [user_id])?;
    let projects = tx.execute("DELETE FROM projects WHERE user_id = ?", [user_id])?;
    Ok((projects, mappings))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn new_connection(user_id: &str, site: &str) -> NewConnection {
        NewConnection {
            user_id: user_id.to_string(),
            remote_site_id: site.to_string(),
            site_name: format!("{}-site", site),
            site_url: format!("https://{}.atlassian.net", site),
            account_email: Some(format!("{}@example.com", user_id)),
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn store() -> ConnectionStore {
        ConnectionStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_upsert_and_get() {
        let store = store();
        let created = store.upsert(new_connection("u1", "cloud-a")).unwrap();

        let loaded = store.get_for_user("u1").unwrap().unwrap();
        assert_eq!(loaded.id, created.id);
        assert_eq!(loaded.remote_site_id, "cloud-a");
        assert_eq!(loaded.access_token, "access-1");
        assert!(store.get_for_user("u2").unwrap().is_none());
    }

    #[test]
    fn test_second_upsert_replaces_first() {
        let store = store();
        let first = store.upsert(new_connection("u1", "cloud-a")).unwrap();

        let mut again = new_connection("u1", "cloud-a");
        again.access_token = "access-2".to_string();
        let second = store.upsert(again).unwrap();

        assert_eq!(first.id, second.id);
        let loaded = store.require_for_user("u1").unwrap();
        assert_eq!(loaded.access_token, "access-2");

        let count: i64 = store
            .db
            .with_conn(|c| Ok(c.query_row("SELECT COUNT(*) FROM connections", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_update_tokens() {
        let store = store();
        let conn = store.upsert(new_connection("u1", "cloud-a")).unwrap();
        let expires = Utc::now() + Duration::hours(2);

        store
            .update_tokens(&conn.id, "access-2", "refresh-2", expires)
            .unwrap();

        let loaded = store.require_for_user("u1").unwrap();
        assert_eq!(loaded.access_token, "access-2");
        assert_eq!(loaded.refresh_token, "refresh-2");
        assert_eq!(loaded.expires_at.timestamp_millis(), expires.timestamp_millis());
    }

    #[test]
    fn test_update_tokens_for_removed_connection() {
        let store = store();
        let result = store.update_tokens("missing", "a", "r", Utc::now());
        assert!(matches!(result, Err(crate::JiraLinkError::ConnectionNotFound(_))));
    }

    #[test]
    fn test_require_missing_is_connection_level() {
        let err = store().require_for_user("ghost").unwrap_err();
        assert!(err.is_connection_level());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let store = store();
        let conn = store.upsert(new_connection("u1", "cloud-a")).unwrap();
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("access-1"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_delete_missing_user() {
        assert!(!store().delete_for_user("nobody").unwrap());
    }
}
