//! Task mapping ledger
//!
//! Durable, user-scoped index between local tasks and remote issues. Within one
//! user a task links to at most one issue and an issue is imported at most once;
//! both rules are enforced here and backed by UNIQUE constraints.

use super::database::{from_millis, is_constraint_violation, to_millis, Database};
use crate::jira::{RemoteIssue, StatusCategory};
use crate::{JiraLinkError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use tasks::TaskId;

/// Link between one local task and one remote issue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    pub id: String,
    pub user_id: String,
    pub task_id: TaskId,
    pub project_id: String,
    pub remote_issue_id: String,
    pub remote_issue_key: String,
    pub remote_parent_id: Option<String>,
    /// Category observed at the last import or sync
    pub cached_status_category: Option<StatusCategory>,
    pub last_synced_at: DateTime<Utc>,
}

const MAPPING_COLUMNS: &str = "id, user_id, task_id, project_id, remote_issue_id, remote_issue_key, \
     remote_parent_id, cached_status_category, last_synced_at";

fn row_to_mapping(row: &Row<'_>) -> rusqlite::Result<Mapping> {
    let category: String = row.get(7)?;
    Ok(Mapping {
        id: row.get(0)?,
        user_id: row.get(1)?,
        task_id: TaskId::new(row.get::<_, String>(2)?),
        project_id: row.get(3)?,
        remote_issue_id: row.get(4)?,
        remote_issue_key: row.get(5)?,
        remote_parent_id: row.get(6)?,
        cached_status_category: StatusCategory::from_key(&category),
        last_synced_at: from_millis(row.get(8)?),
    })
}

fn category_column(category: Option<StatusCategory>) -> &'static str {
    category.map(|c| c.as_str()).unwrap_or("")
}

/// Mapping ledger for a single user
#[derive(Debug, Clone)]
pub struct TaskMappingLedger {
    db: Database,
    user_id: String,
}

impl TaskMappingLedger {
    pub fn new(db: Database, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Record that `task_id` was created from `remote_issue`
    ///
    /// Fails with `DuplicateMapping` if either side is already linked.
    pub fn create(
        &self,
        task_id: &TaskId,
        project_id: &str,
        remote_issue: &RemoteIssue,
    ) -> Result<Mapping> {
        let duplicate = || JiraLinkError::DuplicateMapping {
            task_id: task_id.to_string(),
            remote_issue_id: remote_issue.id.clone(),
        };

        let mapping = Mapping {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            task_id: task_id.clone(),
            project_id: project_id.to_string(),
            remote_issue_id: remote_issue.id.clone(),
            remote_issue_key: remote_issue.key.clone(),
            remote_parent_id: remote_issue.parent_remote_id.clone(),
            cached_status_category: remote_issue.status_category,
            last_synced_at: Utc::now(),
        };

        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM mappings WHERE user_id = ? AND (task_id = ? OR remote_issue_id = ?)",
                params![&self.user_id, task_id.as_str(), &remote_issue.id],
                |row| row.get(0),
            )?;
            if existing > 0 {
                return Err(duplicate());
            }

            let inserted = tx.execute(
                &format!(
                    "INSERT INTO mappings ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    MAPPING_COLUMNS
                ),
                params![
                    &mapping.id,
                    &mapping.user_id,
                    mapping.task_id.as_str(),
                    &mapping.project_id,
                    &mapping.remote_issue_id,
                    &mapping.remote_issue_key,
                    mapping.remote_parent_id.as_deref(),
                    category_column(mapping.cached_status_category),
                    to_millis(mapping.last_synced_at),
                ],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_constraint_violation(&e) => return Err(duplicate()),
                Err(e) => return Err(e.into()),
            }

            tx.commit()?;
            Ok(())
        })?;

        tracing::debug!(
            user_id = %self.user_id,
            task_id = %task_id,
            issue_key = %remote_issue.key,
            "Created task mapping"
        );
        Ok(mapping)
    }

    fn find_one(&self, column: &str, value: &str) -> Result<Option<Mapping>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM mappings WHERE user_id = ? AND {} = ?",
                        MAPPING_COLUMNS, column
                    ),
                    params![&self.user_id, value],
                    row_to_mapping,
                )
                .optional()?)
        })
    }

    fn find_many(&self, filter: &str, value: Option<&str>) -> Result<Vec<Mapping>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM mappings WHERE user_id = ?{} ORDER BY project_id, remote_issue_key",
                MAPPING_COLUMNS, filter
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = match value {
                Some(value) => stmt.query_map(params![&self.user_id, value], row_to_mapping)?,
                None => stmt.query_map(params![&self.user_id], row_to_mapping)?,
            };
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn find_by_task_id(&self, task_id: &TaskId) -> Result<Option<Mapping>> {
        self.find_one("task_id", task_id.as_str())
    }

    pub fn find_by_remote_id(&self, remote_id: &str) -> Result<Option<Mapping>> {
        self.find_one("remote_issue_id", remote_id)
    }

    pub fn list_by_project(&self, project_id: &str) -> Result<Vec<Mapping>> {
        self.find_many(" AND project_id = ?", Some(project_id))
    }

    /// Every mapping of this user, ordered by project
    pub fn list_for_user(&self) -> Result<Vec<Mapping>> {
        self.find_many("", None)
    }

    /// Store the category seen at `synced_at`
    pub fn update_status(
        &self,
        mapping_id: &str,
        category: Option<StatusCategory>,
        synced_at: DateTime<Utc>,
    ) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE mappings SET cached_status_category = ?, last_synced_at = ? WHERE id = ? AND user_id = ?",
                params![
                    category_column(category),
                    to_millis(synced_at),
                    mapping_id,
                    &self.user_id
                ],
            )?)
        })?;

        if changed == 0 {
            return Err(JiraLinkError::NotFound(format!("mapping {}", mapping_id)));
        }
        Ok(())
    }

    /// Drop every mapping of this user; returns how many were removed.
    ///
    /// Disconnect goes through `ConnectionStore::delete_for_user`, which does
    /// this inside the same transaction as the project and connection rows.
    pub fn delete_all_for_user(&self) -> Result<usize> {
        self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM mappings WHERE user_id = ?", [&self.user_id])?)
        })
    }
}
