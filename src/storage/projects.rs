//! Remote projects a user has chosen to track

use super::connections::Connection;
use super::database::{to_millis, Database};
use crate::{JiraLinkError, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;

/// A tracked remote project, owned by one connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub user_id: String,
    pub connection_id: String,
    pub remote_project_id: String,
    pub project_key: String,
    pub project_name: String,
}

const PROJECT_COLUMNS: &str =
    "id, user_id, connection_id, remote_project_id, project_key, project_name";

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        user_id: row.get(1)?,
        connection_id: row.get(2)?,
        remote_project_id: row.get(3)?,
        project_key: row.get(4)?,
        project_name: row.get(5)?,
    })
}

/// Tracked projects of a single user
#[derive(Debug, Clone)]
pub struct ProjectStore {
    db: Database,
    user_id: String,
}

impl ProjectStore {
    pub fn new(db: Database, user_id: impl Into<String>) -> Self {
        Self {
            db,
            user_id: user_id.into(),
        }
    }

    /// Start tracking a remote project. Adding the same project twice returns
    /// the existing row.
    pub fn add(
        &self,
        connection: &Connection,
        remote_project_id: &str,
        project_key: &str,
        project_name: &str,
    ) -> Result<Project> {
        if connection.user_id != self.user_id {
            return Err(JiraLinkError::NotFound(format!(
                "connection {} for user {}",
                connection.id, self.user_id
            )));
        }

        self.db.with_conn(|conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM projects WHERE user_id = ? AND remote_project_id = ?",
                        PROJECT_COLUMNS
                    ),
                    params![&self.user_id, remote_project_id],
                    row_to_project,
                )
                .optional()?;
            if let Some(project) = existing {
                return Ok(project);
            }

            let project = Project {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: self.user_id.clone(),
                connection_id: connection.id.clone(),
                remote_project_id: remote_project_id.to_string(),
                project_key: project_key.to_string(),
                project_name: project_name.to_string(),
            };

            conn.execute(
                &format!(
                    "INSERT INTO projects ({}, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
                    PROJECT_COLUMNS
                ),
                params![
                    &project.id,
                    &project.user_id,
                    &project.connection_id,
                    &project.remote_project_id,
                    &project.project_key,
                    &project.project_name,
                    to_millis(Utc::now()),
                ],
            )?;

            tracing::info!(user_id = %self.user_id, project = %project.project_key, "Tracking Jira project");
            Ok(project)
        })
    }

    pub fn list(&self) -> Result<Vec<Project>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM projects WHERE user_id = ? ORDER BY project_key",
                PROJECT_COLUMNS
            ))?;
            let rows = stmt.query_map([&self.user_id], row_to_project)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    pub fn get(&self, project_id: &str) -> Result<Option<Project>> {
        self.db.with_conn(|conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {} FROM projects WHERE user_id = ? AND id = ?",
                        PROJECT_COLUMNS
                    ),
                    params![&self.user_id, project_id],
                    row_to_project,
                )
                .optional()?)
        })
    }

    /// Project by id, or `NotFound`
    pub fn require(&self, project_id: &str) -> Result<Project> {
        self.get(project_id)?
            .ok_or_else(|| JiraLinkError::NotFound(format!("project {}", project_id)))
    }

    /// Stop tracking a project. Its mappings stay in the ledger so a later
    /// re-import cannot duplicate tasks.
    pub fn remove(&self, project_id: &str) -> Result<bool> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM projects WHERE user_id = ? AND id = ?",
                params![&self.user_id, project_id],
            )?)
        })?;
        Ok(removed > 0)
    }
}
