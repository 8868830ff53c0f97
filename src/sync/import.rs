//! Import of remote issues as local tasks

use super::translate::{completion_for, local_priority, local_status};
use crate::jira::RemoteIssue;
use crate::metrics;
use crate::storage::{Mapping, TaskMappingLedger};
use crate::Result;
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tasks::{NewTask, TaskId, TaskStore};
use tracing::{debug, info, warn};

/// An issue that could not be imported
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub remote_issue_id: String,
    pub remote_issue_key: String,
    pub error: String,
}

/// Outcome of one import batch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub imported: usize,
    /// Keys of issues that already had a mapping
    pub skipped: Vec<String>,
    pub failures: Vec<ImportFailure>,
    /// Mappings of the project, re-read after the batch
    pub mappings: Vec<Mapping>,
}

enum IssueOutcome {
    Imported,
    AlreadyLinked,
}

/// Creates local tasks for selected remote issues and records the links
pub struct ImportReconciler {
    ledger: TaskMappingLedger,
    tasks: Arc<dyn TaskStore>,
}

impl ImportReconciler {
    pub fn new(ledger: TaskMappingLedger, tasks: Arc<dyn TaskStore>) -> Self {
        Self { ledger, tasks }
    }

    /// Import `selected` into `project_id`, in input order
    ///
    /// `target_dates` maps a remote issue id to the day its task lands on;
    /// issues without an entry land on today. A failing issue is logged and
    /// reported in the result; the rest of the batch still runs. Only
    /// connection-level errors abort.
    pub async fn import_issues(
        &self,
        selected: &[RemoteIssue],
        target_dates: &HashMap<String, NaiveDate>,
        project_id: &str,
    ) -> Result<ImportResult> {
        let started = Instant::now();
        let mut result = ImportResult::default();
        let today = Local::now().date_naive();

        for issue in selected {
            let date = target_dates.get(&issue.id).copied().unwrap_or(today);
            match self.import_one(issue, date, project_id).await {
                Ok(IssueOutcome::Imported) => result.imported += 1,
                Ok(IssueOutcome::AlreadyLinked) => {
                    debug!(issue_key = %issue.key, "Issue already imported, skipping");
                    result.skipped.push(issue.key.clone());
                }
                Err(e) if e.is_connection_level() => return Err(e),
                Err(e) => {
                    warn!(
                        user_id = %self.ledger.user_id(),
                        issue_key = %issue.key,
                        error = %e,
                        "Failed to import issue"
                    );
                    result.failures.push(ImportFailure {
                        remote_issue_id: issue.id.clone(),
                        remote_issue_key: issue.key.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        result.mappings = self.ledger.list_by_project(project_id)?;

        metrics::record_sync_items("import", "imported", result.imported);
        metrics::record_sync_items("import", "skipped", result.skipped.len());
        metrics::record_sync_items("import", "failed", result.failures.len());
        metrics::record_batch_duration("import", started.elapsed().as_secs_f64());

        info!(
            user_id = %self.ledger.user_id(),
            project_id = %project_id,
            imported = result.imported,
            skipped = result.skipped.len(),
            failed = result.failures.len(),
            "Import complete"
        );
        Ok(result)
    }

    async fn import_one(
        &self,
        issue: &RemoteIssue,
        date: NaiveDate,
        project_id: &str,
    ) -> Result<IssueOutcome> {
        if self.ledger.find_by_remote_id(&issue.id)?.is_some() {
            return Ok(IssueOutcome::AlreadyLinked);
        }

        let status = local_status(issue.status_category);
        let parent_id = self.resolve_parent(issue)?;

        let title = if issue.summary.trim().is_empty() {
            issue.key.clone()
        } else {
            issue.summary.clone()
        };

        let task_id = self
            .tasks
            .create_task(NewTask {
                title,
                description: issue.description.clone(),
                date,
                status,
                priority: local_priority(&issue.priority),
                completion: completion_for(status),
                parent_id,
            })
            .await?;

        if let Err(e) = self.ledger.create(&task_id, project_id, issue) {
            warn!(task_id = %task_id, issue_key = %issue.key, "Task created but mapping was not recorded");
            return Err(e);
        }

        debug!(task_id = %task_id, issue_key = %issue.key, "Imported issue");
        Ok(IssueOutcome::Imported)
    }

    /// Local parent for an issue whose parent was imported earlier
    fn resolve_parent(&self, issue: &RemoteIssue) -> Result<Option<TaskId>> {
        let Some(parent_remote_id) = issue.parent_remote_id.as_deref() else {
            return Ok(None);
        };
        let parent = self.ledger.find_by_remote_id(parent_remote_id)?;
        if parent.is_none() {
            debug!(issue_key = %issue.key, parent = %parent_remote_id, "Parent not imported, creating without parent");
        }
        Ok(parent.map(|m| m.task_id))
    }
}
