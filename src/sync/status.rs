//! Two-way status synchronization for linked tasks

use super::translate::{completion_for, local_status, push_target};
use crate::jira::{normalize, JiraGateway, StatusCategory};
use crate::metrics;
use crate::storage::{Mapping, TaskMappingLedger};
use crate::{JiraLinkError, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tasks::{TaskId, TaskPatch, TaskStatus, TaskStore};
use tracing::{debug, info, warn};

/// What a push did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum PushOutcome {
    /// The local status has no remote counterpart
    Unsupported,
    /// The task is not linked to an issue
    NotLinked,
    #[serde(rename_all = "camelCase")]
    Transitioned {
        issue_key: String,
        transition_id: String,
        transition_name: String,
        category: StatusCategory,
    },
}

/// Update applied to a local task during a pull
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub task_id: TaskId,
    pub remote_issue_key: String,
    pub previous_category: Option<StatusCategory>,
    pub category: Option<StatusCategory>,
    pub status: TaskStatus,
    pub completion: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFailure {
    pub mapping_id: String,
    pub remote_issue_key: String,
    pub error: String,
}

/// Outcome of a pull batch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullReport {
    pub checked: usize,
    pub unchanged: usize,
    pub updates: Vec<StatusUpdate>,
    pub failures: Vec<SyncFailure>,
}

/// Pushes local status changes out and pulls remote ones in
pub struct StatusSyncEngine {
    gateway: JiraGateway,
    ledger: TaskMappingLedger,
    tasks: Arc<dyn TaskStore>,
}

impl StatusSyncEngine {
    pub fn new(gateway: JiraGateway, ledger: TaskMappingLedger, tasks: Arc<dyn TaskStore>) -> Self {
        Self {
            gateway,
            ledger,
            tasks,
        }
    }

    /// Move the linked issue into the category matching `status`
    ///
    /// Picks the first available transition landing in that category. Fails
    /// with `NoTransition` when the workflow offers none.
    pub async fn push(&self, task_id: &TaskId, status: TaskStatus) -> Result<PushOutcome> {
        let Some(target) = push_target(status) else {
            debug!(task_id = %task_id, status = %status, "No remote equivalent, not pushing");
            return Ok(PushOutcome::Unsupported);
        };

        let Some(mapping) = self.ledger.find_by_task_id(task_id)? else {
            return Ok(PushOutcome::NotLinked);
        };

        let transitions = self.gateway.transitions(&mapping.remote_issue_key).await?;
        let transition = transitions
            .into_iter()
            .find(|t| t.target_category() == Some(target))
            .ok_or_else(|| JiraLinkError::NoTransition {
                issue_key: mapping.remote_issue_key.clone(),
                target: target.to_string(),
            })?;

        self.gateway
            .transition(&mapping.remote_issue_key, &transition.id)
            .await?;
        self.ledger.update_status(&mapping.id, Some(target), Utc::now())?;

        info!(
            task_id = %task_id,
            issue_key = %mapping.remote_issue_key,
            transition = %transition.name,
            category = %target,
            "Pushed status to Jira"
        );

        Ok(PushOutcome::Transitioned {
            issue_key: mapping.remote_issue_key,
            transition_id: transition.id,
            transition_name: transition.name,
            category: target,
        })
    }

    /// Pull every mapping of the user
    pub async fn pull_all(&self) -> Result<PullReport> {
        let mappings = self.ledger.list_for_user()?;
        self.pull_mappings(mappings).await
    }

    /// Pull the mappings of one project
    pub async fn pull_project(&self, project_id: &str) -> Result<PullReport> {
        let mappings = self.ledger.list_by_project(project_id)?;
        self.pull_mappings(mappings).await
    }

    async fn pull_mappings(&self, mappings: Vec<Mapping>) -> Result<PullReport> {
        let started = Instant::now();
        let mut by_project: BTreeMap<String, Vec<Mapping>> = BTreeMap::new();
        for mapping in mappings {
            by_project
                .entry(mapping.project_id.clone())
                .or_default()
                .push(mapping);
        }

        let mut report = PullReport::default();
        for (project_id, group) in by_project {
            debug!(project_id = %project_id, mappings = group.len(), "Pulling project");
            for mapping in group {
                report.checked += 1;
                match self.pull_one(&mapping).await {
                    Ok(Some(update)) => report.updates.push(update),
                    Ok(None) => report.unchanged += 1,
                    Err(e) if e.is_connection_level() => return Err(e),
                    Err(e) => {
                        warn!(
                            mapping_id = %mapping.id,
                            issue_key = %mapping.remote_issue_key,
                            error = %e,
                            "Failed to sync issue"
                        );
                        report.failures.push(SyncFailure {
                            mapping_id: mapping.id.clone(),
                            remote_issue_key: mapping.remote_issue_key.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        metrics::record_sync_items("pull", "updated", report.updates.len());
        metrics::record_sync_items("pull", "unchanged", report.unchanged);
        metrics::record_sync_items("pull", "failed", report.failures.len());
        metrics::record_batch_duration("pull", started.elapsed().as_secs_f64());

        info!(
            user_id = %self.ledger.user_id(),
            checked = report.checked,
            updated = report.updates.len(),
            failed = report.failures.len(),
            "Status pull complete"
        );
        Ok(report)
    }

    async fn pull_one(&self, mapping: &Mapping) -> Result<Option<StatusUpdate>> {
        let issue = normalize(&self.gateway.issue(&mapping.remote_issue_id).await?);
        let now = Utc::now();

        if issue.status_category == mapping.cached_status_category {
            self.ledger
                .update_status(&mapping.id, mapping.cached_status_category, now)?;
            return Ok(None);
        }

        let status = local_status(issue.status_category);
        let completion = completion_for(status);
        self.tasks
            .update_task(&mapping.task_id, TaskPatch::status(status, completion))
            .await?;
        self.ledger
            .update_status(&mapping.id, issue.status_category, now)?;

        debug!(
            task_id = %mapping.task_id,
            issue_key = %mapping.remote_issue_key,
            status = %status,
            "Pulled status from Jira"
        );

        Ok(Some(StatusUpdate {
            task_id: mapping.task_id.clone(),
            remote_issue_key: mapping.remote_issue_key.clone(),
            previous_category: mapping.cached_status_category,
            category: issue.status_category,
            status,
            completion,
        }))
    }
}
