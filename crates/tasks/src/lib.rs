//! Local task model for jiralink
//!
//! The task application owns task CRUD. This crate only describes the shape of a
//! task as jiralink sees it and the [`TaskStore`] seam jiralink calls into when it
//! creates tasks on import or patches them during a status sync.
//!
//! # Example
//!
//! ```no_run
//! use tasks::{MemoryTaskStore, NewTask, TaskPatch, TaskStatus, TaskStore};
//!
//! # async fn run() -> tasks::Result<()> {
//! let store = MemoryTaskStore::new();
//! let id = store
//!     .create_task(NewTask::new("Fix login", chrono::Local::now().date_naive()))
//!     .await?;
//! store
//!     .update_task(&id, TaskPatch::status(TaskStatus::Completed, 100))
//!     .await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors raised by a task store
#[derive(Error, Debug)]
pub enum Error {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Task rejected: {0}")]
    Rejected(String),

    #[error("Task API error: HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for task store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Identifier of a task in the local task application
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Task status as the task application stores it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Completed,
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Todo
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "TODO"),
            TaskStatus::InProgress => write!(f, "IN_PROGRESS"),
            TaskStatus::Completed => write!(f, "COMPLETED"),
            TaskStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TODO" => Ok(TaskStatus::Todo),
            "IN_PROGRESS" => Ok(TaskStatus::InProgress),
            "COMPLETED" => Ok(TaskStatus::Completed),
            "CANCELLED" => Ok(TaskStatus::Cancelled),
            other => Err(Error::Rejected(format!("unknown task status: {}", other))),
        }
    }
}

/// Task priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Medium
    }
}

/// Fields for a task about to be created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Day the task is scheduled on
    pub date: NaiveDate,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    /// Completion percentage, 0-100
    pub completion: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
}

impl NewTask {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            date,
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            completion: 0,
            parent_id: None,
        }
    }
}

/// Partial update applied to an existing task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<u8>,
}

impl TaskPatch {
    /// Patch that sets status and completion together
    pub fn status(status: TaskStatus, completion: u8) -> Self {
        Self {
            status: Some(status),
            completion: Some(completion),
        }
    }
}

/// A task as stored by [`MemoryTaskStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    #[serde(flatten)]
    pub fields: NewTask,
}

/// The operations jiralink needs from the task application
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Create a task, returning its new id
    async fn create_task(&self, task: NewTask) -> Result<TaskId>;

    /// Apply a partial update to an existing task
    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<()>;
}

/// In-process task store
///
/// Ids are assigned sequentially (`task-1`, `task-2`, ...).
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    next_id: u64,
    tasks: HashMap<TaskId, Task>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a task by id
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.lock().await.tasks.get(id).cloned()
    }

    /// All tasks, ordered by id
    pub async fn all(&self) -> Vec<Task> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<Task> = inner.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        tasks
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn create_task(&self, task: NewTask) -> Result<TaskId> {
        if task.title.trim().is_empty() {
            return Err(Error::Rejected("task title is empty".to_string()));
        }

        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        let id = TaskId::new(format!("task-{}", inner.next_id));
        inner.tasks.insert(
            id.clone(),
            Task {
                id: id.clone(),
                fields: task,
            },
        );
        Ok(id)
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        if let Some(status) = patch.status {
            task.fields.status = status;
        }
        if let Some(completion) = patch.completion {
            task.fields.completion = completion.min(100);
        }
        Ok(())
    }
}

/// Task store backed by the task application's REST API
///
/// Expects `POST {base}/tasks` to answer `{"id": "..."}` and
/// `PATCH {base}/tasks/{id}` to accept a [`TaskPatch`] body.
pub struct HttpTaskStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

impl HttpTaskStore {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl TaskStore for HttpTaskStore {
    async fn create_task(&self, task: NewTask) -> Result<TaskId> {
        let url = format!("{}/tasks", self.base_url);
        let response = self
            .authorize(self.client.post(&url).json(&task))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreatedTask = response.json().await?;
        Ok(TaskId::new(created.id))
    }

    async fn update_task(&self, id: &TaskId, patch: TaskPatch) -> Result<()> {
        let url = format!("{}/tasks/{}", self.base_url, id);
        let response = self
            .authorize(self.client.patch(&url).json(&patch))
            .send()
            .await?;

        match response.status().as_u16() {
            200..=299 => Ok(()),
            404 => Err(Error::NotFound(id.to_string())),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::Api { status, body })
            }
        }
    }
}
