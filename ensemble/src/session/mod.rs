//! Durable task sessions: identity, progress, and transcript across process
//! restarts.
//!
//! A session is the persisted projection of a [`Task`] plus the
//! `config_snapshot_hash` used to detect config drift on resume. The record
//! splits into a metadata document (scalar fields) and an append-only
//! transcript log of steps; backends keep that split however suits them:
//!
//! - [`FileSessionStore`]: one directory per task, `metadata.json` +
//!   `steps.jsonl`, atomic tmp+rename metadata writes.
//! - [`SqliteSessionStore`]: two tables in one SQLite file.
//! - [`InMemorySessionStore`]: for tests and ephemeral runs.
//!
//! Writes are serialized per `task_id` (one writer per task); reads may run
//! concurrently.

mod file;
mod memory;
mod sqlite;

pub use file::FileSessionStore;
pub use memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::error::{ErrorKind, TaskFailure};
use crate::step::Step;
use crate::task::{Task, TaskStatus};

/// Persisted projection of a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSession {
    #[serde(flatten)]
    pub task: Task,
    /// Hash of the team config the task was started under.
    pub config_snapshot_hash: String,
}

impl TaskSession {
    pub fn new(task: Task, config_snapshot_hash: impl Into<String>) -> Self {
        Self {
            task,
            config_snapshot_hash: config_snapshot_hash.into(),
        }
    }
}

/// Partial update merged into a session's metadata. `None` fields are left
/// untouched; the store stamps `updated_at` on every applied patch.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub status: Option<TaskStatus>,
    pub current_agent: Option<String>,
    pub round_count: Option<u32>,
    pub error: Option<TaskFailure>,
    pub workspace_path: Option<std::path::PathBuf>,
    /// Keys merged into the session metadata map.
    pub metadata: Vec<(String, Value)>,
}

impl SessionPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(status: TaskStatus, current_agent: &str, round_count: u32) -> Self {
        Self {
            status: Some(status),
            current_agent: Some(current_agent.to_string()),
            round_count: Some(round_count),
            ..Default::default()
        }
    }

    pub fn failed(failure: TaskFailure) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error: Some(failure),
            ..Default::default()
        }
    }

    /// Applies this patch to a task in memory (backends share this).
    pub(crate) fn apply(&self, task: &mut Task) {
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(agent) = &self.current_agent {
            task.current_agent = Some(agent.clone());
        }
        if let Some(rounds) = self.round_count {
            task.round_count = rounds;
        }
        if let Some(error) = &self.error {
            task.error = Some(error.clone());
        }
        if let Some(path) = &self.workspace_path {
            task.workspace_path = Some(path.clone());
        }
        for (key, value) in &self.metadata {
            task.metadata.insert(key.clone(), value.clone());
        }
        task.updated_at = Utc::now();
    }
}

/// Listing filter.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<TaskStatus>,
    pub limit: Option<usize>,
    pub offset: usize,
}

/// Lightweight listing row (metadata only, no transcript).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub task_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub round_count: u32,
    pub max_rounds: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionSummary {
    fn of(session: &TaskSession) -> Self {
        Self {
            task_id: session.task.task_id.clone(),
            description: session.task.description.clone(),
            status: session.task.status,
            round_count: session.task.round_count,
            max_rounds: session.task.max_rounds,
            created_at: session.task.created_at,
            updated_at: session.task.updated_at,
        }
    }
}

/// Errors from session stores. The executor retries a failed write once,
/// then fails the task with `session_io_error`.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("session io: {0}")]
    Io(String),
    #[error("session serialization: {0}")]
    Serialization(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::SessionIoError
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(e: serde_json::Error) -> Self {
        SessionError::Serialization(e.to_string())
    }
}

/// Durable session storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a new session, returning its task id.
    async fn create(&self, session: &TaskSession) -> Result<String, SessionError>;

    /// Merges `patch` into the session's metadata. Atomic per call.
    async fn update(&self, task_id: &str, patch: SessionPatch) -> Result<(), SessionError>;

    /// Appends one step to the transcript log.
    async fn append_step(&self, task_id: &str, step: &Step) -> Result<(), SessionError>;

    /// Full session including transcript, or `None`.
    async fn get(&self, task_id: &str) -> Result<Option<TaskSession>, SessionError>;

    /// Metadata rows matching the filter, newest updated first.
    async fn list(&self, filter: ListFilter) -> Result<Vec<SessionSummary>, SessionError>;

    /// Removes the session and its transcript. Idempotent.
    async fn delete(&self, task_id: &str) -> Result<(), SessionError>;

    /// Best-effort similarity match over sessions still worth resuming
    /// (`created`, `running`, `paused`), most similar first.
    async fn find_continuable(
        &self,
        description: &str,
    ) -> Result<Vec<SessionSummary>, SessionError>;
}

/// Shared find_continuable ranking: resumable statuses only, token-overlap
/// similarity, deterministic tie-break on recency then id.
pub(crate) fn rank_continuable(
    sessions: Vec<SessionSummary>,
    description: &str,
) -> Vec<SessionSummary> {
    let mut scored: Vec<(f64, SessionSummary)> = sessions
        .into_iter()
        .filter(|s| {
            matches!(
                s.status,
                TaskStatus::Created | TaskStatus::Running | TaskStatus::Paused
            )
        })
        .map(|s| (crate::memory::relevance_score(description, &s.description), s))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.updated_at.cmp(&a.1.updated_at))
            .then_with(|| a.1.task_id.cmp(&b.1.task_id))
    });
    scored.into_iter().map(|(_, s)| s).collect()
}

/// List post-processing shared by backends: filter, sort newest first,
/// paginate.
pub(crate) fn filter_and_page(
    mut rows: Vec<SessionSummary>,
    filter: &ListFilter,
) -> Vec<SessionSummary> {
    if let Some(status) = filter.status {
        rows.retain(|s| s.status == status);
    }
    rows.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.task_id.cmp(&b.task_id))
    });
    let rows: Vec<SessionSummary> = rows.into_iter().skip(filter.offset).collect();
    match filter.limit {
        Some(limit) => rows.into_iter().take(limit).collect(),
        None => rows,
    }
}
