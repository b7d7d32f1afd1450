//! File-backed session store: one directory per task.
//!
//! Layout under the root:
//!
//! ```text
//! tasks/<task_id>/metadata.json   # TaskSession without the transcript
//! tasks/<task_id>/steps.jsonl     # one Step per line, append-only
//! ```
//!
//! Metadata writes go through a temp file and rename, so a crash never
//! leaves a half-written document. Appends flush before returning. A
//! per-task mutex serializes writers; readers go straight to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::{
    filter_and_page, rank_continuable, ListFilter, SessionError, SessionPatch, SessionStore,
    SessionSummary, TaskSession,
};
use crate::step::Step;

pub struct FileSessionStore {
    root: PathBuf,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileSessionStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, SessionError> {
        let root = root.as_ref().join("tasks");
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(Self {
            root,
            write_locks: DashMap::new(),
        })
    }

    fn task_dir(&self, task_id: &str) -> PathBuf {
        let safe: String = task_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.root.join(safe)
    }

    fn lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_meta(&self, task_id: &str) -> Result<Option<TaskSession>, SessionError> {
        let path = self.task_dir(task_id).join("metadata.json");
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::Io(e.to_string())),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Atomic metadata write: temp file in the same directory, then rename.
    async fn write_meta(&self, session: &TaskSession) -> Result<(), SessionError> {
        let dir = self.task_dir(&session.task.task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        let mut meta = session.clone();
        meta.task.history = Vec::new();
        let body =
            serde_json::to_vec_pretty(&meta).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let tmp = dir.join("metadata.json.tmp");
        let target = dir.join("metadata.json");
        tokio::fs::write(&tmp, &body)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        tokio::fs::rename(&tmp, &target)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(())
    }

    async fn read_steps(&self, task_id: &str) -> Result<Vec<Step>, SessionError> {
        let path = self.task_dir(task_id).join("steps.jsonl");
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::Io(e.to_string())),
        };
        let mut steps = Vec::new();
        for (n, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Step>(line) {
                Ok(step) => steps.push(step),
                Err(e) => {
                    // A torn tail line from a crash loses at most that step.
                    warn!(task = %task_id, line = n + 1, error = %e,
                        "unreadable transcript line; skipping");
                }
            }
        }
        Ok(steps)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, session: &TaskSession) -> Result<String, SessionError> {
        let lock = self.lock_for(&session.task.task_id);
        let _guard = lock.lock().await;
        self.write_meta(session).await?;
        // Steps of a freshly created task (resume re-creates) go to the log.
        for step in &session.task.history {
            self.append_step_locked(&session.task.task_id, step).await?;
        }
        Ok(session.task.task_id.clone())
    }

    async fn update(&self, task_id: &str, patch: SessionPatch) -> Result<(), SessionError> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;
        let mut session = self
            .read_meta(task_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(task_id.to_string()))?;
        patch.apply(&mut session.task);
        self.write_meta(&session).await
    }

    async fn append_step(&self, task_id: &str, step: &Step) -> Result<(), SessionError> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;
        self.append_step_locked(task_id, step).await
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskSession>, SessionError> {
        let Some(mut session) = self.read_meta(task_id).await? else {
            return Ok(None);
        };
        session.task.history = self.read_steps(task_id).await?;
        Ok(Some(session))
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<SessionSummary>, SessionError> {
        let mut rows = Vec::new();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(SessionError::Io(e.to_string())),
        };
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(task_id) = name.to_str() else {
                continue;
            };
            match self.read_meta(task_id).await {
                Ok(Some(session)) => rows.push(SessionSummary::of(&session)),
                Ok(None) => {}
                Err(e) => warn!(task = %task_id, error = %e, "unreadable session metadata; skipping"),
            }
        }
        Ok(filter_and_page(rows, &filter))
    }

    async fn delete(&self, task_id: &str) -> Result<(), SessionError> {
        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;
        match tokio::fs::remove_dir_all(self.task_dir(task_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SessionError::Io(e.to_string())),
        }
    }

    async fn find_continuable(
        &self,
        description: &str,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        let rows = self.list(ListFilter::default()).await?;
        Ok(rank_continuable(rows, description))
    }
}

impl FileSessionStore {
    async fn append_step_locked(&self, task_id: &str, step: &Step) -> Result<(), SessionError> {
        let dir = self.task_dir(task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        let line =
            serde_json::to_string(step).map_err(|e| SessionError::Serialization(e.to_string()))?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join("steps.jsonl"))
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(())
    }
}
