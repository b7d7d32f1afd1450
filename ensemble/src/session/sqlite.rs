//! SQLite-backed session store. Persistent across process restarts.
//!
//! Two tables: `sessions` (metadata document plus denormalized columns for
//! listing) and `steps` (append-only transcript, one row per step). Each
//! operation opens its own connection inside `spawn_blocking`; SQLite's
//! file locking serializes writers per database, and the store additionally
//! keeps the one-writer-per-task contract at the statement level
//! (`INSERT OR REPLACE` by primary key).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::params;

use super::{
    filter_and_page, rank_continuable, ListFilter, SessionError, SessionPatch, SessionStore,
    SessionSummary, TaskSession,
};
use crate::step::Step;

pub struct SqliteSessionStore {
    db_path: PathBuf,
}

impl SqliteSessionStore {
    /// Opens the database and ensures the schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let db_path = path.as_ref().to_path_buf();
        let conn = rusqlite::Connection::open(&db_path)
            .map_err(|e| SessionError::Io(e.to_string()))?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                task_id TEXT PRIMARY KEY,
                status TEXT NOT NULL,
                description TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                document TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS steps (
                task_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                step TEXT NOT NULL,
                PRIMARY KEY (task_id, seq)
            );
            "#,
        )
        .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(Self { db_path })
    }

    fn write_meta_blocking(
        db_path: &Path,
        session: &TaskSession,
    ) -> Result<(), SessionError> {
        let mut meta = session.clone();
        meta.task.history = Vec::new();
        let document = serde_json::to_string(&meta)?;
        let conn = rusqlite::Connection::open(db_path)
            .map_err(|e| SessionError::Io(e.to_string()))?;
        conn.execute(
            "INSERT OR REPLACE INTO sessions (task_id, status, description, updated_at, document)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                meta.task.task_id,
                meta.task.status.as_str(),
                meta.task.description,
                meta.task.updated_at.to_rfc3339(),
                document,
            ],
        )
        .map_err(|e| SessionError::Io(e.to_string()))?;
        Ok(())
    }

    fn read_meta_blocking(
        db_path: &Path,
        task_id: &str,
    ) -> Result<Option<TaskSession>, SessionError> {
        let conn = rusqlite::Connection::open(db_path)
            .map_err(|e| SessionError::Io(e.to_string()))?;
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM sessions WHERE task_id = ?1",
                params![task_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(SessionError::Io(other.to_string())),
            })?;
        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create(&self, session: &TaskSession) -> Result<String, SessionError> {
        let db_path = self.db_path.clone();
        let session = session.clone();
        tokio::task::spawn_blocking(move || {
            Self::write_meta_blocking(&db_path, &session)?;
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            for (seq, step) in session.task.history.iter().enumerate() {
                let body = serde_json::to_string(step)?;
                conn.execute(
                    "INSERT OR REPLACE INTO steps (task_id, seq, step) VALUES (?1, ?2, ?3)",
                    params![session.task.task_id, seq as i64, body],
                )
                .map_err(|e| SessionError::Io(e.to_string()))?;
            }
            Ok::<String, SessionError>(session.task.task_id.clone())
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn update(&self, task_id: &str, patch: SessionPatch) -> Result<(), SessionError> {
        let db_path = self.db_path.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let mut session = Self::read_meta_blocking(&db_path, &task_id)?
                .ok_or_else(|| SessionError::NotFound(task_id.clone()))?;
            patch.apply(&mut session.task);
            Self::write_meta_blocking(&db_path, &session)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn append_step(&self, task_id: &str, step: &Step) -> Result<(), SessionError> {
        let db_path = self.db_path.clone();
        let task_id = task_id.to_string();
        let body = serde_json::to_string(step)?;
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let next_seq: i64 = conn
                .query_row(
                    "SELECT COALESCE(MAX(seq) + 1, 0) FROM steps WHERE task_id = ?1",
                    params![task_id],
                    |row| row.get(0),
                )
                .map_err(|e| SessionError::Io(e.to_string()))?;
            conn.execute(
                "INSERT INTO steps (task_id, seq, step) VALUES (?1, ?2, ?3)",
                params![task_id, next_seq, body],
            )
            .map_err(|e| SessionError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskSession>, SessionError> {
        let db_path = self.db_path.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let Some(mut session) = Self::read_meta_blocking(&db_path, &task_id)? else {
                return Ok(None);
            };
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT step FROM steps WHERE task_id = ?1 ORDER BY seq ASC")
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let rows = stmt
                .query_map(params![task_id], |row| row.get::<_, String>(0))
                .map_err(|e| SessionError::Io(e.to_string()))?;
            for row in rows {
                let body = row.map_err(|e| SessionError::Io(e.to_string()))?;
                session.task.history.push(serde_json::from_str(&body)?);
            }
            Ok(Some(session))
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<SessionSummary>, SessionError> {
        let db_path = self.db_path.clone();
        let rows = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let mut stmt = conn
                .prepare("SELECT document FROM sessions")
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let mapped = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(|e| SessionError::Io(e.to_string()))?;
            let mut out = Vec::new();
            for row in mapped {
                let document = row.map_err(|e| SessionError::Io(e.to_string()))?;
                let session: TaskSession = serde_json::from_str(&document)?;
                out.push(SessionSummary::of(&session));
            }
            Ok::<Vec<SessionSummary>, SessionError>(out)
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))??;
        Ok(filter_and_page(rows, &filter))
    }

    async fn delete(&self, task_id: &str) -> Result<(), SessionError> {
        let db_path = self.db_path.clone();
        let task_id = task_id.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&db_path)
                .map_err(|e| SessionError::Io(e.to_string()))?;
            conn.execute("DELETE FROM steps WHERE task_id = ?1", params![task_id])
                .map_err(|e| SessionError::Io(e.to_string()))?;
            conn.execute("DELETE FROM sessions WHERE task_id = ?1", params![task_id])
                .map_err(|e| SessionError::Io(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| SessionError::Io(e.to_string()))?
    }

    async fn find_continuable(
        &self,
        description: &str,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        let rows = self.list(ListFilter::default()).await?;
        Ok(rank_continuable(rows, description))
    }
}
