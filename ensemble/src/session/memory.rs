//! In-memory session store. Not persistent; for dev and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    filter_and_page, rank_continuable, ListFilter, SessionError, SessionPatch, SessionStore,
    SessionSummary, TaskSession,
};
use crate::step::Step;

#[derive(Default)]
pub struct InMemorySessionStore {
    by_id: RwLock<HashMap<String, TaskSession>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: &TaskSession) -> Result<String, SessionError> {
        let id = session.task.task_id.clone();
        self.by_id.write().await.insert(id.clone(), session.clone());
        Ok(id)
    }

    async fn update(&self, task_id: &str, patch: SessionPatch) -> Result<(), SessionError> {
        let mut guard = self.by_id.write().await;
        let session = guard
            .get_mut(task_id)
            .ok_or_else(|| SessionError::NotFound(task_id.to_string()))?;
        patch.apply(&mut session.task);
        Ok(())
    }

    async fn append_step(&self, task_id: &str, step: &Step) -> Result<(), SessionError> {
        let mut guard = self.by_id.write().await;
        let session = guard
            .get_mut(task_id)
            .ok_or_else(|| SessionError::NotFound(task_id.to_string()))?;
        session.task.history.push(step.clone());
        Ok(())
    }

    async fn get(&self, task_id: &str) -> Result<Option<TaskSession>, SessionError> {
        Ok(self.by_id.read().await.get(task_id).cloned())
    }

    async fn list(&self, filter: ListFilter) -> Result<Vec<SessionSummary>, SessionError> {
        let rows: Vec<SessionSummary> = self
            .by_id
            .read()
            .await
            .values()
            .map(SessionSummary::of)
            .collect();
        Ok(filter_and_page(rows, &filter))
    }

    async fn delete(&self, task_id: &str) -> Result<(), SessionError> {
        self.by_id.write().await.remove(task_id);
        Ok(())
    }

    async fn find_continuable(
        &self,
        description: &str,
    ) -> Result<Vec<SessionSummary>, SessionError> {
        let rows = self.list(ListFilter::default()).await?;
        Ok(rank_continuable(rows, description))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{Task, TaskStatus};

    /// **Scenario**: create/update/append/get behave like the durable
    /// backends for executor tests.
    #[tokio::test]
    async fn basic_roundtrip() {
        let store = InMemorySessionStore::new();
        let session = TaskSession::new(Task::new("demo", "cfg", 5), "h");
        let id = store.create(&session).await.unwrap();
        store
            .append_step(&id, &Step::begin("assistant"))
            .await
            .unwrap();
        store
            .update(&id, SessionPatch::progress(TaskStatus::Running, "assistant", 1))
            .await
            .unwrap();
        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.task.history.len(), 1);
        assert_eq!(loaded.task.round_count, 1);
    }
}
