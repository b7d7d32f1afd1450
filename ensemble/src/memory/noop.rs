//! No-op memory: the stand-in when a team declares no memory backend.
//!
//! Accepts writes (returning a fresh id so callers proceed normally) and
//! returns empty reads. Tools built over memory keep working; they just
//! never find anything.

use async_trait::async_trait;

use super::{
    AddOptions, ListOptions, Memory, MemoryError, MemoryItem, MemoryStats, SearchOptions,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMemory;

impl NoopMemory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Memory for NoopMemory {
    async fn add(
        &self,
        _task_id: &str,
        _content: &str,
        _options: AddOptions,
    ) -> Result<String, MemoryError> {
        Ok(uuid::Uuid::new_v4().simple().to_string())
    }

    async fn search(
        &self,
        _task_id: &str,
        _query: &str,
        _options: SearchOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    async fn list(
        &self,
        _task_id: &str,
        _options: ListOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        Ok(Vec::new())
    }

    async fn stats(&self, _task_id: &str) -> Result<MemoryStats, MemoryError> {
        Ok(MemoryStats::default())
    }
}
