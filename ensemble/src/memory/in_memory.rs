//! Process-local memory backend. Not persistent; for tests and ephemeral runs.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{
    rank_for_search, stats_of, AddOptions, ListOptions, Memory, MemoryError, MemoryItem,
    MemoryStats, SearchOptions,
};

/// In-memory store keyed by task id.
///
/// **Interaction**: used as `Arc<dyn Memory>` by the executor and the
/// built-in memory tools; the default backend when a team config says
/// `backend: in_memory`.
#[derive(Default)]
pub struct InMemoryMemory {
    by_task: DashMap<String, Vec<MemoryItem>>,
}

impl InMemoryMemory {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Memory for InMemoryMemory {
    async fn add(
        &self,
        task_id: &str,
        content: &str,
        options: AddOptions,
    ) -> Result<String, MemoryError> {
        let memory_id = uuid::Uuid::new_v4().simple().to_string();
        let item = MemoryItem {
            memory_id: memory_id.clone(),
            task_id: task_id.to_string(),
            agent_name: options.agent_name,
            content: content.to_string(),
            kind: options.kind,
            importance: options.importance.unwrap_or(0.5).clamp(0.0, 1.0),
            metadata: options.metadata,
            timestamp: Utc::now(),
        };
        self.by_task.entry(task_id.to_string()).or_default().push(item);
        Ok(memory_id)
    }

    async fn search(
        &self,
        task_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let items = self
            .by_task
            .get(task_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        Ok(rank_for_search(items, query, &options))
    }

    async fn list(
        &self,
        task_id: &str,
        options: ListOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let mut items = self
            .by_task
            .get(task_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        if let Some(agent) = &options.agent_name {
            items.retain(|i| i.agent_name.as_deref() == Some(agent.as_str()));
        }
        // Newest first; insertion order breaks timestamp ties deterministically.
        items.reverse();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = options.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn stats(&self, task_id: &str) -> Result<MemoryStats, MemoryError> {
        let items = self
            .by_task
            .get(task_id)
            .map(|v| v.clone())
            .unwrap_or_default();
        Ok(stats_of(&items))
    }
}
