//! Memory wrapper that mirrors writes and searches onto the event bus.
//!
//! `add` publishes `memory.added` only after the inner backend reports the
//! item durable, which is what lets the bus's auto-emit rules treat tagged
//! memories as milestones. `search` publishes `memory.searched` with the
//! query and hit count.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    AddOptions, ListOptions, Memory, MemoryError, MemoryItem, MemoryStats, SearchOptions,
};
use crate::events::{Event, EventBus, EventType};

pub struct EventedMemory {
    inner: Arc<dyn Memory>,
    bus: EventBus,
}

impl EventedMemory {
    pub fn new(inner: Arc<dyn Memory>, bus: EventBus) -> Self {
        Self { inner, bus }
    }
}

#[async_trait]
impl Memory for EventedMemory {
    async fn add(
        &self,
        task_id: &str,
        content: &str,
        options: AddOptions,
    ) -> Result<String, MemoryError> {
        let agent = options.agent_name.clone();
        let metadata = Value::Object(options.metadata.clone());
        let importance = options.importance.unwrap_or(0.5);
        let memory_id = self.inner.add(task_id, content, options).await?;
        let mut event = Event::new(EventType::MemoryAdded, "memory")
            .for_task(task_id)
            .with("memory_id", json!(memory_id.clone()))
            .with("importance", json!(importance))
            .with("metadata", metadata);
        if let Some(agent) = agent {
            event = event.with("agent_name", json!(agent));
        }
        self.bus.publish(event);
        Ok(memory_id)
    }

    async fn search(
        &self,
        task_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let hits = self.inner.search(task_id, query, options).await?;
        self.bus.publish(
            Event::new(EventType::MemorySearched, "memory")
                .for_task(task_id)
                .with("query", json!(query))
                .with("hits", json!(hits.len())),
        );
        Ok(hits)
    }

    async fn list(
        &self,
        task_id: &str,
        options: ListOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        self.inner.list(task_id, options).await
    }

    async fn stats(&self, task_id: &str) -> Result<MemoryStats, MemoryError> {
        self.inner.stats(task_id).await
    }
}
