//! Task-scoped semantic memory.
//!
//! Agents persist and retrieve facts across steps through the [`Memory`]
//! provider trait: `add`, `search`, `list`, `stats`. Items are keyed by
//! `task_id` and never leak across tasks. Backends bundled with the crate:
//!
//! - [`InMemoryMemory`]: process-local, for tests and ephemeral runs.
//! - [`FileMemory`]: one JSONL file per task under a root directory; the
//!   default durable backend.
//! - [`NoopMemory`]: accepts writes, returns empty reads; used when a team
//!   declares no memory.
//! - [`EventedMemory`]: wraps any backend and emits `memory.added` /
//!   `memory.searched` events after the operation.
//!
//! Vector-store backends implement the same trait outside this crate; the
//! bundled relevance ranking is a deterministic token-overlap score so
//! `search` is reproducible given identical backend state.

mod evented;
mod file;
mod in_memory;
mod noop;

pub use evented::EventedMemory;
pub use file::FileMemory;
pub use in_memory::InMemoryMemory;
pub use noop::NoopMemory;

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::ErrorKind;

/// Content shape of a memory item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    #[default]
    Text,
    Json,
    KeyValue,
    VersionedText,
}

/// One stored memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    pub memory_id: String,
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub kind: MemoryKind,
    /// Salience in `0.0..=1.0`; used by `min_importance` search filters.
    #[serde(default = "default_importance")]
    pub importance: f64,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

fn default_importance() -> f64 {
    0.5
}

/// Options for [`Memory::add`].
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub agent_name: Option<String>,
    pub metadata: Map<String, Value>,
    pub importance: Option<f64>,
    pub kind: MemoryKind,
}

impl AddOptions {
    pub fn agent(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = Some(importance.clamp(0.0, 1.0));
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Options for [`Memory::search`].
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub limit: usize,
    pub min_importance: Option<f64>,
    pub metadata_filter: Map<String, Value>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            min_importance: None,
            metadata_filter: Map::new(),
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Options for [`Memory::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub agent_name: Option<String>,
    pub limit: Option<usize>,
}

/// Aggregate statistics for a task's memories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStats {
    pub count_total: usize,
    pub count_by_agent: BTreeMap<String, usize>,
    pub avg_importance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

/// Errors from memory providers. Non-fatal to the task: the executor logs
/// them and the offending operation returns empty.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    /// Backend storage failed. The message is opaque to avoid leaking
    /// backend types.
    #[error("storage: {0}")]
    Storage(String),
    #[error("serialization: {0}")]
    Serialization(String),
}

impl MemoryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::MemoryError
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(e: serde_json::Error) -> Self {
        MemoryError::Serialization(e.to_string())
    }
}

/// Task-scoped semantic store.
///
/// Guarantees required of implementations:
/// - `add` returns only after the item is durable to the backend's storage.
/// - `search` and `list` never return items from another `task_id`.
/// - `search` is deterministic given identical backend state and query.
/// - `list` returns newest first.
///
/// Implementations are internally thread-safe; the core adds no locking.
#[async_trait]
pub trait Memory: Send + Sync {
    /// Stores `content` under `task_id`, returning the new memory id.
    async fn add(
        &self,
        task_id: &str,
        content: &str,
        options: AddOptions,
    ) -> Result<String, MemoryError>;

    /// Items relevant to `query`, most relevant first.
    async fn search(
        &self,
        task_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError>;

    /// Items in recency order, newest first.
    async fn list(&self, task_id: &str, options: ListOptions)
        -> Result<Vec<MemoryItem>, MemoryError>;

    /// Aggregate statistics for the task.
    async fn stats(&self, task_id: &str) -> Result<MemoryStats, MemoryError>;
}

/// Deterministic token-overlap relevance in `0.0..=1.0`.
///
/// Both texts are lowercased and tokenized to alphanumeric words of three or
/// more characters; the score is the fraction of query tokens present in the
/// content. Used by the bundled backends so search ordering is reproducible.
pub fn relevance_score(query: &str, content: &str) -> f64 {
    let query_tokens = tokens(query);
    if query_tokens.is_empty() {
        return 0.0;
    }
    let content_tokens = tokens(content);
    let hits = query_tokens
        .iter()
        .filter(|t| content_tokens.contains(*t))
        .count();
    hits as f64 / query_tokens.len() as f64
}

fn tokens(text: &str) -> std::collections::BTreeSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() >= 3)
        .map(str::to_string)
        .collect()
}

/// Ranks `items` for `query`: filter by options, sort by score then recency
/// then id. Shared by the bundled backends.
pub(crate) fn rank_for_search(
    mut items: Vec<MemoryItem>,
    query: &str,
    options: &SearchOptions,
) -> Vec<MemoryItem> {
    items.retain(|item| {
        if let Some(min) = options.min_importance {
            if item.importance < min {
                return false;
            }
        }
        options
            .metadata_filter
            .iter()
            .all(|(k, v)| item.metadata.get(k) == Some(v))
    });
    let mut scored: Vec<(f64, MemoryItem)> = items
        .into_iter()
        .map(|item| (relevance_score(query, &item.content), item))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.timestamp.cmp(&a.1.timestamp))
            .then_with(|| a.1.memory_id.cmp(&b.1.memory_id))
    });
    scored
        .into_iter()
        .take(options.limit)
        .map(|(_, item)| item)
        .collect()
}

/// Computes stats over a task's items. Shared by the bundled backends.
pub(crate) fn stats_of(items: &[MemoryItem]) -> MemoryStats {
    let mut stats = MemoryStats {
        count_total: items.len(),
        ..Default::default()
    };
    if items.is_empty() {
        return stats;
    }
    let mut sum = 0.0;
    for item in items {
        sum += item.importance;
        if let Some(agent) = &item.agent_name {
            *stats.count_by_agent.entry(agent.clone()).or_insert(0) += 1;
        }
        stats.oldest = Some(match stats.oldest {
            Some(t) if t <= item.timestamp => t,
            _ => item.timestamp,
        });
        stats.newest = Some(match stats.newest {
            Some(t) if t >= item.timestamp => t,
            _ => item.timestamp,
        });
    }
    stats.avg_importance = sum / items.len() as f64;
    stats
}
