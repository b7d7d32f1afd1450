//! File-backed memory: one JSONL file per task under a root directory.
//!
//! The default durable backend. `add` appends one JSON line and flushes
//! before returning, so durability holds at the provider's storage level.
//! Reads parse the whole file; tasks in this system hold at most a few
//! hundred memories, so linear scans are fine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use super::{
    rank_for_search, stats_of, AddOptions, ListOptions, Memory, MemoryError, MemoryItem,
    MemoryStats, SearchOptions,
};

/// JSONL-per-task memory store.
pub struct FileMemory {
    root: PathBuf,
    /// Serializes appends per task file.
    write_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl FileMemory {
    /// Opens (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, MemoryError> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(Self {
            root,
            write_locks: DashMap::new(),
        })
    }

    fn task_file(&self, task_id: &str) -> PathBuf {
        // Task ids are short hex; keep a guard against path tricks anyway.
        let safe: String = task_id
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        self.root.join(format!("{}.jsonl", safe))
    }

    fn lock_for(&self, task_id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, task_id: &str) -> Result<Vec<MemoryItem>, MemoryError> {
        let path = self.task_file(task_id);
        let data = match tokio::fs::read_to_string(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MemoryError::Storage(e.to_string())),
        };
        let mut items = Vec::new();
        for (n, line) in data.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<MemoryItem>(line) {
                Ok(item) if item.task_id == task_id => items.push(item),
                Ok(item) => {
                    warn!(expected = %task_id, found = %item.task_id, "memory line with foreign task id; skipping");
                }
                Err(e) => {
                    // A torn tail line from a crash is skipped, earlier lines survive.
                    warn!(line = n + 1, error = %e, path = %path.display(), "unreadable memory line; skipping");
                }
            }
        }
        Ok(items)
    }
}

#[async_trait]
impl Memory for FileMemory {
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
        let line = serde_json::to_string(&item)?;

        let lock = self.lock_for(task_id);
        let _guard = lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.task_file(task_id))
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        file.write_all(b"\n")
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        file.flush()
            .await
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
        Ok(memory_id)
    }

    async fn search(
        &self,
        task_id: &str,
        query: &str,
        options: SearchOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let items = self.load(task_id).await?;
        Ok(rank_for_search(items, query, &options))
    }

    async fn list(
        &self,
        task_id: &str,
        options: ListOptions,
    ) -> Result<Vec<MemoryItem>, MemoryError> {
        let mut items = self.load(task_id).await?;
        if let Some(agent) = &options.agent_name {
            items.retain(|i| i.agent_name.as_deref() == Some(agent.as_str()));
        }
        items.reverse();
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = options.limit {
            items.truncate(limit);
        }
        Ok(items)
    }

    async fn stats(&self, task_id: &str) -> Result<MemoryStats, MemoryError> {
        let items = self.load(task_id).await?;
        Ok(stats_of(&items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: add persists across a reopen of the store (durability).
    #[tokio::test]
    async fn add_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let memory = FileMemory::open(dir.path()).await.unwrap();
            memory
                .add("t1", "Shanghai forecast is sunny", AddOptions::default().agent("assistant"))
                .await
                .unwrap();
        }
        let reopened = FileMemory::open(dir.path()).await.unwrap();
        let items = reopened.list("t1", ListOptions::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].agent_name.as_deref(), Some("assistant"));
    }

    /// **Scenario**: tasks write to separate files; scoping holds on disk.
    #[tokio::test]
    async fn tasks_are_isolated_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let memory = FileMemory::open(dir.path()).await.unwrap();
        memory.add("aaa", "alpha fact", AddOptions::default()).await.unwrap();
        memory.add("bbb", "beta fact", AddOptions::default()).await.unwrap();

        let hits = memory
            .search("aaa", "alpha fact", SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].task_id, "aaa");
        assert!(dir.path().join("aaa.jsonl").exists());
        assert!(dir.path().join("bbb.jsonl").exists());
    }

    /// **Scenario**: a torn tail line (crash mid-write) is skipped and the
    /// earlier items remain readable.
    #[tokio::test]
    async fn torn_tail_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let memory = FileMemory::open(dir.path()).await.unwrap();
        memory.add("t1", "good line", AddOptions::default()).await.unwrap();

        let path = dir.path().join("t1.jsonl");
        let mut data = tokio::fs::read_to_string(&path).await.unwrap();
        data.push_str("{\"memory_id\": \"torn");
        tokio::fs::write(&path, data).await.unwrap();

        let items = memory.list("t1", ListOptions::default()).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "good line");
    }
}
