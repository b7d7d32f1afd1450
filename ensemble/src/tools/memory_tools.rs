//! Built-in memory tools: task-scoped persistence exposed to agents.
//!
//! Four scoped tools over the [`Memory`] provider: `add_memory`,
//! `search_memory`, `list_memories`, `memory_stats`. The registry injects
//! `task_id`/`agent_id`, so an agent can only ever touch its own task's
//! memories.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{
    ParamKind, Tool, ToolDescriptor, ToolError, ToolParam, ToolRegistry, RESERVED_AGENT_ID,
    RESERVED_TASK_ID,
};
use crate::memory::{AddOptions, ListOptions, Memory, SearchOptions};

pub const TOOL_ADD_MEMORY: &str = "add_memory";
pub const TOOL_SEARCH_MEMORY: &str = "search_memory";
pub const TOOL_LIST_MEMORIES: &str = "list_memories";
pub const TOOL_MEMORY_STATS: &str = "memory_stats";

fn scope_of(args: &Map<String, Value>) -> Result<(String, String), ToolError> {
    let task_id = args
        .get(RESERVED_TASK_ID)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::InvalidArguments("missing injected task_id".into()))?;
    let agent_id = args
        .get(RESERVED_AGENT_ID)
        .and_then(Value::as_str)
        .unwrap_or_default();
    Ok((task_id.to_string(), agent_id.to_string()))
}

/// `add_memory`: store a fact in the task's memory.
pub struct AddMemoryTool {
    memory: Arc<dyn Memory>,
}

#[async_trait]
impl Tool for AddMemoryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            TOOL_ADD_MEMORY,
            "Store a fact or finding in the task's persistent memory so it can be recalled in later steps",
        )
        .param(ToolParam::required(
            "content",
            ParamKind::String,
            "The fact or finding to store",
        ))
        .param(ToolParam::optional(
            "importance",
            ParamKind::Number,
            "Salience from 0.0 to 1.0; higher values rank earlier in filtered searches",
        ))
        .param(ToolParam::optional(
            "metadata",
            ParamKind::Object,
            "Free-form tags for this memory (e.g. {\"phase\": \"plan\"})",
        ))
        .task_scoped()
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let (task_id, agent_id) = scope_of(&args)?;
        let content = args
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("content must be a string".into()))?;
        let mut options = AddOptions::default().agent(agent_id);
        if let Some(importance) = args.get("importance").and_then(Value::as_f64) {
            options = options.importance(importance);
        }
        if let Some(Value::Object(meta)) = args.get("metadata") {
            options.metadata = meta.clone();
        }
        let memory_id = self
            .memory
            .add(&task_id, content, options)
            .await
            .map_err(|e| ToolError::Failure(e.to_string()))?;
        Ok(json!({ "memory_id": memory_id, "stored": true }))
    }
}

/// `search_memory`: semantic lookup over the task's memories.
pub struct SearchMemoryTool {
    memory: Arc<dyn Memory>,
}

#[async_trait]
impl Tool for SearchMemoryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            TOOL_SEARCH_MEMORY,
            "Search the task's memories by relevance to a query",
        )
        .param(ToolParam::required(
            "query",
            ParamKind::String,
            "What to look for",
        ))
        .param(ToolParam::optional(
            "limit",
            ParamKind::Integer,
            "Maximum number of memories to return (default 5)",
        ))
        .task_scoped()
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let (task_id, _) = scope_of(&args)?;
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("query must be a string".into()))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
        let hits = self
            .memory
            .search(&task_id, query, SearchOptions::default().with_limit(limit))
            .await
            .map_err(|e| ToolError::Failure(e.to_string()))?;
        let results: Vec<Value> = hits
            .into_iter()
            .map(|item| {
                json!({
                    "memory_id": item.memory_id,
                    "content": item.content,
                    "agent_name": item.agent_name,
                    "importance": item.importance,
                })
            })
            .collect();
        Ok(json!({ "count": results.len(), "memories": results }))
    }
}

/// `list_memories`: recent memories for the task, newest first.
pub struct ListMemoriesTool {
    memory: Arc<dyn Memory>,
}

#[async_trait]
impl Tool for ListMemoriesTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            TOOL_LIST_MEMORIES,
            "List the task's most recent memories, newest first",
        )
        .param(ToolParam::optional(
            "limit",
            ParamKind::Integer,
            "Maximum number of memories to list (default 10)",
        ))
        .task_scoped()
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let (task_id, _) = scope_of(&args)?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let items = self
            .memory
            .list(
                &task_id,
                ListOptions {
                    agent_name: None,
                    limit: Some(limit),
                },
            )
            .await
            .map_err(|e| ToolError::Failure(e.to_string()))?;
        let results: Vec<Value> = items
            .into_iter()
            .map(|item| {
                json!({
                    "memory_id": item.memory_id,
                    "content": item.content,
                    "agent_name": item.agent_name,
                    "timestamp": item.timestamp.to_rfc3339(),
                })
            })
            .collect();
        Ok(json!({ "count": results.len(), "memories": results }))
    }
}

/// `memory_stats`: aggregate statistics for the task's memory.
pub struct MemoryStatsTool {
    memory: Arc<dyn Memory>,
}

#[async_trait]
impl Tool for MemoryStatsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(
            TOOL_MEMORY_STATS,
            "Report how many memories the task holds, per agent, with average importance",
        )
        .task_scoped()
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        let (task_id, _) = scope_of(&args)?;
        let stats = self
            .memory
            .stats(&task_id)
            .await
            .map_err(|e| ToolError::Failure(e.to_string()))?;
        serde_json::to_value(&stats).map_err(|e| ToolError::Failure(e.to_string()))
    }
}

/// Registers all four memory tools over `memory`. Existing registrations of
/// the same names are replaced, so teams can re-bind memory per run.
pub fn register_memory_tools(registry: &ToolRegistry, memory: Arc<dyn Memory>) {
    registry.register_overwrite(Arc::new(AddMemoryTool {
        memory: Arc::clone(&memory),
    }));
    registry.register_overwrite(Arc::new(SearchMemoryTool {
        memory: Arc::clone(&memory),
    }));
    registry.register_overwrite(Arc::new(ListMemoriesTool {
        memory: Arc::clone(&memory),
    }));
    registry.register_overwrite(Arc::new(MemoryStatsTool { memory }));
}
