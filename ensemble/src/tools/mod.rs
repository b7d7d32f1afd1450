//! Tool abstraction: structured descriptors, function-calling schemas, and
//! the dispatch trait.
//!
//! Tools declare a [`ToolDescriptor`] (name, description, typed parameters
//! with per-parameter descriptions) alongside the callable. The descriptor is
//! the source of truth for the LLM-facing schema; the registry validates and
//! coerces arguments against it before dispatch. Descriptions are
//! contractually required for production tools because function-calling
//! accuracy depends on them; registration warns when they are missing.

mod memory_tools;
mod registry;

pub use memory_tools::{
    register_memory_tools, TOOL_ADD_MEMORY, TOOL_LIST_MEMORIES, TOOL_MEMORY_STATS,
    TOOL_SEARCH_MEMORY,
};
pub use registry::{ToolRegistry, DEFAULT_TOOL_TIMEOUT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::error::ErrorKind;

/// Reserved argument key carrying the task id for scoped tools.
pub const RESERVED_TASK_ID: &str = "task_id";
/// Reserved argument key carrying the acting agent name for scoped tools.
pub const RESERVED_AGENT_ID: &str = "agent_id";

/// JSON parameter type of a tool argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    /// JSON-schema type name.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    /// A required parameter.
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    /// An optional parameter.
    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// Structured tool metadata: the source of truth for schema generation and
/// argument validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub params: Vec<ToolParam>,
    /// Scoped tools receive the reserved `task_id` / `agent_id` arguments,
    /// injected by the registry at dispatch.
    #[serde(default)]
    pub needs_task_scope: bool,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            needs_task_scope: false,
        }
    }

    /// Adds a parameter (builder pattern).
    pub fn param(mut self, param: ToolParam) -> Self {
        self.params.push(param);
        self
    }

    /// Marks the tool as task-scoped (builder pattern).
    pub fn task_scoped(mut self) -> Self {
        self.needs_task_scope = true;
        self
    }

    /// Declared parameter by name, if any.
    pub fn find_param(&self, name: &str) -> Option<&ToolParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// The LLM-facing function-calling schema:
    /// `{"type":"function","function":{name, description, parameters}}`.
    ///
    /// Reserved scope parameters are not exposed to the model; the registry
    /// injects them.
    pub fn function_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            if p.name == RESERVED_TASK_ID || p.name == RESERVED_AGENT_ID {
                continue;
            }
            properties.insert(
                p.name.clone(),
                json!({"type": p.kind.json_type(), "description": p.description}),
            );
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties,
                    "required": required,
                },
            },
        })
    }

    /// Missing-description findings, as registration warnings. An empty tool
    /// description or any empty parameter description is reported.
    pub fn completeness_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.description.trim().is_empty() {
            warnings.push(format!("tool '{}' has no description", self.name));
        }
        for p in &self.params {
            if p.description.trim().is_empty() {
                warnings.push(format!(
                    "tool '{}' parameter '{}' has no description",
                    self.name, p.name
                ));
            }
        }
        warnings
    }
}

/// Errors from tool registration and dispatch.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("duplicate tool: {0}")]
    Duplicate(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("tool timed out after {0}ms")]
    Timeout(u64),
    #[error("tool failed: {0}")]
    Failure(String),
}

impl ToolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolError::NotFound(_) | ToolError::InvalidArguments(_) => ErrorKind::InvalidArguments,
            ToolError::Duplicate(_) => ErrorKind::ConfigError,
            ToolError::Timeout(_) => ErrorKind::ToolTimeout,
            ToolError::Failure(_) => ErrorKind::ToolFailure,
        }
    }
}

/// Per-dispatch scope for `needs_task_scope` tools.
#[derive(Debug, Clone)]
pub struct ToolScope {
    pub task_id: String,
    pub agent_id: String,
}

/// A named callable exposed to agents.
///
/// Synchronous work runs inline on the invoking task loop; anything blocking
/// belongs in `spawn_blocking` inside the implementation. The registry wraps
/// every call with a timeout and catches errors, so implementations return
/// [`ToolError::Failure`] rather than panicking.
#[async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> ToolDescriptor;

    /// Executes the tool with validated, coerced arguments.
    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Wraps a plain function as a [`Tool`]; the function runs inline.
pub struct FnTool<F> {
    descriptor: ToolDescriptor,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    pub fn new(descriptor: ToolDescriptor, f: F) -> Self {
        Self { descriptor, f }
    }
}

#[async_trait]
impl<F> Tool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Result<Value, ToolError> + Send + Sync,
{
    fn descriptor(&self) -> ToolDescriptor {
        self.descriptor.clone()
    }

    async fn call(&self, args: Map<String, Value>) -> Result<Value, ToolError> {
        (self.f)(args)
    }
}
