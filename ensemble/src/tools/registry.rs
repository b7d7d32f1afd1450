//! Tool registry: registration, schema generation, argument normalization,
//! coercion, and timed dispatch.
//!
//! Argument payloads arrive from the Brain in several shapes across
//! providers: a direct map, a nested `{"args": {...}}`, a nested
//! `{"kwargs": {...}}`, the combined `{"args": [...], "kwargs": {...}}`, or
//! a double-encoded JSON string. [`ToolRegistry::invoke`] normalizes all of
//! these to one flat map before validating against the descriptor.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};

use super::{
    Tool, ToolDescriptor, ToolError, ToolScope, RESERVED_AGENT_ID, RESERVED_TASK_ID,
};
use crate::step::{InvocationError, ToolInvocation};

/// Default per-call timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds named tools and dispatches calls against their descriptors.
///
/// The registry is passed explicitly into Team construction; tests provide
/// isolated registries. Interior locking keeps registration usable from any
/// context while dispatch shares the registry behind `Arc`.
pub struct ToolRegistry {
    inner: RwLock<Inner>,
    timeout: Duration,
}

struct Inner {
    tools: HashMap<String, Arc<dyn Tool>>,
    /// Registration order, for `list()`.
    order: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_TOOL_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: RwLock::new(Inner {
                tools: HashMap::new(),
                order: Vec::new(),
            }),
            timeout,
        }
    }

    /// Registers a tool. Re-registering the same name fails with
    /// [`ToolError::Duplicate`]; use [`register_overwrite`](Self::register_overwrite)
    /// to replace. Missing descriptions are warnings, not errors.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let descriptor = tool.descriptor();
        for warning in descriptor.completeness_warnings() {
            warn!(tool = %descriptor.name, "{}", warning);
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if inner.tools.contains_key(&descriptor.name) {
            return Err(ToolError::Duplicate(descriptor.name));
        }
        inner.order.push(descriptor.name.clone());
        inner.tools.insert(descriptor.name, tool);
        Ok(())
    }

    /// Registers a tool, replacing any existing registration of the name.
    pub fn register_overwrite(&self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        for warning in descriptor.completeness_warnings() {
            warn!(tool = %descriptor.name, "{}", warning);
        }
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.tools.contains_key(&descriptor.name) {
            inner.order.push(descriptor.name.clone());
        }
        inner.tools.insert(descriptor.name, tool);
    }

    /// Registered tool names, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.inner.read().expect("registry lock poisoned").order.clone()
    }

    /// Descriptor of a registered tool.
    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .tools
            .get(name)
            .map(|t| t.descriptor())
    }

    /// Function-calling schemas for the named tools, in allowlist order.
    /// Unknown names are skipped with a warning (tolerant loading).
    pub fn schemas(&self, allowlist: &[String]) -> Vec<Value> {
        let inner = self.inner.read().expect("registry lock poisoned");
        let mut out = Vec::with_capacity(allowlist.len());
        for name in allowlist {
            match inner.tools.get(name) {
                Some(tool) => out.push(tool.descriptor().function_schema()),
                None => warn!(tool = %name, "allowlisted tool is not registered; skipping schema"),
            }
        }
        out
    }

    /// Validates, coerces, and dispatches one call, returning the tool's
    /// value or a classified error. Never panics on tool failure.
    pub async fn invoke(
        &self,
        name: &str,
        arguments: Value,
        scope: Option<&ToolScope>,
    ) -> Result<Value, ToolError> {
        let tool = {
            let inner = self.inner.read().expect("registry lock poisoned");
            inner
                .tools
                .get(name)
                .cloned()
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?
        };
        let descriptor = tool.descriptor();
        let args = prepare_arguments(&descriptor, arguments, scope)?;

        debug!(tool = %name, "dispatching tool call");
        let timeout_ms = self.timeout.as_millis() as u64;
        match tokio::time::timeout(self.timeout, tool.call(args)).await {
            Ok(Ok(value)) => {
                trace!(tool = %name, "tool call succeeded");
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(tool = %name, error = %e, "tool call failed");
                Err(e)
            }
            Err(_) => {
                warn!(tool = %name, timeout_ms, "tool call timed out; discarding partial state");
                Err(ToolError::Timeout(timeout_ms))
            }
        }
    }

    /// Like [`invoke`](Self::invoke) but returns the full audit record the
    /// turn loop appends to the step.
    pub async fn invoke_recorded(
        &self,
        call_id: &str,
        name: &str,
        arguments: Value,
        scope: Option<&ToolScope>,
        agent_name: &str,
    ) -> ToolInvocation {
        let started = Instant::now();
        let result = self.invoke(name, arguments.clone(), scope).await;
        let duration_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(value) => ToolInvocation {
                call_id: call_id.to_string(),
                tool_name: name.to_string(),
                arguments,
                result: Some(value),
                error: None,
                duration_ms,
                agent_name: agent_name.to_string(),
            },
            Err(e) => ToolInvocation {
                call_id: call_id.to_string(),
                tool_name: name.to_string(),
                arguments,
                result: None,
                error: Some(InvocationError {
                    kind: e.kind(),
                    message: e.to_string(),
                }),
                duration_ms,
                agent_name: agent_name.to_string(),
            },
        }
    }
}

/// Normalizes, validates against the descriptor, coerces types, and injects
/// the task scope.
fn prepare_arguments(
    descriptor: &ToolDescriptor,
    arguments: Value,
    scope: Option<&ToolScope>,
) -> Result<Map<String, Value>, ToolError> {
    let mut args = normalize_arguments(arguments)?;

    // Reserved scope keys are only permitted on tools declared for them.
    if !descriptor.needs_task_scope
        && (args.contains_key(RESERVED_TASK_ID) || args.contains_key(RESERVED_AGENT_ID))
    {
        return Err(ToolError::InvalidArguments(format!(
            "tool '{}' does not accept the reserved keys '{}'/'{}'",
            descriptor.name, RESERVED_TASK_ID, RESERVED_AGENT_ID
        )));
    }

    for key in args.keys() {
        let reserved = key == RESERVED_TASK_ID || key == RESERVED_AGENT_ID;
        if !reserved && descriptor.find_param(key).is_none() {
            return Err(ToolError::InvalidArguments(format!(
                "unknown argument '{}' for tool '{}'",
                key, descriptor.name
            )));
        }
    }

    for param in &descriptor.params {
        if param.name == RESERVED_TASK_ID || param.name == RESERVED_AGENT_ID {
            continue;
        }
        match args.get(&param.name) {
            Some(value) => {
                let coerced = coerce(param.kind, value).map_err(|why| {
                    ToolError::InvalidArguments(format!(
                        "argument '{}' of tool '{}': {}",
                        param.name, descriptor.name, why
                    ))
                })?;
                args.insert(param.name.clone(), coerced);
            }
            None if param.required => {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required argument '{}' for tool '{}'",
                    param.name, descriptor.name
                )));
            }
            None => {}
        }
    }

    if descriptor.needs_task_scope {
        let scope = scope.ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "tool '{}' needs task scope but none was provided",
                descriptor.name
            ))
        })?;
        args.insert(
            RESERVED_TASK_ID.to_string(),
            Value::String(scope.task_id.clone()),
        );
        args.insert(
            RESERVED_AGENT_ID.to_string(),
            Value::String(scope.agent_id.clone()),
        );
    }

    Ok(args)
}

/// Flattens the provider argument shapes to one map.
fn normalize_arguments(arguments: Value) -> Result<Map<String, Value>, ToolError> {
    match arguments {
        Value::Null => Ok(Map::new()),
        Value::String(s) => {
            // Double-encoded arguments: parse once and normalize the result.
            let parsed: Value = serde_json::from_str(&s).map_err(|_| {
                ToolError::InvalidArguments(
                    "arguments must be a JSON object, got a bare string".into(),
                )
            })?;
            if parsed.is_string() {
                return Err(ToolError::InvalidArguments(
                    "arguments must be a JSON object, got a nested string".into(),
                ));
            }
            normalize_arguments(parsed)
        }
        Value::Object(map) => {
            let has_args = map.contains_key("args");
            let has_kwargs = map.contains_key("kwargs");
            let only_wrappers = map
                .keys()
                .all(|k| k == "args" || k == "kwargs");
            if (has_args || has_kwargs) && only_wrappers {
                let mut out = Map::new();
                if let Some(kwargs) = map.get("kwargs") {
                    match kwargs {
                        Value::Object(m) => out.extend(m.clone()),
                        Value::Null => {}
                        _ => {
                            return Err(ToolError::InvalidArguments(
                                "'kwargs' must be an object".into(),
                            ))
                        }
                    }
                }
                if let Some(args) = map.get("args") {
                    match args {
                        Value::Object(m) => out.extend(m.clone()),
                        Value::Array(items) if items.is_empty() => {}
                        Value::Null => {}
                        Value::Array(_) => {
                            return Err(ToolError::InvalidArguments(
                                "positional arguments are not supported; pass named arguments".into(),
                            ))
                        }
                        _ => {
                            return Err(ToolError::InvalidArguments(
                                "a lone positional argument is not supported; pass named arguments"
                                    .into(),
                            ))
                        }
                    }
                }
                Ok(out)
            } else {
                Ok(map)
            }
        }
        _ => Err(ToolError::InvalidArguments(
            "arguments must be a JSON object".into(),
        )),
    }
}

/// Coerces a value to the declared parameter kind.
fn coerce(kind: super::ParamKind, value: &Value) -> Result<Value, String> {
    use super::ParamKind::*;
    match (kind, value) {
        (String, Value::String(_)) => Ok(value.clone()),
        (String, Value::Number(n)) => Ok(Value::String(n.to_string())),
        (String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (Integer, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::from(i))
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 {
                    Ok(Value::from(f as i64))
                } else {
                    Err(format!("expected an integer, got {}", f))
                }
            } else {
                Err("expected an integer".into())
            }
        }
        (Integer, Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("expected an integer, got '{}'", s)),
        (Number, Value::Number(_)) => Ok(value.clone()),
        (Number, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| format!("expected a number, got '{}'", s)),
        (Boolean, Value::Bool(_)) => Ok(value.clone()),
        (Boolean, Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            other => Err(format!("expected a boolean, got '{}'", other)),
        },
        (Object, Value::Object(_)) => Ok(value.clone()),
        (Object, Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_object)
            .ok_or_else(|| format!("expected an object, got '{}'", s)),
        (Array, Value::Array(_)) => Ok(value.clone()),
        (Array, Value::String(s)) => serde_json::from_str::<Value>(s)
            .ok()
            .filter(Value::is_array)
            .ok_or_else(|| format!("expected an array, got '{}'", s)),
        (kind, other) => Err(format!(
            "expected {}, got {}",
            kind.json_type(),
            type_name(other)
        )),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
