//! Error taxonomy for the orchestrator.
//!
//! Each subsystem defines its own `thiserror` enum (see [`crate::brain::BrainError`],
//! [`crate::tools::ToolError`], [`crate::memory::MemoryError`],
//! [`crate::session::SessionError`], [`crate::router::RouteError`],
//! [`crate::team::TeamError`]). This module defines the closed, serializable
//! [`ErrorKind`] set those errors are classified into when a failure has to
//! cross a persistence or tool-result boundary, plus [`TaskFailure`], the
//! record stored on a failed task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed classification of every failure the executor can observe.
///
/// Persisted with failed sessions and embedded in error tool_results, so the
/// wire names are stable snake_case strings.
///
/// **Interaction**: produced by the `kind()` methods on the subsystem error
/// enums; consumed by `TaskExecutor` to pick a recovery path (feed back to
/// the Brain, retry, or fail the task).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Tool dispatch rejected the arguments (unknown key, missing required key,
    /// uncoercible type, or reserved scope key on an unscoped tool).
    InvalidArguments,
    /// Tool call exceeded its timeout; partial state was discarded.
    ToolTimeout,
    /// The tool callable itself returned an error.
    ToolFailure,
    /// Assembled tool-call arguments were not valid JSON.
    MalformedToolArguments,
    /// Transient Brain failure (network, rate limit). Retried with backoff.
    BrainTransient,
    /// Permanent Brain failure (bad request, content filter). Fails the task.
    BrainPermanent,
    /// Tool-call rounds exceeded the per-turn cap.
    ToolLoop,
    /// A turn exceeded its wall-clock budget.
    TurnTimeout,
    /// The router could not produce a next agent.
    RoutingFailure,
    /// Session store I/O failed (after one retry).
    SessionIoError,
    /// Memory provider failed; non-fatal, the operation returns empty.
    MemoryError,
    /// Team configuration could not be loaded; the task never starts.
    ConfigError,
}

impl ErrorKind {
    /// Returns true when the executor should retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::BrainTransient)
    }

    /// Returns true when the failure should be handed back to the Brain as an
    /// error tool_result rather than terminating anything.
    pub fn feeds_back_to_brain(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidArguments
                | ErrorKind::ToolTimeout
                | ErrorKind::ToolFailure
                | ErrorKind::MalformedToolArguments
        )
    }

    /// Stable wire name, identical to the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArguments => "invalid_arguments",
            ErrorKind::ToolTimeout => "tool_timeout",
            ErrorKind::ToolFailure => "tool_failure",
            ErrorKind::MalformedToolArguments => "malformed_tool_arguments",
            ErrorKind::BrainTransient => "brain_transient",
            ErrorKind::BrainPermanent => "brain_permanent",
            ErrorKind::ToolLoop => "tool_loop",
            ErrorKind::TurnTimeout => "turn_timeout",
            ErrorKind::RoutingFailure => "routing_failure",
            ErrorKind::SessionIoError => "session_io_error",
            ErrorKind::MemoryError => "memory_error",
            ErrorKind::ConfigError => "config_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error record persisted on a task that reached `failed`.
///
/// Exposed to callers via `get` as `{status: "failed", error: {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Agent that was acting when the failure occurred, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_agent: Option<String>,
    /// Round counter at the time of failure.
    #[serde(default)]
    pub last_round: u32,
}

impl TaskFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            last_agent: None,
            last_round: 0,
        }
    }

    pub fn at(mut self, agent: Option<&str>, round: u32) -> Self {
        self.last_agent = agent.map(str::to_string);
        self.last_round = round;
        self
    }
}

/// Top-level executor error: a classified failure with its message.
///
/// `TaskExecutor` converts every subsystem error into this before deciding
/// between retry, Brain feedback, and task failure.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn into_failure(self, agent: Option<&str>, round: u32) -> TaskFailure {
        TaskFailure::new(self.kind, self.message).at(agent, round)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: ErrorKind serializes to the documented snake_case wire names.
    #[test]
    fn error_kind_wire_names_are_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MalformedToolArguments).unwrap();
        assert_eq!(json, "\"malformed_tool_arguments\"");
        let back: ErrorKind = serde_json::from_str("\"tool_timeout\"").unwrap();
        assert_eq!(back, ErrorKind::ToolTimeout);
    }

    /// **Scenario**: Display matches the serde representation for every variant.
    #[test]
    fn error_kind_display_matches_serde() {
        for kind in [
            ErrorKind::InvalidArguments,
            ErrorKind::ToolTimeout,
            ErrorKind::ToolFailure,
            ErrorKind::MalformedToolArguments,
            ErrorKind::BrainTransient,
            ErrorKind::BrainPermanent,
            ErrorKind::ToolLoop,
            ErrorKind::TurnTimeout,
            ErrorKind::RoutingFailure,
            ErrorKind::SessionIoError,
            ErrorKind::MemoryError,
            ErrorKind::ConfigError,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json.as_str().unwrap(), kind.as_str());
        }
    }

    /// **Scenario**: Only BrainTransient is retryable; dispatch-level failures feed back to the Brain.
    #[test]
    fn recovery_classification() {
        assert!(ErrorKind::BrainTransient.is_retryable());
        assert!(!ErrorKind::BrainPermanent.is_retryable());
        assert!(ErrorKind::ToolFailure.feeds_back_to_brain());
        assert!(ErrorKind::ToolTimeout.feeds_back_to_brain());
        assert!(!ErrorKind::RoutingFailure.feeds_back_to_brain());
    }

    /// **Scenario**: TaskFailure round-trips through serde with agent context.
    #[test]
    fn task_failure_roundtrip() {
        let failure = TaskFailure::new(ErrorKind::BrainPermanent, "content filtered")
            .at(Some("writer"), 3);
        let json = serde_json::to_string(&failure).unwrap();
        let back: TaskFailure = serde_json::from_str(&json).unwrap();
        assert_eq!(back, failure);
        assert_eq!(back.last_agent.as_deref(), Some("writer"));
        assert_eq!(back.last_round, 3);
    }
}
