//! Step types: the record of one completed agent turn.
//!
//! A [`Step`] is an ordered list of [`StepPart`]s (text, tool_call,
//! tool_result) plus timing, token usage, and the [`ToolInvocation`] audit
//! records. Steps are append-only once written to the transcript; nothing in
//! the crate mutates a past step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;

/// A fully assembled tool call: provider id, tool name, parsed JSON arguments.
///
/// **Interaction**: produced by [`crate::brain::ToolCallAssembler`] from
/// streamed deltas; consumed by the tool registry at dispatch and recorded as
/// a `tool_call` step part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, used to correlate the tool_result.
    pub call_id: String,
    /// Tool name as registered.
    pub name: String,
    /// Parsed JSON arguments object.
    pub arguments: Value,
}

/// One element of a step, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPart {
    /// Assistant text (may be empty when the model went straight to tools).
    Text { text: String },
    /// A tool call the model requested.
    ToolCall { call: ToolCall },
    /// The result fed back for a tool call, matched by `call_id`.
    ToolResult {
        call_id: String,
        tool_name: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// Structured error attached to a failed tool invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Audit record for one tool dispatch within a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
    /// Serialized tool return value on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Classified error on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationError>,
    pub duration_ms: u64,
    pub agent_name: String,
}

/// One completed agent turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub agent_name: String,
    pub parts: Vec<StepPart>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    #[serde(default)]
    pub tokens_in: u32,
    #[serde(default)]
    pub tokens_out: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_invocations: Vec<ToolInvocation>,
    /// Non-fatal conditions recorded during the turn (length cutoffs,
    /// content filters, tool-round cap).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Step {
    /// Starts an empty step for `agent_name` timestamped now.
    pub fn begin(agent_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            agent_name: agent_name.into(),
            parts: Vec::new(),
            started_at: now,
            finished_at: now,
            tokens_in: 0,
            tokens_out: 0,
            tool_invocations: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Stamps the finish time; call once when the turn ends.
    pub fn finish(&mut self) {
        self.finished_at = Utc::now();
    }

    /// Concatenated text of all `Text` parts, used by the router for
    /// natural-language handoff matching.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let StepPart::Text { text } = part {
                if !out.is_empty() && !text.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    /// True when every `tool_call` part has a matching later `tool_result`.
    pub fn tool_calls_resolved(&self) -> bool {
        for (i, part) in self.parts.iter().enumerate() {
            if let StepPart::ToolCall { call } = part {
                let resolved = self.parts[i + 1..].iter().any(|p| {
                    matches!(p, StepPart::ToolResult { call_id, .. } if *call_id == call.call_id)
                });
                if !resolved {
                    return false;
                }
            }
        }
        true
    }
}
