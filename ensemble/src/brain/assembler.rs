//! Assembles streamed tool-call deltas into complete calls.
//!
//! Providers chunk tool calls in two patterns:
//!
//! 1. Every chunk carries the call id (and usually a slot `index`) plus a
//!    name/arguments fragment.
//! 2. Only the first chunk of a call carries the id; later chunks carry only
//!    argument fragments and belong to the most recently opened call.
//!
//! The assembler accumulates fragments per call in open order. On finish the
//! argument strings are JSON-parsed; a parse failure yields an `Err` slot so
//! the turn loop can record a failed tool_result instead of aborting.

use serde_json::Value;
use tracing::trace;

use super::ToolCallDelta;
use crate::step::ToolCall;

/// One assembled call: parsed arguments on success, the parse error message
/// (with the raw argument string) on failure.
#[derive(Debug, Clone)]
pub struct AssembledCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Result<Value, String>,
}

impl AssembledCall {
    /// Converts a successfully parsed call into a [`ToolCall`].
    pub fn into_tool_call(self) -> Option<ToolCall> {
        match self.arguments {
            Ok(arguments) => Some(ToolCall {
                call_id: self.call_id,
                name: self.name,
                arguments,
            }),
            Err(_) => None,
        }
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    call_id: String,
    name: String,
    arguments: String,
}

/// Incremental tool-call assembler. Feed every [`ToolCallDelta`] in stream
/// order, then call [`finish`](ToolCallAssembler::finish) when the stream
/// reports `finish_reason == tool_calls`.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    calls: Vec<PartialCall>,
    /// Provider slot index -> position in `calls`.
    by_index: std::collections::HashMap<u32, usize>,
    /// Call id -> position in `calls`.
    by_id: std::collections::HashMap<String, usize>,
    /// Position of the most recently opened call, for id-less deltas.
    last_opened: Option<usize>,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no tool-call data has been seen.
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Number of calls opened so far.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    /// Consumes one delta, opening a new call or extending an existing one.
    pub fn push(&mut self, delta: &ToolCallDelta) {
        let slot = self.resolve_slot(delta);
        let call = &mut self.calls[slot];
        if let Some(id) = &delta.call_id {
            if !id.is_empty() && call.call_id.is_empty() {
                call.call_id = id.clone();
                self.by_id.insert(id.clone(), slot);
            }
        }
        if let Some(name) = &delta.name {
            call.name.push_str(name);
        }
        call.arguments.push_str(&delta.arguments_delta);
    }

    /// Finds or creates the accumulator slot a delta belongs to.
    ///
    /// Resolution order: provider index, known call id, new call id (opens a
    /// slot), otherwise the most recently opened call. An id-less delta with
    /// no open call opens an anonymous slot so its fragments are not lost.
    fn resolve_slot(&mut self, delta: &ToolCallDelta) -> usize {
        if let Some(index) = delta.index {
            if let Some(&slot) = self.by_index.get(&index) {
                return slot;
            }
            let slot = self.open_slot(delta.call_id.as_deref());
            self.by_index.insert(index, slot);
            return slot;
        }
        if let Some(id) = delta.call_id.as_deref().filter(|id| !id.is_empty()) {
            if let Some(&slot) = self.by_id.get(id) {
                return slot;
            }
            return self.open_slot(Some(id));
        }
        match self.last_opened {
            Some(slot) => slot,
            None => self.open_slot(None),
        }
    }

    fn open_slot(&mut self, call_id: Option<&str>) -> usize {
        let slot = self.calls.len();
        let call_id = call_id.unwrap_or_default().to_string();
        if !call_id.is_empty() {
            self.by_id.insert(call_id.clone(), slot);
        }
        self.calls.push(PartialCall {
            call_id,
            name: String::new(),
            arguments: String::new(),
        });
        self.last_opened = Some(slot);
        trace!(slot, "opened tool call accumulator");
        slot
    }

    /// Parses every accumulated call, in open order.
    ///
    /// Empty argument strings parse as `{}` (providers omit arguments for
    /// zero-parameter tools). Calls without a provider id get a synthetic
    /// `call_<n>` id so tool_results can still be correlated.
    pub fn finish(self) -> Vec<AssembledCall> {
        self.calls
            .into_iter()
            .enumerate()
            .map(|(i, partial)| {
                let call_id = if partial.call_id.is_empty() {
                    format!("call_{}", i)
                } else {
                    partial.call_id
                };
                let raw = partial.arguments.trim();
                let arguments = if raw.is_empty() {
                    Ok(Value::Object(serde_json::Map::new()))
                } else {
                    serde_json::from_str::<Value>(raw).map_err(|e| {
                        format!("arguments are not valid JSON ({}): {}", e, raw)
                    })
                };
                AssembledCall {
                    call_id,
                    name: partial.name,
                    arguments,
                }
            })
            .collect()
    }
}
