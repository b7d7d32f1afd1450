//! Brain abstraction: streaming chat completions with function calling.
//!
//! The executor depends on the [`Brain`] trait instead of any concrete LLM
//! SDK. A Brain produces a channel of [`BrainChunk`]s (text deltas, tool-call
//! deltas, and a terminal finish marker); the agent turn loop consumes them,
//! assembling tool calls with [`ToolCallAssembler`].
//!
//! # Streaming
//!
//! Chunks flow through a bounded `tokio::sync::mpsc` channel. The consumer
//! owns termination: dropping the receiver abandons the stream, and
//! implementations must treat a send failure as a cancellation signal and
//! release the underlying connection.

mod assembler;
mod mock;

pub use assembler::{AssembledCall, ToolCallAssembler};
pub use mock::{MockBrain, ScriptedTurn};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::ErrorKind;
use crate::message::Message;

/// Why a completion stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of text.
    Stop,
    /// The model requested tool calls; assembled calls must be dispatched.
    ToolCalls,
    /// Output token limit reached; the text is partial.
    Length,
    /// Provider content filter cut the response.
    ContentFilter,
    /// Provider-side error mid-stream.
    Error,
}

/// Token usage for one completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrainUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Delta for one tool call from the stream.
///
/// Providers emit these in one of two shapes: every chunk carries the call id
/// (usually with an `index`), or only the first chunk of a call carries the
/// id and later chunks are argument deltas attributed to the most recently
/// opened call. [`ToolCallAssembler`] handles both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    /// Provider slot index, when the provider numbers concurrent calls.
    pub index: Option<u32>,
    /// Provider-assigned call id; may be present only on the opening chunk.
    pub call_id: Option<String>,
    /// Function name fragment.
    pub name: Option<String>,
    /// Raw JSON arguments fragment, appended in order.
    pub arguments_delta: String,
}

/// One element of the streamed completion.
#[derive(Debug, Clone)]
pub enum BrainChunk {
    /// Incremental assistant text.
    TextDelta { text: String },
    /// Incremental tool-call data.
    ToolCallDelta(ToolCallDelta),
    /// Terminal marker; no chunks follow it.
    Finish {
        reason: FinishReason,
        usage: Option<BrainUsage>,
    },
}

/// Errors from a Brain implementation.
#[derive(Debug, Clone, Error)]
pub enum BrainError {
    /// Network failure or rate limit; the executor retries with backoff.
    #[error("transient brain error: {0}")]
    Transient(String),
    /// Bad request or provider content policy; fails the task.
    #[error("permanent brain error: {0}")]
    Permanent(String),
    /// The prompt no longer fits the model context; the turn loop truncates
    /// the transcript slice and retries once.
    #[error("context overflow: {0}")]
    ContextOverflow(String),
    /// The stream ended without a finish chunk or produced malformed data.
    #[error("stream error: {0}")]
    Stream(String),
}

impl BrainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrainError::Transient(_) | BrainError::ContextOverflow(_) => ErrorKind::BrainTransient,
            BrainError::Permanent(_) => ErrorKind::BrainPermanent,
            BrainError::Stream(_) => ErrorKind::BrainTransient,
        }
    }
}

/// A receiver of streamed completion chunks.
///
/// Each item is a chunk or a mid-stream error; a `Finish` chunk (or an error)
/// is the last item a well-behaved Brain sends.
pub type ChunkStream = mpsc::Receiver<Result<BrainChunk, BrainError>>;

/// Default capacity of the chunk channel handed out by Brain implementations.
pub const CHUNK_CHANNEL_CAPACITY: usize = 64;

/// Streaming chat-completion capability.
///
/// `tools` carries function-calling schemas in the wire shape produced by
/// [`crate::tools::ToolRegistry::schemas`]; implementations that do not
/// support function calling ignore it.
///
/// **Interaction**: called once per Brain round by the agent turn loop;
/// concrete providers live outside this crate, tests use [`MockBrain`].
#[async_trait]
pub trait Brain: Send + Sync {
    /// Starts one streamed completion over `messages`.
    async fn stream(
        &self,
        messages: &[Message],
        tools: &[Value],
    ) -> Result<ChunkStream, BrainError>;
}
