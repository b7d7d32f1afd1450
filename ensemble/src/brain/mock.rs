//! Scripted Brain for tests and offline runs.
//!
//! [`MockBrain`] plays back a queue of [`ScriptedTurn`]s, one per `stream`
//! call, and records every request so tests can assert on the chat history
//! that was sent. When the script runs out it emits a plain "Done." text
//! turn, which also makes single-agent teams terminate naturally.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{
    Brain, BrainChunk, BrainError, BrainUsage, ChunkStream, FinishReason, ToolCallDelta,
    CHUNK_CHANNEL_CAPACITY,
};
use crate::message::Message;

/// One scripted Brain round: either an error before streaming starts, or a
/// sequence of chunks ending in a finish marker.
#[derive(Debug, Clone)]
pub struct ScriptedTurn {
    pre_error: Option<BrainError>,
    chunks: Vec<Result<BrainChunk, BrainError>>,
}

impl ScriptedTurn {
    /// A text reply streamed as a single delta, finishing with `stop`.
    pub fn text(content: impl Into<String>) -> Self {
        let content = content.into();
        Self::from_chunks(vec![
            BrainChunk::TextDelta { text: content },
            BrainChunk::Finish {
                reason: FinishReason::Stop,
                usage: Some(BrainUsage {
                    prompt_tokens: 10,
                    completion_tokens: 5,
                    total_tokens: 15,
                }),
            },
        ])
    }

    /// A single tool call streamed in the indexed pattern, finishing with
    /// `tool_calls`.
    pub fn tool_call(call_id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self::tool_calls(vec![(call_id.into(), name.into(), arguments)])
    }

    /// Several tool calls in one round, each streamed under its own index.
    pub fn tool_calls(calls: Vec<(String, String, Value)>) -> Self {
        let mut chunks = Vec::new();
        for (i, (call_id, name, arguments)) in calls.into_iter().enumerate() {
            chunks.push(BrainChunk::ToolCallDelta(ToolCallDelta {
                index: Some(i as u32),
                call_id: Some(call_id),
                name: Some(name),
                arguments_delta: arguments.to_string(),
            }));
        }
        chunks.push(BrainChunk::Finish {
            reason: FinishReason::ToolCalls,
            usage: Some(BrainUsage {
                prompt_tokens: 10,
                completion_tokens: 8,
                total_tokens: 18,
            }),
        });
        Self::from_chunks(chunks)
    }

    /// An arbitrary chunk sequence; the caller is responsible for the finish
    /// marker.
    pub fn from_chunks(chunks: Vec<BrainChunk>) -> Self {
        Self {
            pre_error: None,
            chunks: chunks.into_iter().map(Ok).collect(),
        }
    }

    /// Fails before any chunk is produced (connection-level error).
    pub fn fail(error: BrainError) -> Self {
        Self {
            pre_error: Some(error),
            chunks: Vec::new(),
        }
    }

    /// Emits `n` chunks of the script, then the given mid-stream error.
    pub fn fail_mid_stream(mut self, error: BrainError) -> Self {
        self.chunks.push(Err(error));
        self
    }

    /// Overrides the usage on the finish chunk.
    pub fn with_usage(mut self, prompt_tokens: u32, completion_tokens: u32) -> Self {
        for chunk in &mut self.chunks {
            if let Ok(BrainChunk::Finish { usage, .. }) = chunk {
                *usage = Some(BrainUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                });
            }
        }
        self
    }
}

/// Scripted [`Brain`]: plays one [`ScriptedTurn`] per `stream` call.
#[derive(Default)]
pub struct MockBrain {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockBrain {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends another scripted turn to the queue.
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.lock().unwrap().push_back(turn);
    }

    /// Every chat history this brain has been called with, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of `stream` calls made so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Brain for MockBrain {
    async fn stream(
        &self,
        messages: &[Message],
        _tools: &[Value],
    ) -> Result<ChunkStream, BrainError> {
        self.requests.lock().unwrap().push(messages.to_vec());

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text("Done."));

        if let Some(err) = turn.pre_error {
            return Err(err);
        }

        let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            for chunk in turn.chunks {
                // Receiver dropped means the caller abandoned the stream.
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
