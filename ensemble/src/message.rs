//! Chat message types sent to the Brain.
//!
//! Roles: System (rendered agent prompt, first in the list), User, Assistant
//! (may carry tool calls), and Tool (a tool result correlated by `call_id`).
//! The agent turn loop builds these from the task transcript; see
//! [`crate::agent`] for the assembly rules.

use serde::{Deserialize, Serialize};

use crate::step::ToolCall;

/// A single message in the conversation sent to the Brain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    /// System prompt; the rendered agent template, placed first.
    System { content: String },
    /// User input (the task prompt, or a routed peer message).
    User { content: String },
    /// Model reply; `tool_calls` is non-empty when the model requested tools.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool invocation, correlated to the assistant's request.
    Tool {
        call_id: String,
        name: String,
        content: String,
    },
}

impl Message {
    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Creates an assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Creates an assistant message carrying tool calls.
    pub fn assistant_with_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls,
        }
    }

    /// Creates a tool-result message for `call_id`.
    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Text content of the message, regardless of role.
    pub fn content(&self) -> &str {
        match self {
            Message::System { content }
            | Message::User { content }
            | Message::Assistant { content, .. }
            | Message::Tool { content, .. } => content,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: constructors produce the correct role variant with content.
    #[test]
    fn message_constructors() {
        assert!(matches!(Message::system("s"), Message::System { content } if content == "s"));
        assert!(matches!(Message::user("u"), Message::User { content } if content == "u"));
        assert!(
            matches!(Message::assistant("a"), Message::Assistant { content, tool_calls } if content == "a" && tool_calls.is_empty())
        );
        let tool = Message::tool("c1", "get_weather", "sunny");
        assert_eq!(tool.content(), "sunny");
    }

    /// **Scenario**: a tool message round-trips through serde with role tagging.
    #[test]
    fn tool_message_serde_roundtrip() {
        let msg = Message::tool("call_9", "db_query", "3 rows");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["call_id"], "call_9");
        let back: Message = serde_json::from_value(json).unwrap();
        assert!(matches!(back, Message::Tool { call_id, .. } if call_id == "call_9"));
    }

    /// **Scenario**: empty tool_calls are omitted from assistant serialization.
    #[test]
    fn assistant_omits_empty_tool_calls() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
    }
}
