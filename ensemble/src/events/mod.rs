//! Event types and pattern matching for the in-process bus.
//!
//! Event type names are dotted snake_case strings on the wire
//! (`task.step_completed`, `memory.added`, ...). Subscribers match by exact
//! name or a simple glob on the dotted prefix (`task.*`, or `*` for all).

mod bus;

pub use bus::{AutoEmitRule, EventBus, Subscription, DEFAULT_QUEUE_CAPACITY};

use chrono::{DateTime, Utc};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Closed set of event types, plus `Custom` for auto-emitted events derived
/// from memory writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    TaskCreated,
    TaskStarted,
    TaskStepCompleted,
    TaskPaused,
    TaskResumed,
    TaskCompleted,
    TaskFailed,
    TaskStopped,
    AgentTurnStarted,
    AgentTurnFinished,
    ToolInvoked,
    ToolSucceeded,
    ToolFailed,
    MemoryAdded,
    MemorySearched,
    HandoffRouted,
    /// Auto-emitted event named by a team's auto_emit_patterns rule.
    Custom(String),
}

impl EventType {
    /// Dotted wire name.
    pub fn name(&self) -> String {
        match self {
            EventType::TaskCreated => "task.created".into(),
            EventType::TaskStarted => "task.started".into(),
            EventType::TaskStepCompleted => "task.step_completed".into(),
            EventType::TaskPaused => "task.paused".into(),
            EventType::TaskResumed => "task.resumed".into(),
            EventType::TaskCompleted => "task.completed".into(),
            EventType::TaskFailed => "task.failed".into(),
            EventType::TaskStopped => "task.stopped".into(),
            EventType::AgentTurnStarted => "agent.turn_started".into(),
            EventType::AgentTurnFinished => "agent.turn_finished".into(),
            EventType::ToolInvoked => "tool.invoked".into(),
            EventType::ToolSucceeded => "tool.succeeded".into(),
            EventType::ToolFailed => "tool.failed".into(),
            EventType::MemoryAdded => "memory.added".into(),
            EventType::MemorySearched => "memory.searched".into(),
            EventType::HandoffRouted => "handoff.routed".into(),
            EventType::Custom(name) => name.clone(),
        }
    }

    /// Parses a wire name; unknown names become `Custom`.
    pub fn parse(name: &str) -> Self {
        match name {
            "task.created" => EventType::TaskCreated,
            "task.started" => EventType::TaskStarted,
            "task.step_completed" => EventType::TaskStepCompleted,
            "task.paused" => EventType::TaskPaused,
            "task.resumed" => EventType::TaskResumed,
            "task.completed" => EventType::TaskCompleted,
            "task.failed" => EventType::TaskFailed,
            "task.stopped" => EventType::TaskStopped,
            "agent.turn_started" => EventType::AgentTurnStarted,
            "agent.turn_finished" => EventType::AgentTurnFinished,
            "tool.invoked" => EventType::ToolInvoked,
            "tool.succeeded" => EventType::ToolSucceeded,
            "tool.failed" => EventType::ToolFailed,
            "memory.added" => EventType::MemoryAdded,
            "memory.searched" => EventType::MemorySearched,
            "handoff.routed" => EventType::HandoffRouted,
            other => EventType::Custom(other.to_string()),
        }
    }

    /// Whether this type matches a subscription pattern: exact name,
    /// `prefix.*`, or `*`.
    pub fn matches(&self, pattern: &str) -> bool {
        if pattern == "*" {
            return true;
        }
        let name = self.name();
        if pattern == name {
            return true;
        }
        if let Some(prefix) = pattern.strip_suffix(".*") {
            return name
                .strip_prefix(prefix)
                .map(|rest| rest.starts_with('.'))
                .unwrap_or(false);
        }
        false
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("empty event type"));
        }
        Ok(EventType::parse(&s))
    }
}

/// One event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Component that published the event (`executor`, `memory`, ...).
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, source: impl Into<String>) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().simple().to_string()[..12].to_string(),
            event_type,
            source: source.into(),
            task_id: None,
            timestamp: Utc::now(),
            payload: Map::new(),
        }
    }

    pub fn for_task(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}
