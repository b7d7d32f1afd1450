//! Task model and status state machine.
//!
//! A [`Task`] is the whole interaction: prompt, config reference, transcript,
//! status, and progress counters. Status transitions are validated by
//! [`TaskStatus::can_transition_to`]; the executor refuses anything else, so
//! terminal statuses never change.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TaskFailure;
use crate::step::Step;

/// Task lifecycle status.
///
/// ```text
/// created ──start──▶ running ──step_ok──▶ running
///                          │
///                          ├─pause─▶ paused ──resume─▶ running
///                          ├─terminate / round cap─▶ completed
///                          ├─stop()─▶ stopped
///                          └─fatal─▶ failed
/// paused ──stop()──▶ stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Created, Running) => true,
            (Created, Stopped) => true,
            (Running, Running) => true,
            (Running, Paused) => true,
            (Running, Completed) | (Running, Failed) | (Running, Stopped) => true,
            (Paused, Running) => true,
            (Paused, Stopped) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "running" => Ok(TaskStatus::Running),
            "paused" => Ok(TaskStatus::Paused),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "stopped" => Ok(TaskStatus::Stopped),
            other => Err(format!("unknown task status: {}", other)),
        }
    }
}

/// Generates a short opaque task id (first segment of a v4 UUID).
pub fn short_task_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// The whole interaction: prompt, config reference, transcript, status.
///
/// A task exclusively owns its steps and workspace directory; the Team config
/// it references is shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    /// The user prompt this task was started with.
    pub description: String,
    /// Path or handle of the Team config the task runs under.
    pub config_ref: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub round_count: u32,
    pub max_rounds: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ordered transcript of completed agent turns. Append-only.
    #[serde(default)]
    pub history: Vec<Step>,
    /// Free-form metadata (BTreeMap for stable serialization).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    /// Per-task scratch directory, created on first start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_path: Option<PathBuf>,
    /// Set when the task reached `failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskFailure>,
}

impl Task {
    /// Creates a task in `created` state with a fresh short id.
    pub fn new(description: impl Into<String>, config_ref: impl Into<String>, max_rounds: u32) -> Self {
        let now = Utc::now();
        Self {
            task_id: short_task_id(),
            description: description.into(),
            config_ref: config_ref.into(),
            status: TaskStatus::Created,
            current_agent: None,
            round_count: 0,
            max_rounds,
            created_at: now,
            updated_at: now,
            history: Vec::new(),
            metadata: BTreeMap::new(),
            workspace_path: None,
            error: None,
        }
    }

    /// Transitions to `next`, stamping `updated_at`.
    ///
    /// Returns false (and leaves the task untouched) when the state machine
    /// forbids the transition.
    pub fn transition(&mut self, next: TaskStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    /// Appends a completed step, incrementing `round_count`.
    ///
    /// Panics in debug builds if the round cap would be exceeded; the executor
    /// checks the cap before every turn so this is unreachable in normal use.
    pub fn push_step(&mut self, step: Step) {
        debug_assert!(self.round_count < self.max_rounds);
        self.current_agent = Some(step.agent_name.clone());
        self.history.push(step);
        self.round_count += 1;
        self.updated_at = Utc::now();
    }

    /// The most recent step, if any.
    pub fn last_step(&self) -> Option<&Step> {
        self.history.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: terminal statuses admit no outgoing transitions.
    #[test]
    fn terminal_statuses_are_final() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Stopped] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Created,
                TaskStatus::Running,
                TaskStatus::Paused,
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Stopped,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    /// **Scenario**: the documented happy-path transitions are permitted.
    #[test]
    fn state_machine_permits_documented_paths() {
        assert!(TaskStatus::Created.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Paused));
        assert!(TaskStatus::Paused.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Paused.can_transition_to(TaskStatus::Stopped));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Created.can_transition_to(TaskStatus::Paused));
        assert!(!TaskStatus::Paused.can_transition_to(TaskStatus::Completed));
    }

    /// **Scenario**: transition() refuses forbidden moves and keeps the status.
    #[test]
    fn transition_refuses_forbidden_moves() {
        let mut task = Task::new("demo", "teams/demo.yaml", 5);
        assert!(!task.transition(TaskStatus::Paused));
        assert_eq!(task.status, TaskStatus::Created);
        assert!(task.transition(TaskStatus::Running));
        assert!(task.transition(TaskStatus::Completed));
        assert!(!task.transition(TaskStatus::Running));
        assert_eq!(task.status, TaskStatus::Completed);
    }

    /// **Scenario**: push_step increments round_count, sets current_agent,
    /// and bumps updated_at monotonically.
    #[test]
    fn push_step_updates_progress() {
        let mut task = Task::new("demo", "teams/demo.yaml", 5);
        let created = task.created_at;
        task.transition(TaskStatus::Running);
        task.push_step(Step::begin("research"));
        assert_eq!(task.round_count, 1);
        assert_eq!(task.current_agent.as_deref(), Some("research"));
        assert!(task.updated_at >= created);
    }

    /// **Scenario**: short task ids are 8 chars and unique across calls.
    #[test]
    fn short_task_ids_are_short_and_unique() {
        let a = short_task_id();
        let b = short_task_id();
        assert_eq!(a.len(), 8);
        assert_ne!(a, b);
    }

    /// **Scenario**: task status strings round-trip through FromStr.
    #[test]
    fn status_from_str_roundtrip() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Running,
            TaskStatus::Paused,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Stopped,
        ] {
            let parsed: TaskStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}
