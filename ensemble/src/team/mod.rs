//! Declarative Team configuration.
//!
//! A team binds agents, tools, handoff rules, memory, and event rules into
//! one YAML document (`config/teams/*.yaml`). Loading is tolerant: unknown
//! tool names and invalid handoff targets produce warnings, not failures,
//! so a config authored against a larger tool set still runs.

mod loader;

pub use loader::{load_team, team_from_yaml};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::error::ErrorKind;
use crate::events::AutoEmitRule;
use crate::tools::ToolRegistry;

/// Default round cap shared by all agents of a team.
pub const DEFAULT_MAX_ROUNDS: u32 = 20;
/// Default termination marker an agent can emit to close the task.
pub const DEFAULT_TERMINATION_MARKER: &str = "TERMINATE";

/// How the executor advances the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Run until termination, round cap, cancellation, or failure.
    #[default]
    Autonomous,
    /// Pause after every step until explicitly resumed.
    StepThrough,
}

/// LLM settings for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrainSettings {
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_true")]
    pub supports_function_calls: bool,
}

fn default_true() -> bool {
    true
}

impl Default for BrainSettings {
    fn default() -> Self {
        Self {
            provider: "mock".into(),
            model: "scripted".into(),
            temperature: None,
            max_tokens: None,
            supports_function_calls: true,
        }
    }
}

/// One declared agent role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub prompt_template: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub brain: BrainSettings,
    /// Strict prompt rendering: missing template variables are an error
    /// instead of the empty string.
    #[serde(default)]
    pub strict_prompt: bool,
}

/// Kind of a declared tool. `native` tools are Rust callables registered at
/// startup; `command` tools shell out (implementations live outside the
/// core); `builtin` names one of the crate's bundled tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSourceKind {
    Builtin,
    Native,
    Command,
}

/// One declared tool reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    pub name: String,
    #[serde(default = "default_tool_kind", rename = "type")]
    pub kind: ToolSourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

fn default_tool_kind() -> ToolSourceKind {
    ToolSourceKind::Builtin
}

/// Explicit handoff rule: from one agent to another, optionally gated by a
/// condition over the last step's text (plain substring, or `/regex/`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRule {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Natural-language routing pattern: regex over the last step's text mapped
/// to a target agent. Ordered; the first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffPattern {
    pub pattern: String,
    pub to: String,
}

/// Memory backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemorySettings {
    /// `in_memory`, `file`, or `none`.
    pub backend: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

/// Event bus settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventSettings {
    #[serde(default)]
    pub auto_emit_patterns: Vec<AutoEmitRule>,
}

/// The parsed team document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub tools: Vec<ToolConfig>,
    #[serde(default)]
    pub handoffs: Vec<HandoffRule>,
    #[serde(default)]
    pub handoff_patterns: Vec<HandoffPattern>,
    #[serde(default = "default_termination_markers")]
    pub termination_markers: Vec<String>,
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemorySettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<EventSettings>,
}

fn default_max_rounds() -> u32 {
    DEFAULT_MAX_ROUNDS
}

fn default_termination_markers() -> Vec<String> {
    vec![DEFAULT_TERMINATION_MARKER.to_string()]
}

/// Errors loading a team config. The task never starts on these.
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse team config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid team config: {0}")]
    Invalid(String),
}

impl TeamError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ConfigError
    }
}

/// A loaded team: parsed config, its snapshot hash, and load-time warnings.
///
/// Shared read-only among the tasks that reference it.
#[derive(Debug, Clone)]
pub struct Team {
    pub config: TeamConfig,
    /// Hex SHA-256 of the canonical config, persisted with each session for
    /// drift detection on resume.
    pub config_hash: String,
    /// Tolerant-load findings: invalid handoff targets, duplicate names.
    pub warnings: Vec<String>,
}

impl Team {
    /// Wraps a parsed config, validating it and computing the hash.
    pub fn new(config: TeamConfig) -> Result<Self, TeamError> {
        if config.agents.is_empty() {
            return Err(TeamError::Invalid("team declares no agents".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for agent in &config.agents {
            if !seen.insert(agent.name.as_str()) {
                return Err(TeamError::Invalid(format!(
                    "duplicate agent name '{}'",
                    agent.name
                )));
            }
        }
        let warnings = validate(&config);
        for w in &warnings {
            warn!(team = %config.name, "{}", w);
        }
        let config_hash = loader::config_hash(&config)?;
        Ok(Self {
            config,
            config_hash,
            warnings,
        })
    }

    pub fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.config.agents.iter().find(|a| a.name == name)
    }

    /// Agent names in declaration order.
    pub fn agent_names(&self) -> Vec<&str> {
        self.config.agents.iter().map(|a| a.name.as_str()).collect()
    }

    /// Declared handoff targets reachable from `agent` (explicit rules with a
    /// valid target only).
    pub fn handoff_targets(&self, agent: &str) -> Vec<&str> {
        self.config
            .handoffs
            .iter()
            .filter(|h| h.from == agent && self.agent(&h.to).is_some())
            .map(|h| h.to.as_str())
            .collect()
    }

    /// The agent's tool allowlist restricted to tools actually present in
    /// `registry`. Unknown entries warn and are dropped (empty slot).
    pub fn effective_tools(&self, agent: &str, registry: &ToolRegistry) -> Vec<String> {
        let Some(agent_cfg) = self.agent(agent) else {
            return Vec::new();
        };
        let registered: std::collections::HashSet<String> =
            registry.list().into_iter().collect();
        let mut out = Vec::new();
        for name in &agent_cfg.tools {
            if registered.contains(name) {
                out.push(name.clone());
            } else {
                warn!(team = %self.config.name, agent = %agent, tool = %name,
                    "agent references unregistered tool; dropping from allowlist");
            }
        }
        out
    }
}

/// Non-fatal config findings.
fn validate(config: &TeamConfig) -> Vec<String> {
    let names: std::collections::HashSet<&str> =
        config.agents.iter().map(|a| a.name.as_str()).collect();
    let mut warnings = Vec::new();
    for rule in &config.handoffs {
        if !names.contains(rule.from.as_str()) {
            warnings.push(format!(
                "handoff rule from unknown agent '{}'; rule will be skipped",
                rule.from
            ));
        }
        if !names.contains(rule.to.as_str()) {
            warnings.push(format!(
                "handoff rule targets unknown agent '{}'; rule will be skipped",
                rule.to
            ));
        }
    }
    for pattern in &config.handoff_patterns {
        if !names.contains(pattern.to.as_str()) {
            warnings.push(format!(
                "handoff pattern targets unknown agent '{}'; pattern will be skipped",
                pattern.to
            ));
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
name: demo
description: demo team
agents:
  - name: assistant
    prompt_template: "You are {agent_name}. Task: {task}"
    tools: [get_weather]
"#
    }

    /// **Scenario**: defaults apply on a minimal config: max_rounds 20,
    /// autonomous mode, TERMINATE marker.
    #[test]
    fn minimal_config_gets_defaults() {
        let team = team_from_yaml(minimal_yaml()).unwrap();
        assert_eq!(team.config.max_rounds, DEFAULT_MAX_ROUNDS);
        assert_eq!(team.config.execution_mode, ExecutionMode::Autonomous);
        assert_eq!(team.config.termination_markers, vec!["TERMINATE"]);
        assert!(team.config.memory.is_none());
        assert!(!team.config_hash.is_empty());
    }

    /// **Scenario**: invalid handoff targets are warnings, not failures.
    #[test]
    fn invalid_handoff_target_is_warning() {
        let yaml = r#"
name: demo
agents:
  - name: a
    prompt_template: "p"
handoffs:
  - from: a
    to: ghost
"#;
        let team = team_from_yaml(yaml).unwrap();
        assert_eq!(team.warnings.len(), 1);
        assert!(team.warnings[0].contains("ghost"));
        assert!(team.handoff_targets("a").is_empty());
    }

    /// **Scenario**: a team without agents, or with duplicate agent names,
    /// fails to load.
    #[test]
    fn empty_or_duplicate_agents_fail() {
        let err = team_from_yaml("name: demo\nagents: []\n").unwrap_err();
        assert!(matches!(err, TeamError::Invalid(_)));
        let yaml = r#"
name: demo
agents:
  - name: a
    prompt_template: "p"
  - name: a
    prompt_template: "q"
"#;
        let err = team_from_yaml(yaml).unwrap_err();
        assert!(matches!(err, TeamError::Invalid(m) if m.contains("duplicate")));
    }

    /// **Scenario**: effective_tools drops entries missing from the registry
    /// and keeps the registered ones in declared order.
    #[test]
    fn effective_tools_drops_unknown_entries() {
        let team = team_from_yaml(minimal_yaml()).unwrap();
        let registry = ToolRegistry::new();
        assert!(team.effective_tools("assistant", &registry).is_empty());

        registry
            .register(std::sync::Arc::new(crate::tools::FnTool::new(
                crate::tools::ToolDescriptor::new("get_weather", "Weather lookup"),
                |_| Ok(serde_json::Value::Null),
            )))
            .unwrap();
        assert_eq!(
            team.effective_tools("assistant", &registry),
            vec!["get_weather"]
        );
    }

    /// **Scenario**: identical configs hash identically; any change to the
    /// document changes the hash.
    #[test]
    fn config_hash_tracks_content() {
        let a = team_from_yaml(minimal_yaml()).unwrap();
        let b = team_from_yaml(minimal_yaml()).unwrap();
        assert_eq!(a.config_hash, b.config_hash);
        let changed = team_from_yaml(&minimal_yaml().replace("demo team", "other")).unwrap();
        assert_ne!(a.config_hash, changed.config_hash);
    }
}
