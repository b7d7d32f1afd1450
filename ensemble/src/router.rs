//! Handoff routing: which agent acts next.
//!
//! Routing is a pure function of the declared rules and the last step's
//! text, so it is deterministic and testable in isolation. Resolution order:
//!
//! 1. Termination markers in the last text close the task.
//! 2. Explicit rules (`from` == current agent) in declaration order; a rule
//!    without a condition always fires, a condition is a case-insensitive
//!    substring or, when written `/like this/`, a regex.
//! 3. Natural-language patterns in declaration order; the first regex that
//!    matches the text wins.
//! 4. No match: if the team declares no onward routing for the current agent
//!    at all, the turn was the natural end of the task; otherwise the
//!    current agent keeps the floor for another round (the round cap bounds
//!    this).
//!
//! Circular chains are just explicit unconditional rules forming a cycle.
//! Rules referencing unknown agents were already dropped with a warning at
//! team load.

use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::warn;

use crate::error::ErrorKind;
use crate::team::Team;

/// The router's verdict for one boundary between steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Hand the floor to this agent.
    Agent(String),
    /// Close the task as completed.
    Terminate,
}

/// Routing failures; the task fails on these.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("team has no agents")]
    NoAgents,
    #[error("current agent '{0}' is not part of the team")]
    UnknownAgent(String),
}

impl RouteError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::RoutingFailure
    }
}

#[derive(Debug)]
enum Condition {
    /// Case-insensitive substring.
    Substring(String),
    /// `/.../` in the config compiles to a case-insensitive regex.
    Pattern(Regex),
}

impl Condition {
    fn matches(&self, text: &str) -> bool {
        match self {
            Condition::Substring(needle) => text.to_lowercase().contains(needle),
            Condition::Pattern(re) => re.is_match(text),
        }
    }
}

#[derive(Debug)]
struct CompiledRule {
    from: String,
    to: String,
    condition: Option<Condition>,
}

/// Deterministic next-agent router compiled from a team's declarations.
pub struct HandoffRouter {
    agents: Vec<String>,
    rules: Vec<CompiledRule>,
    patterns: Vec<(Regex, String)>,
    termination_markers: Vec<String>,
}

impl HandoffRouter {
    /// Compiles the router from a loaded team, skipping (with a warning)
    /// rules whose endpoints are unknown and patterns that fail to compile.
    pub fn from_team(team: &Team) -> Self {
        let agents: Vec<String> = team
            .config
            .agents
            .iter()
            .map(|a| a.name.clone())
            .collect();
        let known = |name: &str| agents.iter().any(|a| a == name);

        let mut rules = Vec::new();
        for rule in &team.config.handoffs {
            if !known(&rule.from) || !known(&rule.to) {
                continue; // already warned at team load
            }
            let condition = match rule.condition.as_deref() {
                None => None,
                Some(raw) => match compile_condition(raw) {
                    Ok(c) => Some(c),
                    Err(e) => {
                        warn!(from = %rule.from, to = %rule.to, error = %e,
                            "handoff condition failed to compile; skipping rule");
                        continue;
                    }
                },
            };
            rules.push(CompiledRule {
                from: rule.from.clone(),
                to: rule.to.clone(),
                condition,
            });
        }

        let mut patterns = Vec::new();
        for p in &team.config.handoff_patterns {
            if !known(&p.to) {
                continue;
            }
            match RegexBuilder::new(&p.pattern).case_insensitive(true).build() {
                Ok(re) => patterns.push((re, p.to.clone())),
                Err(e) => {
                    warn!(pattern = %p.pattern, error = %e,
                        "handoff pattern failed to compile; skipping");
                }
            }
        }

        Self {
            agents,
            rules,
            patterns,
            termination_markers: team.config.termination_markers.clone(),
        }
    }

    /// The agent that opens the task: first declared.
    pub fn first_agent(&self) -> Result<&str, RouteError> {
        self.agents
            .first()
            .map(String::as_str)
            .ok_or(RouteError::NoAgents)
    }

    /// Routes the boundary after `current`'s step whose text is `last_text`.
    pub fn next(&self, current: &str, last_text: &str) -> Result<Route, RouteError> {
        if !self.agents.iter().any(|a| a == current) {
            return Err(RouteError::UnknownAgent(current.to_string()));
        }

        if self
            .termination_markers
            .iter()
            .any(|marker| !marker.is_empty() && last_text.contains(marker))
        {
            return Ok(Route::Terminate);
        }

        for rule in self.rules.iter().filter(|r| r.from == current) {
            let fires = match &rule.condition {
                None => true,
                Some(condition) => condition.matches(last_text),
            };
            if fires {
                return Ok(Route::Agent(rule.to.clone()));
            }
        }

        for (re, to) in &self.patterns {
            if re.is_match(last_text) {
                return Ok(Route::Agent(to.clone()));
            }
        }

        let has_routing = self.rules.iter().any(|r| r.from == current) || !self.patterns.is_empty();
        if has_routing {
            // Conditions simply have not fired yet; the agent keeps the floor.
            Ok(Route::Agent(current.to_string()))
        } else {
            Ok(Route::Terminate)
        }
    }
}

fn compile_condition(raw: &str) -> Result<Condition, regex::Error> {
    let trimmed = raw.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('/') && trimmed.ends_with('/') {
        let body = &trimmed[1..trimmed.len() - 1];
        let re = RegexBuilder::new(body).case_insensitive(true).build()?;
        Ok(Condition::Pattern(re))
    } else {
        Ok(Condition::Substring(trimmed.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::team_from_yaml;

    fn circular_team() -> Team {
        team_from_yaml(
            r#"
name: writers
agents:
  - name: research
    prompt_template: "p"
  - name: write
    prompt_template: "p"
  - name: review
    prompt_template: "p"
handoffs:
  - from: research
    to: write
  - from: write
    to: review
  - from: review
    to: research
"#,
        )
        .unwrap()
    }

    fn nl_team() -> Team {
        team_from_yaml(
            r#"
name: writers
agents:
  - name: research
    prompt_template: "p"
  - name: write
    prompt_template: "p"
  - name: review
    prompt_template: "p"
handoff_patterns:
  - pattern: "need(s)?\\s+review|ready\\s+for\\s+review"
    to: review
  - pattern: "ready\\s+for\\s+writing|begin\\s+drafting"
    to: write
  - pattern: "more\\s+research\\s+needed"
    to: research
"#,
        )
        .unwrap()
    }

    /// **Scenario**: an unconditional circular chain cycles in declaration
    /// order.
    #[test]
    fn circular_chain_cycles() {
        let router = HandoffRouter::from_team(&circular_team());
        assert_eq!(router.first_agent().unwrap(), "research");
        assert_eq!(
            router.next("research", "anything").unwrap(),
            Route::Agent("write".into())
        );
        assert_eq!(
            router.next("write", "anything").unwrap(),
            Route::Agent("review".into())
        );
        assert_eq!(
            router.next("review", "anything").unwrap(),
            Route::Agent("research".into())
        );
    }

    /// **Scenario**: a TERMINATE marker closes the task before any rule is
    /// consulted.
    #[test]
    fn termination_marker_wins() {
        let router = HandoffRouter::from_team(&circular_team());
        assert_eq!(
            router.next("research", "All done. TERMINATE").unwrap(),
            Route::Terminate
        );
    }

    /// **Scenario**: natural-language patterns are consulted in declaration
    /// order; the first match wins even when later patterns also match.
    #[test]
    fn nl_patterns_first_match_wins() {
        let router = HandoffRouter::from_team(&nl_team());
        assert_eq!(
            router
                .next("write", "Draft complete, needs review before we continue")
                .unwrap(),
            Route::Agent("review".into())
        );
        // Both "ready for review" and "more research needed" appear; the
        // review pattern is declared first.
        assert_eq!(
            router
                .next("write", "ready for review although more research needed")
                .unwrap(),
            Route::Agent("review".into())
        );
    }

    /// **Scenario**: with routing declared but nothing matching, the current
    /// agent keeps the floor; with no routing declared at all, the task
    /// terminates naturally.
    #[test]
    fn unmatched_text_behavior() {
        let router = HandoffRouter::from_team(&nl_team());
        assert_eq!(
            router.next("research", "still digging into sources").unwrap(),
            Route::Agent("research".into())
        );

        let solo = team_from_yaml(
            "name: solo\nagents:\n  - name: assistant\n    prompt_template: p\n",
        )
        .unwrap();
        let router = HandoffRouter::from_team(&solo);
        assert_eq!(
            router.next("assistant", "here is your answer").unwrap(),
            Route::Terminate
        );
    }

    /// **Scenario**: conditions gate explicit rules; `/regex/` syntax
    /// compiles to a regex condition.
    #[test]
    fn conditions_gate_rules() {
        let team = team_from_yaml(
            r#"
name: gated
agents:
  - name: a
    prompt_template: "p"
  - name: b
    prompt_template: "p"
  - name: c
    prompt_template: "p"
handoffs:
  - from: a
    to: b
    condition: "research complete"
  - from: a
    to: c
    condition: "/revision (needed|required)/"
"#,
        )
        .unwrap();
        let router = HandoffRouter::from_team(&team);
        assert_eq!(
            router.next("a", "Research COMPLETE, moving on").unwrap(),
            Route::Agent("b".into())
        );
        assert_eq!(
            router.next("a", "revision required on section 2").unwrap(),
            Route::Agent("c".into())
        );
        assert_eq!(
            router.next("a", "nothing decisive yet").unwrap(),
            Route::Agent("a".into())
        );
    }

    /// **Scenario**: routing is deterministic: the same rules and text give
    /// the same answer on every call.
    #[test]
    fn routing_is_deterministic() {
        let router = HandoffRouter::from_team(&nl_team());
        let text = "section draft complete, ready for review";
        let first = router.next("write", text).unwrap();
        for _ in 0..50 {
            assert_eq!(router.next("write", text).unwrap(), first);
        }
    }

    /// **Scenario**: an unknown current agent is a routing failure.
    #[test]
    fn unknown_agent_is_routing_failure() {
        let router = HandoffRouter::from_team(&circular_team());
        let err = router.next("ghost", "text").unwrap_err();
        assert!(matches!(&err, RouteError::UnknownAgent(name) if name == "ghost"));
        assert_eq!(err.kind(), ErrorKind::RoutingFailure);
    }
}
