//! Agent runtime: one role's turn against the Brain and the tool registry.
//!
//! A turn renders the agent's prompt, assembles the chat history from the
//! task transcript, then drives the Brain-to-tool-to-Brain cycle until the
//! model stops, a cutoff finish arrives, or the per-turn tool-round cap is
//! reached. Text deltas stream out through an optional channel without
//! buffering the whole response.

pub mod prompt;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::brain::{
    Brain, BrainChunk, BrainError, FinishReason, ToolCallAssembler,
};
use crate::error::ErrorKind;
use crate::events::{Event, EventBus, EventType};
use crate::message::Message;
use crate::step::{InvocationError, Step, StepPart, ToolCall, ToolInvocation};
use crate::task::Task;
use crate::team::{AgentConfig, Team};
use crate::tools::{ToolRegistry, ToolScope};

/// Default cap on Brain-tool rounds within a single turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;

/// How many trailing steps survive transcript truncation on context
/// overflow (the system message and these steps are kept verbatim).
const TRUNCATE_KEEP_LAST: usize = 2;

/// Per-turn tuning.
#[derive(Debug, Clone)]
pub struct TurnOptions {
    pub max_tool_rounds: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// Errors that end a turn without a step.
///
/// Everything recoverable (tool failures, malformed arguments, cutoffs) is
/// recorded inside the returned [`Step`] instead; only Brain-level failures
/// surface here so the executor can apply its retry policy.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Brain(#[from] BrainError),
    #[error("prompt render failed: {0}")]
    Prompt(#[from] prompt::PromptError),
}

impl TurnError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TurnError::Brain(e) => e.kind(),
            TurnError::Prompt(_) => ErrorKind::ConfigError,
        }
    }
}

/// A runnable agent: declared config bound to a Brain, tool allowlist, and
/// the event bus.
pub struct AgentRuntime {
    config: AgentConfig,
    /// Effective allowlist (unknown names already dropped by the team).
    tools: Vec<String>,
    handoff_targets: Vec<String>,
    brain: Arc<dyn Brain>,
    registry: Arc<ToolRegistry>,
    bus: EventBus,
    options: TurnOptions,
}

impl AgentRuntime {
    /// Binds the named agent of `team` to its collaborators.
    pub fn new(
        team: &Team,
        agent_name: &str,
        brain: Arc<dyn Brain>,
        registry: Arc<ToolRegistry>,
        bus: EventBus,
        options: TurnOptions,
    ) -> Option<Self> {
        let config = team.agent(agent_name)?.clone();
        let tools = team.effective_tools(agent_name, &registry);
        let handoff_targets = team
            .handoff_targets(agent_name)
            .into_iter()
            .map(str::to_string)
            .collect();
        Some(Self {
            config,
            tools,
            handoff_targets,
            brain,
            registry,
            bus,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Executes one turn for this agent over the task transcript.
    ///
    /// `delta_tx` receives assistant text deltas as they stream; send
    /// failures are ignored (a dropped UI must not fail the turn).
    pub async fn turn(
        &self,
        task: &Task,
        delta_tx: Option<&mpsc::Sender<String>>,
    ) -> Result<Step, TurnError> {
        let system_prompt = self.render_prompt(task)?;
        let mut history = self.build_history(task, &system_prompt, None);
        let schemas = if self.config.brain.supports_function_calls {
            self.registry.schemas(&self.tools)
        } else {
            Vec::new()
        };

        let mut step = Step::begin(&self.config.name);
        let mut truncated_once = false;
        let mut round = 0usize;

        loop {
            let mut rx = match self.brain.stream(&history, &schemas).await {
                Ok(rx) => rx,
                Err(BrainError::ContextOverflow(why)) if !truncated_once => {
                    debug!(agent = %self.config.name, why = %why,
                        "context overflow; truncating transcript and retrying once");
                    truncated_once = true;
                    history =
                        self.build_history(task, &system_prompt, Some(TRUNCATE_KEEP_LAST));
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let mut text = String::new();
            let mut assembler = ToolCallAssembler::new();
            let mut finish: Option<(FinishReason, Option<crate::brain::BrainUsage>)> = None;

            while let Some(item) = rx.recv().await {
                match item? {
                    BrainChunk::TextDelta { text: delta } => {
                        if let Some(tx) = delta_tx {
                            let _ = tx.try_send(delta.clone());
                        }
                        text.push_str(&delta);
                    }
                    BrainChunk::ToolCallDelta(delta) => assembler.push(&delta),
                    BrainChunk::Finish { reason, usage } => {
                        finish = Some((reason, usage));
                        break;
                    }
                }
            }
            let (reason, usage) = finish
                .ok_or_else(|| BrainError::Stream("stream ended without finish chunk".into()))?;
            if let Some(usage) = usage {
                step.tokens_in += usage.prompt_tokens;
                step.tokens_out += usage.completion_tokens;
            }

            match reason {
                FinishReason::Stop => {
                    step.parts.push(StepPart::Text { text });
                    break;
                }
                FinishReason::Length | FinishReason::ContentFilter => {
                    step.parts.push(StepPart::Text { text });
                    let note = match reason {
                        FinishReason::Length => "response truncated at the output token limit",
                        _ => "response cut by the provider content filter",
                    };
                    warn!(agent = %self.config.name, "{}", note);
                    step.warnings.push(note.to_string());
                    break;
                }
                FinishReason::Error => {
                    return Err(TurnError::Brain(BrainError::Stream(
                        "provider reported an error finish".into(),
                    )));
                }
                FinishReason::ToolCalls => {
                    round += 1;
                    if !text.is_empty() {
                        step.parts.push(StepPart::Text { text: text.clone() });
                    }
                    let assembled = assembler.finish();
                    if assembled.is_empty() {
                        step.warnings
                            .push("finish said tool_calls but no calls were streamed".into());
                        break;
                    }
                    let follow_ups = self
                        .dispatch_round(task, &mut step, text, assembled)
                        .await;
                    history.extend(follow_ups);

                    if round >= self.options.max_tool_rounds {
                        let note = format!(
                            "tool-call round cap reached ({}); ending turn",
                            self.options.max_tool_rounds
                        );
                        warn!(agent = %self.config.name, task = %task.task_id, "{}", note);
                        step.warnings.push(note);
                        step.warnings.push(ErrorKind::ToolLoop.as_str().to_string());
                        break;
                    }
                    continue;
                }
            }
        }

        step.finish();
        Ok(step)
    }

    /// Dispatches one round of assembled tool calls, recording parts and
    /// invocations on the step and returning the follow-up messages for the
    /// Brain (assistant with tool_calls, then one tool message per call).
    async fn dispatch_round(
        &self,
        task: &Task,
        step: &mut Step,
        assistant_text: String,
        assembled: Vec<crate::brain::AssembledCall>,
    ) -> Vec<Message> {
        let scope = ToolScope {
            task_id: task.task_id.clone(),
            agent_id: self.config.name.clone(),
        };

        let mut calls_for_history = Vec::new();
        let mut tool_messages = Vec::new();

        for call in assembled {
            match call.arguments {
                Ok(arguments) => {
                    let tool_call = ToolCall {
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        arguments: arguments.clone(),
                    };
                    step.parts.push(StepPart::ToolCall {
                        call: tool_call.clone(),
                    });
                    calls_for_history.push(tool_call);

                    self.publish_tool_event(
                        EventType::ToolInvoked,
                        task,
                        &call.name,
                        json!({"call_id": call.call_id.clone()}),
                    );

                    let allowed = self.tools.iter().any(|t| t == &call.name);
                    let invocation = if allowed {
                        self.registry
                            .invoke_recorded(
                                &call.call_id,
                                &call.name,
                                arguments,
                                Some(&scope),
                                &self.config.name,
                            )
                            .await
                    } else {
                        // The model asked for a tool outside its allowlist.
                        ToolInvocation {
                            call_id: call.call_id.clone(),
                            tool_name: call.name.clone(),
                            arguments,
                            result: None,
                            error: Some(InvocationError {
                                kind: ErrorKind::InvalidArguments,
                                message: format!(
                                    "tool '{}' is not available to agent '{}'",
                                    call.name, self.config.name
                                ),
                            }),
                            duration_ms: 0,
                            agent_name: self.config.name.clone(),
                        }
                    };

                    let (content, is_error) = match (&invocation.result, &invocation.error) {
                        (Some(value), None) => {
                            self.publish_tool_event(
                                EventType::ToolSucceeded,
                                task,
                                &call.name,
                                json!({"call_id": call.call_id.clone(), "duration_ms": invocation.duration_ms}),
                            );
                            (render_tool_value(value), false)
                        }
                        (_, Some(err)) => {
                            self.publish_tool_event(
                                EventType::ToolFailed,
                                task,
                                &call.name,
                                json!({"call_id": call.call_id.clone(), "kind": err.kind.as_str(), "message": err.message.clone()}),
                            );
                            (
                                format!("error ({}): {}", err.kind.as_str(), err.message),
                                true,
                            )
                        }
                        (None, None) => ("".to_string(), false),
                    };

                    step.parts.push(StepPart::ToolResult {
                        call_id: call.call_id.clone(),
                        tool_name: call.name.clone(),
                        content: content.clone(),
                        is_error,
                    });
                    step.tool_invocations.push(invocation);
                    tool_messages.push(Message::tool(call.call_id, call.name, content));
                }
                Err(parse_error) => {
                    // Malformed arguments: record the failure and let the
                    // Brain observe it on the next round.
                    let message = format!("{}: {}", ErrorKind::MalformedToolArguments, parse_error);
                    warn!(agent = %self.config.name, tool = %call.name, "{}", message);
                    let tool_call = ToolCall {
                        call_id: call.call_id.clone(),
                        name: call.name.clone(),
                        arguments: Value::Null,
                    };
                    step.parts.push(StepPart::ToolCall {
                        call: tool_call.clone(),
                    });
                    calls_for_history.push(tool_call);
                    step.parts.push(StepPart::ToolResult {
                        call_id: call.call_id.clone(),
                        tool_name: call.name.clone(),
                        content: message.clone(),
                        is_error: true,
                    });
                    step.tool_invocations.push(ToolInvocation {
                        call_id: call.call_id.clone(),
                        tool_name: call.name.clone(),
                        arguments: Value::Null,
                        result: None,
                        error: Some(InvocationError {
                            kind: ErrorKind::MalformedToolArguments,
                            message: parse_error,
                        }),
                        duration_ms: 0,
                        agent_name: self.config.name.clone(),
                    });
                    self.publish_tool_event(
                        EventType::ToolFailed,
                        task,
                        &call.name,
                        json!({"call_id": call.call_id.clone(), "kind": ErrorKind::MalformedToolArguments.as_str()}),
                    );
                    tool_messages.push(Message::tool(call.call_id, call.name, message));
                }
            }
        }

        let mut out = Vec::with_capacity(1 + tool_messages.len());
        out.push(Message::assistant_with_tools(assistant_text, calls_for_history));
        out.extend(tool_messages);
        out
    }

    fn publish_tool_event(&self, kind: EventType, task: &Task, tool: &str, extra: Value) {
        let mut event = Event::new(kind, "agent")
            .for_task(&task.task_id)
            .with("agent_name", json!(self.config.name.clone()))
            .with("tool_name", json!(tool));
        if let Value::Object(map) = extra {
            event.payload.extend(map);
        }
        self.bus.publish(event);
    }

    fn render_prompt(&self, task: &Task) -> Result<String, prompt::PromptError> {
        let mut vars = BTreeMap::new();
        vars.insert("agent_name".to_string(), self.config.name.clone());
        vars.insert(
            "agent_description".to_string(),
            self.config.description.clone(),
        );
        vars.insert("task".to_string(), task.description.clone());
        vars.insert("task_id".to_string(), task.task_id.clone());
        vars.insert("tools".to_string(), self.tools.join(", "));
        vars.insert(
            "handoff_targets".to_string(),
            self.handoff_targets.join(", "),
        );
        prompt::render(
            &self.config.prompt_template,
            &vars,
            self.config.strict_prompt,
        )
    }

    /// Chat history: rendered system prompt, the task prompt, then prior
    /// steps in chronological order. The agent's own steps replay as
    /// assistant/tool messages (tool calls threaded by call_id); other
    /// agents' steps appear as attributed user messages. `keep_last`
    /// truncates to the newest N steps after a context overflow.
    fn build_history(
        &self,
        task: &Task,
        system_prompt: &str,
        keep_last: Option<usize>,
    ) -> Vec<Message> {
        let mut messages = vec![
            Message::system(system_prompt),
            Message::user(task.description.clone()),
        ];

        let steps: &[Step] = match keep_last {
            Some(n) if task.history.len() > n => &task.history[task.history.len() - n..],
            _ => &task.history,
        };

        for step in steps {
            if step.agent_name == self.config.name {
                append_own_step(&mut messages, step);
            } else {
                let text = step.text();
                if !text.is_empty() {
                    messages.push(Message::user(format!("[{}]: {}", step.agent_name, text)));
                }
            }
        }
        messages
    }
}

/// Replays one of the agent's own steps as assistant/tool messages.
fn append_own_step(messages: &mut Vec<Message>, step: &Step) {
    let mut pending_text = String::new();
    let mut pending_calls: Vec<ToolCall> = Vec::new();

    for part in &step.parts {
        match part {
            StepPart::Text { text } => {
                if !pending_calls.is_empty() {
                    messages.push(Message::assistant_with_tools(
                        std::mem::take(&mut pending_text),
                        std::mem::take(&mut pending_calls),
                    ));
                }
                if !text.is_empty() {
                    if !pending_text.is_empty() {
                        pending_text.push('\n');
                    }
                    pending_text.push_str(text);
                }
            }
            StepPart::ToolCall { call } => pending_calls.push(call.clone()),
            StepPart::ToolResult {
                call_id,
                tool_name,
                content,
                ..
            } => {
                if !pending_calls.is_empty() {
                    messages.push(Message::assistant_with_tools(
                        std::mem::take(&mut pending_text),
                        std::mem::take(&mut pending_calls),
                    ));
                }
                messages.push(Message::tool(call_id, tool_name, content));
            }
        }
    }
    if !pending_text.is_empty() || !pending_calls.is_empty() {
        messages.push(Message::assistant_with_tools(pending_text, pending_calls));
    }
}

/// Tool values render to plain text for the Brain: strings verbatim,
/// everything else as compact JSON.
fn render_tool_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::{MockBrain, ScriptedTurn};
    use crate::team::team_from_yaml;
    use crate::tools::{FnTool, ParamKind, ToolDescriptor, ToolParam};

    fn weather_team() -> Team {
        team_from_yaml(
            r#"
name: demo
agents:
  - name: assistant
    description: general helper
    prompt_template: "You are {agent_name}. Task: {task}"
    tools: [get_weather]
"#,
        )
        .unwrap()
    }

    fn registry_with_weather() -> Arc<ToolRegistry> {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(FnTool::new(
                ToolDescriptor::new("get_weather", "Weather lookup").param(ToolParam::required(
                    "location",
                    ParamKind::String,
                    "City to look up",
                )),
                |args| {
                    let loc = args["location"].as_str().unwrap_or("?");
                    Ok(json!(format!("Sunny, 25°C in {}", loc)))
                },
            )))
            .unwrap();
        Arc::new(registry)
    }

    fn runtime(team: &Team, brain: Arc<dyn Brain>, registry: Arc<ToolRegistry>) -> AgentRuntime {
        AgentRuntime::new(
            team,
            "assistant",
            brain,
            registry,
            EventBus::default(),
            TurnOptions::default(),
        )
        .unwrap()
    }

    /// **Scenario**: spec scenario 1 in miniature: one tool round then a
    /// final text; the step holds tool_call, tool_result, and text parts in
    /// order with all calls resolved.
    #[tokio::test]
    async fn single_tool_round_turn() {
        let team = weather_team();
        let brain = Arc::new(MockBrain::new(vec![
            ScriptedTurn::tool_call("c1", "get_weather", json!({"location": "Shanghai"})),
            ScriptedTurn::text("Tomorrow in Shanghai: sunny, 25°C."),
        ]));
        let agent = runtime(&team, brain.clone(), registry_with_weather());
        let task = Task::new("weather in Shanghai tomorrow", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        assert!(step.tool_calls_resolved());
        let kinds: Vec<&str> = step
            .parts
            .iter()
            .map(|p| match p {
                StepPart::Text { .. } => "text",
                StepPart::ToolCall { .. } => "tool_call",
                StepPart::ToolResult { .. } => "tool_result",
            })
            .collect();
        assert_eq!(kinds, vec!["tool_call", "tool_result", "text"]);
        assert_eq!(step.tool_invocations.len(), 1);
        assert!(step.tool_invocations[0].error.is_none());
        assert!(step.tokens_in > 0);

        // The follow-up request contains the assistant tool_calls message and
        // the tool result threaded by call id.
        let second_request = &brain.requests()[1];
        assert!(second_request.iter().any(|m| matches!(
            m,
            Message::Tool { call_id, .. } if call_id == "c1"
        )));
    }

    /// **Scenario**: a failing tool is fed back as an error tool_result and
    /// the Brain recovers on the next round (spec scenario 5 in miniature).
    #[tokio::test]
    async fn tool_failure_feeds_back_to_brain() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(FnTool::new(
                ToolDescriptor::new("db_query", "Run a SQL query").param(ToolParam::required(
                    "sql",
                    ParamKind::String,
                    "The query",
                )),
                |args| {
                    let sql = args["sql"].as_str().unwrap_or_default();
                    if sql.contains("FORM") {
                        Err(crate::tools::ToolError::Failure("malformed SQL".into()))
                    } else {
                        Ok(json!("3 rows"))
                    }
                },
            )))
            .unwrap();
        let team = team_from_yaml(
            r#"
name: demo
agents:
  - name: assistant
    prompt_template: "p"
    tools: [db_query]
"#,
        )
        .unwrap();
        let brain = Arc::new(MockBrain::new(vec![
            ScriptedTurn::tool_call("c1", "db_query", json!({"sql": "SELECT FORM t"})),
            ScriptedTurn::tool_call("c2", "db_query", json!({"sql": "SELECT * FROM t"})),
            ScriptedTurn::text("Query returned 3 rows."),
        ]));
        let agent = AgentRuntime::new(
            &team,
            "assistant",
            brain,
            Arc::new(registry),
            EventBus::default(),
            TurnOptions::default(),
        )
        .unwrap();
        let task = Task::new("query the db", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        assert_eq!(step.tool_invocations.len(), 2);
        assert_eq!(
            step.tool_invocations[0].error.as_ref().unwrap().kind,
            ErrorKind::ToolFailure
        );
        assert!(step.tool_invocations[1].error.is_none());
        assert!(step.text().contains("3 rows"));
    }

    /// **Scenario**: the per-turn tool-round cap ends the turn with a
    /// ToolLoop warning instead of looping forever.
    #[tokio::test]
    async fn tool_round_cap_ends_turn() {
        let team = weather_team();
        let turns: Vec<ScriptedTurn> = (0..20)
            .map(|i| {
                ScriptedTurn::tool_call(
                    format!("c{}", i),
                    "get_weather",
                    json!({"location": "Shanghai"}),
                )
            })
            .collect();
        let brain = Arc::new(MockBrain::new(turns));
        let agent = AgentRuntime::new(
            &team,
            "assistant",
            brain.clone(),
            registry_with_weather(),
            EventBus::default(),
            TurnOptions { max_tool_rounds: 3 },
        )
        .unwrap();
        let task = Task::new("weather", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        assert_eq!(brain.call_count(), 3);
        assert!(step
            .warnings
            .iter()
            .any(|w| w == ErrorKind::ToolLoop.as_str()));
    }

    /// **Scenario**: malformed streamed arguments are recorded as a failed
    /// tool_result and the turn continues to the next Brain round.
    #[tokio::test]
    async fn malformed_arguments_recorded_and_recovered() {
        use crate::brain::ToolCallDelta;
        let team = weather_team();
        let bad_round = ScriptedTurn::from_chunks(vec![
            BrainChunk::ToolCallDelta(ToolCallDelta {
                index: Some(0),
                call_id: Some("c1".into()),
                name: Some("get_weather".into()),
                arguments_delta: "{\"location\": ".into(),
            }),
            BrainChunk::Finish {
                reason: FinishReason::ToolCalls,
                usage: None,
            },
        ]);
        let brain = Arc::new(MockBrain::new(vec![
            bad_round,
            ScriptedTurn::text("Could not read the arguments, sorry."),
        ]));
        let agent = runtime(&team, brain, registry_with_weather());
        let task = Task::new("weather", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        assert_eq!(
            step.tool_invocations[0].error.as_ref().unwrap().kind,
            ErrorKind::MalformedToolArguments
        );
        assert!(step.tool_calls_resolved());
    }

    /// **Scenario**: a length cutoff keeps the partial text and records a
    /// warning instead of failing the turn.
    #[tokio::test]
    async fn length_cutoff_records_warning() {
        let team = weather_team();
        let brain = Arc::new(MockBrain::new(vec![ScriptedTurn::from_chunks(vec![
            BrainChunk::TextDelta {
                text: "partial answ".into(),
            },
            BrainChunk::Finish {
                reason: FinishReason::Length,
                usage: None,
            },
        ])]));
        let agent = runtime(&team, brain, registry_with_weather());
        let task = Task::new("weather", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        assert_eq!(step.text(), "partial answ");
        assert!(!step.warnings.is_empty());
    }

    /// **Scenario**: context overflow triggers one truncation retry keeping
    /// the system message and the last two steps.
    #[tokio::test]
    async fn context_overflow_truncates_and_retries() {
        let team = weather_team();
        let brain = Arc::new(MockBrain::new(vec![
            ScriptedTurn::fail(BrainError::ContextOverflow("too long".into())),
            ScriptedTurn::text("short answer"),
        ]));
        let agent = runtime(&team, brain.clone(), registry_with_weather());
        let mut task = Task::new("long task", "demo.yaml", 10);
        for i in 0..5 {
            let mut step = Step::begin("assistant");
            step.parts.push(StepPart::Text {
                text: format!("step {}", i),
            });
            task.history.push(step);
        }

        let step = agent.turn(&task, None).await.unwrap();
        assert_eq!(step.text(), "short answer");
        let requests = brain.requests();
        assert_eq!(requests.len(), 2);
        // Retry request: system + task prompt + the last two steps only.
        assert_eq!(requests[1].len(), 4);
        assert!(matches!(&requests[1][0], Message::System { .. }));
        assert!(requests[1][2].content().contains("step 3"));
        assert!(requests[1][3].content().contains("step 4"));
    }

    /// **Scenario**: text deltas stream to the caller while the turn runs.
    #[tokio::test]
    async fn text_deltas_stream_out() {
        let team = weather_team();
        let brain = Arc::new(MockBrain::new(vec![ScriptedTurn::from_chunks(vec![
            BrainChunk::TextDelta { text: "Tom".into() },
            BrainChunk::TextDelta {
                text: "orrow".into(),
            },
            BrainChunk::Finish {
                reason: FinishReason::Stop,
                usage: None,
            },
        ])]));
        let agent = runtime(&team, brain, registry_with_weather());
        let task = Task::new("weather", "demo.yaml", 2);
        let (tx, mut rx) = mpsc::channel(16);

        let step = agent.turn(&task, Some(&tx)).await.unwrap();
        drop(tx);
        let mut streamed = String::new();
        while let Some(delta) = rx.recv().await {
            streamed.push_str(&delta);
        }
        assert_eq!(streamed, "Tomorrow");
        assert_eq!(step.text(), "Tomorrow");
    }

    /// **Scenario**: a tool outside the agent's allowlist is refused with an
    /// error tool_result, not dispatched.
    #[tokio::test]
    async fn out_of_allowlist_tool_is_refused() {
        let team = team_from_yaml(
            r#"
name: demo
agents:
  - name: assistant
    prompt_template: "p"
    tools: []
"#,
        )
        .unwrap();
        let brain = Arc::new(MockBrain::new(vec![
            ScriptedTurn::tool_call("c1", "get_weather", json!({"location": "Shanghai"})),
            ScriptedTurn::text("understood"),
        ]));
        let agent = AgentRuntime::new(
            &team,
            "assistant",
            brain,
            registry_with_weather(),
            EventBus::default(),
            TurnOptions::default(),
        )
        .unwrap();
        let task = Task::new("weather", "demo.yaml", 2);

        let step = agent.turn(&task, None).await.unwrap();
        let err = step.tool_invocations[0].error.as_ref().unwrap();
        assert_eq!(err.kind, ErrorKind::InvalidArguments);
        assert!(err.message.contains("not available"));
    }
}
