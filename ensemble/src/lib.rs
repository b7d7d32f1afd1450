//! # Ensemble
//!
//! A multi-agent task orchestrator: a runtime that drives a cooperating set
//! of LLM-backed agents through a long-running task, mediating turn-taking,
//! tool invocation, shared memory, event observation, pause/resume, and
//! persistence across process restarts.
//!
//! ## Design principles
//!
//! - **One driver per task**: the executor is a cooperative, single-logical-
//!   thread loop; one agent turn at a time, every suspension point a
//!   cancellation point.
//! - **Teams are data**: a team is a declarative YAML bundle of agents,
//!   tools, handoff rules, memory, and event rules; the executor interprets
//!   the data, there are no team subclasses.
//! - **Providers are traits**: the LLM ([`Brain`]), memory ([`Memory`]), and
//!   session storage ([`SessionStore`]) are consumed through traits; the
//!   crate ships scripted, in-memory, file, and SQLite implementations.
//! - **Errors are values**: a closed [`ErrorKind`] taxonomy decides between
//!   feeding a failure back to the model, retrying with backoff, and failing
//!   the task.
//!
//! ## Main modules
//!
//! - [`executor`]: [`TaskExecutor`], [`TaskControl`] — the main loop with
//!   pause/resume/stop and resume-from-disk.
//! - [`team`]: [`Team`], [`TeamConfig`], [`load_team`] — declarative config.
//! - [`router`]: [`HandoffRouter`] — deterministic next-agent routing.
//! - [`agent`]: [`AgentRuntime`] — the Brain-to-tool-to-Brain turn loop.
//! - [`brain`]: [`Brain`], [`BrainChunk`], [`ToolCallAssembler`],
//!   [`MockBrain`] — streaming completions and tool-call assembly.
//! - [`tools`]: [`ToolRegistry`], [`ToolDescriptor`], [`Tool`] — schemas,
//!   validation, coercion, timed dispatch, built-in memory tools.
//! - [`memory`]: [`Memory`] with in-memory, file, no-op, and evented
//!   backends.
//! - [`events`]: [`EventBus`], [`Event`], [`EventType`] — bounded lossy
//!   pub/sub with auto-emit rules.
//! - [`session`]: [`SessionStore`] with file, SQLite, and in-memory
//!   backends.
//! - [`task`] / [`step`] / [`message`] / [`error`]: the shared data model.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ensemble::{
//!     bus_for_team, install_team_memory, team_from_yaml, ExecutorOptions,
//!     InMemorySessionStore, MockBrain, SharedBrain, TaskControl, TaskExecutor,
//!     ToolRegistry,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let team = Arc::new(team_from_yaml(r#"
//! name: demo
//! agents:
//!   - name: assistant
//!     prompt_template: "You are {agent_name}. Task: {task}"
//! "#)?);
//! let bus = bus_for_team(&team);
//! let registry = Arc::new(ToolRegistry::new());
//! install_team_memory(&team, &registry, &bus, std::path::Path::new("./workspace")).await?;
//!
//! let executor = TaskExecutor::new(
//!     team,
//!     Arc::new(SharedBrain(Arc::new(MockBrain::new(vec![])))),
//!     registry,
//!     Arc::new(InMemorySessionStore::new()),
//!     bus,
//!     ExecutorOptions::default(),
//! );
//! let control = TaskControl::new();
//! let task = executor.start("say hello", "inline", &control).await?;
//! println!("{} finished as {}", task.task_id, task.status);
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod brain;
pub mod error;
pub mod events;
pub mod executor;
pub mod memory;
pub mod message;
pub mod router;
pub mod session;
pub mod step;
pub mod task;
pub mod team;
pub mod tools;

pub use agent::{AgentRuntime, TurnError, TurnOptions, DEFAULT_MAX_TOOL_ROUNDS};
pub use brain::{
    AssembledCall, Brain, BrainChunk, BrainError, BrainUsage, ChunkStream, FinishReason,
    MockBrain, ScriptedTurn, ToolCallAssembler, ToolCallDelta,
};
pub use error::{ErrorKind, TaskError, TaskFailure};
pub use events::{AutoEmitRule, Event, EventBus, EventType, Subscription, DEFAULT_QUEUE_CAPACITY};
pub use executor::{
    bus_for_team, install_team_memory, BrainProvider, ExecutorOptions, RetryPolicy, SharedBrain,
    TaskControl, TaskExecutor,
};
pub use memory::{
    AddOptions, EventedMemory, FileMemory, InMemoryMemory, ListOptions, Memory, MemoryError,
    MemoryItem, MemoryKind, MemoryStats, NoopMemory, SearchOptions,
};
pub use message::Message;
pub use router::{HandoffRouter, Route, RouteError};
pub use session::{
    FileSessionStore, InMemorySessionStore, ListFilter, SessionError, SessionPatch, SessionStore,
    SessionSummary, SqliteSessionStore, TaskSession,
};
pub use step::{InvocationError, Step, StepPart, ToolCall, ToolInvocation};
pub use task::{short_task_id, Task, TaskStatus};
pub use team::{
    load_team, team_from_yaml, AgentConfig, BrainSettings, ExecutionMode, HandoffPattern,
    HandoffRule, MemorySettings, Team, TeamConfig, TeamError, ToolConfig, ToolSourceKind,
};
pub use tools::{
    register_memory_tools, FnTool, ParamKind, Tool, ToolDescriptor, ToolError, ToolParam,
    ToolRegistry, ToolScope, DEFAULT_TOOL_TIMEOUT, TOOL_ADD_MEMORY, TOOL_LIST_MEMORIES,
    TOOL_MEMORY_STATS, TOOL_SEARCH_MEMORY,
};
