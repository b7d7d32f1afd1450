//! Task executor: the main loop driving a team through a task.
//!
//! One cooperative driver per task. Each iteration is one agent turn:
//! consult the router, run the turn, append the step, persist, emit events,
//! observe pause/stop. Multiple tasks may run concurrently, one driver
//! each, sharing the registry and team read-only.
//!
//! `start` and `resume` return only when the task reaches a terminal status
//! (or parks forever in `paused`; callers drive pause/resume/stop through
//! the [`TaskControl`] handle from another task).

mod control;

pub use control::TaskControl;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::agent::{AgentRuntime, TurnOptions};
use crate::brain::{Brain, BrainError};
use crate::error::{ErrorKind, TaskError};
use crate::events::{Event, EventBus, EventType};
use crate::memory::{
    EventedMemory, FileMemory, InMemoryMemory, Memory, MemoryError, NoopMemory,
};
use crate::router::{HandoffRouter, Route};
use crate::session::{SessionPatch, SessionStore, TaskSession};
use crate::step::Step;
use crate::task::{Task, TaskStatus};
use crate::team::{AgentConfig, ExecutionMode, Team};
use crate::tools::{register_memory_tools, ToolRegistry};

/// Retry policy for transient Brain failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Executor tuning.
#[derive(Clone, Default)]
pub struct ExecutorOptions {
    pub turn: TurnOptions,
    /// Wall-clock budget per turn; expiry records a turn_timeout step.
    pub turn_timeout: Option<Duration>,
    pub retry: RetryPolicy,
    /// When set, each task gets a scratch directory under here.
    pub workspace_root: Option<PathBuf>,
    /// Receives assistant text deltas across all turns (UI streaming).
    pub text_deltas: Option<mpsc::Sender<String>>,
}

/// Maps an agent's declared Brain settings to a live [`Brain`].
///
/// Concrete providers live outside the core; tests and offline runs use
/// [`SharedBrain`] over a scripted mock.
pub trait BrainProvider: Send + Sync {
    fn brain_for(&self, agent: &AgentConfig) -> Result<Arc<dyn Brain>, BrainError>;
}

/// One Brain shared by every agent.
pub struct SharedBrain(pub Arc<dyn Brain>);

impl BrainProvider for SharedBrain {
    fn brain_for(&self, _agent: &AgentConfig) -> Result<Arc<dyn Brain>, BrainError> {
        Ok(Arc::clone(&self.0))
    }
}

/// Builds the bus a team's config asks for (auto-emit rules installed).
pub fn bus_for_team(team: &Team) -> EventBus {
    let rules = team
        .config
        .events
        .as_ref()
        .map(|e| e.auto_emit_patterns.clone())
        .unwrap_or_default();
    EventBus::default().with_rules(rules)
}

/// Instantiates the team's memory backend, wraps it with event emission,
/// and registers the built-in memory tools. Unknown backends warn and fall
/// back to `in_memory`; an omitted memory section is the no-op stub.
pub async fn install_team_memory(
    team: &Team,
    registry: &ToolRegistry,
    bus: &EventBus,
    data_root: &std::path::Path,
) -> Result<Arc<dyn Memory>, MemoryError> {
    let backend: Arc<dyn Memory> = match team.config.memory.as_ref() {
        None => Arc::new(NoopMemory::new()),
        Some(settings) => match settings.backend.as_str() {
            "none" => Arc::new(NoopMemory::new()),
            "file" => Arc::new(FileMemory::open(data_root.join("memory")).await?),
            "in_memory" => Arc::new(InMemoryMemory::new()),
            other => {
                warn!(backend = %other, "unknown memory backend; using in_memory");
                Arc::new(InMemoryMemory::new())
            }
        },
    };
    let memory: Arc<dyn Memory> = Arc::new(EventedMemory::new(backend, bus.clone()));
    register_memory_tools(registry, Arc::clone(&memory));
    Ok(memory)
}

enum TurnOutcome {
    Step(Step),
    Cancelled,
    Failed(TaskError),
}

/// The per-task driver.
pub struct TaskExecutor {
    team: Arc<Team>,
    brains: Arc<dyn BrainProvider>,
    registry: Arc<ToolRegistry>,
    store: Arc<dyn SessionStore>,
    bus: EventBus,
    options: ExecutorOptions,
}

impl TaskExecutor {
    pub fn new(
        team: Arc<Team>,
        brains: Arc<dyn BrainProvider>,
        registry: Arc<ToolRegistry>,
        store: Arc<dyn SessionStore>,
        bus: EventBus,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            team,
            brains,
            registry,
            store,
            bus,
            options,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Creates a task from the team config and a prompt, persists it, and
    /// drives it until a terminal status. The returned task carries the
    /// final state; inspect `status`/`error` for the outcome.
    pub async fn start(
        &self,
        description: &str,
        config_ref: &str,
        control: &TaskControl,
    ) -> Result<Task, TaskError> {
        let mut task = Task::new(description, config_ref, self.team.config.max_rounds);

        if let Some(root) = &self.options.workspace_root {
            let dir = root.join(&task.task_id);
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                TaskError::new(
                    ErrorKind::SessionIoError,
                    format!("create workspace {}: {}", dir.display(), e),
                )
            })?;
            task.workspace_path = Some(dir);
        }

        let session = TaskSession::new(task.clone(), &self.team.config_hash);
        self.store
            .create(&session)
            .await
            .map_err(|e| TaskError::new(e.kind(), e.to_string()))?;
        info!(task = %task.task_id, team = %self.team.config.name, "task created");
        self.emit(
            Event::new(EventType::TaskCreated, "executor")
                .for_task(&task.task_id)
                .with("description", json!(task.description.clone())),
        );

        self.run_loop(task, control).await
    }

    /// Reloads a persisted session and re-enters the loop. Config drift
    /// (the stored snapshot hash differing from the current team's) is a
    /// warning, surfaced on the `task.resumed` event; resume proceeds with
    /// the stored transcript under the new config.
    pub async fn resume(&self, task_id: &str, control: &TaskControl) -> Result<Task, TaskError> {
        let session = self
            .store
            .get(task_id)
            .await
            .map_err(|e| TaskError::new(e.kind(), e.to_string()))?
            .ok_or_else(|| {
                TaskError::new(ErrorKind::ConfigError, format!("unknown task: {}", task_id))
            })?;
        let mut task = session.task;
        if task.status.is_terminal() {
            return Err(TaskError::new(
                ErrorKind::ConfigError,
                format!("task {} is already {}", task_id, task.status),
            ));
        }

        let config_drift = session.config_snapshot_hash != self.team.config_hash;
        if config_drift {
            warn!(task = %task_id,
                stored = %session.config_snapshot_hash,
                current = %self.team.config_hash,
                "team config changed since this task was persisted; resuming with the new config");
        }

        if task.status != TaskStatus::Running {
            task.transition(TaskStatus::Running);
        }
        self.persist_patch(
            &task.task_id,
            SessionPatch::status(TaskStatus::Running),
        )
        .await
        .map_err(|e| TaskError::new(e.kind(), e.to_string()))?;

        info!(task = %task.task_id, round = task.round_count, "task resumed");
        self.emit(
            Event::new(EventType::TaskResumed, "executor")
                .for_task(&task.task_id)
                .with("round_count", json!(task.round_count))
                .with("config_drift", json!(config_drift)),
        );

        self.run_loop(task, control).await
    }

    async fn run_loop(&self, mut task: Task, control: &TaskControl) -> Result<Task, TaskError> {
        let router = HandoffRouter::from_team(&self.team);

        if task.status == TaskStatus::Created {
            task.transition(TaskStatus::Running);
            if let Err(e) = self
                .persist_patch(&task.task_id, SessionPatch::status(TaskStatus::Running))
                .await
            {
                return self
                    .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                    .await;
            }
            self.emit(Event::new(EventType::TaskStarted, "executor").for_task(&task.task_id));
        }

        loop {
            // 1. Cancellation wins over everything.
            if control.is_cancelled() {
                return self.finish_stopped(task).await;
            }

            // 2. Pause parks the loop cooperatively.
            if control.is_paused() {
                task.transition(TaskStatus::Paused);
                if let Err(e) = self
                    .persist_patch(&task.task_id, SessionPatch::status(TaskStatus::Paused))
                    .await
                {
                    return self
                        .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                        .await;
                }
                self.emit(Event::new(EventType::TaskPaused, "executor").for_task(&task.task_id));

                if !control.wait_resumed().await {
                    return self.finish_stopped(task).await;
                }

                task.transition(TaskStatus::Running);
                if let Err(e) = self
                    .persist_patch(&task.task_id, SessionPatch::status(TaskStatus::Running))
                    .await
                {
                    return self
                        .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                        .await;
                }
                self.emit(Event::new(EventType::TaskResumed, "executor").for_task(&task.task_id));
            }

            // Round-cap guard also covers sessions resumed at the cap.
            if task.round_count >= task.max_rounds {
                return self.finish_completed(task).await;
            }

            // 3. Routing.
            let route = match task.last_step() {
                Some(last) => router.next(&last.agent_name, &last.text()),
                None => router.first_agent().map(|a| Route::Agent(a.to_string())),
            };
            let agent_name = match route {
                Ok(Route::Agent(name)) => name,
                Ok(Route::Terminate) => return self.finish_completed(task).await,
                Err(e) => {
                    return self
                        .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                        .await
                }
            };
            self.emit(
                Event::new(EventType::HandoffRouted, "executor")
                    .for_task(&task.task_id)
                    .with(
                        "from",
                        task.last_step()
                            .map(|s| json!(s.agent_name.clone()))
                            .unwrap_or(serde_json::Value::Null),
                    )
                    .with("to", json!(agent_name.clone())),
            );

            // 4 + 5. The turn itself.
            self.emit(
                Event::new(EventType::AgentTurnStarted, "executor")
                    .for_task(&task.task_id)
                    .with("agent_name", json!(agent_name.clone()))
                    .with("round", json!(task.round_count + 1)),
            );
            let step = match self.run_turn(&task, &agent_name, control).await {
                TurnOutcome::Step(step) => step,
                TurnOutcome::Cancelled => return self.finish_stopped(task).await,
                TurnOutcome::Failed(err) => return self.finish_failed(task, err).await,
            };

            // 6 + 7 + 8. Persist the step, append it, update progress.
            let tokens_in = step.tokens_in;
            let tokens_out = step.tokens_out;
            if let Err(e) = self.persist_step(&task.task_id, &step).await {
                return self
                    .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                    .await;
            }
            task.push_step(step);
            if let Err(e) = self
                .persist_patch(
                    &task.task_id,
                    SessionPatch::progress(TaskStatus::Running, &agent_name, task.round_count),
                )
                .await
            {
                return self
                    .finish_failed(task, TaskError::new(e.kind(), e.to_string()))
                    .await;
            }
            self.emit(
                Event::new(EventType::AgentTurnFinished, "executor")
                    .for_task(&task.task_id)
                    .with("agent_name", json!(agent_name.clone()))
                    .with("tokens_in", json!(tokens_in))
                    .with("tokens_out", json!(tokens_out)),
            );
            self.emit(
                Event::new(EventType::TaskStepCompleted, "executor")
                    .for_task(&task.task_id)
                    .with("agent_name", json!(agent_name.clone()))
                    .with("round_count", json!(task.round_count)),
            );
            debug!(task = %task.task_id, agent = %agent_name, round = task.round_count, "step completed");

            // 9. Round cap.
            if task.round_count >= task.max_rounds {
                return self.finish_completed(task).await;
            }

            // 10. Step-through mode pauses after every step.
            if self.team.config.execution_mode == ExecutionMode::StepThrough {
                control.pause();
            }
        }
    }

    /// One turn with the retry policy applied to transient Brain failures.
    async fn run_turn(&self, task: &Task, agent_name: &str, control: &TaskControl) -> TurnOutcome {
        let Some(agent_cfg) = self.team.agent(agent_name) else {
            return TurnOutcome::Failed(TaskError::new(
                ErrorKind::RoutingFailure,
                format!("routed to unknown agent '{}'", agent_name),
            ));
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;

            let brain = match self.brains.brain_for(agent_cfg) {
                Ok(brain) => brain,
                Err(e) => return TurnOutcome::Failed(TaskError::new(e.kind(), e.to_string())),
            };
            let Some(runtime) = AgentRuntime::new(
                &self.team,
                agent_name,
                brain,
                Arc::clone(&self.registry),
                self.bus.clone(),
                self.options.turn.clone(),
            ) else {
                return TurnOutcome::Failed(TaskError::new(
                    ErrorKind::ConfigError,
                    format!("agent '{}' could not be constructed", agent_name),
                ));
            };

            let turn = runtime.turn(task, self.options.text_deltas.as_ref());
            let result = tokio::select! {
                // Abandoning the turn future drops the Brain stream, which
                // releases the connection; partial step state is discarded.
                _ = control.cancelled() => return TurnOutcome::Cancelled,
                result = async {
                    match self.options.turn_timeout {
                        Some(budget) => tokio::time::timeout(budget, turn).await,
                        None => Ok(turn.await),
                    }
                } => result,
            };

            match result {
                Err(_elapsed) => {
                    let budget = self.options.turn_timeout.unwrap_or_default();
                    warn!(task = %task.task_id, agent = %agent_name, ?budget, "turn timed out");
                    let mut step = Step::begin(agent_name);
                    step.warnings.push(format!(
                        "turn timed out after {}ms",
                        budget.as_millis()
                    ));
                    step.warnings.push(ErrorKind::TurnTimeout.as_str().to_string());
                    step.finish();
                    return TurnOutcome::Step(step);
                }
                Ok(Ok(step)) => return TurnOutcome::Step(step),
                Ok(Err(err)) => {
                    let kind = err.kind();
                    if kind.is_retryable() && attempt < self.options.retry.max_attempts {
                        let delay = self.options.retry.delay_for(attempt);
                        warn!(task = %task.task_id, agent = %agent_name, attempt,
                            delay_ms = delay.as_millis() as u64, error = %err,
                            "transient brain failure; backing off");
                        tokio::select! {
                            _ = control.cancelled() => return TurnOutcome::Cancelled,
                            _ = tokio::time::sleep(delay) => {}
                        }
                        continue;
                    }
                    return TurnOutcome::Failed(TaskError::new(kind, err.to_string()));
                }
            }
        }
    }

    async fn finish_completed(&self, mut task: Task) -> Result<Task, TaskError> {
        task.transition(TaskStatus::Completed);
        self.persist_patch(&task.task_id, SessionPatch::status(TaskStatus::Completed))
            .await
            .map_err(|e| TaskError::new(e.kind(), e.to_string()))?;
        info!(task = %task.task_id, rounds = task.round_count, "task completed");
        self.emit(
            Event::new(EventType::TaskCompleted, "executor")
                .for_task(&task.task_id)
                .with("round_count", json!(task.round_count)),
        );
        Ok(task)
    }

    async fn finish_stopped(&self, mut task: Task) -> Result<Task, TaskError> {
        task.transition(TaskStatus::Stopped);
        self.persist_patch(&task.task_id, SessionPatch::status(TaskStatus::Stopped))
            .await
            .map_err(|e| TaskError::new(e.kind(), e.to_string()))?;
        info!(task = %task.task_id, "task stopped");
        self.emit(Event::new(EventType::TaskStopped, "executor").for_task(&task.task_id));
        Ok(task)
    }

    async fn finish_failed(&self, mut task: Task, err: TaskError) -> Result<Task, TaskError> {
        let failure = err
            .clone()
            .into_failure(task.current_agent.as_deref(), task.round_count);
        warn!(task = %task.task_id, kind = %failure.kind, message = %failure.message, "task failed");
        task.error = Some(failure.clone());
        task.transition(TaskStatus::Failed);
        // Best effort: a failing store must not mask the original error.
        if let Err(persist_err) = self
            .persist_patch(&task.task_id, SessionPatch::failed(failure.clone()))
            .await
        {
            warn!(task = %task.task_id, error = %persist_err, "could not persist failure record");
        }
        self.emit(
            Event::new(EventType::TaskFailed, "executor")
                .for_task(&task.task_id)
                .with("kind", json!(failure.kind.as_str()))
                .with("message", json!(failure.message)),
        );
        Ok(task)
    }

    /// Store update with one retry; session I/O fails the task only after
    /// the second attempt.
    async fn persist_patch(
        &self,
        task_id: &str,
        patch: SessionPatch,
    ) -> Result<(), crate::session::SessionError> {
        if let Err(first) = self.store.update(task_id, patch.clone()).await {
            warn!(task = %task_id, error = %first, "session update failed; retrying once");
            self.store.update(task_id, patch).await?;
        }
        Ok(())
    }

    async fn persist_step(
        &self,
        task_id: &str,
        step: &Step,
    ) -> Result<(), crate::session::SessionError> {
        if let Err(first) = self.store.append_step(task_id, step).await {
            warn!(task = %task_id, error = %first, "step append failed; retrying once");
            self.store.append_step(task_id, step).await?;
        }
        Ok(())
    }

    fn emit(&self, event: Event) {
        self.bus.publish(event);
    }
}
