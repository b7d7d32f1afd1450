//! Command handlers: wire the engine together per invocation.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use ensemble::{
    bus_for_team, install_team_memory, load_team, ExecutorOptions, FileSessionStore, ListFilter,
    MockBrain, SessionPatch, SessionStore, SharedBrain, Task, TaskControl, TaskExecutor,
    TaskStatus, Team, ToolRegistry,
};

use crate::output;
use crate::CliError;

/// Loads the team, applying a round-cap override before validation.
fn team_with_overrides(path: &Path, max_rounds: Option<u32>) -> Result<Team, CliError> {
    let team = load_team(path).map_err(|e| CliError::User(e.to_string()))?;
    match max_rounds {
        None => Ok(team),
        Some(cap) => {
            let mut config = team.config;
            config.max_rounds = cap;
            Team::new(config).map_err(|e| CliError::User(e.to_string()))
        }
    }
}

/// Brain wiring. Concrete LLM providers are linked by embedders of the
/// library; the CLI bundles only the offline scripted brain.
fn provider_for(team: &Team) -> Result<Arc<dyn ensemble::BrainProvider>, CliError> {
    for agent in &team.config.agents {
        match agent.brain.provider.as_str() {
            "mock" | "scripted" => {}
            other => {
                return Err(CliError::User(format!(
                    "agent '{}' wants brain provider '{}', which is not bundled with this CLI; \
                     embed the ensemble library with your provider crate, or use provider 'mock' \
                     for offline runs",
                    agent.name, other
                )))
            }
        }
    }
    Ok(Arc::new(SharedBrain(Arc::new(MockBrain::new(vec![])))))
}

async fn open_store(workspace: &Path) -> Result<Arc<FileSessionStore>, CliError> {
    FileSessionStore::open(workspace)
        .await
        .map(Arc::new)
        .map_err(|e| CliError::User(format!("open workspace {}: {}", workspace.display(), e)))
}

struct RunOutcome {
    task: Task,
    interrupted: bool,
}

/// Runs a task (fresh or resumed) with Ctrl-C wired to `stop`, streaming
/// text to stdout and, with `verbose`, narrating events.
async fn drive(
    team: Arc<Team>,
    provider: Arc<dyn ensemble::BrainProvider>,
    store: Arc<FileSessionStore>,
    workspace: &Path,
    verbose: bool,
    run: impl FnOnce(
        TaskExecutor,
        TaskControl,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Task, ensemble::TaskError>> + Send>,
    >,
) -> Result<RunOutcome, CliError> {
    let bus = bus_for_team(&team);
    let registry = Arc::new(ToolRegistry::new());
    install_team_memory(&team, &registry, &bus, workspace)
        .await
        .map_err(|e| CliError::User(format!("memory backend: {}", e)))?;

    // Stream assistant text as it is produced.
    let (delta_tx, mut delta_rx) = tokio::sync::mpsc::channel::<String>(256);
    let printer = tokio::spawn(async move {
        use std::io::Write;
        while let Some(delta) = delta_rx.recv().await {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
        }
        println!();
    });

    if verbose {
        let mut sub = bus.subscribe("*");
        tokio::spawn(async move {
            while let Some(event) = sub.recv().await {
                output::print_event(&event);
            }
        });
    } else {
        // Always announce the task id as soon as it exists.
        let mut sub = bus.subscribe("task.created");
        tokio::spawn(async move {
            if let Some(event) = sub.recv().await {
                if let Some(id) = event.task_id {
                    eprintln!("task {}", id);
                }
            }
        });
    }

    let executor = TaskExecutor::new(
        team,
        provider,
        registry,
        store as Arc<dyn SessionStore>,
        bus,
        ExecutorOptions {
            workspace_root: Some(workspace.join("scratch")),
            text_deltas: Some(delta_tx),
            ..Default::default()
        },
    );

    let control = TaskControl::new();
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let control = control.clone();
        let interrupted = Arc::clone(&interrupted);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; stopping task");
                interrupted.store(true, Ordering::SeqCst);
                control.stop();
            }
        });
    }

    let task = run(executor, control)
        .await
        .map_err(|e| CliError::User(e.to_string()))?;
    // The executor (and its delta sender) is gone; the printer drains and ends.
    let _ = printer.await;
    Ok(RunOutcome {
        task,
        interrupted: interrupted.load(Ordering::SeqCst),
    })
}

fn outcome_to_exit(outcome: RunOutcome) -> Result<i32, CliError> {
    output::print_final(&outcome.task);
    match outcome.task.status {
        TaskStatus::Completed => Ok(crate::EXIT_OK),
        TaskStatus::Stopped if outcome.interrupted => Ok(crate::EXIT_INTERRUPTED),
        TaskStatus::Stopped => Ok(crate::EXIT_OK),
        TaskStatus::Failed => {
            let message = outcome
                .task
                .error
                .map(|e| format!("{}: {}", e.kind, e.message))
                .unwrap_or_else(|| "task failed".into());
            Err(CliError::Runtime(message))
        }
        other => Err(CliError::Runtime(format!(
            "task ended in unexpected status {}",
            other
        ))),
    }
}

pub async fn start(
    prompt: &str,
    config: &Path,
    max_rounds: Option<u32>,
    workspace: &Path,
    verbose: bool,
) -> Result<i32, CliError> {
    let team = Arc::new(team_with_overrides(config, max_rounds)?);
    let provider = provider_for(&team)?;
    let store = open_store(workspace).await?;
    let config_ref = config.display().to_string();
    let prompt = prompt.to_string();
    let outcome = drive(team, provider, store, workspace, verbose, move |executor, control| {
        Box::pin(async move {
            executor
                .start(&prompt, &config_ref, &control)
                .await
        })
    })
    .await?;
    outcome_to_exit(outcome)
}

pub async fn resume(
    task_id: &str,
    config_override: Option<&Path>,
    max_rounds: Option<u32>,
    workspace: &Path,
    verbose: bool,
) -> Result<i32, CliError> {
    let store = open_store(workspace).await?;
    let session = store
        .get(task_id)
        .await
        .map_err(|e| CliError::User(e.to_string()))?
        .ok_or_else(|| CliError::User(format!("unknown task: {}", task_id)))?;

    let config_path: PathBuf = config_override
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&session.task.config_ref));
    let team = Arc::new(team_with_overrides(&config_path, max_rounds)?);
    let provider = provider_for(&team)?;

    let task_id = task_id.to_string();
    let outcome = drive(team, provider, store, workspace, verbose, move |executor, control| {
        Box::pin(async move { executor.resume(&task_id, &control).await })
    })
    .await?;
    outcome_to_exit(outcome)
}

pub async fn list(status: Option<&str>, workspace: &Path) -> Result<i32, CliError> {
    let filter = match status {
        None => ListFilter::default(),
        Some(raw) => ListFilter {
            status: Some(
                raw.parse::<TaskStatus>()
                    .map_err(CliError::User)?,
            ),
            ..Default::default()
        },
    };
    let store = open_store(workspace).await?;
    let rows = store
        .list(filter)
        .await
        .map_err(|e| CliError::User(e.to_string()))?;
    output::print_list(&rows);
    Ok(crate::EXIT_OK)
}

pub async fn details(task_id: &str, workspace: &Path) -> Result<i32, CliError> {
    let store = open_store(workspace).await?;
    let session = store
        .get(task_id)
        .await
        .map_err(|e| CliError::User(e.to_string()))?
        .ok_or_else(|| CliError::User(format!("unknown task: {}", task_id)))?;
    output::print_details(&session);
    Ok(crate::EXIT_OK)
}

pub async fn find(description: &str, workspace: &Path) -> Result<i32, CliError> {
    let store = open_store(workspace).await?;
    let rows = store
        .find_continuable(description)
        .await
        .map_err(|e| CliError::User(e.to_string()))?;
    if rows.is_empty() {
        println!("no similar resumable tasks found");
    } else {
        output::print_list(&rows);
        println!("\nresume with: ensemble resume <task_id>");
    }
    Ok(crate::EXIT_OK)
}

/// Marks a non-terminal session stopped. This acts on the persisted record;
/// a driver running in this process observes Ctrl-C instead.
pub async fn stop(task_id: &str, workspace: &Path) -> Result<i32, CliError> {
    let store = open_store(workspace).await?;
    let session = store
        .get(task_id)
        .await
        .map_err(|e| CliError::User(e.to_string()))?
        .ok_or_else(|| CliError::User(format!("unknown task: {}", task_id)))?;
    if session.task.status.is_terminal() {
        return Err(CliError::User(format!(
            "task {} is already {}",
            task_id, session.task.status
        )));
    }
    store
        .update(task_id, SessionPatch::status(TaskStatus::Stopped))
        .await
        .map_err(|e| CliError::Runtime(e.to_string()))?;
    println!("task {} stopped", task_id);
    Ok(crate::EXIT_OK)
}
