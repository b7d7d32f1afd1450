//! Argument definitions (clap derive).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "ensemble",
    about = "Drive a team of cooperating agents through long-running tasks",
    version
)]
pub struct Cli {
    /// Workspace root for sessions, memories, and task scratch directories.
    /// Defaults to $ENSEMBLE_WORKSPACE or ./workspace.
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Print handoffs, tool calls, and memory events while a task runs.
    #[arg(long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a new task from a prompt; prints the task id.
    Start {
        /// The task prompt.
        prompt: String,
        /// Team configuration file (YAML).
        #[arg(long, default_value = "teams/default.yaml")]
        config: PathBuf,
        /// Override the team's round cap.
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// Resume a persisted task from where it left off.
    Resume {
        task_id: String,
        /// Team configuration file; defaults to the one the task was
        /// started with.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the team's round cap.
        #[arg(long)]
        max_rounds: Option<u32>,
    },
    /// List task sessions.
    List {
        /// Filter by status (created, running, paused, completed, failed,
        /// stopped).
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one task session in detail.
    Details { task_id: String },
    /// Find resumable sessions similar to a description.
    Find { description: String },
    /// Mark a non-terminal task stopped.
    Stop { task_id: String },
}
