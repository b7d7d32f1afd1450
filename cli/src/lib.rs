//! CLI surface over the ensemble engine.
//!
//! Commands: `start`, `resume`, `list`, `details`, `find`, `stop`. Exit
//! codes: 0 success, 1 user error (unknown task, bad config), 2 runtime
//! error (task failed), 130 interrupted.

pub mod args;
pub mod handlers;
pub mod output;

pub const EXIT_OK: i32 = 0;
pub const EXIT_USER_ERROR: i32 = 1;
pub const EXIT_RUNTIME_ERROR: i32 = 2;
pub const EXIT_INTERRUPTED: i32 = 130;

/// CLI-level failure, already classified for the exit code.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Bad invocation: unknown task, unreadable config, unsupported value.
    #[error("{0}")]
    User(String),
    /// The engine could not complete the task.
    #[error("{0}")]
    Runtime(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::User(_) => EXIT_USER_ERROR,
            CliError::Runtime(_) => EXIT_RUNTIME_ERROR,
        }
    }
}
