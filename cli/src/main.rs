//! `ensemble` binary entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::args::{Cli, Command};
use cli::{handlers, EXIT_USER_ERROR};

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = config::load_and_apply("ensemble", None) {
        eprintln!("config: {}", e);
        std::process::exit(EXIT_USER_ERROR);
    }

    let cli = Cli::parse();
    let workspace = config::workspace_dir(cli.workspace.as_deref());

    let result = match &cli.command {
        Command::Start {
            prompt,
            config,
            max_rounds,
        } => handlers::start(prompt, config, *max_rounds, &workspace, cli.verbose).await,
        Command::Resume {
            task_id,
            config,
            max_rounds,
        } => {
            handlers::resume(
                task_id,
                config.as_deref(),
                *max_rounds,
                &workspace,
                cli.verbose,
            )
            .await
        }
        Command::List { status } => handlers::list(status.as_deref(), &workspace).await,
        Command::Details { task_id } => handlers::details(task_id, &workspace).await,
        Command::Find { description } => handlers::find(description, &workspace).await,
        Command::Stop { task_id } => handlers::stop(task_id, &workspace).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}
