//! Conductor CLI entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use conductor::cli::{commands, App, Cli, Commands};
use conductor::domain::models::GlobalConfig;
use conductor::infrastructure::config::{ConfigLoader, FileConfigSource};
use conductor::infrastructure::runtime::{DockerCli, GitCli, GitHubAdapter};
use conductor::infrastructure::state::TaskStateStore;
use conductor::infrastructure::logging;
use conductor::services::AgentRegistry;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<u8> {
    let install_dir = std::env::var("CONDUCTOR_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".conductor"));
    let global = ConfigLoader::load_global(&install_dir).context("Failed to load configuration")?;

    // Workers log structured JSON into the task's log file; everything
    // else logs to stderr.
    let worker_log = match &cli.command {
        Some(Commands::Task {
            worker: Some(id), ..
        }) => Some(global.logs_dir.join(format!("{id}.log"))),
        _ => None,
    };
    if let Some(path) = &worker_log {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let _log_guard = logging::init(&global.logging, worker_log.as_deref())?;

    let app = build_app(global, cli.json)?;

    match cli.command {
        None => commands::interactive::handle(&app).await,
        Some(Commands::Task {
            project,
            description,
            background,
            worker,
        }) => commands::task::handle(&app, &project, &description, background, worker).await,
        Some(Commands::Status { project }) => commands::status::handle(&app, project).await,
        Some(Commands::Logs { id, follow, lines }) => {
            commands::logs::handle(&app, &id, follow, lines).await
        }
        Some(Commands::Cancel { id }) => commands::cancel::handle(&app, id).await,
        Some(Commands::Restart { id, background }) => {
            commands::restart::handle(&app, &id, background).await
        }
        Some(Commands::Approve { id }) => commands::review::handle_approve(&app, &id).await,
        Some(Commands::Reject { id }) => commands::review::handle_reject(&app, &id).await,
        Some(Commands::Cleanup { all }) => commands::cleanup::handle(&app, all).await,
    }
}

fn build_app(global: GlobalConfig, json: bool) -> Result<App> {
    let mut registry = AgentRegistry::with_standard_agents();
    for agent in &global.extra_agents {
        registry
            .register(agent.clone())
            .with_context(|| format!("duplicate extra agent '{}'", agent.name))?;
    }

    let source = Arc::new(FileConfigSource::new(
        std::env::var("CONDUCTOR_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(".conductor")),
        global.config_dir.clone(),
    ));
    let store = Arc::new(TaskStateStore::new(global.tasks_dir.clone()));

    Ok(App {
        global,
        json,
        source,
        store,
        registry: Arc::new(registry),
        git: Arc::new(GitCli::new()),
        containers: Arc::new(DockerCli::new()),
        host: Arc::new(GitHubAdapter::from_env()),
    })
}
