//! `task` command: foreground run, background spawn, and worker mode.

use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};

use crate::cli::commands::EXIT_INTERRUPTED;
use crate::cli::App;
use crate::domain::models::{TaskRecord, TaskStatus};
use crate::domain::ports::config_source::ConfigSource;
use crate::services::CancelFlag;

/// Dispatch for `task <project> <description> [-b] [--worker <id>]`.
pub async fn handle(
    app: &App,
    project: &str,
    description: &str,
    background: bool,
    worker: Option<String>,
) -> Result<u8> {
    if let Some(task_id) = worker {
        return run_worker(app, &task_id).await;
    }
    if background {
        return start_background(app, project, description).await;
    }
    run_foreground(app, project, description, None).await
}

/// Spawn a detached worker via the supervisor and report its handle.
async fn start_background(app: &App, project: &str, description: &str) -> Result<u8> {
    // Validate the project before spawning anything.
    app.source.load_project(project)?;
    let spawned = app
        .supervisor()
        .start_background(project, description, None)
        .await?;
    if app.json {
        println!(
            "{}",
            serde_json::json!({
                "id": spawned.id,
                "pid": spawned.pid,
                "logPath": spawned.log_path,
            })
        );
    } else {
        println!("Task {} started in background", spawned.id);
        println!("  pid: {}", spawned.pid);
        println!("  log: {}", spawned.log_path.display());
        println!("Follow with: conductor logs {} -f", spawned.id);
    }
    Ok(0)
}

/// Run a task in this process. Ctrl-C cancels cooperatively and exits 130.
pub async fn run_foreground(
    app: &App,
    project_name: &str,
    description: &str,
    restarted_from: Option<String>,
) -> Result<u8> {
    let project = app.source.load_project(project_name)?;
    let orchestrator = app.orchestrator()?;

    let mut task = TaskRecord::new(project_name, description);
    task.restarted_from = restarted_from;
    #[allow(clippy::cast_possible_wrap)]
    let own_pid = std::process::id() as i32;
    task.pid = Some(own_pid);
    app.store.save(&task).await?;

    let cancel = CancelFlag::new();
    let ctrl_c_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received; finishing the current turn then cleaning up...");
            ctrl_c_flag.set();
        }
    });

    let spinner = if app.json || !console::user_attended() {
        None
    } else {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.enable_steady_tick(Duration::from_millis(120));
        bar.set_message(format!("running task {}", task.id));
        Some(bar)
    };

    let task_id = task.id.clone();
    let finished = orchestrator.run(&project, task, cancel).await;
    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }
    let finished = finished?;

    report_outcome(app, &finished);
    info!(task_id = %task_id, status = %finished.status, "foreground run finished");
    Ok(exit_code_for(finished.status))
}

/// Worker mode: the process spawned by the supervisor. The record already
/// exists with this worker's pid; run it to a terminal status.
async fn run_worker(app: &App, task_id: &str) -> Result<u8> {
    // The supervisor persists the record just after spawning us; retry
    // briefly to close the hand-off window.
    let mut task = None;
    for _ in 0..20 {
        match app.store.load(task_id).await {
            Ok(found) => {
                task = Some(found);
                break;
            }
            Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
    let task = task.with_context(|| format!("task {task_id} never appeared in the state store"))?;
    let project = app.source.load_project(&task.project)?;
    let orchestrator = app.orchestrator()?;

    let cancel = CancelFlag::new();
    #[cfg(unix)]
    {
        let term_flag = cancel.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(err) => {
                    error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            sigterm.recv().await;
            info!("SIGTERM received; cancelling at next suspension point");
            term_flag.set();
        });
    }

    let finished = orchestrator.run(&project, task, cancel).await?;
    Ok(exit_code_for(finished.status))
}

fn exit_code_for(status: TaskStatus) -> u8 {
    match status {
        TaskStatus::Completed => 0,
        TaskStatus::Cancelled => EXIT_INTERRUPTED,
        _ => 1,
    }
}

fn report_outcome(app: &App, task: &TaskRecord) {
    if app.json {
        println!(
            "{}",
            serde_json::to_string_pretty(task).unwrap_or_else(|_| "{}".to_string())
        );
        return;
    }
    match task.status {
        TaskStatus::Completed => {
            println!("Task {} completed (${:.4})", task.id, task.cost_usd);
            if let Some(branch) = &task.branch {
                println!("  branch: {branch}");
            }
            match &task.pr_url {
                Some(url) => println!("  pull request: {url}"),
                None => {
                    if task.branch.is_some() {
                        println!("  no pull request; run `conductor approve {}`", task.id);
                    }
                }
            }
        }
        TaskStatus::Cancelled => println!("Task {} cancelled", task.id),
        _ => {
            println!("Task {} {}", task.id, task.status);
            if let Some(reason) = &task.failure_reason {
                println!("  reason: {reason}");
            }
            if let Some(branch) = &task.branch {
                println!("  partial work preserved on: {branch}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for(TaskStatus::Completed), 0);
        assert_eq!(exit_code_for(TaskStatus::Cancelled), EXIT_INTERRUPTED);
        assert_eq!(exit_code_for(TaskStatus::Failed), 1);
        assert_eq!(exit_code_for(TaskStatus::Interrupted), 1);
    }
}
