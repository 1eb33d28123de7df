//! `cancel` command.

use anyhow::Result;
use console::Term;

use crate::cli::App;
use crate::infrastructure::supervisor::CancelOutcome;

pub async fn handle(app: &App, id: Option<String>) -> Result<u8> {
    let supervisor = app.supervisor();
    let id = match id {
        Some(id) => app.store.resolve_id(&id).await?,
        None => match pick_running_task(app).await? {
            Some(id) => id,
            None => {
                println!("No running tasks to cancel.");
                return Ok(0);
            }
        },
    };

    match supervisor.cancel(&id).await? {
        CancelOutcome::Cancelled { forced } => {
            if forced {
                println!("Task {id} cancelled (worker had to be force-killed)");
            } else {
                println!("Task {id} cancelled");
            }
            Ok(0)
        }
        CancelOutcome::NotRunning(status) => {
            println!("Task {id} is not running (status: {status}); nothing to do");
            Ok(0)
        }
    }
}

/// Interactive selection when no id was given.
async fn pick_running_task(app: &App) -> Result<Option<String>> {
    let running = app.supervisor().list_running(None).await?;
    if running.is_empty() {
        return Ok(None);
    }
    let term = Term::stderr();
    term.write_line("Running tasks:")?;
    for (i, task) in running.iter().enumerate() {
        term.write_line(&format!(
            "  {}. {} [{}] {}",
            i + 1,
            task.id,
            task.project,
            task.description.chars().take(50).collect::<String>()
        ))?;
    }
    term.write_str("Cancel which task? ")?;
    let answer = term.read_line()?;
    let index: usize = match answer.trim().parse() {
        Ok(n) => n,
        Err(_) => anyhow::bail!("invalid selection '{}'", answer.trim()),
    };
    if index == 0 || index > running.len() {
        anyhow::bail!("selection {index} out of range");
    }
    Ok(Some(running[index - 1].id.clone()))
}
