//! `restart` command: run a finished task again as a fresh task.
//!
//! The new task starts with a clean conversation; the original is only
//! referenced through `restarted_from`.

use anyhow::Result;

use crate::cli::commands::task::run_foreground;
use crate::cli::App;
use crate::domain::models::TaskStatus;

pub async fn handle(app: &App, id: &str, background: bool) -> Result<u8> {
    let id = app.store.resolve_id(id).await?;
    let original = app.store.load(&id).await?;
    if original.status == TaskStatus::Running {
        println!("Task {id} is still running; cancel it first");
        return Ok(1);
    }

    if background {
        let spawned = app
            .supervisor()
            .start_background(&original.project, &original.description, Some(id.clone()))
            .await?;
        println!(
            "Task {} restarted as {} (pid {}, log {})",
            id,
            spawned.id,
            spawned.pid,
            spawned.log_path.display()
        );
        Ok(0)
    } else {
        println!("Restarting task {id} in the foreground");
        run_foreground(app, &original.project, &original.description, Some(id)).await
    }
}
