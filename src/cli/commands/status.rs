//! `status` command: list running tasks.

use anyhow::Result;

use crate::cli::output::TableFormatter;
use crate::cli::App;

pub async fn handle(app: &App, project: Option<String>) -> Result<u8> {
    let supervisor = app.supervisor();
    // Reconcile and sweep before reporting, so dead workers show as
    // interrupted and their leftovers are gone.
    app.store.sync().await?;
    supervisor.sweep().await?;

    let running = supervisor.list_running(project.as_deref()).await?;
    if app.json {
        println!("{}", serde_json::to_string_pretty(&running)?);
    } else {
        println!("{}", TableFormatter::new().format_tasks(&running));
        if running.is_empty() {
            println!("No running tasks.");
        }
    }
    Ok(0)
}
