//! `cleanup` command: remove orphan containers.

use anyhow::Result;

use crate::cli::App;

pub async fn handle(app: &App, all: bool) -> Result<u8> {
    app.store.sync().await?;
    let removed = app.supervisor().sweep_containers(all).await?;
    if removed == 0 {
        println!("Nothing to clean up.");
    } else {
        println!("Removed {removed} container(s).");
    }
    Ok(0)
}
