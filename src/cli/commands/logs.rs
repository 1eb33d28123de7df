//! `logs` command: print or follow a task's log file.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::cli::App;
use crate::domain::models::TaskStatus;

/// Poll interval while following.
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

pub async fn handle(app: &App, id: &str, follow: bool, lines: usize) -> Result<u8> {
    let id = app.store.resolve_id(id).await?;
    let task = app.store.load(&id).await?;
    let path = log_path(app, &task.id, task.log_path.clone());
    if !path.exists() {
        eprintln!("No log file for task {id} ({})", path.display());
        return Ok(1);
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    for line in tail_lines(&content, lines) {
        println!("{line}");
    }

    if follow {
        follow_file(app, &id, &path, content.len() as u64).await?;
    }
    Ok(0)
}

fn log_path(app: &App, id: &str, recorded: Option<PathBuf>) -> PathBuf {
    recorded.unwrap_or_else(|| app.global.logs_dir.join(format!("{id}.log")))
}

fn tail_lines(content: &str, n: usize) -> Vec<&str> {
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(n);
    all[start..].to_vec()
}

/// Stream appended bytes until interrupted or the task goes terminal and
/// the file stops growing.
async fn follow_file(app: &App, id: &str, path: &PathBuf, mut offset: u64) -> Result<()> {
    let mut quiet_polls_after_exit = 0u32;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            () = tokio::time::sleep(FOLLOW_INTERVAL) => {}
        }

        let mut file = tokio::fs::File::open(path).await?;
        let len = file.metadata().await?.len();
        if len > offset {
            file.seek(SeekFrom::Start(offset)).await?;
            let mut buffer = String::new();
            file.read_to_string(&mut buffer).await?;
            print!("{buffer}");
            offset = len;
            quiet_polls_after_exit = 0;
        } else if app
            .store
            .load(id)
            .await
            .map(|t| t.status != TaskStatus::Running)
            .unwrap_or(true)
        {
            quiet_polls_after_exit += 1;
            // Terminal task and two quiet polls: nothing more is coming.
            if quiet_polls_after_exit >= 2 {
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tail_lines() {
        let content = "a\nb\nc\nd\n";
        assert_eq!(tail_lines(content, 2), vec!["c", "d"]);
        assert_eq!(tail_lines(content, 10).len(), 4);
        assert!(tail_lines("", 5).is_empty());
    }
}
