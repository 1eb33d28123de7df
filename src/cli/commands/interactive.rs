//! Interactive workflow: choose a project, describe the task, run it in
//! the foreground. This is what `conductor` with no arguments does.

use anyhow::Result;
use console::Term;

use crate::cli::commands::task::run_foreground;
use crate::cli::App;
use crate::domain::ports::config_source::ConfigSource;

pub async fn handle(app: &App) -> Result<u8> {
    let projects = app.source.list_projects()?;
    let term = Term::stderr();

    if projects.is_empty() {
        term.write_line("No projects configured yet.")?;
        term.write_line(&format!(
            "Create one by writing {}/<name>.yaml, for example:",
            app.global.config_dir.display()
        ))?;
        term.write_line("")?;
        term.write_line("  name: my-project")?;
        term.write_line("  repo_path: /path/to/checkout")?;
        term.write_line("  remote_repo: owner/repo")?;
        term.write_line("  base_branch: main")?;
        term.write_line("")?;
        term.write_line("Then run `conductor` again.")?;
        return Ok(0);
    }

    term.write_line("Projects:")?;
    for (i, name) in projects.iter().enumerate() {
        term.write_line(&format!("  {}. {name}", i + 1))?;
    }
    term.write_str("Project number: ")?;
    let answer = term.read_line()?;
    let index: usize = answer
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid selection '{}'", answer.trim()))?;
    if index == 0 || index > projects.len() {
        anyhow::bail!("selection {index} out of range");
    }
    let project = projects[index - 1].clone();

    term.write_str("Task description: ")?;
    let description = term.read_line()?;
    let description = description.trim();
    if description.is_empty() {
        anyhow::bail!("task description cannot be empty");
    }

    run_foreground(app, &project, description, None).await
}
