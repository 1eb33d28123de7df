//! `approve` and `reject` commands: manual PR creation and branch disposal.

use anyhow::{Context, Result};

use crate::cli::App;
use crate::domain::ports::config_source::ConfigSource;
use crate::domain::ports::host_adapter::PrRequest;

/// Manually create the pull request for a task branch.
pub async fn handle_approve(app: &App, id: &str) -> Result<u8> {
    let id = app.store.resolve_id(id).await?;
    let task = app.store.load(&id).await?;
    if let Some(url) = &task.pr_url {
        println!("Task {id} already has a pull request: {url}");
        return Ok(0);
    }
    let branch = task
        .branch
        .clone()
        .with_context(|| format!("task {id} has no branch to open a PR from"))?;
    let project = app.source.load_project(&task.project)?;
    let remote = project
        .remote_repo
        .clone()
        .with_context(|| format!("project '{}' has no remote_repo configured", project.name))?;

    let title = match &project.pr.title_prefix {
        Some(prefix) => format!("{prefix} {}", task.description.chars().take(60).collect::<String>()),
        None => task.description.chars().take(60).collect(),
    };
    let pr = app
        .host
        .create_pr(&PrRequest {
            repo: remote,
            head: branch,
            base: project.base_branch.clone(),
            title,
            body: format!("Automated change produced by conductor task `{id}`."),
            draft: project.pr.draft,
            labels: project.pr.labels.clone(),
        })
        .await?;

    app.store
        .update(&id, |t| t.pr_url = Some(pr.url.clone()))
        .await?;
    println!("Pull request created: {}", pr.url);
    Ok(0)
}

/// Delete a task's branch. Protected branches are never touched.
pub async fn handle_reject(app: &App, id: &str) -> Result<u8> {
    let id = app.store.resolve_id(id).await?;
    let task = app.store.load(&id).await?;
    let branch = task
        .branch
        .clone()
        .with_context(|| format!("task {id} has no branch to delete"))?;
    let project = app.source.load_project(&task.project)?;
    if project.is_protected(&branch) {
        anyhow::bail!("refusing to delete protected branch '{branch}'");
    }
    app.git.checkout(&project.repo_path, &project.base_branch).await?;
    app.git.delete_branch(&project.repo_path, &branch).await?;
    println!("Deleted branch {branch} for task {id}");
    Ok(0)
}
