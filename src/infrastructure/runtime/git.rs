//! Git runtime over the `git` binary.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::git_runtime::{GitRuntime, MergeAttempt};

/// [`GitRuntime`] backed by the system `git` CLI.
#[derive(Debug, Default, Clone)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, repo: &Path, args: &[&str]) -> DomainResult<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .await
            .map_err(|e| DomainError::Runtime(format!("failed to run git: {e}")))?;
        Ok(output)
    }

    async fn run_ok(&self, repo: &Path, args: &[&str]) -> DomainResult<String> {
        let output = self.run(repo, args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::Runtime(format!(
                "git {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl GitRuntime for GitCli {
    async fn branch_exists(&self, repo: &Path, branch: &str) -> DomainResult<bool> {
        let reference = format!("refs/heads/{branch}");
        let output = self
            .run(repo, &["show-ref", "--verify", "--quiet", &reference])
            .await?;
        Ok(output.status.success())
    }

    async fn create_branch(&self, repo: &Path, branch: &str, from: &str) -> DomainResult<()> {
        self.run_ok(repo, &["branch", branch, from]).await?;
        debug!(branch, from, "branch created");
        Ok(())
    }

    async fn checkout(&self, repo: &Path, branch: &str) -> DomainResult<()> {
        self.run_ok(repo, &["checkout", branch]).await?;
        Ok(())
    }

    async fn merge_no_ff(
        &self,
        repo: &Path,
        source: &str,
        message: &str,
    ) -> DomainResult<MergeAttempt> {
        let merge = self
            .run(repo, &["merge", "--no-ff", "-m", message, "--", source])
            .await?;
        if merge.status.success() {
            let commit = self.head_commit(repo).await?;
            let diff = self
                .run_ok(repo, &["diff", "--name-only", "HEAD~1", "HEAD"])
                .await
                .unwrap_or_default();
            let files_changed = diff.lines().map(ToString::to_string).collect();
            return Ok(MergeAttempt::Clean {
                commit,
                files_changed,
            });
        }

        // Conflicted: collect the unmerged paths, then roll back.
        let conflicts = self
            .run_ok(repo, &["diff", "--name-only", "--diff-filter=U"])
            .await
            .unwrap_or_default();
        let files: Vec<String> = conflicts.lines().map(ToString::to_string).collect();
        if let Err(err) = self.abort_merge(repo).await {
            warn!(error = %err, "merge --abort failed after conflict");
        }
        Ok(MergeAttempt::Conflicted { files })
    }

    async fn abort_merge(&self, repo: &Path) -> DomainResult<()> {
        self.run_ok(repo, &["merge", "--abort"]).await?;
        Ok(())
    }

    async fn push(&self, repo: &Path, branch: &str) -> DomainResult<()> {
        self.run_ok(repo, &["push", "--set-upstream", "origin", branch])
            .await?;
        Ok(())
    }

    async fn delete_branch(&self, repo: &Path, branch: &str) -> DomainResult<()> {
        self.run_ok(repo, &["branch", "-D", branch]).await?;
        Ok(())
    }

    async fn list_task_branches(&self, repo: &Path) -> DomainResult<Vec<String>> {
        let stdout = self
            .run_ok(
                repo,
                &[
                    "for-each-ref",
                    "--format=%(refname:short)",
                    "refs/heads/task-*",
                ],
            )
            .await?;
        Ok(stdout.lines().map(ToString::to_string).collect())
    }

    async fn diff_is_empty(&self, repo: &Path, base: &str, branch: &str) -> DomainResult<bool> {
        let range = format!("{base}...{branch}");
        let diff = self.run_ok(repo, &["diff", "--name-only", &range]).await?;
        Ok(diff.trim().is_empty())
    }

    async fn head_commit(&self, repo: &Path) -> DomainResult<String> {
        let sha = self.run_ok(repo, &["rev-parse", "HEAD"]).await?;
        Ok(sha.trim().to_string())
    }
}
