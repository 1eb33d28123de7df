//! Git runtime port.
//!
//! Branch protection is config-derived and enforced at call sites via
//! `ProjectConfig::is_protected`; implementations of this trait only run
//! the plumbing they are asked to run.

use std::path::Path;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Result of one merge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeAttempt {
    /// Merge committed cleanly.
    Clean {
        commit: String,
        files_changed: Vec<String>,
    },
    /// Merge hit conflicts; the implementation already aborted it and the
    /// working tree is back at the pre-attempt state.
    Conflicted { files: Vec<String> },
}

/// Trait for git implementations.
#[async_trait]
pub trait GitRuntime: Send + Sync {
    async fn branch_exists(&self, repo: &Path, branch: &str) -> DomainResult<bool>;

    async fn create_branch(&self, repo: &Path, branch: &str, from: &str) -> DomainResult<()>;

    async fn checkout(&self, repo: &Path, branch: &str) -> DomainResult<()>;

    /// Non-fast-forward merge of `source` into the checked-out branch.
    /// On conflict the merge is aborted before returning.
    async fn merge_no_ff(
        &self,
        repo: &Path,
        source: &str,
        message: &str,
    ) -> DomainResult<MergeAttempt>;

    async fn abort_merge(&self, repo: &Path) -> DomainResult<()>;

    async fn push(&self, repo: &Path, branch: &str) -> DomainResult<()>;

    async fn delete_branch(&self, repo: &Path, branch: &str) -> DomainResult<()>;

    /// Local branches in the orchestrator's `task-` namespace. The
    /// supervisor sweep enumerates these to reclaim branches left behind
    /// by crash-killed workers.
    async fn list_task_branches(&self, repo: &Path) -> DomainResult<Vec<String>>;

    /// Whether `branch` introduces no changes over `base`.
    async fn diff_is_empty(&self, repo: &Path, base: &str, branch: &str) -> DomainResult<bool>;

    async fn head_commit(&self, repo: &Path) -> DomainResult<String>;
}
