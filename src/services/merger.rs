//! Branch merger: serial, deterministic recombination of part branches.
//!
//! Parts merge into the coordination branch strictly in part-index order
//! with non-fast-forward merges. A conflict aborts the attempt, rolls the
//! working tree back, and fails the whole operation; the merger never
//! invents resolutions.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::git_runtime::{GitRuntime, MergeAttempt};

/// Record of one clean merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// 1-based part index.
    pub part_index: usize,
    pub branch: String,
    pub commit: String,
    pub files_changed: Vec<String>,
}

/// Merges part branches into a coordination branch.
pub struct BranchMerger {
    git: Arc<dyn GitRuntime>,
}

impl BranchMerger {
    pub fn new(git: Arc<dyn GitRuntime>) -> Self {
        Self { git }
    }

    /// Merge `branches` (paired with their 1-based part index) into
    /// `target`, in index order.
    ///
    /// On conflict the merge is aborted and the whole operation fails with
    /// [`DomainError::MergeConflict`] naming the offending files and the
    /// branches already merged. Given the same base commit and branches,
    /// the result is identical on every run.
    #[instrument(skip(self, repo), fields(target = target))]
    pub async fn merge_parts(
        &self,
        repo: &Path,
        target: &str,
        branches: &[(usize, String)],
    ) -> DomainResult<Vec<MergeOutcome>> {
        let mut ordered: Vec<&(usize, String)> = branches.iter().collect();
        ordered.sort_by_key(|(index, _)| *index);

        self.git.checkout(repo, target).await?;

        let mut merged: Vec<MergeOutcome> = Vec::new();
        for (index, branch) in ordered {
            let message = format!("Merge {branch} into {target}");
            match self.git.merge_no_ff(repo, branch, &message).await? {
                MergeAttempt::Clean {
                    commit,
                    files_changed,
                } => {
                    info!(branch = %branch, commit = %commit, "part merged");
                    merged.push(MergeOutcome {
                        part_index: *index,
                        branch: branch.clone(),
                        commit,
                        files_changed,
                    });
                }
                MergeAttempt::Conflicted { files } => {
                    // The adapter already aborted the merge; the tree is
                    // back at the last clean state.
                    return Err(DomainError::MergeConflict {
                        branch: branch.clone(),
                        files,
                        merged: merged.into_iter().map(|m| m.branch).collect(),
                    });
                }
            }
        }
        Ok(merged)
    }
}
