//! Mock and in-memory adapters for testing.
//!
//! The scripted model adapter replays queued responses; the fake git and
//! container runtimes record every operation so tests can assert ordering
//! and cleanup behavior.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::container_runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutcome,
};
use crate::domain::ports::git_runtime::{GitRuntime, MergeAttempt};
use crate::domain::ports::host_adapter::{HostAdapter, PrHandle, PrRequest};
use crate::domain::ports::model_adapter::{
    ModelAdapter, ModelError, ModelRequest, ModelResponse,
};

/// Scripted model adapter. Responses are matched first by a substring of
/// the user prompt (keyed), then by queue order, then a terminal default.
#[derive(Default)]
pub struct MockModelAdapter {
    queue: Mutex<std::collections::VecDeque<Result<ModelResponse, ModelError>>>,
    keyed: Mutex<Vec<(String, Result<ModelResponse, ModelError>)>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl MockModelAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a plain text response with a nominal cost.
    pub fn push_text(&self, text: impl Into<String>) {
        self.push_response(ModelResponse {
            text: text.into(),
            cost_usd: Some(0.01),
            input_tokens: 100,
            output_tokens: 50,
            duration_ms: 20,
        });
    }

    /// Queue a full response.
    pub fn push_response(&self, response: ModelResponse) {
        self.queue.lock().unwrap().push_back(Ok(response));
    }

    /// Queue an error.
    pub fn push_error(&self, error: ModelError) {
        self.queue.lock().unwrap().push_back(Err(error));
    }

    /// Respond with `text` to the first request whose user prompt contains
    /// `key`. Keyed responses win over the queue; each fires once.
    pub fn push_keyed_text(&self, key: impl Into<String>, text: impl Into<String>) {
        self.keyed.lock().unwrap().push((
            key.into(),
            Ok(ModelResponse {
                text: text.into(),
                cost_usd: Some(0.01),
                input_tokens: 100,
                output_tokens: 50,
                duration_ms: 20,
            }),
        ));
    }

    /// Keyed variant of [`Self::push_error`].
    pub fn push_keyed_error(&self, key: impl Into<String>, error: ModelError) {
        self.keyed.lock().unwrap().push((key.into(), Err(error)));
    }

    /// All requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelAdapter for MockModelAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let prompt = request.user_prompt.clone();
        self.requests.lock().unwrap().push(request);
        {
            let mut keyed = self.keyed.lock().unwrap();
            if let Some(position) = keyed.iter().position(|(key, _)| prompt.contains(key)) {
                return keyed.remove(position).1;
            }
        }
        self.queue.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(ModelResponse {
                text: "Done.\nNEXT: COMPLETE\nREASON: ok".to_string(),
                cost_usd: Some(0.01),
                input_tokens: 100,
                output_tokens: 50,
                duration_ms: 20,
            })
        })
    }
}

#[derive(Default)]
struct GitState {
    branches: Vec<String>,
    /// Branch -> conflicting files injected for its merge.
    conflicts: HashMap<String, Vec<String>>,
    /// Branch -> files reported changed by its merge.
    files_changed: HashMap<String, Vec<String>>,
    /// Branches whose diff against any base is empty.
    empty_diffs: Vec<String>,
    merges: Vec<String>,
    deleted: Vec<String>,
    pushed: Vec<String>,
    checkouts: Vec<String>,
    commit_counter: usize,
}

/// In-memory [`GitRuntime`] recording operations for assertions.
#[derive(Default)]
pub struct FakeGitRuntime {
    state: Mutex<GitState>,
}

impl FakeGitRuntime {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.add_branch("main");
        fake
    }

    pub fn add_branch(&self, branch: &str) {
        let mut state = self.state.lock().unwrap();
        if !state.branches.iter().any(|b| b == branch) {
            state.branches.push(branch.to_string());
        }
    }

    /// Make the next merge of `branch` conflict on `files`.
    pub fn set_conflict(&self, branch: &str, files: &[&str]) {
        self.state.lock().unwrap().conflicts.insert(
            branch.to_string(),
            files.iter().map(ToString::to_string).collect(),
        );
    }

    pub fn set_files_changed(&self, branch: &str, files: &[&str]) {
        self.state.lock().unwrap().files_changed.insert(
            branch.to_string(),
            files.iter().map(ToString::to_string).collect(),
        );
    }

    /// Mark `branch` as introducing no changes.
    pub fn set_empty_diff(&self, branch: &str) {
        self.state.lock().unwrap().empty_diffs.push(branch.to_string());
    }

    pub fn merges(&self) -> Vec<String> {
        self.state.lock().unwrap().merges.clone()
    }

    pub fn deleted_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    pub fn pushed_branches(&self) -> Vec<String> {
        self.state.lock().unwrap().pushed.clone()
    }

    pub fn branches(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.clone()
    }
}

#[async_trait]
impl GitRuntime for FakeGitRuntime {
    async fn branch_exists(&self, _repo: &Path, branch: &str) -> DomainResult<bool> {
        Ok(self.state.lock().unwrap().branches.iter().any(|b| b == branch))
    }

    async fn create_branch(&self, _repo: &Path, branch: &str, from: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.branches.iter().any(|b| b == from) {
            return Err(DomainError::Runtime(format!("unknown base branch {from}")));
        }
        if state.branches.iter().any(|b| b == branch) {
            return Err(DomainError::Runtime(format!("branch {branch} exists")));
        }
        state.branches.push(branch.to_string());
        Ok(())
    }

    async fn checkout(&self, _repo: &Path, branch: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        if !state.branches.iter().any(|b| b == branch) {
            return Err(DomainError::Runtime(format!("unknown branch {branch}")));
        }
        state.checkouts.push(branch.to_string());
        Ok(())
    }

    async fn merge_no_ff(
        &self,
        _repo: &Path,
        source: &str,
        _message: &str,
    ) -> DomainResult<MergeAttempt> {
        let mut state = self.state.lock().unwrap();
        if let Some(files) = state.conflicts.get(source).cloned() {
            return Ok(MergeAttempt::Conflicted { files });
        }
        state.merges.push(source.to_string());
        state.commit_counter += 1;
        let commit = format!("merge{:04}", state.commit_counter);
        let files_changed = state.files_changed.get(source).cloned().unwrap_or_default();
        Ok(MergeAttempt::Clean {
            commit,
            files_changed,
        })
    }

    async fn abort_merge(&self, _repo: &Path) -> DomainResult<()> {
        Ok(())
    }

    async fn push(&self, _repo: &Path, branch: &str) -> DomainResult<()> {
        self.state.lock().unwrap().pushed.push(branch.to_string());
        Ok(())
    }

    async fn delete_branch(&self, _repo: &Path, branch: &str) -> DomainResult<()> {
        let mut state = self.state.lock().unwrap();
        state.branches.retain(|b| b != branch);
        state.deleted.push(branch.to_string());
        Ok(())
    }

    async fn list_task_branches(&self, _repo: &Path) -> DomainResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .branches
            .iter()
            .filter(|b| b.starts_with("task-"))
            .cloned()
            .collect())
    }

    async fn diff_is_empty(&self, _repo: &Path, _base: &str, branch: &str) -> DomainResult<bool> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .empty_diffs
            .iter()
            .any(|b| b == branch))
    }

    async fn head_commit(&self, _repo: &Path) -> DomainResult<String> {
        Ok(format!(
            "head{:04}",
            self.state.lock().unwrap().commit_counter
        ))
    }
}

/// In-memory [`ContainerRuntime`].
#[derive(Default)]
pub struct FakeContainerRuntime {
    counter: AtomicUsize,
    created: Mutex<Vec<(ContainerHandle, String)>>,
    destroyed: Mutex<Vec<String>>,
    exec_results: Mutex<Vec<ExecOutcome>>,
}

impl FakeContainerRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next `exec` call (defaults to exit 0).
    pub fn push_exec_result(&self, outcome: ExecOutcome) {
        self.exec_results.lock().unwrap().push(outcome);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }

    /// Containers created but not destroyed.
    pub fn live(&self) -> Vec<String> {
        let destroyed = self.destroyed.lock().unwrap();
        self.created
            .lock()
            .unwrap()
            .iter()
            .map(|(h, _)| h.id.clone())
            .filter(|id| !destroyed.contains(id))
            .collect()
    }
}

#[async_trait]
impl ContainerRuntime for FakeContainerRuntime {
    async fn ping(&self) -> DomainResult<()> {
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> DomainResult<ContainerHandle> {
        let id = format!("container-{}", self.counter.fetch_add(1, Ordering::SeqCst));
        let handle = ContainerHandle { id };
        let owner = spec
            .labels
            .iter()
            .find(|(k, _)| k == crate::services::parallel::TASK_LABEL)
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        self.created.lock().unwrap().push((handle.clone(), owner));
        Ok(handle)
    }

    async fn exec(
        &self,
        _handle: &ContainerHandle,
        _cmd: &[String],
        _deadline: Duration,
    ) -> DomainResult<ExecOutcome> {
        let mut results = self.exec_results.lock().unwrap();
        if results.is_empty() {
            Ok(ExecOutcome {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        } else {
            Ok(results.remove(0))
        }
    }

    async fn destroy(&self, handle: &ContainerHandle) -> DomainResult<()> {
        self.destroyed.lock().unwrap().push(handle.id.clone());
        Ok(())
    }

    async fn list_labelled(
        &self,
        _label_key: &str,
    ) -> DomainResult<Vec<(ContainerHandle, String)>> {
        let destroyed = self.destroyed.lock().unwrap();
        Ok(self
            .created
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| !destroyed.contains(&h.id))
            .cloned()
            .collect())
    }
}

/// In-memory [`HostAdapter`].
#[derive(Default)]
pub struct FakeHostAdapter {
    prs: Mutex<Vec<PrRequest>>,
    fail_creates: Mutex<bool>,
}

impl FakeHostAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `create_pr` calls fail.
    pub fn fail_pr_creation(&self) {
        *self.fail_creates.lock().unwrap() = true;
    }

    pub fn created_prs(&self) -> Vec<PrRequest> {
        self.prs.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostAdapter for FakeHostAdapter {
    async fn create_pr(&self, request: &PrRequest) -> DomainResult<PrHandle> {
        if *self.fail_creates.lock().unwrap() {
            return Err(DomainError::Runtime("host unavailable".to_string()));
        }
        let mut prs = self.prs.lock().unwrap();
        prs.push(request.clone());
        Ok(PrHandle {
            url: format!("https://example.test/{}/pull/{}", request.repo, prs.len()),
        })
    }

    async fn check_access(&self, _repo: &str) -> DomainResult<bool> {
        Ok(true)
    }
}
