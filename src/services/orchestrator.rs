//! Top-level task runner.
//!
//! Runs one task end to end: preflight validation, isolation acquisition
//! (task branch + container), planning, sequential or parallel execution,
//! optional test run, finalize (push + PR attempt), and unconditional
//! cleanup. The same flow serves foreground runs and supervisor-spawned
//! workers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    coordination_branch, task_branch, ConversationLog, CostAccount, FailureCause, GlobalConfig,
    Plan, ProjectConfig, TaskRecord, TaskStatus, Workspace,
};
use crate::domain::ports::container_runtime::{
    ContainerHandle, ContainerRuntime, ContainerSpec, Mount,
};
use crate::domain::ports::git_runtime::GitRuntime;
use crate::domain::ports::host_adapter::{HostAdapter, PrRequest};
use crate::domain::ports::model_adapter::ModelAdapter;
use crate::infrastructure::state::TaskStateStore;
use crate::services::invoker::AgentInvoker;
use crate::services::parallel::{ParallelExecutor, TASK_LABEL};
use crate::services::planner::Planner;
use crate::services::registry::AgentRegistry;
use crate::services::retry::RetryPolicy;
use crate::services::sequential::{SequentialExecutor, StopReason};
use crate::services::{CancelFlag, RunContext};

/// Deadline for container commands run outside agent turns (test runs).
const EXEC_TIMEOUT: Duration = Duration::from_secs(900);

/// Scoped isolation for one task: a branch and a container whose release
/// is guaranteed on every exit path of [`Orchestrator::run`].
struct Isolation {
    branch: String,
    container: Option<ContainerHandle>,
}

/// Top-level facade wiring planner, executors, merger, and adapters.
pub struct Orchestrator {
    global: GlobalConfig,
    registry: Arc<AgentRegistry>,
    planner: Planner,
    invoker: Arc<AgentInvoker>,
    git: Arc<dyn GitRuntime>,
    containers: Arc<dyn ContainerRuntime>,
    host: Arc<dyn HostAdapter>,
    store: Arc<TaskStateStore>,
}

impl Orchestrator {
    pub fn new(
        global: GlobalConfig,
        registry: Arc<AgentRegistry>,
        model: Arc<dyn ModelAdapter>,
        git: Arc<dyn GitRuntime>,
        containers: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostAdapter>,
        store: Arc<TaskStateStore>,
    ) -> Self {
        let turn_timeout = Duration::from_secs(global.safety.turn_timeout_seconds);
        let invoker = Arc::new(AgentInvoker::new(
            Arc::clone(&registry),
            Arc::clone(&model),
            RetryPolicy::default(),
            turn_timeout,
        ));
        let planner = Planner::new(Arc::clone(&model), global.model.planner_model.clone());
        Self {
            global,
            registry,
            planner,
            invoker,
            git,
            containers,
            host,
            store,
        }
    }

    /// Run `task` to a terminal status. The record must already be
    /// persisted with status `running`; this method owns it from here on
    /// and persists every transition.
    #[instrument(skip_all, fields(task_id = %task.id, project = %project.name))]
    pub async fn run(
        &self,
        project: &ProjectConfig,
        mut task: TaskRecord,
        cancel: CancelFlag,
    ) -> DomainResult<TaskRecord> {
        let mut log = ConversationLog::new();
        let safety = project.effective_safety(&self.global);
        let cost = CostAccount::new(safety.max_cost_per_task);

        let result = self
            .run_inner(project, &mut task, &mut log, &cost, &cancel)
            .await;

        // Mirror final cost and agents onto the record before the terminal
        // transition is persisted.
        let totals = cost.totals().await;
        task.cost_usd = totals.spent_usd;

        match result {
            Ok(()) => {
                task.progress.percent = 100;
                task.finish(TaskStatus::Completed);
            }
            Err(DomainError::Cancelled) => {
                task.failure_cause = Some(FailureCause::Cancelled);
                task.finish(TaskStatus::Cancelled);
            }
            Err(err) => {
                let cause = failure_cause(&err);
                error!(error = %err, cause = cause.as_str(), "task failed");
                task.fail(cause, err.to_string());
            }
        }
        self.store.save(&task).await?;
        info!(status = %task.status, cost_usd = task.cost_usd, "task finished");
        Ok(task)
    }

    async fn run_inner(
        &self,
        project: &ProjectConfig,
        task: &mut TaskRecord,
        log: &mut ConversationLog,
        cost: &CostAccount,
        cancel: &CancelFlag,
    ) -> DomainResult<()> {
        self.preflight(project).await?;
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        // Plan before isolation: a parallel verdict changes the branch
        // topology (coordination branch vs plain task branch).
        let plan = self.planner.plan(&task.description, &self.registry.names()).await;
        log.append(
            "planner",
            format!(
                "plan: {:?}, complexity {}, agents {:?}, parallel={}",
                plan.task_kind, plan.complexity.score, plan.agents, plan.parallelizable
            ),
            false,
        );

        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let isolation = self.acquire_isolation(project, task, &plan).await?;
        task.branch = Some(isolation.branch.clone());
        self.store.save(task).await?;

        let ctx = RunContext {
            task_id: task.id.clone(),
            description: task.description.clone(),
            project: project.clone(),
            safety: project.effective_safety(&self.global),
            container: project.effective_container(&self.global),
            workspace: Workspace {
                branch: isolation.branch.clone(),
                workdir: project.repo_path.clone(),
                container: isolation.container.clone(),
            },
            cancel: cancel.clone(),
            store: Arc::clone(&self.store),
        };

        let run_result = self.execute(&plan, &ctx, task, log, cost).await;

        // Tests and finalize only on success; cleanup runs regardless.
        let final_result = match run_result {
            Ok(()) => self.finalize(project, task, &ctx, log, cost).await,
            Err(err) => Err(err),
        };

        let cancelled = matches!(final_result, Err(DomainError::Cancelled));
        self.cleanup(project, &isolation, final_result.is_ok(), cancelled)
            .await;
        final_result
    }

    /// Pre-flight validation: fails before any cost is incurred.
    async fn preflight(&self, project: &ProjectConfig) -> DomainResult<()> {
        if project.effective_safety(&self.global).max_cost_per_task <= 0.0 {
            return Err(DomainError::PreflightFailed(
                "maxCostPerTask must be positive".to_string(),
            ));
        }
        self.containers
            .ping()
            .await
            .map_err(|e| DomainError::PreflightFailed(format!("container runtime: {e}")))?;
        let repo = project.repo_path();
        if !self.git.branch_exists(repo, &project.base_branch).await? {
            return Err(DomainError::PreflightFailed(format!(
                "base branch '{}' does not exist",
                project.base_branch
            )));
        }
        if let Some(remote) = &project.remote_repo {
            match self.host.check_access(remote).await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(DomainError::PreflightFailed(format!(
                        "no access to remote repository {remote}"
                    )))
                }
                // Host unavailability is not fatal pre-flight; PR creation
                // is already tolerated to fail later.
                Err(err) => warn!(error = %err, "remote access check failed"),
            }
        }
        Ok(())
    }

    /// Create the task (or coordination) branch and the task container.
    async fn acquire_isolation(
        &self,
        project: &ProjectConfig,
        task: &TaskRecord,
        plan: &Plan,
    ) -> DomainResult<Isolation> {
        let branch = if plan.parallelizable {
            coordination_branch(&task.id)
        } else {
            task_branch(&task.id)
        };
        if project.is_protected(&branch) {
            return Err(DomainError::ProtectedBranch(branch));
        }
        self.git
            .create_branch(project.repo_path(), &branch, &project.base_branch)
            .await?;
        self.git.checkout(project.repo_path(), &branch).await?;

        let container = project.effective_container(&self.global);
        let mut mounts = vec![Mount {
            source: project.repo_path.clone(),
            target: "/workspace".to_string(),
            read_only: false,
        }];
        if let Some(tools) = &container.tools_dir {
            mounts.push(Mount {
                source: tools.clone(),
                target: "/tools".to_string(),
                read_only: true,
            });
        }
        let spec = ContainerSpec {
            image: container.image,
            cpu_limit: container.cpu_limit,
            memory_mb: container.memory_mb,
            mounts,
            labels: vec![(TASK_LABEL.to_string(), task.id.clone())],
        };
        let handle = match self.containers.create(&spec).await {
            Ok(handle) => handle,
            Err(err) => {
                // Half-acquired isolation must not leak the fresh branch.
                let _ = self.git.checkout(project.repo_path(), &project.base_branch).await;
                let _ = self.git.delete_branch(project.repo_path(), &branch).await;
                return Err(err);
            }
        };
        Ok(Isolation {
            branch,
            container: Some(handle),
        })
    }

    /// Dispatch to the right executor under the task's wall-clock ceiling.
    async fn execute(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        task: &mut TaskRecord,
        log: &mut ConversationLog,
        cost: &CostAccount,
    ) -> DomainResult<()> {
        let deadline = Duration::from_secs(ctx.safety.max_duration_seconds);
        match tokio::time::timeout(deadline, self.dispatch(plan, ctx, task, log, cost)).await {
            Ok(result) => result,
            Err(_) => {
                ctx.cancel.set();
                Err(DomainError::Timeout(ctx.safety.max_duration_seconds))
            }
        }
    }

    async fn dispatch(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        task: &mut TaskRecord,
        log: &mut ConversationLog,
        cost: &CostAccount,
    ) -> DomainResult<()> {
        if plan.parallelizable {
            let executor = ParallelExecutor::new(
                Arc::clone(&self.invoker),
                Arc::clone(&self.git),
                Arc::clone(&self.containers),
            );
            let outcome = executor.run(plan, ctx, log, cost).await?;
            task.subtasks = Some(outcome.subtasks.iter().map(|s| s.id.clone()).collect());
            task.completed_agents = outcome.subtasks.iter().map(|s| s.agent.clone()).collect();
            Ok(())
        } else {
            let executor = SequentialExecutor::new(Arc::clone(&self.invoker));
            let outcome = executor.run(plan, ctx, log, cost).await?;
            task.completed_agents.clone_from(&outcome.visited);
            match outcome.stop {
                StopReason::Complete => Ok(()),
                StopReason::Cycle => Err(DomainError::Cycle(outcome.visited)),
                StopReason::IterationLimit => Err(DomainError::Runtime(format!(
                    "no completion after {} agent turns",
                    outcome.visited.len()
                ))),
                StopReason::Cancelled => Err(DomainError::Cancelled),
            }
        }
    }

    /// Run configured tests, push the branch, and attempt PR creation.
    /// PR failure does not fail the task; the branch name is surfaced.
    async fn finalize(
        &self,
        project: &ProjectConfig,
        task: &mut TaskRecord,
        ctx: &RunContext,
        log: &mut ConversationLog,
        cost: &CostAccount,
    ) -> DomainResult<()> {
        let repo = project.repo_path();
        let branch = ctx.workspace.branch.clone();

        if let (Some(command), Some(container)) =
            (&project.test_command, &ctx.workspace.container)
        {
            let cmd = vec!["sh".to_string(), "-c".to_string(), command.clone()];
            match self.containers.exec(container, &cmd, EXEC_TIMEOUT).await {
                Ok(outcome) if outcome.success() => {
                    log.append("system", format!("tests passed: `{command}`"), true);
                }
                Ok(outcome) => {
                    log.append(
                        "system",
                        format!(
                            "tests failed (exit {}): {}",
                            outcome.exit_code,
                            tail(&outcome.stderr, 2000)
                        ),
                        true,
                    );
                }
                Err(err) => {
                    log.append("system", format!("test run error: {err}"), true);
                }
            }
        }

        // An analysis-only run leaves no changes; there is nothing to push
        // or to open a PR for, and cleanup deletes the empty branch.
        if self
            .git
            .diff_is_empty(repo, &project.base_branch, &branch)
            .await?
        {
            info!(branch = %branch, "no changes produced; skipping push and PR");
            return Ok(());
        }

        self.git.push(repo, &branch).await?;
        info!(branch = %branch, "branch pushed");

        if let Some(remote) = &project.remote_repo {
            let title = pr_title(project, &task.description);
            let body = pr_body(task, log, cost).await;
            let request = PrRequest {
                repo: remote.clone(),
                head: branch.clone(),
                base: project.base_branch.clone(),
                title,
                body,
                draft: project.pr.draft,
                labels: project.pr.labels.clone(),
            };
            match self.host.create_pr(&request).await {
                Ok(pr) => {
                    info!(url = %pr.url, "pull request created");
                    task.pr_url = Some(pr.url);
                }
                Err(err) => {
                    warn!(error = %err, branch = %branch, "PR creation failed; branch is pushed");
                    log.append(
                        "system",
                        format!("PR creation failed ({err}); branch {branch} is pushed. Run `conductor approve {}` to retry", task.id),
                        true,
                    );
                }
            }
        }
        Ok(())
    }

    /// Unconditional cleanup: destroy the task container and delete the
    /// task branch when it carries nothing worth keeping. Failure branches
    /// are preserved for inspection; protected branches are never touched.
    async fn cleanup(
        &self,
        project: &ProjectConfig,
        isolation: &Isolation,
        succeeded: bool,
        cancelled: bool,
    ) {
        if let Some(container) = &isolation.container {
            if let Err(err) = self.containers.destroy(container).await {
                warn!(container = %container.id, error = %err, "failed to destroy container");
            }
        }

        let repo = project.repo_path();
        let branch = &isolation.branch;
        if project.is_protected(branch) {
            return;
        }
        // Leave the working tree on the base branch either way.
        if let Err(err) = self.git.checkout(repo, &project.base_branch).await {
            warn!(error = %err, "failed to return to base branch");
        }

        let delete = if succeeded {
            // Keep pushed work; delete only an empty branch.
            matches!(
                self.git.diff_is_empty(repo, &project.base_branch, branch).await,
                Ok(true)
            )
        } else {
            // Preserve partial work on failures; delete on cancellation.
            cancelled
        };
        if delete {
            if let Err(err) = self.git.delete_branch(repo, branch).await {
                warn!(branch = %branch, error = %err, "failed to delete task branch");
            } else {
                info!(branch = %branch, "task branch deleted");
            }
        }
    }
}

fn failure_cause(err: &DomainError) -> FailureCause {
    match err {
        DomainError::BudgetExceeded { .. } => FailureCause::BudgetExceeded,
        DomainError::MergeConflict { .. } => FailureCause::MergeConflict,
        DomainError::Cycle(_) => FailureCause::Cycle,
        DomainError::Timeout(_) => FailureCause::Timeout,
        DomainError::PreflightFailed(_)
        | DomainError::UnknownProject(_)
        | DomainError::InvalidConfig(_) => FailureCause::Preflight,
        _ => FailureCause::AgentError,
    }
}

fn pr_title(project: &ProjectConfig, description: &str) -> String {
    let summary: String = description.chars().take(60).collect();
    match &project.pr.title_prefix {
        Some(prefix) => format!("{prefix} {summary}"),
        None => summary,
    }
}

async fn pr_body(task: &TaskRecord, log: &ConversationLog, cost: &CostAccount) -> String {
    let totals = cost.totals().await;
    let agents = task.completed_agents.join(", ");
    let turn_count = log.turns().count();
    format!(
        "Automated change produced by conductor task `{}`.\n\n\
         - Agents: {agents}\n\
         - Turns: {turn_count}\n\
         - Cost: ${:.4}\n\n\
         _Review before merging._",
        task.id, totals.spent_usd,
    )
}

fn tail(text: &str, max_chars: usize) -> &str {
    let len = text.len();
    if len <= max_chars {
        text
    } else {
        // Cut on a char boundary near the tail.
        let mut start = len - max_chars;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        &text[start..]
    }
}
