//! Parallel executor: fan-out of independent parts, then join.
//!
//! Each part gets its own branch off the coordination branch, its own
//! container, a seeded clone of the conversation log, and a share of the
//! parent cost account. Parts run concurrently in dependency waves under
//! the task's global deadline. At join, part logs are reassembled into the
//! parent log in part-index order, branches are merged serially, and a
//! finalizing reviewer runs on the merged tree.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    part_branch, subtask_id, AgentTurn, ConversationLog, CostAccount, FailureCause, Plan,
    SubtaskRecord, TaskStatus, Workspace,
};
use crate::domain::ports::container_runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, Mount};
use crate::domain::ports::git_runtime::GitRuntime;
use crate::services::invoker::AgentInvoker;
use crate::services::merger::{BranchMerger, MergeOutcome};
use crate::services::RunContext;

/// Container label key identifying the owning task; the supervisor sweep
/// keys off this.
pub const TASK_LABEL: &str = "conductor.task";

/// Outcome of a parallel run.
#[derive(Debug, Clone)]
pub struct ParallelOutcome {
    pub merges: Vec<MergeOutcome>,
    pub subtasks: Vec<SubtaskRecord>,
}

struct PartRun {
    index: usize,
    log: ConversationLog,
    result: Option<DomainResult<AgentTurn>>,
}

/// Drives the fan-out/join of a parallelizable plan.
pub struct ParallelExecutor {
    invoker: Arc<AgentInvoker>,
    merger: BranchMerger,
    git: Arc<dyn GitRuntime>,
    containers: Arc<dyn ContainerRuntime>,
}

impl ParallelExecutor {
    pub fn new(
        invoker: Arc<AgentInvoker>,
        git: Arc<dyn GitRuntime>,
        containers: Arc<dyn ContainerRuntime>,
    ) -> Self {
        Self {
            invoker,
            merger: BranchMerger::new(Arc::clone(&git)),
            git,
            containers,
        }
    }

    /// Run all parts of `plan`. Expects `ctx.workspace.branch` to be the
    /// already-created coordination branch (`task-<id>-main`).
    #[instrument(skip_all, fields(task_id = %ctx.task_id, parts = plan.parts.len()))]
    pub async fn run(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        log: &mut ConversationLog,
        cost: &CostAccount,
    ) -> DomainResult<ParallelOutcome> {
        let repo = ctx.project.repo_path.clone();
        let coordination = ctx.workspace.branch.clone();
        let seed_len = log.len();

        // Allocate per-part isolation: branch + container, in index order.
        let mut subtasks: Vec<SubtaskRecord> = Vec::new();
        let mut handles: Vec<ContainerHandle> = Vec::new();
        for (i, part) in plan.parts.iter().enumerate() {
            let k = i + 1;
            let branch = part_branch(&ctx.task_id, k);
            if let Err(err) = self.git.create_branch(&repo, &branch, &coordination).await {
                self.release_containers(&handles).await;
                return Err(err);
            }
            let spec = self.part_spec(ctx, k);
            let handle = match self.containers.create(&spec).await {
                Ok(handle) => handle,
                Err(err) => {
                    self.release_containers(&handles).await;
                    return Err(err);
                }
            };
            let subtask = SubtaskRecord {
                id: subtask_id(&ctx.task_id, k),
                parent: ctx.task_id.clone(),
                part_index: k,
                description: part.description.clone(),
                agent: part.agent.clone(),
                assigned_files: part.assigned_files.clone(),
                branch,
                container_id: Some(handle.id.clone()),
                status: TaskStatus::Running,
                result_summary: None,
                failure_cause: None,
                started_at: chrono::Utc::now(),
                completed_at: None,
            };
            ctx.store.save_subtask(&subtask).await?;
            subtasks.push(subtask);
            handles.push(handle);
        }

        // Execute in dependency waves under the global task deadline.
        let waves = plan
            .dependency_waves()
            .unwrap_or_else(|| vec![(0..plan.parts.len()).collect()]);
        let deadline = Instant::now() + Duration::from_secs(ctx.safety.max_duration_seconds);
        let run_result = self
            .run_waves(plan, ctx, cost, log, &waves, &subtasks, &handles, deadline)
            .await;

        // Join: reassemble logs in part-index order and persist subtask
        // terminal states, regardless of how execution went.
        let (mut part_runs, stop_error) = match run_result {
            Ok(runs) => (runs, None),
            Err((runs, err)) => (runs, Some(err)),
        };
        part_runs.sort_by_key(|r| r.index);
        let mut first_error: Option<DomainError> = None;
        for run in part_runs {
            let subtask = &mut subtasks[run.index - 1];
            match run.result {
                Some(Ok(turn)) => {
                    subtask.status = TaskStatus::Completed;
                    subtask.result_summary = Some(turn.decision.reason().to_string());
                    subtask.completed_at = Some(chrono::Utc::now());
                }
                Some(Err(err)) => {
                    subtask.status = TaskStatus::Failed;
                    subtask.failure_cause = Some(match &err {
                        DomainError::BudgetExceeded { .. } => FailureCause::BudgetExceeded,
                        DomainError::Timeout(_) => FailureCause::Timeout,
                        _ => FailureCause::AgentError,
                    });
                    subtask.result_summary = Some(err.to_string());
                    subtask.completed_at = Some(chrono::Utc::now());
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
                None => {
                    // Never started: cancelled by a sibling failure,
                    // cancellation, or the deadline.
                    subtask.status = TaskStatus::Cancelled;
                    subtask.completed_at = Some(chrono::Utc::now());
                }
            }
            log.absorb(seed_len, run.log);
            ctx.store.save_subtask(subtask).await?;
        }

        self.release_containers(&handles).await;

        if let Some(err) = first_error {
            return Err(err);
        }
        if let Some(err) = stop_error {
            return Err(err);
        }
        if ctx.cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        // Serial, deterministic recombination. Conflicts abort the task;
        // part branches are preserved for inspection.
        let branches: Vec<(usize, String)> = subtasks
            .iter()
            .map(|s| (s.part_index, s.branch.clone()))
            .collect();
        let merges = self.merger.merge_parts(&repo, &coordination, &branches).await?;
        info!(merged = merges.len(), "all parts merged");

        // Finalizing review on the merged tree.
        let review_description = format!(
            "{}\n\nAll {} parallel parts are merged into {}. Review the combined \
             result for consistency across parts.",
            ctx.description,
            subtasks.len(),
            coordination
        );
        self.invoker
            .run_turn("reviewer", &review_description, log, cost, &ctx.workspace)
            .await?;

        Ok(ParallelOutcome { merges, subtasks })
    }

    /// Run dependency waves until done, a part fails, or the deadline
    /// expires. Returns the part runs either way; the error side carries
    /// the reason execution stopped early.
    #[allow(clippy::too_many_arguments)]
    async fn run_waves(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        cost: &CostAccount,
        log: &ConversationLog,
        waves: &[Vec<usize>],
        subtasks: &[SubtaskRecord],
        handles: &[ContainerHandle],
        deadline: Instant,
    ) -> Result<Vec<PartRun>, (Vec<PartRun>, DomainError)> {
        let mut runs: Vec<PartRun> = Vec::new();
        let mut stop: Option<DomainError> = None;

        for wave in waves {
            if stop.is_some() || ctx.cancel.is_cancelled() {
                // Later waves never start: cancelled by sibling failure.
                runs.extend(wave.iter().map(|&i| PartRun {
                    index: i + 1,
                    log: ConversationLog::new(),
                    result: None,
                }));
                continue;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                stop = Some(DomainError::Timeout(ctx.safety.max_duration_seconds));
                ctx.cancel.set();
                runs.extend(wave.iter().map(|&i| PartRun {
                    index: i + 1,
                    log: ConversationLog::new(),
                    result: None,
                }));
                continue;
            }

            let futures: Vec<_> = wave
                .iter()
                .map(|&i| {
                    let part = &plan.parts[i];
                    let subtask = &subtasks[i];
                    let workspace = Workspace {
                        branch: subtask.branch.clone(),
                        workdir: ctx.project.repo_path.clone(),
                        container: Some(handles[i].clone()),
                    };
                    let description = format!(
                        "{}\n\nPart {} of {}: {}\nAssigned files (do not touch others): {}",
                        ctx.description,
                        i + 1,
                        plan.parts.len(),
                        part.description,
                        if part.assigned_files.is_empty() {
                            "(none listed)".to_string()
                        } else {
                            part.assigned_files.join(", ")
                        },
                    );
                    let agent = part.agent.clone();
                    let seed = log.seeded_clone();
                    let invoker = Arc::clone(&self.invoker);
                    let cost = cost.clone();
                    let cancel = ctx.cancel.clone();
                    async move {
                        let mut part_log = seed;
                        if cancel.is_cancelled() {
                            return PartRun {
                                index: i + 1,
                                log: part_log,
                                result: None,
                            };
                        }
                        let result = invoker
                            .run_turn(&agent, &description, &mut part_log, &cost, &workspace)
                            .await;
                        PartRun {
                            index: i + 1,
                            log: part_log,
                            result: Some(result),
                        }
                    }
                })
                .collect();

            match tokio::time::timeout(remaining, join_all(futures)).await {
                Ok(wave_runs) => {
                    let failed = wave_runs
                        .iter()
                        .any(|r| matches!(r.result, Some(Err(_))));
                    runs.extend(wave_runs);
                    if failed {
                        // Sibling cancellation: no later wave starts.
                        warn!("part failed; cancelling remaining parts");
                        ctx.cancel.set();
                    }
                }
                Err(_) => {
                    // Deadline: in-flight futures are dropped and the
                    // remaining parts are cancelled.
                    warn!("task deadline expired during parallel execution");
                    ctx.cancel.set();
                    stop = Some(DomainError::Timeout(ctx.safety.max_duration_seconds));
                    runs.extend(wave.iter().map(|&i| PartRun {
                        index: i + 1,
                        log: ConversationLog::new(),
                        result: None,
                    }));
                }
            }
        }

        match stop {
            Some(err) => Err((runs, err)),
            None => Ok(runs),
        }
    }

    fn part_spec(&self, ctx: &RunContext, k: usize) -> ContainerSpec {
        let mut mounts = vec![Mount {
            source: ctx.project.repo_path.clone(),
            target: "/workspace".to_string(),
            read_only: false,
        }];
        if let Some(tools) = &ctx.container.tools_dir {
            mounts.push(Mount {
                source: tools.clone(),
                target: "/tools".to_string(),
                read_only: true,
            });
        }
        ContainerSpec {
            image: ctx.container.image.clone(),
            cpu_limit: ctx.container.cpu_limit,
            memory_mb: ctx.container.memory_mb,
            mounts,
            labels: vec![
                (TASK_LABEL.to_string(), ctx.task_id.clone()),
                ("conductor.part".to_string(), k.to_string()),
            ],
        }
    }

    async fn release_containers(&self, handles: &[ContainerHandle]) {
        for handle in handles {
            if let Err(err) = self.containers.destroy(handle).await {
                warn!(container = %handle.id, error = %err, "failed to destroy part container");
            }
        }
    }
}
