//! Background task supervisor.
//!
//! Spawns detached worker processes (one per task), enforces the global
//! concurrency cap, reconciles persisted state against live processes,
//! cancels with a graceful-then-forced signal sequence, and sweeps
//! resources left behind by crash-killed workers.
//!
//! Supervisor and workers communicate only through the state store and the
//! log file; there is no IPC channel.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{branch_task_id, GlobalConfig, TaskRecord, TaskStatus};
use crate::domain::ports::config_source::ConfigSource;
use crate::domain::ports::container_runtime::ContainerRuntime;
use crate::domain::ports::git_runtime::GitRuntime;
use crate::infrastructure::state::TaskStateStore;
use crate::services::parallel::TASK_LABEL;

/// Grace period after SIGTERM before escalating.
const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
/// Wait after SIGKILL before giving up on the pid.
const FORCED_WAIT: Duration = Duration::from_secs(1);
/// Poll interval while waiting for a signalled process to exit.
const WAIT_POLL: Duration = Duration::from_millis(100);

/// Whether `pid` refers to a live process (signal 0 probe).
pub fn pid_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Details of a freshly spawned background task.
#[derive(Debug, Clone)]
pub struct SpawnedTask {
    pub id: String,
    pub pid: i32,
    pub log_path: PathBuf,
}

/// Result of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The worker was signalled and the task is now cancelled.
    Cancelled { forced: bool },
    /// The task was not running; nothing to do.
    NotRunning(TaskStatus),
}

/// Process-level manager for background tasks.
pub struct Supervisor {
    config: GlobalConfig,
    store: Arc<TaskStateStore>,
    containers: Arc<dyn ContainerRuntime>,
    git: Arc<dyn GitRuntime>,
    source: Arc<dyn ConfigSource>,
}

impl Supervisor {
    pub fn new(
        config: GlobalConfig,
        store: Arc<TaskStateStore>,
        containers: Arc<dyn ContainerRuntime>,
        git: Arc<dyn GitRuntime>,
        source: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            config,
            store,
            containers,
            git,
            source,
        }
    }

    /// Spawn a detached worker for `(project, description)` and persist
    /// the initial running record.
    #[instrument(skip(self, description))]
    pub async fn start_background(
        &self,
        project: &str,
        description: &str,
        restarted_from: Option<String>,
    ) -> DomainResult<SpawnedTask> {
        // Reconcile first so dead workers do not count against the cap.
        self.store.sync().await?;
        self.sweep().await?;

        let running = self.list_running(None).await?;
        if running.len() >= self.config.max_parallel_tasks {
            return Err(DomainError::CapacityExceeded {
                running: running.len(),
                cap: self.config.max_parallel_tasks,
            });
        }

        let mut task = TaskRecord::new(project, description);
        task.restarted_from = restarted_from;
        tokio::fs::create_dir_all(&self.config.logs_dir).await?;
        let log_path = self.config.logs_dir.join(format!("{}.log", task.id));

        let log_file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;
        let stderr_file = log_file.try_clone()?;

        let exe = std::env::current_exe()?;
        let mut command = std::process::Command::new(exe);
        command
            .arg("task")
            .arg(project)
            .arg(description)
            .arg("--worker")
            .arg(&task.id)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file))
            .stderr(Stdio::from(stderr_file));
        // Detach into its own process group so the worker survives the
        // supervisor process and terminal signals.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let child = command.spawn()?;
        #[allow(clippy::cast_possible_wrap)]
        let pid = child.id() as i32;

        task.pid = Some(pid);
        task.log_path = Some(log_path.clone());
        self.store.save(&task).await?;
        info!(task_id = %task.id, pid, "background worker spawned");

        Ok(SpawnedTask {
            id: task.id,
            pid,
            log_path,
        })
    }

    /// Running tasks, optionally filtered by project.
    pub async fn list_running(&self, project: Option<&str>) -> DomainResult<Vec<TaskRecord>> {
        let tasks = match project {
            Some(name) => self.store.list_by_project(name).await?,
            None => self.store.list().await?,
        };
        Ok(tasks
            .into_iter()
            .filter(|t| t.status == TaskStatus::Running)
            .collect())
    }

    /// Cancel a background task: SIGTERM, wait up to 5s, SIGKILL, wait up
    /// to 1s, then persist the cancelled status.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: &str) -> DomainResult<CancelOutcome> {
        let task = self.store.load(id).await?;
        if task.status != TaskStatus::Running {
            return Ok(CancelOutcome::NotRunning(task.status));
        }

        let mut forced = false;
        if let Some(pid) = task.pid {
            let target = Pid::from_raw(pid);
            if kill(target, Signal::SIGTERM).is_ok() {
                if !wait_for_exit(pid, GRACEFUL_WAIT).await {
                    warn!(task_id = %id, pid, "worker ignored SIGTERM, sending SIGKILL");
                    forced = true;
                    let _ = kill(target, Signal::SIGKILL);
                    wait_for_exit(pid, FORCED_WAIT).await;
                }
            }
        }

        self.store
            .update(id, |t| {
                if t.status == TaskStatus::Running {
                    t.failure_cause = Some(crate::domain::models::FailureCause::Cancelled);
                    t.finish(TaskStatus::Cancelled);
                }
            })
            .await?;
        // A force-killed worker never ran its cleanup handlers; the sweep
        // picks up its containers and branches.
        self.sweep().await?;
        info!(task_id = %id, forced, "task cancelled");
        Ok(CancelOutcome::Cancelled { forced })
    }

    /// Destroy containers belonging to tasks that are no longer running.
    /// Idempotent. With `all` set, every labelled container goes.
    pub async fn sweep_containers(&self, all: bool) -> DomainResult<usize> {
        let handles = self.containers.list_labelled(TASK_LABEL).await?;
        if handles.is_empty() {
            return Ok(0);
        }
        let running: std::collections::HashSet<String> = if all {
            std::collections::HashSet::new()
        } else {
            self.list_running(None)
                .await?
                .iter()
                .map(|t| t.id.clone())
                .collect()
        };
        let mut removed = 0;
        for (handle, owner) in handles {
            if running.contains(&owner) {
                continue;
            }
            if let Err(err) = self.containers.destroy(&handle).await {
                warn!(container = %handle.id, error = %err, "sweep failed to destroy container");
            } else {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, "swept orphan containers");
        }
        Ok(removed)
    }

    /// Delete `task-` namespace branches left behind by workers whose
    /// cleanup never ran (crash-killed or interrupted). Branches of
    /// running tasks are untouched; completed and failed tasks keep
    /// theirs (pushed work, and failures preserved for inspection).
    /// Protected branches are never deleted. Idempotent.
    pub async fn sweep_branches(&self) -> DomainResult<usize> {
        let tasks = self.store.list().await?;
        let running: std::collections::HashSet<&str> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .map(|t| t.id.as_str())
            .collect();
        let preserved: std::collections::HashSet<&str> = tasks
            .iter()
            .filter(|t| matches!(t.status, TaskStatus::Completed | TaskStatus::Failed))
            .map(|t| t.id.as_str())
            .collect();

        let mut removed = 0;
        for name in self.source.list_projects()? {
            let project = match self.source.load_project(&name) {
                Ok(project) => project,
                Err(err) => {
                    warn!(project = %name, error = %err, "skipping unloadable project during sweep");
                    continue;
                }
            };
            let branches = match self.git.list_task_branches(project.repo_path()).await {
                Ok(branches) => branches,
                Err(err) => {
                    warn!(project = %name, error = %err, "failed to list task branches");
                    continue;
                }
            };
            for branch in branches {
                if project.is_protected(&branch) {
                    continue;
                }
                let Some(owner) = branch_task_id(&branch) else {
                    continue;
                };
                if running.contains(owner) || preserved.contains(owner) {
                    continue;
                }
                match self.git.delete_branch(project.repo_path(), &branch).await {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        warn!(branch = %branch, error = %err, "sweep failed to delete branch");
                    }
                }
            }
        }
        if removed > 0 {
            info!(removed, "swept dead-task branches");
        }
        Ok(removed)
    }

    /// Default sweep used on `status`, cancel, and background-start paths:
    /// orphan containers plus dead-task branches.
    pub async fn sweep(&self) -> DomainResult<usize> {
        let containers = self.sweep_containers(false).await?;
        let branches = self.sweep_branches().await?;
        Ok(containers + branches)
    }
}

/// Poll until `pid` exits or `timeout` elapses; true when it exited.
async fn wait_for_exit(pid: i32, timeout: Duration) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if !pid_alive(pid) {
            return true;
        }
        sleep(WAIT_POLL).await;
    }
    !pid_alive(pid)
}
