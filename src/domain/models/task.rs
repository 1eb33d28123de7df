//! Task domain model.
//!
//! A task is one user request against one project. It is executed by a
//! sequence (or fan-out) of agents in its own worker process, on its own
//! git branch, inside its own container.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::ports::container_runtime::ContainerHandle;

/// Status of a task over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is being executed by a live worker process.
    Running,
    /// Task finished successfully.
    Completed,
    /// Task finished with an error.
    Failed,
    /// Task was cancelled by the user.
    Cancelled,
    /// The worker process died without recording a terminal status.
    Interrupted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Interrupted => "interrupted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "running" => Some(Self::Running),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "interrupted" => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended up failed (or cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCause {
    BudgetExceeded,
    Cycle,
    MergeConflict,
    Timeout,
    AgentError,
    Preflight,
    Cancelled,
}

impl FailureCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget-exceeded",
            Self::Cycle => "cycle",
            Self::MergeConflict => "merge-conflict",
            Self::Timeout => "timeout",
            Self::AgentError => "agent-error",
            Self::Preflight => "preflight",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Coarse progress reported by the worker after each agent turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Estimated completion percentage, 0-100.
    pub percent: u8,
    /// Estimated seconds remaining, when known.
    pub eta_seconds: Option<u64>,
}

/// Persistent task document, one per task id under the state directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// 12 lowercase hex chars, globally unique within the state directory.
    pub id: String,
    pub project: String,
    pub description: String,
    pub status: TaskStatus,
    /// Worker process id. Foreground runs record their own pid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<i32>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Task branch (`task-<id>`, or `task-<id>-main` for parallel runs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_agent: Option<String>,
    #[serde(default)]
    pub completed_agents: Vec<String>,
    #[serde(default)]
    pub progress: Progress,
    /// Dollars spent so far, mirrored from the cost account for `status`.
    #[serde(default)]
    pub cost_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<FailureCause>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Id of the task this one was restarted from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restarted_from: Option<String>,
    /// Parent task id, for subtask workers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Subtask ids for a parallel task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtasks: Option<Vec<String>>,
    /// URL of the pull request, once created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
}

impl TaskRecord {
    /// Create a new running task record.
    pub fn new(project: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            project: project.into(),
            description: description.into(),
            status: TaskStatus::Running,
            pid: None,
            started_at: Utc::now(),
            completed_at: None,
            log_path: None,
            branch: None,
            current_agent: None,
            completed_agents: Vec::new(),
            progress: Progress::default(),
            cost_usd: 0.0,
            failure_cause: None,
            failure_reason: None,
            restarted_from: None,
            parent: None,
            subtasks: None,
            pr_url: None,
        }
    }

    /// Transition to a terminal status, stamping `completed_at` and
    /// clearing `current_agent`.
    pub fn finish(&mut self, status: TaskStatus) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.current_agent = None;
    }

    /// Mark the task failed with a cause.
    pub fn fail(&mut self, cause: FailureCause, reason: impl Into<String>) {
        self.failure_cause = Some(cause);
        self.failure_reason = Some(reason.into());
        self.finish(TaskStatus::Failed);
    }
}

/// One part of a parallel task, mirroring [`TaskRecord`] plus part metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskRecord {
    /// `<task_id>-part<k>`, k 1-based.
    pub id: String,
    pub parent: String,
    /// 1-based part index; merge order follows this.
    pub part_index: usize,
    pub description: String,
    pub agent: String,
    #[serde(default)]
    pub assigned_files: Vec<String>,
    pub branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_cause: Option<FailureCause>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The isolated surface one agent (or part) operates on: a dedicated
/// branch, a working directory, and usually a container.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub branch: String,
    pub workdir: PathBuf,
    pub container: Option<ContainerHandle>,
}

/// Generate a 12-lowercase-hex task id.
pub fn generate_task_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    hex[..12].to_string()
}

/// Subtask id for part `k` (1-based) of `task_id`.
pub fn subtask_id(task_id: &str, k: usize) -> String {
    format!("{task_id}-part{k}")
}

/// Branch names derived from a task id.
pub fn task_branch(task_id: &str) -> String {
    format!("task-{task_id}")
}

/// Coordination branch for a parallel task.
pub fn coordination_branch(task_id: &str) -> String {
    format!("task-{task_id}-main")
}

/// Branch for part `k` (1-based) of a parallel task.
pub fn part_branch(task_id: &str, k: usize) -> String {
    format!("task-{task_id}-part{k}")
}

/// Owning task id of a branch in the `task-` namespace, covering
/// `task-<id>`, `task-<id>-main`, and `task-<id>-part<k>`. Returns `None`
/// for branches outside the namespace.
pub fn branch_task_id(branch: &str) -> Option<&str> {
    let rest = branch.strip_prefix("task-")?;
    let id = rest.split('-').next()?;
    (id.len() == 12 && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))).then_some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_id_format() {
        let id = generate_task_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn test_subtask_id() {
        assert_eq!(subtask_id("a1b2c3d4e5f6", 2), "a1b2c3d4e5f6-part2");
    }

    #[test]
    fn test_branch_names() {
        assert_eq!(task_branch("abc123abc123"), "task-abc123abc123");
        assert_eq!(coordination_branch("abc123abc123"), "task-abc123abc123-main");
        assert_eq!(part_branch("abc123abc123", 3), "task-abc123abc123-part3");
    }

    #[test]
    fn test_branch_task_id_round_trips() {
        let id = generate_task_id();
        assert_eq!(branch_task_id(&task_branch(&id)), Some(id.as_str()));
        assert_eq!(branch_task_id(&coordination_branch(&id)), Some(id.as_str()));
        assert_eq!(branch_task_id(&part_branch(&id, 2)), Some(id.as_str()));
    }

    #[test]
    fn test_branch_task_id_rejects_foreign_branches() {
        assert_eq!(branch_task_id("main"), None);
        assert_eq!(branch_task_id("feature/task-list"), None);
        assert_eq!(branch_task_id("task-notahexid"), None);
        assert_eq!(branch_task_id("task-ABC123ABC123"), None);
    }

    #[test]
    fn test_finish_clears_current_agent() {
        let mut task = TaskRecord::new("demo", "fix the bug");
        task.current_agent = Some("coder".to_string());
        task.finish(TaskStatus::Completed);
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.current_agent.is_none());
        assert!(task.completed_at.unwrap() >= task.started_at);
    }

    #[test]
    fn test_fail_records_cause() {
        let mut task = TaskRecord::new("demo", "fix the bug");
        task.fail(FailureCause::BudgetExceeded, "ceiling hit");
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.failure_cause, Some(FailureCause::BudgetExceeded));
        assert_eq!(task.failure_reason.as_deref(), Some("ceiling hit"));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            TaskStatus::Running,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
            TaskStatus::Interrupted,
        ] {
            assert_eq!(TaskStatus::from_str(status.as_str()), Some(status));
        }
    }

    proptest! {
        #[test]
        fn prop_generated_ids_are_12_hex(_ in 0..64u32) {
            let id = generate_task_id();
            prop_assert_eq!(id.len(), 12);
            prop_assert!(id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        }
    }
}
