//! Domain errors for the Conductor orchestration core.

use thiserror::Error;

use crate::domain::ports::model_adapter::ModelError;

/// Domain-level errors that can occur while orchestrating a task.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Unknown project: {0}")]
    UnknownProject(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Preflight check failed: {0}")]
    PreflightFailed(String),

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Ambiguous task id prefix '{prefix}': matches {candidates:?}")]
    AmbiguousTaskId {
        prefix: String,
        candidates: Vec<String>,
    },

    #[error(
        "Budget exceeded: ${spent:.4} spent, next turn estimated at ${estimate:.4}, ceiling ${ceiling:.2}"
    )]
    BudgetExceeded {
        spent: f64,
        estimate: f64,
        ceiling: f64,
    },

    #[error("Capacity exceeded: {running} tasks running at cap {cap}")]
    CapacityExceeded { running: usize, cap: usize },

    #[error("Merge conflict merging {branch}: conflicting files {files:?}")]
    MergeConflict {
        /// Branch whose merge conflicted.
        branch: String,
        /// Files left in a conflicted state before the merge was aborted.
        files: Vec<String>,
        /// Branches already merged cleanly before the conflict.
        merged: Vec<String>,
    },

    #[error("Agent hand-off cycle after {0:?}")]
    Cycle(Vec<String>),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Refusing to touch protected branch: {0}")]
    ProtectedBranch(String),

    #[error("Task cancelled")]
    Cancelled,

    #[error("Task timed out after {0} seconds")]
    Timeout(u64),

    #[error("State store error: {0}")]
    State(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}
