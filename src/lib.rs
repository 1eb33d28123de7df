//! Conductor - multi-agent coding orchestrator.
//!
//! A user submits a natural-language task against a configured project;
//! conductor plans a sequence (or parallel fan-out) of specialized agents,
//! executes each inside an isolated container on a dedicated git branch,
//! merges their results, and produces a pull request. A supervisor manages
//! detached background workers with cancellation, restart, and dead-worker
//! reconciliation.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{GlobalConfig, Plan, ProjectConfig, TaskRecord, TaskStatus};
pub use infrastructure::state::TaskStateStore;
pub use infrastructure::supervisor::Supervisor;
pub use services::Orchestrator;
