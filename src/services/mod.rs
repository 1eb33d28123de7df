//! Orchestration services.
//!
//! These drive the task lifecycle: registry lookups, single agent turns,
//! planning, sequential hand-off, parallel fan-out, branch merging, and the
//! top-level orchestrator.

pub mod invoker;
pub mod merger;
pub mod orchestrator;
pub mod parallel;
pub mod planner;
pub mod registry;
pub mod retry;
pub mod sequential;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::models::{ContainerDefaults, ProjectConfig, SafetyConfig, Workspace};
use crate::infrastructure::state::TaskStateStore;

pub use invoker::AgentInvoker;
pub use merger::{BranchMerger, MergeOutcome};
pub use orchestrator::Orchestrator;
pub use parallel::ParallelExecutor;
pub use planner::Planner;
pub use registry::AgentRegistry;
pub use retry::RetryPolicy;
pub use sequential::{SequentialExecutor, SequentialOutcome, StopReason};

/// Cooperative cancellation flag, consulted at every suspension point.
/// In-flight model turns finish; no new turn starts after it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything an executor needs to run agents for one task.
#[derive(Clone)]
pub struct RunContext {
    pub task_id: String,
    pub description: String,
    pub project: ProjectConfig,
    /// Effective safety limits (project overrides over global defaults).
    pub safety: SafetyConfig,
    /// Effective container settings (project overrides over global defaults).
    pub container: ContainerDefaults,
    pub workspace: Workspace,
    pub cancel: CancelFlag,
    pub store: Arc<TaskStateStore>,
}

/// Extract a JSON object from model output, tolerating surrounding prose
/// and fenced code blocks.
pub fn extract_json_from_response(response: &str) -> String {
    let trimmed = response.trim();

    // Handle ```json ... ``` blocks
    if trimmed.starts_with("```json") {
        if let Some(end) = trimmed.rfind("```") {
            if end > 7 {
                return trimmed[7..end].trim().to_string();
            }
        }
    }

    // Handle ``` ... ``` blocks
    if trimmed.starts_with("```") {
        if let Some(end) = trimmed.rfind("```") {
            let start = if trimmed.starts_with("```\n") { 4 } else { 3 };
            if end > start {
                return trimmed[start..end].trim().to_string();
            }
        }
    }

    // If it already looks like a JSON object, use it directly
    if trimmed.starts_with('{') && trimmed.ends_with('}') {
        return trimmed.to_string();
    }

    // Try to find a JSON object embedded in text
    if let Some(start) = trimmed.find('{') {
        if let Some(end) = trimmed.rfind('}') {
            if end > start {
                return trimmed[start..=end].to_string();
            }
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_plain() {
        let input = r#"{"taskType": "implementation"}"#;
        assert_eq!(extract_json_from_response(input), input);
    }

    #[test]
    fn test_extract_json_code_block() {
        let input = "```json\n{\"taskType\": \"analysis\"}\n```";
        assert_eq!(extract_json_from_response(input), r#"{"taskType": "analysis"}"#);
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let input = "Here is the plan:\n{\"agents\": [\"coder\"]}\nGood luck.";
        assert_eq!(extract_json_from_response(input), r#"{"agents": ["coder"]}"#);
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        let shared = flag.clone();
        assert!(!flag.is_cancelled());
        shared.set();
        assert!(flag.is_cancelled());
    }
}
