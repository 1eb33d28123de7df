//! Domain models for tasks, plans, agents, conversations, cost, and config.

pub mod agent;
pub mod config;
pub mod conversation;
pub mod cost;
pub mod plan;
pub mod task;

pub use agent::{standard_agents, AgentCapability};
pub use config::{
    ContainerDefaults, GlobalConfig, LoggingConfig, ModelConfig, PrConfig, ProjectConfig,
    SafetyConfig,
};
pub use conversation::{AgentTurn, ConversationEntry, ConversationLog, Decision};
pub use cost::{estimate_turn_cost, CostAccount, CostTotals};
pub use plan::{Complexity, ComplexityLabel, Part, Plan, TaskKind};
pub use task::{
    branch_task_id, coordination_branch, generate_task_id, part_branch, subtask_id, task_branch,
    FailureCause, Progress, SubtaskRecord, TaskRecord, TaskStatus, Workspace,
};
