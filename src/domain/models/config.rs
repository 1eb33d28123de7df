//! Global and per-project configuration.
//!
//! The global config lives at `<install_dir>/config.json` (camelCase keys);
//! project configs are YAML files under the config directory. Both are
//! loaded once at process start and injected; no component reads ambient
//! environment state on its own.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::models::agent::AgentCapability;

/// Container defaults (and per-project overrides).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefaults {
    pub image: String,
    pub cpu_limit: f64,
    pub memory_mb: u64,
    /// Host directory mounted read-only into every container at /tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools_dir: Option<PathBuf>,
}

impl Default for ContainerDefaults {
    fn default() -> Self {
        Self {
            image: "ubuntu:24.04".to_string(),
            cpu_limit: 2.0,
            memory_mb: 4096,
            tools_dir: None,
        }
    }
}

/// Safety limits for one task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafetyConfig {
    /// Hard dollar ceiling per task.
    pub max_cost_per_task: f64,
    /// Hard wall-clock ceiling per task, seconds.
    pub max_duration_seconds: u64,
    /// Per-agent-turn timeout, seconds.
    pub turn_timeout_seconds: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_cost_per_task: 5.0,
            max_duration_seconds: 3600,
            turn_timeout_seconds: 300,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// trace | debug | info | warn | error
    pub level: String,
    /// json | pretty
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Model backend configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    /// "claude-code" (CLI) or "anthropic-api" (direct Messages API).
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli_path: Option<String>,
    /// Default model tier for agents that do not override it.
    pub model: String,
    /// Cheap tier used by the planner.
    pub planner_model: String,
    /// Environment variable holding the API key for direct API mode.
    pub api_key_env: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: "claude-code".to_string(),
            cli_path: None,
            model: "sonnet".to_string(),
            planner_model: "haiku".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

/// Global configuration, `<install_dir>/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    pub config_dir: PathBuf,
    pub tasks_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub max_parallel_tasks: usize,
    #[serde(default)]
    pub docker: ContainerDefaults,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    /// Platform-specific agent sets registered in addition to the
    /// standard agents.
    #[serde(default)]
    pub extra_agents: Vec<AgentCapability>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        let base = PathBuf::from(".conductor");
        Self {
            config_dir: base.join("projects"),
            tasks_dir: base.join("tasks"),
            logs_dir: base.join("logs"),
            max_parallel_tasks: 10,
            docker: ContainerDefaults::default(),
            safety: SafetyConfig::default(),
            logging: LoggingConfig::default(),
            model: ModelConfig::default(),
            extra_agents: Vec::new(),
        }
    }
}

/// Pull-request metadata for a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_prefix: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Per-project configuration, `<config_dir>/<name>.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    /// Local repository working tree.
    pub repo_path: PathBuf,
    /// Remote repository reference ("owner/repo") for PR creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_repo: Option<String>,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default)]
    pub protected_branches: Vec<String>,
    /// Container overrides; global docker defaults apply when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container: Option<ContainerDefaults>,
    /// Safety overrides; global safety defaults apply when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety: Option<SafetyConfig>,
    #[serde(default)]
    pub pr: PrConfig,
    /// Command run inside the container after agents finish.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_command: Option<String>,
}

fn default_base_branch() -> String {
    "main".to_string()
}

impl ProjectConfig {
    /// Whether a branch must never be deleted or force-touched. The base
    /// branch is always protected.
    pub fn is_protected(&self, branch: &str) -> bool {
        branch == self.base_branch || self.protected_branches.iter().any(|b| b == branch)
    }

    /// Effective safety limits, project overrides over global defaults.
    pub fn effective_safety(&self, global: &GlobalConfig) -> SafetyConfig {
        self.safety.unwrap_or(global.safety)
    }

    /// Effective container settings, project overrides over global defaults.
    pub fn effective_container(&self, global: &GlobalConfig) -> ContainerDefaults {
        self.container.clone().unwrap_or_else(|| global.docker.clone())
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }
}
