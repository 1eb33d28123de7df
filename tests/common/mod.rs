//! Shared fixtures for integration tests.

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use conductor::domain::models::{GlobalConfig, ProjectConfig, TaskRecord};
use conductor::infrastructure::config::FileConfigSource;
use conductor::infrastructure::runtime::mock::{
    FakeContainerRuntime, FakeGitRuntime, FakeHostAdapter, MockModelAdapter,
};
use conductor::infrastructure::state::TaskStateStore;
use conductor::services::{AgentRegistry, Orchestrator};

/// Fully wired orchestrator over fakes plus handles to every fake for
/// scripting and assertions.
pub struct Harness {
    pub tmp: TempDir,
    pub global: GlobalConfig,
    pub project: ProjectConfig,
    pub source: Arc<FileConfigSource>,
    pub model: Arc<MockModelAdapter>,
    pub git: Arc<FakeGitRuntime>,
    pub containers: Arc<FakeContainerRuntime>,
    pub host: Arc<FakeHostAdapter>,
    pub store: Arc<TaskStateStore>,
}

impl Harness {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let global = test_global(tmp.path());
        let project = test_project(tmp.path());
        // The project config exists on disk too, so the supervisor's
        // config source sees the same project the fakes are wired for.
        std::fs::create_dir_all(&global.config_dir).expect("config dir");
        std::fs::write(
            global.config_dir.join(format!("{}.yaml", project.name)),
            serde_yaml::to_string(&project).expect("project yaml"),
        )
        .expect("write project yaml");
        let source = Arc::new(FileConfigSource::new(
            tmp.path().to_path_buf(),
            global.config_dir.clone(),
        ));
        Self {
            store: Arc::new(TaskStateStore::new(global.tasks_dir.clone())),
            source,
            model: Arc::new(MockModelAdapter::new()),
            git: Arc::new(FakeGitRuntime::new()),
            containers: Arc::new(FakeContainerRuntime::new()),
            host: Arc::new(FakeHostAdapter::new()),
            tmp,
            global,
            project,
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.global.clone(),
            Arc::new(AgentRegistry::with_standard_agents()),
            self.model.clone(),
            self.git.clone(),
            self.containers.clone(),
            self.host.clone(),
            self.store.clone(),
        )
    }

    /// Create and persist a running task record the way the CLI does.
    pub async fn new_task(&self, description: &str) -> TaskRecord {
        let mut task = TaskRecord::new(self.project.name.clone(), description);
        #[allow(clippy::cast_possible_wrap)]
        let pid = std::process::id() as i32;
        task.pid = Some(pid);
        self.store.save(&task).await.expect("save task");
        task
    }
}

pub fn test_global(base: &Path) -> GlobalConfig {
    GlobalConfig {
        config_dir: base.join("projects"),
        tasks_dir: base.join("tasks"),
        logs_dir: base.join("logs"),
        ..Default::default()
    }
}

pub fn test_project(base: &Path) -> ProjectConfig {
    ProjectConfig {
        name: "demo".to_string(),
        repo_path: base.join("repo"),
        remote_repo: Some("acme/demo".to_string()),
        base_branch: "main".to_string(),
        protected_branches: vec!["release".to_string()],
        container: None,
        safety: None,
        pr: Default::default(),
        test_command: None,
    }
}

/// Sequential plan JSON in the planner's wire format.
pub fn plan_json(agents: &[&str], score: u8) -> String {
    format!(
        r#"{{
            "taskType": "implementation",
            "agents": [{}],
            "reasoning": "test plan",
            "complexity": {{ "score": {score}, "label": "medium" }},
            "parallel": {{ "canParallelize": false, "parts": [] }}
        }}"#,
        agents
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(", ")
    )
}

/// Parallel plan JSON with one coder part per `(description, file)` pair.
pub fn parallel_plan_json(parts: &[(&str, &str)]) -> String {
    let parts_json = parts
        .iter()
        .map(|(description, file)| {
            format!(
                r#"{{ "description": "{description}", "files": ["{file}"], "agent": "coder", "dependsOn": [] }}"#
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        r#"{{
            "taskType": "implementation",
            "agents": ["coder"],
            "reasoning": "split by area",
            "complexity": {{ "score": 6, "label": "medium" }},
            "parallel": {{ "canParallelize": true, "parts": [{parts_json}] }}
        }}"#
    )
}

/// An agent response ending in a hand-off directive.
pub fn turn(body: &str, next: &str, reason: &str) -> String {
    format!("{body}\nNEXT: {next}\nREASON: {reason}")
}
