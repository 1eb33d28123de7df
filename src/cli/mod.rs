//! Command-line interface: clap types, command handlers, output.

pub mod commands;
pub mod output;
pub mod types;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::domain::models::GlobalConfig;
use crate::domain::ports::container_runtime::ContainerRuntime;
use crate::domain::ports::git_runtime::GitRuntime;
use crate::domain::ports::host_adapter::HostAdapter;
use crate::domain::ports::model_adapter::ModelAdapter;
use crate::infrastructure::config::FileConfigSource;
use crate::infrastructure::runtime::model::{AnthropicApiAdapter, ClaudeCodeAdapter};
use crate::infrastructure::state::TaskStateStore;
use crate::infrastructure::supervisor::Supervisor;
use crate::services::{AgentRegistry, Orchestrator};

pub use types::{Cli, Commands};

/// Shared wiring for all command handlers.
pub struct App {
    pub global: GlobalConfig,
    pub json: bool,
    pub source: Arc<FileConfigSource>,
    pub store: Arc<TaskStateStore>,
    pub registry: Arc<AgentRegistry>,
    pub git: Arc<dyn GitRuntime>,
    pub containers: Arc<dyn ContainerRuntime>,
    pub host: Arc<dyn HostAdapter>,
}

impl App {
    pub fn supervisor(&self) -> Supervisor {
        Supervisor::new(
            self.global.clone(),
            Arc::clone(&self.store),
            Arc::clone(&self.containers),
            Arc::clone(&self.git),
            Arc::clone(&self.source) as Arc<dyn crate::domain::ports::config_source::ConfigSource>,
        )
    }

    /// Build the model adapter for the configured backend. Only run paths
    /// need this; read-only commands never touch model credentials.
    pub fn model_adapter(&self) -> Result<Arc<dyn ModelAdapter>> {
        match self.global.model.backend.as_str() {
            "anthropic-api" => {
                let key = std::env::var(&self.global.model.api_key_env).with_context(|| {
                    format!(
                        "model backend 'anthropic-api' requires {} to be set",
                        self.global.model.api_key_env
                    )
                })?;
                Ok(Arc::new(AnthropicApiAdapter::new(key)))
            }
            _ => Ok(Arc::new(ClaudeCodeAdapter::new(
                self.global.model.cli_path.clone(),
            ))),
        }
    }

    pub fn orchestrator(&self) -> Result<Orchestrator> {
        Ok(Orchestrator::new(
            self.global.clone(),
            Arc::clone(&self.registry),
            self.model_adapter()?,
            Arc::clone(&self.git),
            Arc::clone(&self.containers),
            Arc::clone(&self.host),
            Arc::clone(&self.store),
        ))
    }
}
