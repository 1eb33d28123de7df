//! Configuration loader with hierarchical merging.
//!
//! Global config comes from `<install_dir>/config.json` (camelCase keys),
//! merged over programmatic defaults and under `CONDUCTOR_*` environment
//! variables. Project configs are YAML files in the config directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Json, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{GlobalConfig, ProjectConfig};
use crate::domain::ports::config_source::ConfigSource;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid maxParallelTasks: {0}. Must be between 1 and 100")]
    InvalidMaxParallelTasks(usize),

    #[error("Invalid maxCostPerTask: {0}. Must be positive")]
    InvalidMaxCost(f64),

    #[error("Invalid maxDurationSeconds: {0}. Must be positive")]
    InvalidMaxDuration(u64),

    #[error("Invalid turnTimeoutSeconds: {0}. Must be positive")]
    InvalidTurnTimeout(u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid model backend: {0}. Must be one of: claude-code, anthropic-api")]
    InvalidModelBackend(String),

    #[error("Project '{0}': repo_path cannot be empty")]
    EmptyRepoPath(String),

    #[error("Project '{0}': base_branch cannot be empty")]
    EmptyBaseBranch(String),
}

/// Loads and validates configuration.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load the global configuration for `install_dir`.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. `<install_dir>/config.json`
    /// 3. Environment variables (`CONDUCTOR_*` prefix, `__` nesting)
    pub fn load_global(install_dir: &Path) -> Result<GlobalConfig> {
        let config: GlobalConfig = Figment::new()
            .merge(Serialized::defaults(GlobalConfig::default()))
            .merge(Json::file(install_dir.join("config.json")))
            .merge(Env::prefixed("CONDUCTOR_").split("__"))
            .extract()
            .context("Failed to extract global configuration")?;

        Self::validate_global(&config)?;
        Ok(config)
    }

    /// Load one project's YAML config from `config_dir`.
    pub fn load_project(config_dir: &Path, name: &str) -> Result<ProjectConfig> {
        let path = config_dir.join(format!("{name}.yaml"));
        if !path.exists() {
            anyhow::bail!("project '{name}' is not configured (no {})", path.display());
        }
        let config: ProjectConfig = Figment::new()
            .merge(Yaml::file(&path))
            .extract()
            .with_context(|| format!("Failed to load project config {}", path.display()))?;
        Self::validate_project(&config)?;
        Ok(config)
    }

    pub fn validate_global(config: &GlobalConfig) -> Result<(), ConfigError> {
        if config.max_parallel_tasks == 0 || config.max_parallel_tasks > 100 {
            return Err(ConfigError::InvalidMaxParallelTasks(
                config.max_parallel_tasks,
            ));
        }
        if config.safety.max_cost_per_task <= 0.0 {
            return Err(ConfigError::InvalidMaxCost(config.safety.max_cost_per_task));
        }
        if config.safety.max_duration_seconds == 0 {
            return Err(ConfigError::InvalidMaxDuration(
                config.safety.max_duration_seconds,
            ));
        }
        if config.safety.turn_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTurnTimeout(
                config.safety.turn_timeout_seconds,
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }
        let valid_backends = ["claude-code", "anthropic-api"];
        if !valid_backends.contains(&config.model.backend.as_str()) {
            return Err(ConfigError::InvalidModelBackend(
                config.model.backend.clone(),
            ));
        }
        Ok(())
    }

    pub fn validate_project(config: &ProjectConfig) -> Result<(), ConfigError> {
        if config.repo_path.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRepoPath(config.name.clone()));
        }
        if config.base_branch.is_empty() {
            return Err(ConfigError::EmptyBaseBranch(config.name.clone()));
        }
        Ok(())
    }
}

/// Filesystem-backed [`ConfigSource`].
pub struct FileConfigSource {
    install_dir: PathBuf,
    config_dir: PathBuf,
}

impl FileConfigSource {
    pub fn new(install_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            install_dir,
            config_dir,
        }
    }
}

impl ConfigSource for FileConfigSource {
    fn load_global(&self) -> DomainResult<GlobalConfig> {
        ConfigLoader::load_global(&self.install_dir)
            .map_err(|e| DomainError::InvalidConfig(e.to_string()))
    }

    fn load_project(&self, name: &str) -> DomainResult<ProjectConfig> {
        ConfigLoader::load_project(&self.config_dir, name)
            .map_err(|e| DomainError::UnknownProject(format!("{name}: {e}")))
    }

    fn list_projects(&self) -> DomainResult<Vec<String>> {
        let mut names = Vec::new();
        let entries = match std::fs::read_dir(&self.config_dir) {
            Ok(entries) => entries,
            Err(_) => return Ok(names),
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("yaml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_global_config_is_valid() {
        let config = GlobalConfig::default();
        assert_eq!(config.max_parallel_tasks, 10);
        ConfigLoader::validate_global(&config).expect("defaults should validate");
    }

    #[test]
    fn test_global_config_json_merging() {
        let dir = TempDir::new().unwrap();
        let mut file = std::fs::File::create(dir.path().join("config.json")).unwrap();
        write!(
            file,
            r#"{{ "maxParallelTasks": 4, "safety": {{ "maxCostPerTask": 1.5, "maxDurationSeconds": 600, "turnTimeoutSeconds": 120 }} }}"#
        )
        .unwrap();
        let config = ConfigLoader::load_global(dir.path()).unwrap();
        assert_eq!(config.max_parallel_tasks, 4);
        assert!((config.safety.max_cost_per_task - 1.5).abs() < f64::EPSILON);
        // Untouched sections keep defaults.
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_missing_config_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::load_global(dir.path()).unwrap();
        assert_eq!(config.max_parallel_tasks, 10);
    }

    #[test]
    fn test_validate_zero_parallel_tasks() {
        let config = GlobalConfig {
            max_parallel_tasks: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate_global(&config),
            Err(ConfigError::InvalidMaxParallelTasks(0))
        ));
    }

    #[test]
    fn test_validate_zero_budget() {
        let mut config = GlobalConfig::default();
        config.safety.max_cost_per_task = 0.0;
        assert!(matches!(
            ConfigLoader::validate_global(&config),
            Err(ConfigError::InvalidMaxCost(_))
        ));
    }

    #[test]
    fn test_validate_bad_log_level() {
        let mut config = GlobalConfig::default();
        config.logging.level = "loud".to_string();
        assert!(matches!(
            ConfigLoader::validate_global(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_bad_backend() {
        let mut config = GlobalConfig::default();
        config.model.backend = "gpt".to_string();
        assert!(matches!(
            ConfigLoader::validate_global(&config),
            Err(ConfigError::InvalidModelBackend(_))
        ));
    }

    #[test]
    fn test_project_loading_and_listing() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("demo.yaml"),
            "name: demo\nrepo_path: /srv/demo\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("api.yaml"),
            "name: api\nrepo_path: /srv/api\nbase_branch: develop\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a project").unwrap();

        let source = FileConfigSource::new(dir.path().to_path_buf(), dir.path().to_path_buf());
        assert_eq!(source.list_projects().unwrap(), vec!["api", "demo"]);

        let api = source.load_project("api").unwrap();
        assert_eq!(api.base_branch, "develop");

        assert!(matches!(
            source.load_project("missing"),
            Err(DomainError::UnknownProject(_))
        ));
    }

    #[test]
    fn test_validate_project_empty_repo_path() {
        let config = ProjectConfig {
            name: "x".into(),
            repo_path: PathBuf::new(),
            remote_repo: None,
            base_branch: "main".into(),
            protected_branches: vec![],
            container: None,
            safety: None,
            pr: Default::default(),
            test_command: None,
        };
        assert!(matches!(
            ConfigLoader::validate_project(&config),
            Err(ConfigError::EmptyRepoPath(_))
        ));
    }
}
