//! Configuration source port.

use crate::domain::errors::DomainResult;
use crate::domain::models::{GlobalConfig, ProjectConfig};

/// Trait for configuration providers.
pub trait ConfigSource: Send + Sync {
    fn load_global(&self) -> DomainResult<GlobalConfig>;

    fn load_project(&self, name: &str) -> DomainResult<ProjectConfig>;

    /// Names of all configured projects.
    fn list_projects(&self) -> DomainResult<Vec<String>>;
}
