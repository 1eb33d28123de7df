//! Container runtime port.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;

/// A bind mount into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

/// Specification for creating a container.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: String,
    pub cpu_limit: f64,
    pub memory_mb: u64,
    pub mounts: Vec<Mount>,
    /// Labels attached for ownership tracking; the sweep uses these to
    /// find orphans.
    pub labels: Vec<(String, String)>,
}

/// Handle to a created container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHandle {
    pub id: String,
}

/// Outcome of a command executed inside a container.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Trait for container runtime implementations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Verify the runtime is reachable.
    async fn ping(&self) -> DomainResult<()>;

    async fn create(&self, spec: &ContainerSpec) -> DomainResult<ContainerHandle>;

    async fn exec(
        &self,
        handle: &ContainerHandle,
        cmd: &[String],
        deadline: Duration,
    ) -> DomainResult<ExecOutcome>;

    async fn destroy(&self, handle: &ContainerHandle) -> DomainResult<()>;

    /// Containers carrying the given label key, running or stopped, paired
    /// with the label's value (the owning task id).
    async fn list_labelled(
        &self,
        label_key: &str,
    ) -> DomainResult<Vec<(ContainerHandle, String)>>;
}
