//! Ports: the capability interfaces the core consumes.
//!
//! The core never calls git, docker, the model backend, or the code host
//! directly; it goes through these traits. Implementations live under
//! `infrastructure::runtime`.

pub mod config_source;
pub mod container_runtime;
pub mod git_runtime;
pub mod host_adapter;
pub mod model_adapter;

pub use config_source::ConfigSource;
pub use container_runtime::{ContainerHandle, ContainerRuntime, ContainerSpec, ExecOutcome, Mount};
pub use git_runtime::{GitRuntime, MergeAttempt};
pub use host_adapter::{HostAdapter, PrHandle, PrRequest};
pub use model_adapter::{ModelAdapter, ModelError, ModelErrorKind, ModelRequest, ModelResponse};
