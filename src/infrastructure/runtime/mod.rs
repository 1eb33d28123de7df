//! Runtime adapters implementing the domain ports.

pub mod docker;
pub mod git;
pub mod host;
pub mod mock;
pub mod model;

pub use docker::DockerCli;
pub use git::GitCli;
pub use host::GitHubAdapter;
