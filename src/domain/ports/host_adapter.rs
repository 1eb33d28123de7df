//! Code host port (pull requests, access checks).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Request to open a pull request.
#[derive(Debug, Clone)]
pub struct PrRequest {
    /// "owner/repo"
    pub repo: String,
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
    pub labels: Vec<String>,
}

/// A created pull request.
#[derive(Debug, Clone)]
pub struct PrHandle {
    pub url: String,
}

/// Trait for code host implementations.
#[async_trait]
pub trait HostAdapter: Send + Sync {
    async fn create_pr(&self, request: &PrRequest) -> DomainResult<PrHandle>;

    async fn check_access(&self, repo: &str) -> DomainResult<bool>;
}
