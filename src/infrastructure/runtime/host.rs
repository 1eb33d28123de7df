//! Code host adapter for the GitHub REST API.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::host_adapter::{HostAdapter, PrHandle, PrRequest};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("conductor/", env!("CARGO_PKG_VERSION"));

/// [`HostAdapter`] for GitHub.
pub struct GitHubAdapter {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PrResponse {
    html_url: String,
}

impl GitHubAdapter {
    pub fn new(token: Option<String>) -> Self {
        Self::with_api_base(DEFAULT_API_BASE, token)
    }

    /// Construct against a custom API base (tests point this at a mock
    /// server).
    pub fn with_api_base(api_base: impl Into<String>, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            api_base: api_base.into(),
            token,
        }
    }

    /// Token from the conventional environment variable.
    pub fn from_env() -> Self {
        Self::new(std::env::var("GITHUB_TOKEN").ok())
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.header("authorization", format!("Bearer {token}")),
            None => request,
        }
    }
}

#[async_trait]
impl HostAdapter for GitHubAdapter {
    async fn create_pr(&self, request: &PrRequest) -> DomainResult<PrHandle> {
        let url = format!("{}/repos/{}/pulls", self.api_base, request.repo);
        let body = serde_json::json!({
            "title": request.title,
            "head": request.head,
            "base": request.base,
            "body": request.body,
            "draft": request.draft,
        });
        let response = self
            .authorize(self.client.post(&url))
            .header("accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await
            .map_err(|e| DomainError::Runtime(format!("PR request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(DomainError::Runtime(format!(
                "PR creation failed ({status}): {text}"
            )));
        }
        let pr: PrResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Runtime(format!("unparseable PR response: {e}")))?;
        debug!(url = %pr.html_url, "pull request created");

        if !request.labels.is_empty() {
            // Labels are best-effort; a failure does not void the PR.
            if let Some(number) = pr.html_url.rsplit('/').next() {
                let labels_url = format!(
                    "{}/repos/{}/issues/{number}/labels",
                    self.api_base, request.repo
                );
                let _ = self
                    .authorize(self.client.post(&labels_url))
                    .json(&serde_json::json!({ "labels": request.labels }))
                    .send()
                    .await;
            }
        }

        Ok(PrHandle { url: pr.html_url })
    }

    async fn check_access(&self, repo: &str) -> DomainResult<bool> {
        let url = format!("{}/repos/{repo}", self.api_base);
        let response = self
            .authorize(self.client.get(&url))
            .header("accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| DomainError::Runtime(format!("access check failed: {e}")))?;
        Ok(response.status().is_success())
    }
}
