//! Model adapter port - interface for LLM backends.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ports::container_runtime::ContainerHandle;

/// How a model invocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// Network-level failure reaching the backend.
    Network,
    /// The backend rate-limited the request.
    RateLimited,
    /// The turn exceeded its deadline.
    Timeout,
    /// Authentication or authorization failure.
    Auth,
    /// Model or resource not found.
    NotFound,
    /// The backend returned something unparseable.
    InvalidResponse,
}

impl ModelErrorKind {
    /// Transient errors are retried; permanent errors are surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::RateLimited | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RateLimited => "rate-limited",
            Self::Timeout => "timeout",
            Self::Auth => "auth",
            Self::NotFound => "not-found",
            Self::InvalidResponse => "invalid-response",
        }
    }
}

/// Error from a model invocation.
#[derive(Debug, Clone, Error)]
#[error("model error ({}): {message}", kind.as_str())]
pub struct ModelError {
    pub kind: ModelErrorKind,
    pub message: String,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// One model invocation request.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Opaque tool scope strings interpreted by the backend.
    pub tool_scopes: Vec<String>,
    /// Model name or tier alias.
    pub model: String,
    /// Working directory the agent's tool use operates in.
    pub workdir: Option<PathBuf>,
    /// Container the agent's tool use is confined to, when isolated.
    pub container: Option<ContainerHandle>,
    /// Per-turn deadline; the adapter terminates the turn when it expires.
    pub timeout: Duration,
}

/// Result of a completed model invocation.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    /// Actual dollar cost when the backend reports it.
    pub cost_usd: Option<f64>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: u64,
}

/// Trait for LLM backend implementations.
///
/// The adapter executes the agent's model-driven tool use against the
/// isolated workspace and returns the final textual response with cost
/// and duration.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Run one turn to completion.
    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelErrorKind::Network.is_transient());
        assert!(ModelErrorKind::RateLimited.is_transient());
        assert!(ModelErrorKind::Timeout.is_transient());
        assert!(!ModelErrorKind::Auth.is_transient());
        assert!(!ModelErrorKind::NotFound.is_transient());
        assert!(!ModelErrorKind::InvalidResponse.is_transient());
    }
}
