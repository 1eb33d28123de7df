//! Model adapter driving the Claude Code CLI.
//!
//! One invocation per turn: the CLI runs the agent's model-driven tool use
//! in the workspace and prints a JSON result envelope. The per-turn
//! deadline is enforced here with a graceful SIGTERM, then SIGKILL after a
//! short grace window.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::domain::ports::model_adapter::{
    ModelAdapter, ModelError, ModelErrorKind, ModelRequest, ModelResponse,
};

/// Grace window between SIGTERM and SIGKILL on turn timeout.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// [`ModelAdapter`] backed by the `claude` CLI.
pub struct ClaudeCodeAdapter {
    cli_path: String,
}

impl ClaudeCodeAdapter {
    pub fn new(cli_path: Option<String>) -> Self {
        Self {
            cli_path: cli_path.unwrap_or_else(|| "claude".to_string()),
        }
    }

    fn build_args(&self, request: &ModelRequest) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--model".to_string(),
            request.model.clone(),
        ];
        if !request.system_prompt.is_empty() {
            args.push("--append-system-prompt".to_string());
            args.push(request.system_prompt.clone());
        }
        if !request.tool_scopes.is_empty() {
            args.push("--allowed-tools".to_string());
            args.push(request.tool_scopes.join(","));
        }
        args.push(request.user_prompt.clone());
        args
    }

    fn classify_failure(stderr: &str) -> ModelError {
        let lower = stderr.to_lowercase();
        let kind = if lower.contains("rate limit") || lower.contains("overloaded") {
            ModelErrorKind::RateLimited
        } else if lower.contains("unauthorized")
            || lower.contains("api key")
            || lower.contains("authentication")
        {
            ModelErrorKind::Auth
        } else if lower.contains("not found") || lower.contains("no such model") {
            ModelErrorKind::NotFound
        } else {
            ModelErrorKind::Network
        };
        ModelError::new(kind, stderr.trim().to_string())
    }

    fn parse_output(stdout: &str, fallback_duration_ms: u64) -> ModelResponse {
        // The CLI prints a JSON envelope; tolerate plain text from older
        // versions by passing stdout through unchanged.
        match serde_json::from_str::<serde_json::Value>(stdout) {
            Ok(value) => {
                let text = value
                    .get("result")
                    .and_then(|v| v.as_str())
                    .unwrap_or(stdout)
                    .to_string();
                let cost_usd = value.get("total_cost_usd").and_then(serde_json::Value::as_f64);
                let duration_ms = value
                    .get("duration_ms")
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(fallback_duration_ms);
                let usage = value.get("usage");
                let input_tokens = usage
                    .and_then(|u| u.get("input_tokens"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                let output_tokens = usage
                    .and_then(|u| u.get("output_tokens"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0);
                ModelResponse {
                    text,
                    cost_usd,
                    input_tokens,
                    output_tokens,
                    duration_ms,
                }
            }
            Err(_) => ModelResponse {
                text: stdout.to_string(),
                cost_usd: None,
                input_tokens: 0,
                output_tokens: 0,
                duration_ms: fallback_duration_ms,
            },
        }
    }
}

#[async_trait]
impl ModelAdapter for ClaudeCodeAdapter {
    fn name(&self) -> &'static str {
        "claude-code"
    }

    async fn invoke(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let args = self.build_args(&request);
        let mut command = Command::new(&self.cli_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(workdir) = &request.workdir {
            command.current_dir(workdir);
        }

        let started = std::time::Instant::now();
        let mut child = command.spawn().map_err(|e| {
            ModelError::new(
                ModelErrorKind::Network,
                format!("failed to spawn {}: {e}", self.cli_path),
            )
        })?;
        #[allow(clippy::cast_possible_wrap)]
        let child_pid = child.id().map(|id| id as i32);

        let wait = child.wait_with_output();
        tokio::pin!(wait);

        let output = match tokio::time::timeout(request.timeout, &mut wait).await {
            Ok(result) => result.map_err(|e| {
                ModelError::new(ModelErrorKind::Network, format!("wait failed: {e}"))
            })?,
            Err(_) => {
                // Deadline: graceful termination, then forced.
                warn!(timeout_s = request.timeout.as_secs(), "turn deadline expired");
                if let Some(pid) = child_pid {
                    let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
                }
                if tokio::time::timeout(KILL_GRACE, &mut wait).await.is_err() {
                    if let Some(pid) = child_pid {
                        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
                    }
                    let _ = tokio::time::timeout(Duration::from_secs(1), &mut wait).await;
                }
                return Err(ModelError::new(
                    ModelErrorKind::Timeout,
                    format!("turn exceeded {}s", request.timeout.as_secs()),
                ));
            }
        };

        #[allow(clippy::cast_possible_truncation)]
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Self::classify_failure(&stderr));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let response = Self::parse_output(&stdout, elapsed_ms);
        debug!(
            duration_ms = response.duration_ms,
            cost_usd = ?response.cost_usd,
            "claude-code turn complete"
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request() -> ModelRequest {
        ModelRequest {
            system_prompt: "be helpful".to_string(),
            user_prompt: "hello".to_string(),
            tool_scopes: vec!["read".to_string(), "write".to_string()],
            model: "sonnet".to_string(),
            workdir: Some(PathBuf::from("/tmp")),
            container: None,
            timeout: Duration::from_secs(60),
        }
    }

    #[test]
    fn test_build_args() {
        let adapter = ClaudeCodeAdapter::new(None);
        let args = adapter.build_args(&request());
        assert!(args.contains(&"--print".to_string()));
        assert!(args.contains(&"--append-system-prompt".to_string()));
        assert!(args.contains(&"read,write".to_string()));
        assert_eq!(args.last().unwrap(), "hello");
    }

    #[test]
    fn test_parse_json_envelope() {
        let stdout = r#"{"result": "done", "total_cost_usd": 0.0123, "duration_ms": 4200, "usage": {"input_tokens": 900, "output_tokens": 120}}"#;
        let response = ClaudeCodeAdapter::parse_output(stdout, 1);
        assert_eq!(response.text, "done");
        assert!((response.cost_usd.unwrap() - 0.0123).abs() < 1e-9);
        assert_eq!(response.duration_ms, 4200);
        assert_eq!(response.input_tokens, 900);
    }

    #[test]
    fn test_parse_plain_text_fallback() {
        let response = ClaudeCodeAdapter::parse_output("plain answer", 7);
        assert_eq!(response.text, "plain answer");
        assert!(response.cost_usd.is_none());
        assert_eq!(response.duration_ms, 7);
    }

    #[test]
    fn test_classify_failure() {
        assert_eq!(
            ClaudeCodeAdapter::classify_failure("Rate limit reached").kind,
            ModelErrorKind::RateLimited
        );
        assert_eq!(
            ClaudeCodeAdapter::classify_failure("Invalid API key").kind,
            ModelErrorKind::Auth
        );
        assert_eq!(
            ClaudeCodeAdapter::classify_failure("model not found").kind,
            ModelErrorKind::NotFound
        );
        assert_eq!(
            ClaudeCodeAdapter::classify_failure("connection reset").kind,
            ModelErrorKind::Network
        );
    }
}
