//! Model adapters: the Claude Code CLI backend and the direct Messages
//! API backend.

pub mod anthropic;
pub mod claude_code;

pub use anthropic::AnthropicApiAdapter;
pub use claude_code::ClaudeCodeAdapter;

/// Resolve a tier alias to a concrete model id for the direct API.
pub fn resolve_model_id(model: &str) -> String {
    match model.to_lowercase().as_str() {
        "opus" => "claude-opus-4-6".to_string(),
        "sonnet" => "claude-sonnet-4-5".to_string(),
        "haiku" => "claude-haiku-4-5".to_string(),
        other => other.to_string(),
    }
}
