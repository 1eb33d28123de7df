//! Agent capability records.
//!
//! An agent is a named role: a system prompt, the tool scopes it may use,
//! a preferred model tier, and a per-turn cost estimate used for budget
//! pre-checks. The registry of capabilities is closed after startup.

use serde::{Deserialize, Serialize};

/// Capability record for one named agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapability {
    pub name: String,
    pub description: String,
    /// Capability tags used for `find_by_capability` lookups.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Opaque tool scope strings passed through to the runtime adapter.
    #[serde(default)]
    pub tool_scopes: Vec<String>,
    /// Estimated dollars per turn, used for the budget pre-check.
    pub cost_estimate: f64,
    pub system_prompt: String,
    /// Preferred model tier alias (e.g. "haiku", "sonnet", "opus").
    pub model: String,
}

impl AgentCapability {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            capabilities: Vec::new(),
            tool_scopes: Vec::new(),
            cost_estimate: 0.05,
            system_prompt: String::new(),
            model: "sonnet".to_string(),
        }
    }

    pub fn with_capabilities(mut self, tags: &[&str]) -> Self {
        self.capabilities = tags.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_tool_scopes(mut self, scopes: &[&str]) -> Self {
        self.tool_scopes = scopes.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_cost_estimate(mut self, usd: f64) -> Self {
        self.cost_estimate = usd;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// The standard agent set registered at process start.
pub fn standard_agents() -> Vec<AgentCapability> {
    vec![
        AgentCapability::new("architect", "Designs the approach and breaks down the work")
            .with_capabilities(&["design", "analysis"])
            .with_tool_scopes(&["read", "search"])
            .with_cost_estimate(0.15)
            .with_model("opus")
            .with_system_prompt(
                "You are a software architect. Study the repository, decide on an \
                 approach, and describe the concrete changes needed. Do not write \
                 code yourself; set up the coder to succeed.",
            ),
        AgentCapability::new("coder", "Implements code changes")
            .with_capabilities(&["implementation"])
            .with_tool_scopes(&["read", "write", "exec", "search"])
            .with_cost_estimate(0.10)
            .with_model("sonnet")
            .with_system_prompt(
                "You are a senior software engineer. Implement the requested change \
                 in the working directory, committing to the current branch. Keep \
                 changes minimal and consistent with the surrounding code.",
            ),
        AgentCapability::new("reviewer", "Reviews changes for correctness and style")
            .with_capabilities(&["review", "analysis"])
            .with_tool_scopes(&["read", "search"])
            .with_cost_estimate(0.08)
            .with_model("sonnet")
            .with_system_prompt(
                "You are a meticulous code reviewer. Inspect the diff against the \
                 base branch, flag correctness and style problems, and state \
                 clearly whether the work is complete.",
            ),
        AgentCapability::new("security", "Audits changes for security issues")
            .with_capabilities(&["security", "review"])
            .with_tool_scopes(&["read", "search"])
            .with_cost_estimate(0.08)
            .with_model("sonnet")
            .with_system_prompt(
                "You are a security auditor. Look for injection, authentication, \
                 secret handling, and unsafe input issues in the changes.",
            ),
        AgentCapability::new("documenter", "Writes and updates documentation")
            .with_capabilities(&["documentation"])
            .with_tool_scopes(&["read", "write", "search"])
            .with_cost_estimate(0.04)
            .with_model("haiku")
            .with_system_prompt(
                "You are a technical writer. Update documentation and comments to \
                 match the implemented changes. Do not alter behavior.",
            ),
        AgentCapability::new("tester", "Writes and runs tests")
            .with_capabilities(&["testing", "implementation"])
            .with_tool_scopes(&["read", "write", "exec", "search"])
            .with_cost_estimate(0.08)
            .with_model("sonnet")
            .with_system_prompt(
                "You are a test engineer. Add tests covering the change, run the \
                 project's test suite, and report failures honestly.",
            ),
        AgentCapability::new("performance", "Profiles and optimizes hot paths")
            .with_capabilities(&["performance", "analysis"])
            .with_tool_scopes(&["read", "write", "exec", "search"])
            .with_cost_estimate(0.10)
            .with_model("sonnet")
            .with_system_prompt(
                "You are a performance engineer. Identify hot paths affected by \
                 the change and optimize only where measurements justify it.",
            ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_agents_complete() {
        let names: Vec<_> = standard_agents().into_iter().map(|a| a.name).collect();
        assert_eq!(
            names,
            vec![
                "architect",
                "coder",
                "reviewer",
                "security",
                "documenter",
                "tester",
                "performance"
            ]
        );
    }

    #[test]
    fn test_standard_agents_have_prompts_and_estimates() {
        for agent in standard_agents() {
            assert!(!agent.system_prompt.is_empty(), "{} missing prompt", agent.name);
            assert!(agent.cost_estimate > 0.0, "{} missing estimate", agent.name);
        }
    }
}
