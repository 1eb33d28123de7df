//! Agent invoker: performs exactly one agent turn.
//!
//! A turn resolves the capability, builds the prompt (system prompt, task,
//! rendered history, peer list, hand-off instruction), checks the budget,
//! calls the model adapter with retry, parses the hand-off directive,
//! charges the cost account, and appends to the conversation log.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentTurn, ConversationLog, CostAccount, Decision, Workspace};
use crate::domain::ports::model_adapter::{ModelAdapter, ModelRequest};
use crate::services::registry::AgentRegistry;
use crate::services::retry::RetryPolicy;

/// The literal hand-off instruction appended to every agent prompt. This
/// is a stable contract with the model; the parser below matches it.
pub const HANDOFF_INSTRUCTION: &str = "\
When you are finished, end your reply with exactly two lines:\n\
NEXT: <agent-name> | COMPLETE\n\
REASON: <one-line rationale>";

/// Agent an unparseable or unknown hand-off is normalized to.
pub const DEFAULT_NEXT_AGENT: &str = "reviewer";

/// Approximate character budget for rendered history in a prompt.
const HISTORY_CHAR_BUDGET: usize = 24_000;

/// Runs one agent turn at a time against the model adapter.
pub struct AgentInvoker {
    registry: Arc<AgentRegistry>,
    model: Arc<dyn ModelAdapter>,
    retry: RetryPolicy,
    turn_timeout: std::time::Duration,
}

impl AgentInvoker {
    pub fn new(
        registry: Arc<AgentRegistry>,
        model: Arc<dyn ModelAdapter>,
        retry: RetryPolicy,
        turn_timeout: std::time::Duration,
    ) -> Self {
        Self {
            registry,
            model,
            retry,
            turn_timeout,
        }
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    /// Run one turn for `agent_name`.
    ///
    /// The budget pre-check happens before the model call; a refused turn
    /// costs nothing. The charge happens after, and crossing the ceiling
    /// fails the turn even though the response is recorded.
    #[instrument(skip_all, fields(agent = agent_name))]
    pub async fn run_turn(
        &self,
        agent_name: &str,
        task_description: &str,
        log: &mut ConversationLog,
        cost: &CostAccount,
        workspace: &Workspace,
    ) -> DomainResult<AgentTurn> {
        let capability = self.registry.get(agent_name)?;

        if !cost.can_afford(capability.cost_estimate).await {
            return Err(cost.refusal(capability.cost_estimate).await);
        }

        let user_prompt = self.build_user_prompt(agent_name, task_description, log, workspace);
        let request = ModelRequest {
            system_prompt: capability.system_prompt.clone(),
            user_prompt: user_prompt.clone(),
            tool_scopes: capability.tool_scopes.clone(),
            model: capability.model.clone(),
            workdir: Some(workspace.workdir.clone()),
            container: workspace.container.clone(),
            timeout: self.turn_timeout,
        };

        let started_at = Utc::now();
        let response = self
            .retry
            .execute(|| {
                let request = request.clone();
                let model = Arc::clone(&self.model);
                async move { model.invoke(request).await }
            })
            .await?;
        let finished_at = Utc::now();

        let known = self.registry.names();
        let (decision, warning) = parse_decision(&response.text, &known);
        if let Some(message) = warning {
            warn!(agent = agent_name, "{message}");
            log.append("system", message, false);
        }

        let actual_cost = response.cost_usd.unwrap_or(capability.cost_estimate);
        let charge = cost
            .charge(
                agent_name,
                actual_cost,
                response.input_tokens,
                response.output_tokens,
                response.duration_ms,
            )
            .await;

        let turn = AgentTurn {
            speaker: agent_name.to_string(),
            prompt: user_prompt,
            response: response.text,
            decision,
            cost_usd: actual_cost,
            duration_ms: response.duration_ms,
            started_at,
            finished_at,
        };
        log.append_turn(&turn);
        debug!(
            agent = agent_name,
            cost_usd = actual_cost,
            duration_ms = response.duration_ms,
            terminal = turn.decision.is_terminal(),
            "agent turn finished"
        );

        // A charge that crossed the ceiling fails the turn after the fact;
        // the response stays in the log and partial work is preserved.
        charge?;
        Ok(turn)
    }

    fn build_user_prompt(
        &self,
        agent_name: &str,
        task_description: &str,
        log: &ConversationLog,
        workspace: &Workspace,
    ) -> String {
        let peers = self
            .registry
            .list_all()
            .iter()
            .filter(|a| a.name != agent_name)
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n");
        let history = log.render_for_agent(agent_name, HISTORY_CHAR_BUDGET);

        format!(
            "## Task\n{task}\n\n\
             ## Working branch\n{branch}\n\n\
             ## Conversation so far\n{history}\n\n\
             ## Available peers\n{peers}\n\n\
             ## Hand-off\n{instruction}",
            task = task_description,
            branch = workspace.branch,
            history = history,
            peers = peers,
            instruction = HANDOFF_INSTRUCTION,
        )
    }
}

/// Parse the `NEXT:`/`REASON:` tail of a response.
///
/// Matching is case-insensitive on the line prefixes. `NEXT: COMPLETE`
/// is terminal. An unknown agent name is normalized to [`DEFAULT_NEXT_AGENT`]
/// and a warning is returned. A missing directive defaults to a non-terminal
/// hand-off to [`DEFAULT_NEXT_AGENT`].
pub fn parse_decision(text: &str, known_agents: &[String]) -> (Decision, Option<String>) {
    let mut next: Option<String> = None;
    let mut reason: Option<String> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(value) = strip_prefix_ci(trimmed, "NEXT:") {
            let value = value.trim();
            if !value.is_empty() {
                next = Some(value.to_string());
            }
        } else if let Some(value) = strip_prefix_ci(trimmed, "REASON:") {
            let value = value.trim();
            if !value.is_empty() {
                reason = Some(value.to_string());
            }
        }
    }

    match next {
        Some(value) if value.eq_ignore_ascii_case("complete") => (
            Decision::Complete {
                reason: reason.unwrap_or_else(|| "complete".to_string()),
            },
            None,
        ),
        Some(value) => {
            let normalized = value.to_lowercase();
            if known_agents.iter().any(|a| *a == normalized) {
                (
                    Decision::Handoff {
                        next: normalized,
                        reason: reason.unwrap_or_else(|| "handed off".to_string()),
                    },
                    None,
                )
            } else {
                (
                    Decision::Handoff {
                        next: DEFAULT_NEXT_AGENT.to_string(),
                        reason: reason.unwrap_or_else(|| "handed off".to_string()),
                    },
                    Some(format!(
                        "unknown next agent '{value}', routing to {DEFAULT_NEXT_AGENT}"
                    )),
                )
            }
        }
        None => (
            Decision::Handoff {
                next: DEFAULT_NEXT_AGENT.to_string(),
                reason: "no explicit decision found".to_string(),
            },
            None,
        ),
    }
}

/// ASCII case-insensitive prefix strip.
fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    if line.len() >= prefix.len()
        && line.is_char_boundary(prefix.len())
        && line[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["architect".into(), "coder".into(), "reviewer".into()]
    }

    #[test]
    fn test_parse_complete() {
        let (decision, warning) =
            parse_decision("All done.\nNEXT: COMPLETE\nREASON: tests pass", &known());
        assert!(decision.is_terminal());
        assert_eq!(decision.reason(), "tests pass");
        assert!(warning.is_none());
    }

    #[test]
    fn test_parse_handoff() {
        let (decision, warning) =
            parse_decision("Patch written.\nNEXT: reviewer\nREASON: needs review", &known());
        assert_eq!(decision.next_agent(), Some("reviewer"));
        assert!(warning.is_none());
    }

    #[test]
    fn test_parse_case_insensitive() {
        let (decision, _) = parse_decision("next: Coder\nreason: go", &known());
        assert_eq!(decision.next_agent(), Some("coder"));
        let (decision, _) = parse_decision("NEXT: complete\nREASON: ok", &known());
        assert!(decision.is_terminal());
    }

    #[test]
    fn test_parse_unknown_agent_normalizes_to_reviewer() {
        let (decision, warning) = parse_decision("NEXT: wizard\nREASON: magic", &known());
        assert_eq!(decision.next_agent(), Some(DEFAULT_NEXT_AGENT));
        assert!(warning.unwrap().contains("wizard"));
    }

    #[test]
    fn test_parse_missing_directive_defaults() {
        let (decision, warning) = parse_decision("I did some work.", &known());
        assert_eq!(decision.next_agent(), Some(DEFAULT_NEXT_AGENT));
        assert_eq!(decision.reason(), "no explicit decision found");
        assert!(warning.is_none());
    }

    #[test]
    fn test_parse_directive_anywhere_in_tail() {
        let text = "Summary first.\n\nNEXT: architect\nREASON: re-plan needed\n";
        let (decision, _) = parse_decision(text, &known());
        assert_eq!(decision.next_agent(), Some("architect"));
        assert_eq!(decision.reason(), "re-plan needed");
    }
}
