//! Sequential executor: dynamic agent hand-off.
//!
//! Drives the agent loop one turn at a time. Each agent sees all prior
//! turns and ends with a hand-off directive; the loop follows it until an
//! agent declares completion, a cycle is detected, or the iteration cap is
//! reached. No agent re-enters within a single run.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{ConversationLog, CostAccount, Plan, Progress, TaskStatus};
use crate::services::invoker::AgentInvoker;
use crate::services::RunContext;

/// Hard cap on agent turns in one sequential run.
pub const MAX_ITERATIONS: usize = 10;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// An agent declared the task complete.
    Complete,
    /// The next agent had already run in this loop.
    Cycle,
    /// The iteration cap was reached without completion.
    IterationLimit,
    /// Cancellation was observed before a turn.
    Cancelled,
}

/// Outcome of a sequential run.
#[derive(Debug, Clone)]
pub struct SequentialOutcome {
    pub stop: StopReason,
    /// Agents that ran, in order. Unique by construction.
    pub visited: Vec<String>,
}

impl SequentialOutcome {
    pub fn success(&self) -> bool {
        self.stop == StopReason::Complete
    }
}

/// Drives the dynamic hand-off loop.
pub struct SequentialExecutor {
    invoker: Arc<AgentInvoker>,
}

impl SequentialExecutor {
    pub fn new(invoker: Arc<AgentInvoker>) -> Self {
        Self { invoker }
    }

    #[instrument(skip_all, fields(task_id = %ctx.task_id))]
    pub async fn run(
        &self,
        plan: &Plan,
        ctx: &RunContext,
        log: &mut ConversationLog,
        cost: &CostAccount,
    ) -> DomainResult<SequentialOutcome> {
        let mut current = plan.agents.first().cloned();
        let mut visited: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let expected = plan.agents.len().max(1);

        let stop = loop {
            let Some(agent) = current.clone() else {
                break StopReason::Complete;
            };
            if visited.len() >= MAX_ITERATIONS {
                warn!(iterations = visited.len(), "iteration cap reached");
                break StopReason::IterationLimit;
            }
            if ctx.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            if !seen.insert(agent.clone()) {
                warn!(agent = %agent, "cycle detected: agent already ran");
                log.append(
                    "system",
                    format!("cycle detected: {agent} was routed to a second time"),
                    false,
                );
                break StopReason::Cycle;
            }

            self.report_progress(ctx, &agent, visited.len(), expected)
                .await;

            let turn = match self
                .invoker
                .run_turn(&agent, &ctx.description, log, cost, &ctx.workspace)
                .await
            {
                Ok(turn) => turn,
                Err(err) => {
                    log.append("system", format!("{agent} failed: {err}"), true);
                    return Err(err);
                }
            };
            visited.push(agent.clone());

            if turn.decision.is_terminal() {
                info!(agent = %agent, reason = turn.decision.reason(), "task declared complete");
                break StopReason::Complete;
            }
            current = turn.decision.next_agent().map(ToString::to_string);
        };

        Ok(SequentialOutcome { stop, visited })
    }

    /// Heartbeat: update the task document so `status` reflects the live
    /// agent and coarse progress. Best-effort; a heartbeat failure never
    /// fails the run.
    async fn report_progress(&self, ctx: &RunContext, agent: &str, done: usize, expected: usize) {
        #[allow(clippy::cast_possible_truncation)]
        let percent = ((done * 100 / expected.max(done + 1)).min(95)) as u8;
        let agent = agent.to_string();
        let result = ctx
            .store
            .update(&ctx.task_id, |task| {
                if task.status == TaskStatus::Running {
                    task.current_agent = Some(agent.clone());
                    task.progress = Progress {
                        percent,
                        eta_seconds: None,
                    };
                }
            })
            .await;
        if let Err(err) = result {
            warn!(error = %err, "progress heartbeat failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_success() {
        let done = SequentialOutcome {
            stop: StopReason::Complete,
            visited: vec!["coder".into()],
        };
        assert!(done.success());
        let cycled = SequentialOutcome {
            stop: StopReason::Cycle,
            visited: vec!["coder".into(), "architect".into()],
        };
        assert!(!cycled.success());
    }
}
