//! Task planner.
//!
//! Analyzes a task once at the start with a cheap planning model and
//! produces a [`Plan`]: classification, complexity, agent sequence, and a
//! parallelization verdict. Planner output is untrusted input: tolerant
//! JSON extraction, schema validation, a heuristic guard, and a fallback
//! plan when anything is unusable.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, instrument, warn};

use crate::domain::models::{Complexity, ComplexityLabel, Part, Plan, TaskKind};
use crate::domain::ports::model_adapter::{ModelAdapter, ModelRequest};
use crate::services::extract_json_from_response;
use crate::services::retry::RetryPolicy;

/// Minimum complexity score before parallelization is considered.
const MIN_PARALLEL_COMPLEXITY: u8 = 3;

/// Planner prompt deadline; planning is a single cheap call.
const PLANNING_TIMEOUT: Duration = Duration::from_secs(60);

/// Analyzes tasks into plans.
pub struct Planner {
    model: Arc<dyn ModelAdapter>,
    planner_model: String,
    retry: RetryPolicy,
}

impl Planner {
    pub fn new(model: Arc<dyn ModelAdapter>, planner_model: impl Into<String>) -> Self {
        Self {
            model,
            planner_model: planner_model.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// Produce a plan for `description`. Never fails: unusable planner
    /// output falls back to the default plan with a warning.
    #[instrument(skip_all)]
    pub async fn plan(&self, description: &str, available_agents: &[String]) -> Plan {
        let prompt = build_planning_prompt(description, available_agents);
        let request = ModelRequest {
            system_prompt: String::new(),
            user_prompt: prompt,
            tool_scopes: Vec::new(),
            model: self.planner_model.clone(),
            workdir: None,
            container: None,
            timeout: PLANNING_TIMEOUT,
        };

        let response = self
            .retry
            .execute(|| {
                let request = request.clone();
                let model = Arc::clone(&self.model);
                async move { model.invoke(request).await }
            })
            .await;

        let mut plan = match response {
            Ok(response) => match parse_plan(&response.text) {
                Some(plan) => plan,
                None => {
                    warn!("planner returned unparseable output, using fallback plan");
                    Plan::fallback()
                }
            },
            Err(err) => {
                warn!(error = %err, "planner call failed, using fallback plan");
                Plan::fallback()
            }
        };

        sanitize_agents(&mut plan, available_agents);
        apply_parallel_guard(&mut plan);
        info!(
            kind = ?plan.task_kind,
            complexity = plan.complexity.score,
            agents = ?plan.agents,
            parallel = plan.parallelizable,
            parts = plan.parts.len(),
            "plan ready"
        );
        plan
    }
}

/// The strict planning prompt. The JSON field names here are a contract
/// with [`parse_plan`].
fn build_planning_prompt(description: &str, available_agents: &[String]) -> String {
    format!(
        r#"You are a planning assistant for a multi-agent coding system.

## Task
{description}

## Available agents
{agents}

## Instructions
Classify the task, estimate its complexity, choose the agent sequence, and
decide whether the work can be split into independent parallel parts. Parts
must touch disjoint files.

## Required output format (JSON)
Respond with a JSON object:
```json
{{
  "taskType": "implementation|analysis|documentation|mixed",
  "agents": ["agent names in execution order"],
  "reasoning": "one short paragraph",
  "complexity": {{ "score": 1, "label": "simple|medium|complex" }},
  "parallel": {{
    "canParallelize": false,
    "parts": [
      {{
        "description": "what this part does",
        "files": ["paths this part may touch"],
        "agent": "agent name",
        "dependsOn": [0]
      }}
    ]
  }}
}}
```

IMPORTANT: Output ONLY the JSON object, no other text."#,
        description = description,
        agents = available_agents.join(", "),
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    task_type: String,
    #[serde(default)]
    agents: Vec<String>,
    #[serde(default)]
    reasoning: String,
    complexity: RawComplexity,
    parallel: Option<RawParallel>,
}

#[derive(Debug, Deserialize)]
struct RawComplexity {
    score: u8,
    #[serde(default)]
    label: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParallel {
    can_parallelize: bool,
    #[serde(default)]
    parts: Vec<RawPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPart {
    description: String,
    #[serde(default)]
    files: Vec<String>,
    agent: Option<String>,
    #[serde(default)]
    depends_on: Vec<usize>,
}

/// Parse planner output into a [`Plan`]. Returns `None` when the JSON is
/// missing or fails schema validation; no attempt is made to reconcile
/// partial JSON.
pub(crate) fn parse_plan(text: &str) -> Option<Plan> {
    let json = extract_json_from_response(text);
    let raw: RawPlan = serde_json::from_str(&json).ok()?;

    let complexity = if let Some(label) = ComplexityLabel::from_str(&raw.complexity.label) {
        Complexity {
            score: raw.complexity.score.clamp(1, 10),
            label,
        }
    } else {
        Complexity::new(raw.complexity.score)
    };

    let (parallelizable, parts) = match raw.parallel {
        Some(parallel) => {
            let parts = parallel
                .parts
                .into_iter()
                .map(|p| Part {
                    description: p.description,
                    assigned_files: p.files,
                    agent: p.agent.unwrap_or_else(|| "coder".to_string()),
                    depends_on: p.depends_on,
                })
                .collect();
            (parallel.can_parallelize, parts)
        }
        None => (false, Vec::new()),
    };

    Some(Plan {
        task_kind: TaskKind::from_str(&raw.task_type).unwrap_or_default(),
        complexity,
        agents: raw.agents,
        reasoning: raw.reasoning,
        parallelizable,
        parts,
    })
}

/// Drop unknown agent names; fall back to the default sequence when the
/// list becomes empty.
fn sanitize_agents(plan: &mut Plan, available: &[String]) {
    let before = plan.agents.len();
    plan.agents.retain(|a| available.iter().any(|k| k == a));
    if plan.agents.len() < before {
        warn!(
            dropped = before - plan.agents.len(),
            "plan contained unknown agents"
        );
    }
    if plan.agents.is_empty() {
        plan.agents = Plan::fallback().agents;
    }
    for part in &mut plan.parts {
        if !available.iter().any(|k| k == &part.agent) {
            warn!(agent = %part.agent, "unknown part agent, assigning coder");
            part.agent = "coder".to_string();
        }
    }
}

/// The heuristic guard applied after parsing: parallelize only when the
/// task is complex enough and the decomposition is structurally sound.
fn apply_parallel_guard(plan: &mut Plan) {
    if !plan.parallelizable {
        plan.parts.clear();
        return;
    }
    let reason = if plan.complexity.score < MIN_PARALLEL_COMPLEXITY {
        Some(format!(
            "complexity {} below parallel threshold {MIN_PARALLEL_COMPLEXITY}",
            plan.complexity.score
        ))
    } else {
        plan.validate_parallel().err()
    };
    if let Some(reason) = reason {
        warn!(%reason, "forcing sequential execution");
        plan.parallelizable = false;
        plan.parts.clear();
        if !plan.reasoning.is_empty() {
            plan.reasoning.push_str("; ");
        }
        plan.reasoning.push_str(&format!("forced sequential: {reason}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available() -> Vec<String> {
        vec![
            "architect".into(),
            "coder".into(),
            "reviewer".into(),
            "tester".into(),
        ]
    }

    fn parsed(text: &str) -> Plan {
        let mut plan = parse_plan(text).unwrap();
        sanitize_agents(&mut plan, &available());
        apply_parallel_guard(&mut plan);
        plan
    }

    const SEQUENTIAL_JSON: &str = r#"{
        "taskType": "implementation",
        "agents": ["coder", "reviewer"],
        "reasoning": "small fix",
        "complexity": { "score": 2, "label": "simple" },
        "parallel": { "canParallelize": false, "parts": [] }
    }"#;

    #[test]
    fn test_parse_sequential_plan() {
        let plan = parsed(SEQUENTIAL_JSON);
        assert_eq!(plan.agents, vec!["coder", "reviewer"]);
        assert_eq!(plan.task_kind, TaskKind::Implementation);
        assert_eq!(plan.complexity.label, ComplexityLabel::Simple);
        assert!(!plan.parallelizable);
    }

    #[test]
    fn test_parse_plan_in_code_fence() {
        let fenced = format!("Here is my plan:\n```json\n{SEQUENTIAL_JSON}\n```");
        let plan = parsed(&fenced);
        assert_eq!(plan.agents, vec!["coder", "reviewer"]);
    }

    #[test]
    fn test_malformed_json_returns_none() {
        assert!(parse_plan("not a plan at all").is_none());
        assert!(parse_plan(r#"{"taskType": "implementation""#).is_none());
    }

    #[test]
    fn test_unknown_agents_dropped_with_fallback() {
        let json = r#"{
            "taskType": "implementation",
            "agents": ["wizard", "sorcerer"],
            "complexity": { "score": 4, "label": "medium" },
            "parallel": { "canParallelize": false, "parts": [] }
        }"#;
        let plan = parsed(json);
        assert_eq!(plan.agents, vec!["architect", "coder", "reviewer"]);
    }

    #[test]
    fn test_parallel_plan_accepted() {
        let json = r#"{
            "taskType": "implementation",
            "agents": ["coder"],
            "complexity": { "score": 6, "label": "medium" },
            "parallel": { "canParallelize": true, "parts": [
                { "description": "users endpoint", "files": ["src/users.rs"], "agent": "coder", "dependsOn": [] },
                { "description": "posts endpoint", "files": ["src/posts.rs"], "agent": "coder", "dependsOn": [] },
                { "description": "comments endpoint", "files": ["src/comments.rs"], "agent": "coder", "dependsOn": [] }
            ] }
        }"#;
        let plan = parsed(json);
        assert!(plan.parallelizable);
        assert_eq!(plan.parts.len(), 3);
    }

    #[test]
    fn test_guard_rejects_low_complexity_parallel() {
        let json = r#"{
            "taskType": "implementation",
            "agents": ["coder"],
            "complexity": { "score": 2, "label": "simple" },
            "parallel": { "canParallelize": true, "parts": [
                { "description": "a", "files": ["a.rs"], "agent": "coder", "dependsOn": [] },
                { "description": "b", "files": ["b.rs"], "agent": "coder", "dependsOn": [] }
            ] }
        }"#;
        let plan = parsed(json);
        assert!(!plan.parallelizable);
        assert!(plan.parts.is_empty());
        assert!(plan.reasoning.contains("forced sequential"));
    }

    #[test]
    fn test_guard_rejects_overlapping_files() {
        let json = r#"{
            "taskType": "implementation",
            "agents": ["coder"],
            "complexity": { "score": 7, "label": "complex" },
            "parallel": { "canParallelize": true, "parts": [
                { "description": "a", "files": ["shared.rs"], "agent": "coder", "dependsOn": [] },
                { "description": "b", "files": ["shared.rs"], "agent": "coder", "dependsOn": [] }
            ] }
        }"#;
        let plan = parsed(json);
        assert!(!plan.parallelizable);
    }

    #[test]
    fn test_guard_rejects_too_many_parts() {
        let parts: Vec<String> = (0..6)
            .map(|i| {
                format!(
                    r#"{{ "description": "p{i}", "files": ["f{i}.rs"], "agent": "coder", "dependsOn": [] }}"#
                )
            })
            .collect();
        let json = format!(
            r#"{{
                "taskType": "implementation",
                "agents": ["coder"],
                "complexity": {{ "score": 8, "label": "complex" }},
                "parallel": {{ "canParallelize": true, "parts": [{}] }}
            }}"#,
            parts.join(",")
        );
        let plan = parsed(&json);
        assert!(!plan.parallelizable);
    }

    #[test]
    fn test_unknown_part_agent_reassigned_to_coder() {
        let json = r#"{
            "taskType": "implementation",
            "agents": ["coder"],
            "complexity": { "score": 6, "label": "medium" },
            "parallel": { "canParallelize": true, "parts": [
                { "description": "a", "files": ["a.rs"], "agent": "wizard", "dependsOn": [] },
                { "description": "b", "files": ["b.rs"], "agent": "coder", "dependsOn": [] }
            ] }
        }"#;
        let plan = parsed(json);
        assert_eq!(plan.parts[0].agent, "coder");
    }
}
