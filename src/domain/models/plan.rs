//! Plan domain model.
//!
//! A plan is produced once per task by the planner: a classification, a
//! complexity estimate, the agent sequence, and a parallelization verdict
//! with its subtask parts. Planner output is untrusted; [`Plan::validate_parallel`]
//! is the gate every parallel verdict must pass.

use serde::{Deserialize, Serialize};

/// What kind of work a task is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Implementation,
    Analysis,
    Documentation,
    Mixed,
}

impl Default for TaskKind {
    fn default() -> Self {
        Self::Implementation
    }
}

impl TaskKind {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "implementation" => Some(Self::Implementation),
            "analysis" => Some(Self::Analysis),
            "documentation" => Some(Self::Documentation),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// Complexity label, derived from the numeric score when absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLabel {
    Simple,
    Medium,
    Complex,
}

impl ComplexityLabel {
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "simple" | "trivial" => Some(Self::Simple),
            "medium" | "moderate" => Some(Self::Medium),
            "complex" | "very_complex" => Some(Self::Complex),
            _ => None,
        }
    }

    /// Label implied by a 1-10 score.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Self::Simple,
            4..=6 => Self::Medium,
            _ => Self::Complex,
        }
    }
}

/// Complexity estimate: 1-10 score plus label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Complexity {
    pub score: u8,
    pub label: ComplexityLabel,
}

impl Complexity {
    pub fn new(score: u8) -> Self {
        let score = score.clamp(1, 10);
        Self {
            score,
            label: ComplexityLabel::from_score(score),
        }
    }
}

impl Default for Complexity {
    fn default() -> Self {
        Self {
            score: 5,
            label: ComplexityLabel::Medium,
        }
    }
}

/// One independent part of a parallelizable task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    pub description: String,
    #[serde(default)]
    pub assigned_files: Vec<String>,
    /// Agent that executes this part.
    pub agent: String,
    /// 0-based indices of parts that must complete first.
    #[serde(default)]
    pub depends_on: Vec<usize>,
}

/// Bounds on part counts for a parallel plan.
pub const MIN_PARTS: usize = 2;
pub const MAX_PARTS: usize = 5;

/// The planner's structured output for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub task_kind: TaskKind,
    pub complexity: Complexity,
    /// Ordered agent sequence; the first entry starts the sequential loop.
    pub agents: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    pub parallelizable: bool,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Plan {
    /// The default plan used when planner output is unusable.
    pub fn fallback() -> Self {
        Self {
            task_kind: TaskKind::Implementation,
            complexity: Complexity::default(),
            agents: vec![
                "architect".to_string(),
                "coder".to_string(),
                "reviewer".to_string(),
            ],
            reasoning: "fallback plan".to_string(),
            parallelizable: false,
            parts: Vec::new(),
        }
    }

    /// Validate the parallel verdict: 2-5 parts, pairwise-disjoint file
    /// sets, acyclic dependencies with in-range indices.
    ///
    /// Returns the reason the verdict is invalid, if any.
    pub fn validate_parallel(&self) -> Result<(), String> {
        if !self.parallelizable {
            return Ok(());
        }
        let n = self.parts.len();
        if !(MIN_PARTS..=MAX_PARTS).contains(&n) {
            return Err(format!("part count {n} outside {MIN_PARTS}..={MAX_PARTS}"));
        }
        let mut seen = std::collections::HashSet::new();
        for part in &self.parts {
            for file in &part.assigned_files {
                if !seen.insert(file.as_str()) {
                    return Err(format!("file '{file}' assigned to more than one part"));
                }
            }
        }
        for part in &self.parts {
            if part.depends_on.iter().any(|&d| d >= n) {
                return Err(format!(
                    "part '{}' depends on out-of-range index",
                    part.description
                ));
            }
        }
        if self.dependency_waves().is_none() {
            return Err("part dependency graph has a cycle".to_string());
        }
        Ok(())
    }

    /// Group part indices into dependency waves: each wave only depends on
    /// parts in earlier waves. Returns `None` when the graph is cyclic.
    ///
    /// Wave order is an execution aid only; merges always run in
    /// part-index order.
    pub fn dependency_waves(&self) -> Option<Vec<Vec<usize>>> {
        let n = self.parts.len();
        let mut done = vec![false; n];
        let mut waves = Vec::new();
        let mut remaining = n;
        while remaining > 0 {
            let mut wave: Vec<usize> = (0..n)
                .filter(|&i| !done[i] && self.parts[i].depends_on.iter().all(|&d| done[d]))
                .collect();
            if wave.is_empty() {
                return None;
            }
            wave.sort_unstable();
            for &i in &wave {
                done[i] = true;
            }
            remaining -= wave.len();
            waves.push(wave);
        }
        Some(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn part(desc: &str, files: &[&str], deps: &[usize]) -> Part {
        Part {
            description: desc.to_string(),
            assigned_files: files.iter().map(ToString::to_string).collect(),
            agent: "coder".to_string(),
            depends_on: deps.to_vec(),
        }
    }

    fn parallel_plan(parts: Vec<Part>) -> Plan {
        Plan {
            parallelizable: true,
            parts,
            ..Plan::fallback()
        }
    }

    #[test]
    fn test_fallback_plan() {
        let plan = Plan::fallback();
        assert_eq!(plan.agents, vec!["architect", "coder", "reviewer"]);
        assert!(!plan.parallelizable);
    }

    #[test]
    fn test_validate_accepts_disjoint_parts() {
        let plan = parallel_plan(vec![
            part("users", &["src/users.rs"], &[]),
            part("posts", &["src/posts.rs"], &[]),
            part("comments", &["src/comments.rs"], &[0]),
        ]);
        assert!(plan.validate_parallel().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_part() {
        let plan = parallel_plan(vec![part("solo", &["a.rs"], &[])]);
        assert!(plan.validate_parallel().is_err());
    }

    #[test]
    fn test_validate_rejects_overlapping_files() {
        let plan = parallel_plan(vec![
            part("a", &["shared.rs"], &[]),
            part("b", &["shared.rs"], &[]),
        ]);
        let err = plan.validate_parallel().unwrap_err();
        assert!(err.contains("shared.rs"));
    }

    #[test]
    fn test_validate_rejects_cycle() {
        let plan = parallel_plan(vec![
            part("a", &["a.rs"], &[1]),
            part("b", &["b.rs"], &[0]),
        ]);
        let err = plan.validate_parallel().unwrap_err();
        assert!(err.contains("cycle"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_dependency() {
        let plan = parallel_plan(vec![
            part("a", &["a.rs"], &[7]),
            part("b", &["b.rs"], &[]),
        ]);
        assert!(plan.validate_parallel().is_err());
    }

    #[test]
    fn test_dependency_waves_topological() {
        let plan = parallel_plan(vec![
            part("a", &[], &[]),
            part("b", &[], &[0]),
            part("c", &[], &[0]),
            part("d", &[], &[1, 2]),
        ]);
        let waves = plan.dependency_waves().unwrap();
        assert_eq!(waves, vec![vec![0], vec![1, 2], vec![3]]);
    }

    #[test]
    fn test_complexity_labels() {
        assert_eq!(Complexity::new(2).label, ComplexityLabel::Simple);
        assert_eq!(Complexity::new(5).label, ComplexityLabel::Medium);
        assert_eq!(Complexity::new(9).label, ComplexityLabel::Complex);
        assert_eq!(Complexity::new(0).score, 1);
        assert_eq!(Complexity::new(99).score, 10);
    }

    proptest! {
        // A valid parallel plan keeps every file in exactly one part.
        #[test]
        fn prop_disjoint_files_always_validate(n in 2usize..=5) {
            let parts: Vec<Part> = (0..n)
                .map(|i| part(&format!("p{i}"), &[&format!("f{i}.rs")], &[]))
                .collect();
            let plan = parallel_plan(parts);
            prop_assert!(plan.validate_parallel().is_ok());
        }
    }
}
