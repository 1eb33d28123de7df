//! Cost accounting with a hard per-task ceiling.
//!
//! One [`CostAccount`] is shared by every agent of a task, including all
//! parts of a parallel run (clones share the same totals). The ceiling is
//! enforced cooperatively: callers check [`CostAccount::can_afford`] before
//! dispatching a turn, and [`CostAccount::charge`] refuses to cross the
//! ceiling.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::errors::{DomainError, DomainResult};

/// Pricing per million tokens for a model tier.
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    /// Cost per million input tokens (USD).
    pub input: f64,
    /// Cost per million output tokens (USD).
    pub output: f64,
}

/// Known model pricing table (USD per million tokens).
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("opus", ModelPricing { input: 15.0, output: 75.0 }),
    ("sonnet", ModelPricing { input: 3.0, output: 15.0 }),
    ("haiku", ModelPricing { input: 0.80, output: 4.0 }),
];

/// Get pricing for a model by name or alias substring match.
pub fn model_pricing(model: &str) -> Option<ModelPricing> {
    let model_lower = model.to_lowercase();
    PRICING_TABLE
        .iter()
        .find(|(name, _)| model_lower.contains(name))
        .map(|(_, pricing)| *pricing)
}

/// Estimate the dollar cost of a turn from its token counts.
pub fn estimate_turn_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    let pricing = model_pricing(model)?;
    #[allow(clippy::cast_precision_loss)]
    let cost = (input_tokens as f64 * pricing.input + output_tokens as f64 * pricing.output)
        / 1_000_000.0;
    Some(cost)
}

/// Running totals for one task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostTotals {
    pub spent_usd: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub elapsed_ms: u64,
    /// Dollars per agent name. BTreeMap keeps serialization deterministic.
    pub by_agent: BTreeMap<String, f64>,
}

/// Shared, ceiling-enforcing cost account. Cloning shares the totals.
#[derive(Debug, Clone)]
pub struct CostAccount {
    ceiling_usd: f64,
    inner: Arc<RwLock<CostTotals>>,
}

impl CostAccount {
    pub fn new(ceiling_usd: f64) -> Self {
        Self {
            ceiling_usd,
            inner: Arc::new(RwLock::new(CostTotals::default())),
        }
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling_usd
    }

    /// Whether a turn with the given estimate fits under the ceiling.
    pub async fn can_afford(&self, estimate_usd: f64) -> bool {
        let totals = self.inner.read().await;
        totals.spent_usd + estimate_usd <= self.ceiling_usd
    }

    /// The [`DomainError::BudgetExceeded`] this account would produce for a
    /// refused turn, capturing current totals.
    pub async fn refusal(&self, estimate_usd: f64) -> DomainError {
        let totals = self.inner.read().await;
        DomainError::BudgetExceeded {
            spent: totals.spent_usd,
            estimate: estimate_usd,
            ceiling: self.ceiling_usd,
        }
    }

    /// Record actual spend for one turn. The spend is recorded even when it
    /// crosses the ceiling (the turn already happened); crossing returns
    /// `BudgetExceeded` so the caller fails the task while preserving work.
    pub async fn charge(
        &self,
        agent: &str,
        actual_usd: f64,
        input_tokens: u64,
        output_tokens: u64,
        duration_ms: u64,
    ) -> DomainResult<()> {
        let mut totals = self.inner.write().await;
        totals.spent_usd += actual_usd;
        totals.input_tokens += input_tokens;
        totals.output_tokens += output_tokens;
        totals.elapsed_ms += duration_ms;
        *totals.by_agent.entry(agent.to_string()).or_default() += actual_usd;
        if totals.spent_usd > self.ceiling_usd {
            return Err(DomainError::BudgetExceeded {
                spent: totals.spent_usd,
                estimate: 0.0,
                ceiling: self.ceiling_usd,
            });
        }
        Ok(())
    }

    pub async fn totals(&self) -> CostTotals {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pricing_alias_match() {
        assert!((model_pricing("sonnet").unwrap().input - 3.0).abs() < f64::EPSILON);
        assert!((model_pricing("claude-opus-4-6-20250616").unwrap().output - 75.0).abs() < f64::EPSILON);
        assert!(model_pricing("unknown-model").is_none());
    }

    #[test]
    fn test_estimate_turn_cost() {
        // 1M input tokens on sonnet = $3
        let cost = estimate_turn_cost("sonnet", 1_000_000, 0).unwrap();
        assert!((cost - 3.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_can_afford_respects_ceiling() {
        let account = CostAccount::new(0.10);
        account.charge("coder", 0.05, 1000, 500, 200).await.unwrap();
        assert!(account.can_afford(0.04).await);
        // $0.05 spent, $0.08 projected, $0.10 ceiling: refused.
        assert!(!account.can_afford(0.08).await);
    }

    #[tokio::test]
    async fn test_charge_crossing_ceiling_fails_but_records() {
        let account = CostAccount::new(0.10);
        let result = account.charge("coder", 0.15, 0, 0, 0).await;
        assert!(matches!(result, Err(DomainError::BudgetExceeded { .. })));
        let totals = account.totals().await;
        assert!((totals.spent_usd - 0.15).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_totals_equal_sum_of_charges() {
        let account = CostAccount::new(10.0);
        account.charge("architect", 0.10, 100, 50, 10).await.unwrap();
        account.charge("coder", 0.20, 200, 100, 20).await.unwrap();
        account.charge("coder", 0.05, 50, 25, 5).await.unwrap();
        let totals = account.totals().await;
        assert!((totals.spent_usd - 0.35).abs() < 1e-9);
        assert_eq!(totals.input_tokens, 350);
        assert_eq!(totals.output_tokens, 175);
        assert!((totals.by_agent["coder"] - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_clones_share_totals() {
        let account = CostAccount::new(1.0);
        let part_slice = account.clone();
        part_slice.charge("coder", 0.9, 0, 0, 0).await.unwrap();
        // The parent sees the part's spend: cooperative global ceiling.
        assert!(!account.can_afford(0.2).await);
    }
}
