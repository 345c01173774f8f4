//! Budget-constrained adoption of optional modules.
//!
//! A single greedy pass over candidates ranked by value density. It never
//! back-tracks, so the result is a density-ranked approximation rather
//! than the optimal knapsack.

use serde::Serialize;
use std::cmp::Ordering;

const SCORE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnapsackCandidate {
    pub id: String,
    pub tokens: usize,
    /// Ordering weight; scores are divided by `max(1, prior_peso)`.
    pub prior_peso: f64,
    pub vpt_mean: f64,
    pub vpt_ci: Option<f64>,
}

impl KnapsackCandidate {
    pub fn new(id: impl Into<String>, tokens: usize, prior_peso: f64, vpt_mean: f64) -> Self {
        Self {
            id: id.into(),
            tokens,
            prior_peso,
            vpt_mean,
            vpt_ci: None,
        }
    }

    pub fn score(&self) -> f64 {
        self.vpt_mean / self.prior_peso.max(1.0)
    }

    fn rank(&self, other: &Self) -> Ordering {
        let (a, b) = (self.score(), other.score());
        if (a - b).abs() > SCORE_TOLERANCE {
            return b.partial_cmp(&a).unwrap_or(Ordering::Equal);
        }
        self.tokens
            .cmp(&other.tokens)
            .then_with(|| other.vpt_mean.partial_cmp(&self.vpt_mean).unwrap_or(Ordering::Equal))
            .then_with(|| self.id.cmp(&other.id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KnapsackResult {
    pub adopted: Vec<String>,
    /// `Σ vpt_mean * tokens` over adopted items, rounded to 4 decimals.
    pub marginal_gain: f64,
    pub tokens_used: usize,
}

pub fn solve(budget: usize, candidates: &[KnapsackCandidate]) -> KnapsackResult {
    let mut ranked: Vec<&KnapsackCandidate> = candidates
        .iter()
        .filter(|c| c.tokens > 0 && c.vpt_mean.is_finite())
        .collect();
    ranked.sort_by(|a, b| a.rank(b));

    let mut result = KnapsackResult::default();
    let mut gain = 0.0;
    for candidate in ranked {
        let remaining = budget - result.tokens_used;
        if remaining == 0 {
            break;
        }
        if candidate.tokens > remaining {
            continue;
        }
        result.tokens_used += candidate.tokens;
        gain += candidate.vpt_mean * candidate.tokens as f64;
        result.adopted.push(candidate.id.clone());
    }
    result.marginal_gain = (gain * 10_000.0).round() / 10_000.0;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> Vec<KnapsackCandidate> {
        vec![
            KnapsackCandidate::new("A", 300, 1.0, 0.008),
            KnapsackCandidate::new("B", 500, 3.0, 0.01),
            KnapsackCandidate::new("C", 200, 2.0, 0.006),
        ]
    }

    #[test]
    fn adopts_by_density_then_fit() {
        let result = solve(600, &scenario());
        assert_eq!(result.adopted, vec!["A", "C"]);
        assert_eq!(result.tokens_used, 500);
        assert!((result.marginal_gain - 3.6).abs() < 1e-9);
    }

    #[test]
    fn zero_budget_adopts_nothing() {
        let result = solve(0, &scenario());
        assert!(result.adopted.is_empty());
        assert_eq!(result.marginal_gain, 0.0);
    }

    #[test]
    fn zero_token_candidates_are_ignored() {
        let result = solve(100, &[KnapsackCandidate::new("Z", 0, 1.0, 9.0)]);
        assert!(result.adopted.is_empty());
    }

    #[test]
    fn ties_prefer_cheaper_then_id() {
        let candidates = vec![
            KnapsackCandidate::new("B", 100, 1.0, 0.01),
            KnapsackCandidate::new("A", 100, 1.0, 0.01),
            KnapsackCandidate::new("C", 50, 1.0, 0.01),
        ];
        assert_eq!(solve(150, &candidates).adopted, vec!["C", "A"]);
    }

    #[test]
    fn never_exceeds_budget() {
        let candidates: Vec<KnapsackCandidate> = (1..=12)
            .map(|i| KnapsackCandidate::new(format!("M{i}"), i * 37, (i % 4) as f64, 0.001 * i as f64))
            .collect();
        for budget in [0, 1, 36, 100, 250, 600, 5000] {
            assert!(solve(budget, &candidates).tokens_used <= budget);
        }
    }

    #[test]
    fn dropping_a_rejected_candidate_does_not_raise_value() {
        let candidates = scenario();
        let full = solve(600, &candidates);
        for rejected in candidates.iter().filter(|c| !full.adopted.contains(&c.id)) {
            let reduced: Vec<KnapsackCandidate> =
                candidates.iter().filter(|c| c.id != rejected.id).cloned().collect();
            assert!(solve(600, &reduced).marginal_gain <= full.marginal_gain);
        }
    }
}
