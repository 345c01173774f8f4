//! Hard prompt-token budget over the final candidate list.

use promptweave_config::BudgetConfig;
use promptweave_core::module::ModuleCandidate;
use tracing::{debug, warn};

use crate::selection::BaseSelector;
use crate::trace::{ModuleTraceEntry, TraceSource};

#[derive(Debug, Clone, Default)]
pub struct BudgetOutcome {
    /// Surviving modules in budget order.
    pub kept: Vec<ModuleCandidate>,
    /// `NAME [no budget: +X tokens]` for every dropped module.
    pub cut: Vec<String>,
    pub tokens_used: usize,
    pub trace: Vec<ModuleTraceEntry>,
}

pub struct BudgetPlanner {
    config: BudgetConfig,
}

impl BudgetPlanner {
    pub fn new(config: BudgetConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BudgetConfig {
        &self.config
    }

    /// Tokens available after the safety margin.
    pub fn effective_budget(&self) -> usize {
        self.config
            .prompt_tokens
            .saturating_sub(self.config.safety_margin_tokens)
    }

    fn reserve(&self) -> usize {
        self.effective_budget() * usize::from(self.config.reserve_pct.min(100)) / 100
    }

    /// Pinned modules first in pin-list order, then by priority weight,
    /// then insertion order.
    fn ordered(
        &self,
        candidates: Vec<ModuleCandidate>,
        pinned: &[String],
        selector: &BaseSelector,
    ) -> Vec<ModuleCandidate> {
        let pin_rank = |name: &str| pinned.iter().position(|p| p == name);
        let mut indexed: Vec<(usize, ModuleCandidate)> = candidates.into_iter().enumerate().collect();
        indexed.sort_by(|(ia, a), (ib, b)| {
            let (pa, pb) = (pin_rank(&a.name), pin_rank(&b.name));
            match (pa, pb) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => selector
                    .priority_weight(&a.name)
                    .cmp(&selector.priority_weight(&b.name))
                    .then(ia.cmp(ib)),
            }
        });
        indexed.into_iter().map(|(_, c)| c).collect()
    }

    /// Keep modules while they fit. Modules in `pinned` always survive; an
    /// overflow they cause is logged.
    pub fn apply(
        &self,
        candidates: Vec<ModuleCandidate>,
        pinned: &[String],
        selector: &BaseSelector,
    ) -> BudgetOutcome {
        let budget = self.effective_budget();
        let reserve = self.reserve();
        let mut outcome = BudgetOutcome::default();

        for candidate in self.ordered(candidates, pinned, selector) {
            let cost = candidate.token_count + self.config.separator_tokens;
            let remaining = budget.saturating_sub(outcome.tokens_used);

            if pinned.contains(&candidate.name) {
                if cost > remaining {
                    warn!(
                        module = %candidate.name,
                        tokens = cost,
                        remaining,
                        "Pinned module exceeds prompt budget, keeping it"
                    );
                }
                outcome.tokens_used += cost;
                outcome.trace.push(ModuleTraceEntry::new(&candidate.name, TraceSource::Budget, true, "pinned"));
                outcome.kept.push(candidate);
                continue;
            }

            if remaining < reserve || cost > remaining {
                debug!(module = %candidate.name, tokens = cost, remaining, "Module cut by budget");
                outcome.cut.push(format!("{} [no budget: +{} tokens]", candidate.name, cost));
                outcome.trace.push(ModuleTraceEntry::new(
                    &candidate.name,
                    TraceSource::Budget,
                    false,
                    if remaining < reserve { "reserve" } else { "overflow" },
                ));
                continue;
            }

            outcome.tokens_used += cost;
            outcome.trace.push(ModuleTraceEntry::new(&candidate.name, TraceSource::Budget, true, "fits"));
            outcome.kept.push(candidate);
        }

        debug!(
            budget,
            used = outcome.tokens_used,
            kept = outcome.kept.len(),
            cut = outcome.cut.len(),
            "Budget applied"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptweave_config::SelectionMatrixConfig;
    use promptweave_core::module::FrontMatter;

    fn candidate(name: &str, tokens: usize) -> ModuleCandidate {
        ModuleCandidate {
            name: name.into(),
            text: "x".repeat(tokens),
            token_count: tokens,
            meta: FrontMatter::default(),
        }
    }

    fn selector(priority: &[&str]) -> BaseSelector {
        let matrix = SelectionMatrixConfig {
            priority: priority.iter().map(|s| s.to_string()).collect(),
            ..SelectionMatrixConfig::default()
        };
        BaseSelector::new(matrix).unwrap()
    }

    fn pins(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn planner(prompt_tokens: usize) -> BudgetPlanner {
        BudgetPlanner::new(BudgetConfig {
            prompt_tokens,
            separator_tokens: 0,
            reserve_pct: 0,
            ..BudgetConfig::default()
        })
    }

    fn names(outcome: &BudgetOutcome) -> Vec<&str> {
        outcome.kept.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn orders_pinned_then_priority_then_insertion() {
        let s = selector(&["FIRST.txt", "SECOND.txt"]);
        let outcome = planner(10_000).apply(
            vec![
                candidate("LATE_B.txt", 10),
                candidate("SECOND.txt", 10),
                candidate("CORE.txt", 10),
                candidate("LATE_A.txt", 10),
                candidate("FIRST.txt", 10),
            ],
            &pins(&["CORE.txt"]),
            &s,
        );
        assert_eq!(
            names(&outcome),
            vec!["CORE.txt", "FIRST.txt", "SECOND.txt", "LATE_B.txt", "LATE_A.txt"]
        );
    }

    #[test]
    fn overflowing_modules_are_cut() {
        let s = selector(&[]);
        let outcome = planner(100).apply(
            vec![candidate("A.txt", 60), candidate("B.txt", 50), candidate("C.txt", 40)],
            &[],
            &s,
        );
        assert_eq!(names(&outcome), vec!["A.txt", "C.txt"]);
        assert_eq!(outcome.cut, vec!["B.txt [no budget: +50 tokens]"]);
        assert_eq!(outcome.tokens_used, 100);
    }

    #[test]
    fn pinned_survive_any_budget() {
        let s = selector(&[]);
        let outcome = planner(10).apply(
            vec![candidate("OPT.txt", 5), candidate("CORE.txt", 50)],
            &pins(&["CORE.txt"]),
            &s,
        );
        assert_eq!(names(&outcome), vec!["CORE.txt"]);
        assert_eq!(outcome.cut.len(), 1);
    }

    #[test]
    fn reserve_stops_optional_modules() {
        let s = selector(&[]);
        let p = BudgetPlanner::new(BudgetConfig {
            prompt_tokens: 100,
            separator_tokens: 1,
            reserve_pct: 10,
            ..BudgetConfig::default()
        });
        let outcome = p.apply(vec![candidate("A.txt", 90), candidate("B.txt", 1)], &[], &s);
        // 91 used, 9 left, below the 10 token reserve
        assert_eq!(names(&outcome), vec!["A.txt"]);
        assert_eq!(outcome.cut, vec!["B.txt [no budget: +2 tokens]"]);
    }

    #[test]
    fn non_pinned_total_never_exceeds_budget() {
        let s = selector(&[]);
        let pool: Vec<ModuleCandidate> = (1..=20).map(|i| candidate(&format!("M{i}.txt"), i * 13)).collect();
        for budget in [0, 5, 50, 333, 1000, 4000] {
            let outcome = planner(budget).apply(pool.clone(), &[], &s);
            assert!(outcome.tokens_used <= budget, "budget {budget} exceeded");
        }
    }

    #[test]
    fn safety_margin_shrinks_budget() {
        let p = BudgetPlanner::new(BudgetConfig {
            prompt_tokens: 500,
            safety_margin_tokens: 120,
            ..BudgetConfig::default()
        });
        assert_eq!(p.effective_budget(), 380);
    }
}
