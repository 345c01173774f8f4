//! Compiled module rules.

use crate::parser::{Condition, RuleContext, parse_rule};
use promptweave_core::RuleError;
use serde::Serialize;
use tracing::debug;

/// A rule gating one module, parsed once at load time.
#[derive(Debug, Clone)]
pub struct ModuleRule {
    pub module: String,
    pub description: String,
    /// The source expression, kept for debug traces.
    pub source: String,
    pub condition: Condition,
}

impl ModuleRule {
    pub fn compile(module: &str, expr: &str, description: &str) -> Result<Self, RuleError> {
        Ok(Self {
            module: module.to_string(),
            description: description.to_string(),
            source: expr.trim().to_string(),
            condition: parse_rule(expr)?,
        })
    }
}

/// Result of evaluating one rule.
#[derive(Debug, Clone, Serialize)]
pub struct RuleOutcome {
    pub module: String,
    pub passed: bool,
    pub rule: String,
    /// Boolean variables the rule referenced that were set.
    pub signals: Vec<String>,
}

/// An ordered set of compiled rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<ModuleRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `(module, expression, description)` triples.
    ///
    /// The first malformed expression aborts compilation.
    pub fn compile<'a, I>(entries: I) -> Result<Self, RuleError>
    where
        I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
    {
        let rules = entries
            .into_iter()
            .map(|(module, expr, description)| ModuleRule::compile(module, expr, description))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(count = rules.len(), "Rules compiled");
        Ok(Self { rules })
    }

    pub fn add(&mut self, rule: ModuleRule) {
        self.rules.push(rule);
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleRule> {
        self.rules.iter()
    }

    /// Evaluate every rule in declaration order.
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> Vec<RuleOutcome> {
        self.rules
            .iter()
            .map(|rule| RuleOutcome {
                module: rule.module.clone(),
                passed: rule.condition.evaluate(ctx),
                rule: rule.source.clone(),
                signals: rule.condition.active_signals(ctx),
            })
            .collect()
    }
}
