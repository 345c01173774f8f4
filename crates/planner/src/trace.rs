//! Debug trace types recorded while assembling a prompt.

use serde::Serialize;

use crate::bandit::FamilyDecision;
use crate::heuristics::HeuristicLogEntry;

/// Stage that produced a module trace entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceSource {
    Base,
    Intensity,
    Rule,
    FrontMatter,
    Dedupe,
    Bandit,
    Knapsack,
    Budget,
}

/// Why a module was activated or dropped at one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleTraceEntry {
    pub id: String,
    pub source: TraceSource,
    pub activated: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u8>,
}

impl ModuleTraceEntry {
    pub fn new(id: impl Into<String>, source: TraceSource, activated: bool, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source,
            activated,
            reason: reason.into(),
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: u8) -> Self {
        self.threshold = Some(threshold);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct KnapsackTrace {
    pub budget: usize,
    pub adopted: Vec<String>,
    pub marginal_gain: f64,
}

/// Everything the pipeline decided for one turn.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DebugTrace {
    pub cache_key: Option<String>,
    pub cache_hit: bool,
    pub decision_signals: Vec<String>,
    pub modules: Vec<ModuleTraceEntry>,
    pub bandit: Vec<FamilyDecision>,
    pub excluded: Vec<String>,
    pub knapsack: KnapsackTrace,
    pub budget_cut: Vec<String>,
    pub tokens_used: usize,
    pub heuristics: Vec<HeuristicLogEntry>,
}

impl DebugTrace {
    pub fn push(&mut self, entry: ModuleTraceEntry) {
        self.modules.push(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ModuleTraceEntry>) {
        self.modules.extend(entries);
    }
}
