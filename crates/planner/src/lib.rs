//! The module selection pipeline: the heart of PromptWeave.
//!
//! One turn flows through these stages:
//!
//! 1. **Decide**: derive a [`DecSnapshot`](promptweave_core::DecSnapshot)
//!    (intensity, openness, steps) from the raw text
//! 2. **Score signals**: decayed, cooldown-aware heuristic signals per identity
//! 3. **Select base**: the matrix modules for the openness level, gated by
//!    intensity floors and rules
//! 4. **Plan families**: one arm per module family via Thompson sampling,
//!    with `excludes` / `depends_on` resolution
//! 5. **Adopt optional modules**: greedy knapsack by value per token
//! 6. **Budget and stitch**: hard token budget, then one deduplicated block
//!
//! [`PromptPipeline`] runs all of it and returns the text with a debug trace.

pub mod bandit;
pub mod budget;
pub mod cache;
pub mod catalog;
pub mod decision;
pub mod heuristics;
pub mod knapsack;
pub mod lexicon;
pub mod pipeline;
pub mod selection;
pub mod stitcher;
pub mod trace;

pub use bandit::{ChosenBy, FamilyDecision, FamilyPlan, FamilyPlanner, GateContext, Sampler, StdRngSampler};
pub use budget::{BudgetOutcome, BudgetPlanner};
pub use cache::{CacheKeyParts, CachedContext, ContextCache};
pub use catalog::{FrontMatterError, MetadataSelection, ModuleCatalog, parse_front_matter};
pub use decision::DecisionHub;
pub use heuristics::{HeuristicsEngine, HeuristicsInput, HeuristicsRuntime};
pub use knapsack::{KnapsackCandidate, KnapsackResult};
pub use pipeline::{AssembledPrompt, AssemblyRequest, PromptPipeline};
pub use selection::{BaseSelection, BaseSelector};
pub use trace::{DebugTrace, ModuleTraceEntry, TraceSource};
