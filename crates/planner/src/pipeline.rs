//! End-to-end prompt assembly for one conversational turn.
//!
//! ```text
//! text ──► DecisionHub ──► HeuristicsEngine ──► BaseSelector
//!                                                   │
//!       FamilyPlanner ◄── intents / flag modules ◄──┘
//!            │
//!            ▼
//!      ModuleCatalog ──► front matter ──► knapsack ──► budget ──► stitch
//! ```
//!
//! Every stage appends to the [`DebugTrace`] returned with the prompt.

use chrono::Utc;
use promptweave_config::{AppConfig, ConfigError, Manifest, ManifestDefaults, SelectionMatrixConfig};
use promptweave_core::analytics::{BanditPriors, PosteriorStore, VptStore};
use promptweave_core::decision::DecSnapshot;
use promptweave_core::error::{AnalyticsError, Result};
use promptweave_core::module::{ModuleCandidate, ModuleSource};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bandit::{FamilyPlanner, GateContext, Sampler};
use crate::budget::BudgetPlanner;
use crate::cache::{CacheKeyParts, CachedContext, ContextCache};
use crate::catalog::{ModuleCatalog, apply_metadata};
use crate::decision::DecisionHub;
use crate::heuristics::{HeuristicsEngine, HeuristicsInput, HeuristicsRuntime};
use crate::knapsack::{self, KnapsackCandidate};
use crate::selection::BaseSelector;
use crate::stitcher::stitch;
use crate::trace::{DebugTrace, KnapsackTrace, ModuleTraceEntry, TraceSource};

/// Value-per-token used when a module has no history yet, scaled down by
/// its priority weight and size.
const VPT_FALLBACK: f64 = 0.0001;

/// One turn to assemble.
#[derive(Debug, Clone, Default)]
pub struct AssemblyRequest {
    pub text: String,
    pub identity: Option<String>,
    /// Caller-supplied flags (heuristic flags, `use_memories`, ...).
    pub flags: BTreeMap<String, bool>,
    /// Passive behavior cues such as `fast_followup`.
    pub passive_signals: Vec<String>,
    pub memory_count: usize,
    pub memory_tokens: usize,
    pub has_derived_context: bool,
    pub hybrid_opening: bool,
    pub has_embedding: bool,
    /// Wall clock override in epoch milliseconds.
    pub now_ms: Option<i64>,
}

impl AssemblyRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_flag(mut self, flag: impl Into<String>) -> Self {
        self.flags.insert(flag.into(), true);
        self
    }

    pub fn with_passive_signal(mut self, signal: impl Into<String>) -> Self {
        self.passive_signals.push(signal.into());
        self
    }

    pub fn at(mut self, now_ms: i64) -> Self {
        self.now_ms = Some(now_ms);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AssembledPrompt {
    pub text: String,
    pub footers: Vec<String>,
    pub snapshot: DecSnapshot,
    pub trace: DebugTrace,
}

/// Owns every stage. Build once, share behind an `Arc`.
pub struct PromptPipeline {
    config: AppConfig,
    hub: DecisionHub,
    heuristics: HeuristicsEngine,
    selector: BaseSelector,
    catalog: ModuleCatalog,
    planner: FamilyPlanner,
    budget: BudgetPlanner,
    cache: ContextCache,
    manifest: Option<Manifest>,
    posteriors: Arc<dyn PosteriorStore>,
    vpt: Arc<dyn VptStore>,
}

/// Priors declared by the manifest, or the fallback defaults without one.
fn priors_for(manifest: Option<&Manifest>) -> BanditPriors {
    manifest
        .map(|m| BanditPriors::from(&m.defaults))
        .unwrap_or_else(|| BanditPriors::from(&ManifestDefaults::default()))
}

impl PromptPipeline {
    /// Build from configuration. The manifest and selection matrix are read
    /// from the configured paths; a rejected manifest falls back to none.
    pub fn new<A>(config: AppConfig, source: Arc<dyn ModuleSource>, analytics: Arc<A>) -> std::result::Result<Self, ConfigError>
    where
        A: PosteriorStore + VptStore + 'static,
    {
        let matrix = SelectionMatrixConfig::load(config.store.matrix_path.as_deref())?;
        let manifest = Manifest::load_or_fallback(config.store.manifest_path.as_deref());
        let selector = BaseSelector::new(matrix)?;
        analytics.configure_priors(priors_for(manifest.as_ref()));

        info!(
            source = source.name(),
            manifest = manifest.as_ref().map(|m| m.version.as_str()).unwrap_or("none"),
            shadow = config.bandit.shadow,
            "Prompt pipeline ready"
        );

        Ok(Self {
            hub: DecisionHub::new(),
            heuristics: HeuristicsEngine::new(config.heuristics.clone()),
            selector,
            catalog: ModuleCatalog::new(source, config.store.strict_missing),
            planner: FamilyPlanner::new(config.bandit.clone()),
            budget: BudgetPlanner::new(config.budget.clone()),
            cache: ContextCache::new(config.cache.capacity),
            manifest,
            posteriors: analytics.clone(),
            vpt: analytics,
            config,
        })
    }

    pub fn with_manifest(mut self, manifest: Option<Manifest>) -> Self {
        self.posteriors.configure_priors(priors_for(manifest.as_ref()));
        self.manifest = manifest;
        self
    }

    pub fn with_matrix(mut self, matrix: SelectionMatrixConfig) -> std::result::Result<Self, ConfigError> {
        self.selector = BaseSelector::new(matrix)?;
        Ok(self)
    }

    /// Replace the Thompson sampler, e.g. with a seeded one in tests.
    pub fn with_sampler(mut self, sampler: Box<dyn Sampler>) -> Self {
        self.planner = FamilyPlanner::with_sampler(self.config.bandit.clone(), sampler);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn manifest(&self) -> Option<&Manifest> {
        self.manifest.as_ref()
    }

    pub fn selector(&self) -> &BaseSelector {
        &self.selector
    }

    pub fn heuristics(&self) -> &HeuristicsEngine {
        &self.heuristics
    }

    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// Forget heuristic history for `identity`.
    pub fn end_session(&self, identity: &str) {
        self.heuristics.end_session(identity);
    }

    pub async fn record_outcome(&self, family: &str, arm: &str, reward: f64) -> std::result::Result<(), AnalyticsError> {
        self.posteriors.record_outcome(family, arm, reward).await
    }

    pub async fn record_module_outcome(
        &self,
        module_id: &str,
        quality: f64,
        tokens: usize,
    ) -> std::result::Result<(), AnalyticsError> {
        self.vpt.record_module_outcome(module_id, quality, tokens).await
    }

    fn knapsack_budget(&self) -> usize {
        self.config.budget.knapsack_tokens.unwrap_or_else(|| {
            self.manifest
                .as_ref()
                .map(|m| m.defaults.max_aux_tokens)
                .unwrap_or_else(|| ManifestDefaults::default().max_aux_tokens)
        })
    }

    async fn knapsack_candidates(&self, optional: &[&ModuleCandidate]) -> Vec<KnapsackCandidate> {
        let mut out = Vec::with_capacity(optional.len());
        for module in optional {
            let prior_peso = self.selector.priority_weight(&module.name) as f64;
            let stats = self.vpt.get_module_vpt(&module.name).await;
            let vpt_mean = if stats.vpt_mean.is_finite() && stats.vpt_mean > 0.0 {
                stats.vpt_mean
            } else {
                VPT_FALLBACK / prior_peso.max(1.0) / module.token_count.max(1) as f64
            };
            out.push(KnapsackCandidate {
                id: module.name.clone(),
                tokens: module.token_count,
                prior_peso,
                vpt_mean,
                vpt_ci: stats.vpt_ci,
            });
        }
        out
    }

    /// Assemble the prompt for one turn.
    ///
    /// Only a missing module in strict mode fails the turn; every other
    /// problem degrades and is logged.
    pub async fn assemble(&self, request: &AssemblyRequest) -> Result<AssembledPrompt> {
        let text = request.text.as_str();
        let identity = request.identity.as_deref();
        let mut dec = self.hub.decide(text, &request.flags);
        let flag_signals = HeuristicsEngine::flag_signals(&dec.flags);
        let mut trace = DebugTrace::default();

        let key_parts = CacheKeyParts {
            identity,
            openness: dec.openness.level(),
            intensity: f64::from(dec.intensity),
            memory_count: request.memory_count,
            has_steps: !dec.steps.is_empty(),
            has_derived_context: request.has_derived_context,
            hybrid_opening: request.hybrid_opening,
            has_heuristic_flags: !flag_signals.is_empty(),
            has_embedding: request.has_embedding,
        };
        trace.cache_key = Some(key_parts.key());
        if let Some(cached) = self.cache.lookup(&key_parts) {
            trace.cache_hit = true;
            trace.tokens_used = cached.tokens_used;
            return Ok(AssembledPrompt {
                text: cached.text.clone(),
                footers: cached.footers.clone(),
                snapshot: dec,
                trace,
            });
        }

        let mut runtime: Option<HeuristicsRuntime> = if self.config.heuristics.enabled {
            Some(
                self.heuristics
                    .evaluate(HeuristicsInput {
                        identity,
                        text,
                        passive_signals: &request.passive_signals,
                        flag_signals: &flag_signals,
                        now_ms: request.now_ms.unwrap_or_else(|| Utc::now().timestamp_millis()),
                    })
                    .await,
            )
        } else {
            None
        };
        let signals = self
            .heuristics
            .decision_signals(runtime.as_ref(), &dec, text, request.memory_tokens);
        trace.decision_signals = signals.iter().cloned().collect();

        // Base selection, then intents and caller flags as extras.
        let base = self.selector.select(&dec);
        trace.extend(base.trace);
        if !base.cut.is_empty() {
            debug!(cut = ?base.cut, "Modules below intensity floor");
        }
        let mut extras = self.selector.intent_modules(text);
        extras.extend(self.selector.flag_modules(&dec));

        let plan = {
            let mut gate = GateContext {
                dec: &dec,
                signals: &signals,
                runtime: runtime.as_mut(),
            };
            self.planner
                .plan(
                    self.manifest.as_ref(),
                    self.posteriors.as_ref(),
                    &base.selected,
                    &extras,
                    &mut gate,
                )
                .await
        };
        for decision in &plan.decisions {
            if let Some(chosen) = &decision.chosen {
                let reason = format!("{}:{:?}", decision.family_id, decision.chosen_by).to_lowercase();
                trace.push(ModuleTraceEntry::new(chosen, TraceSource::Bandit, true, reason));
                if let Some(signal) = runtime.as_ref().and_then(|r| r.signal_for(chosen)) {
                    dec.annotate_bias(signal);
                }
            }
        }
        for excluded in &plan.excluded {
            trace.push(ModuleTraceEntry::new(excluded, TraceSource::Bandit, false, "excluded"));
        }
        trace.bandit = plan.decisions;
        trace.excluded = plan.excluded;

        // Load texts and apply front matter.
        let candidates = self.catalog.load(&plan.modules).await?;
        let selection = apply_metadata(&dec, &plan.modules, candidates);
        trace.extend(selection.trace);
        let footer_names: HashSet<&str> = selection.footers.iter().map(|m| m.name.as_str()).collect();

        let mut pinned: Vec<String> = self.selector.pinned().to_vec();
        pinned.extend(selection.footers.iter().map(|m| m.name.clone()));

        // Optional modules compete for the knapsack budget.
        let optional: Vec<&ModuleCandidate> = selection
            .regular
            .iter()
            .filter(|m| !pinned.contains(&m.name))
            .collect();
        let knapsack_budget = self.knapsack_budget();
        let result = knapsack::solve(knapsack_budget, &self.knapsack_candidates(&optional).await);
        for module in &optional {
            let adopted = result.adopted.contains(&module.name);
            trace.push(ModuleTraceEntry::new(
                &module.name,
                TraceSource::Knapsack,
                adopted,
                if adopted { "adopted" } else { "knapsack" },
            ));
        }
        trace.knapsack = KnapsackTrace {
            budget: knapsack_budget,
            adopted: result.adopted.clone(),
            marginal_gain: result.marginal_gain,
        };

        let allowed: Vec<ModuleCandidate> = selection
            .regular
            .iter()
            .chain(&selection.footers)
            .filter(|m| pinned.contains(&m.name) || result.adopted.contains(&m.name))
            .cloned()
            .collect();
        let outcome = self.budget.apply(allowed, &pinned, &self.selector);
        trace.extend(outcome.trace);
        trace.budget_cut = outcome.cut;
        trace.tokens_used = outcome.tokens_used;

        let (footers, regular): (Vec<ModuleCandidate>, Vec<ModuleCandidate>) = outcome
            .kept
            .into_iter()
            .partition(|m| footer_names.contains(m.name.as_str()));
        let stitched = stitch(&regular, dec.openness.level(), &self.selector);
        let footer_texts: Vec<String> = footers.iter().map(|m| m.text.trim().to_string()).collect();

        dec.annotate_selected(regular.iter().chain(&footers).map(|m| m.name.clone()));
        if let Some(runtime) = &runtime {
            trace.heuristics = runtime.logs.values().cloned().collect();
        }

        self.cache.store(
            &key_parts,
            CachedContext {
                text: stitched.clone(),
                footers: footer_texts.clone(),
                tokens_used: trace.tokens_used,
            },
        );

        debug!(
            openness = dec.openness.level(),
            intensity = dec.intensity,
            modules = dec.debug.selected_modules.len(),
            tokens = trace.tokens_used,
            "Prompt assembled"
        );

        Ok(AssembledPrompt {
            text: stitched,
            footers: footer_texts,
            snapshot: dec,
            trace,
        })
    }
}
