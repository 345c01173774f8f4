//! Family bandit planner.
//!
//! Each manifest family contributes at most one arm per turn. Arms are
//! gated (minimum openness, named signal), gate-passing arms draw a
//! Thompson sample from their posterior, and the feature flags decide
//! whether the sampled pick or the family baseline is adopted:
//!
//! - `shadow`: log the sampled pick, adopt the baseline
//! - `early`: adopt the sampled pick for `pilot_percent`% of turns
//! - otherwise: adopt the sampled pick
//!
//! The adopted arm's `excludes` are removed from the final list and its
//! `depends_on` appended.

use promptweave_config::{BanditConfig, Manifest, ManifestModule};
use promptweave_core::analytics::{BanditPosterior, PosteriorStore};
use promptweave_core::decision::DecSnapshot;
use promptweave_core::text::normalize_key;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::f64::consts::PI;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::heuristics::{
    HeuristicsRuntime, SIGNAL_INTENSITY_HIGH, SIGNAL_MEMORY_HIGH, SIGNAL_RATIONAL_PRESENCE,
    is_heuristic_signal,
};

/// Posteriors with fewer observations receive the cold-start boost.
pub const COLD_START_MIN_COUNT: u64 = 20;

// ── Sampling ──────────────────────────────────────────────────────────────

/// Source of randomness for Thompson draws and pilot rolls.
pub trait Sampler: Send {
    /// Uniform in `[0, 1)`.
    fn unit(&mut self) -> f64;

    /// Standard normal, via Box-Muller.
    fn standard_normal(&mut self) -> f64 {
        let u1 = 1.0 - self.unit();
        let u2 = self.unit();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }
}

pub struct StdRngSampler {
    rng: StdRng,
}

impl StdRngSampler {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_os_rng() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Sampler for StdRngSampler {
    fn unit(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// One Thompson draw using a normal approximation of the Beta posterior.
/// Returns the draw and whether the cold-start boost was applied.
pub fn thompson_draw(posterior: &BanditPosterior, cold_start_boost: f64, sampler: &mut dyn Sampler) -> (f64, bool) {
    let (alpha, beta) = (posterior.alpha, posterior.beta);
    let sum = alpha + beta;
    let variance = (alpha * beta) / (sum * sum * (sum + 1.0)).max(1e-6);
    let sd = variance.max(1e-6).sqrt();
    let mean = alpha / sum.max(1e-6);
    let cold = posterior.count < COLD_START_MIN_COUNT;
    let mut draw = mean + sd * sampler.standard_normal();
    if cold {
        draw += cold_start_boost;
    }
    let draw = if draw.is_finite() { draw.clamp(0.0, 1.0) } else { 0.0 };
    (draw, cold)
}

// ── Decision log ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChosenBy {
    Ts,
    Baseline,
    Shadow,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArmTrace {
    pub id: String,
    pub tokens_avg: f64,
    pub alpha: f64,
    pub beta: f64,
    pub count: u64,
    pub gate_passed: bool,
}

/// What the planner decided for one family.
#[derive(Debug, Clone, Serialize)]
pub struct FamilyDecision {
    pub family_id: String,
    pub reward_key: String,
    pub baseline: Option<String>,
    pub chosen: Option<String>,
    pub chosen_by: ChosenBy,
    pub ts_pick: Option<String>,
    pub eligible_arms: Vec<ArmTrace>,
    pub tokens_planned: f64,
    pub cold_start_applied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FamilyPlan {
    pub modules: Vec<String>,
    pub decisions: Vec<FamilyDecision>,
    pub excluded: Vec<String>,
}

// ── Gate ──────────────────────────────────────────────────────────────────

/// Everything an arm gate can look at.
pub struct GateContext<'a> {
    pub dec: &'a DecSnapshot,
    pub signals: &'a BTreeSet<String>,
    pub runtime: Option<&'a mut HeuristicsRuntime>,
}

impl GateContext<'_> {
    /// Whether `arm` may be drawn this turn.
    pub fn passes(&mut self, arm: &ManifestModule) -> bool {
        let Some(gate) = &arm.gate else {
            return true;
        };
        let openness = self.dec.openness.level();
        if gate.min_open.is_some_and(|min| openness < min) {
            return false;
        }
        let Some(signal) = gate.signal.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return true;
        };

        if is_heuristic_signal(signal) {
            return match self.runtime.as_deref_mut() {
                Some(runtime) => runtime.open_arm(&arm.id, signal, gate.min),
                None => self.signals.contains(signal),
            };
        }
        match signal {
            "open" => openness >= gate.min_open.unwrap_or(1),
            "vulnerability" => self.dec.is_vulnerable || self.dec.flag("vulnerability"),
            "memoria" => self.dec.flag("use_memories"),
            "pattern" => self.dec.flag("pattern_synthesis"),
            SIGNAL_INTENSITY_HIGH | SIGNAL_MEMORY_HIGH | SIGNAL_RATIONAL_PRESENCE => {
                self.signals.contains(signal)
            }
            other => {
                warn!(arm = %arm.id, signal = other, "Unknown gate signal, passing");
                true
            }
        }
    }
}

// ── Planner ───────────────────────────────────────────────────────────────

fn unique(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(normalize_key(item)))
        .collect()
}

struct ArmDraw<'m> {
    arm: &'m ManifestModule,
    posterior: BanditPosterior,
    gate_passed: bool,
    draw: Option<(f64, bool)>,
}

/// Picks one arm per family. Holds the sampler; everything else is passed
/// per call.
pub struct FamilyPlanner {
    config: BanditConfig,
    sampler: Mutex<Box<dyn Sampler>>,
}

impl FamilyPlanner {
    pub fn new(config: BanditConfig) -> Self {
        let sampler: Box<dyn Sampler> = match config.seed {
            Some(seed) => Box::new(StdRngSampler::seeded(seed)),
            None => Box::new(StdRngSampler::from_os_rng()),
        };
        Self::with_sampler(config, sampler)
    }

    pub fn with_sampler(config: BanditConfig, sampler: Box<dyn Sampler>) -> Self {
        Self {
            config,
            sampler: Mutex::new(sampler),
        }
    }

    pub fn config(&self) -> &BanditConfig {
        &self.config
    }

    fn with_sampler_locked<T>(&self, f: impl FnOnce(&mut dyn Sampler) -> T) -> T {
        let mut guard = self.sampler.lock().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_mut())
    }

    /// Whether the sampled pick is adopted this turn. Rolled once per
    /// turn so every family shares the pilot decision.
    fn apply_ts(&self) -> bool {
        if self.config.shadow {
            return false;
        }
        if !self.config.early {
            return true;
        }
        let roll = self.with_sampler_locked(|s| s.unit());
        roll * 100.0 < f64::from(self.config.pilot_percent)
    }

    /// Plan the module list for `base` followed by `extras`.
    ///
    /// Without a manifest every candidate is its own one-arm family and
    /// the deduplicated list is returned unchanged.
    pub async fn plan(
        &self,
        manifest: Option<&Manifest>,
        posteriors: &dyn PosteriorStore,
        base: &[String],
        extras: &[String],
        gate: &mut GateContext<'_>,
    ) -> FamilyPlan {
        let candidates = unique(base.iter().chain(extras).cloned());
        let Some(manifest) = manifest else {
            return FamilyPlan {
                modules: candidates,
                ..FamilyPlan::default()
            };
        };

        let apply_ts = self.apply_ts();
        let mut seen_families: HashSet<String> = HashSet::new();
        let mut modules = Vec::new();
        let mut decisions = Vec::new();
        let mut excluded: BTreeSet<String> = BTreeSet::new();
        let mut depends: Vec<String> = Vec::new();

        for candidate in candidates {
            let Some(module) = manifest.module(&candidate) else {
                modules.push(candidate);
                continue;
            };
            if !seen_families.insert(module.family.clone()) {
                continue;
            }
            let family_id = module.family.as_str();
            let family = manifest.family(family_id);
            let arms: Vec<&ManifestModule> = manifest
                .arms(family_id)
                .into_iter()
                .filter(|arm| arm.enabled)
                .collect();
            if family.is_some_and(|f| !f.enabled) || arms.is_empty() {
                debug!(family = family_id, "Family disabled or without arms, keeping candidate");
                modules.push(candidate);
                continue;
            }

            let mut draws = Vec::with_capacity(arms.len());
            for arm in arms.iter().copied() {
                let gate_passed = gate.passes(arm);
                let posterior = posteriors.get_posterior(family_id, &arm.id).await;
                draws.push(ArmDraw {
                    arm,
                    posterior,
                    gate_passed,
                    draw: None,
                });
            }
            let boost = manifest.defaults.cold_start_boost;
            self.with_sampler_locked(|sampler| {
                for d in draws.iter_mut().filter(|d| d.gate_passed) {
                    d.draw = Some(thompson_draw(&d.posterior, boost, sampler));
                }
            });

            let ts_pick = draws
                .iter()
                .filter_map(|d| d.draw.map(|(score, cold)| (d, score, cold)))
                .fold(None::<(&ArmDraw<'_>, f64, bool)>, |best, cur| match best {
                    Some(b) if b.1 >= cur.1 => Some(b),
                    _ => Some(cur),
                });

            let baseline = family
                .and_then(|f| f.baseline.as_deref())
                .and_then(|b| manifest.module(b))
                .or_else(|| arms.iter().copied().find(|a| normalize_key(&a.id) == normalize_key(&candidate)));

            let chosen_by = if self.config.shadow {
                ChosenBy::Shadow
            } else if apply_ts {
                ChosenBy::Ts
            } else {
                ChosenBy::Baseline
            };
            let ts_arm = ts_pick.map(|(d, _, _)| d.arm);
            let chosen: Option<&ManifestModule> = if apply_ts && ts_arm.is_some() {
                ts_arm
            } else {
                baseline.or(ts_arm)
            };

            let tokens_planned = chosen
                .map(|c| c.tokens_avg)
                .filter(|t| *t > 0.0)
                .unwrap_or(manifest.defaults.max_aux_tokens as f64);

            match chosen {
                Some(arm) => {
                    modules.push(arm.id.clone());
                    excluded.extend(arm.excludes.iter().map(|e| normalize_key(e)));
                    depends.extend(arm.depends_on.iter().cloned());
                    if let Some(runtime) = gate.runtime.as_deref_mut() {
                        runtime.register_selection(&arm.id).await;
                    }
                }
                None => modules.push(candidate.clone()),
            }

            let decision = FamilyDecision {
                family_id: family_id.to_string(),
                reward_key: module.reward_key_or(family).to_string(),
                baseline: baseline.map(|b| b.id.clone()),
                chosen: chosen.map(|c| c.id.clone()),
                chosen_by,
                ts_pick: ts_arm.map(|a| a.id.clone()),
                eligible_arms: draws
                    .iter()
                    .map(|d| ArmTrace {
                        id: d.arm.id.clone(),
                        tokens_avg: d.arm.tokens_avg,
                        alpha: d.posterior.alpha,
                        beta: d.posterior.beta,
                        count: d.posterior.count,
                        gate_passed: d.gate_passed,
                    })
                    .collect(),
                tokens_planned,
                cold_start_applied: ts_pick.is_some_and(|(_, _, cold)| cold) && apply_ts,
            };
            debug!(
                family = %decision.family_id,
                chosen = decision.chosen.as_deref().unwrap_or("-"),
                ts_pick = decision.ts_pick.as_deref().unwrap_or("-"),
                chosen_by = ?decision.chosen_by,
                "Family arm selected"
            );
            decisions.push(decision);
        }

        for dependency in depends {
            let key = normalize_key(&dependency);
            if !modules.iter().any(|m| normalize_key(m) == key) {
                modules.push(dependency);
            }
        }
        let modules: Vec<String> = unique(
            modules
                .into_iter()
                .filter(|m| !excluded.contains(&normalize_key(m))),
        );

        FamilyPlan {
            modules,
            decisions,
            excluded: excluded.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heuristics::{HeuristicsEngine, HeuristicsInput};
    use promptweave_core::decision::{DecisionDebug, Openness, Step};
    use promptweave_store::InMemoryAnalytics;
    use std::collections::BTreeMap;

    const MANIFEST: &str = r#"{
      "version": "test",
      "defaults": { "max_aux_tokens": 400, "cold_start_boost": 0.35 },
      "families": {
        "tone": { "reward_key": "tone_quality", "baseline": "TONE_WARM.txt" },
        "bias": { "reward_key": "bias_quality" }
      },
      "modules": [
        { "id": "TONE_WARM.txt", "family": "tone", "role": "instruction", "size": "S", "tokens_avg": 120 },
        { "id": "TONE_DIRECT.txt", "family": "tone", "role": "instruction", "size": "M", "tokens_avg": 180,
          "excludes": ["LONG_CONTEXT.txt"], "depends_on": ["TONE_GLOSSARY.txt"] },
        { "id": "TONE_GLOSSARY.txt", "family": "glossary", "role": "context", "size": "S", "tokens_avg": 40 },
        { "id": "LONG_CONTEXT.txt", "family": "context", "role": "context", "size": "L", "tokens_avg": 500 },
        { "id": "BIAS_ANCHORING.txt", "family": "bias", "role": "instruction", "size": "S", "tokens_avg": 90,
          "gate": { "signal": "bias:anchoring" } },
        { "id": "BIAS_AVAILABILITY.txt", "family": "bias", "role": "instruction", "size": "S", "tokens_avg": 90,
          "gate": { "signal": "bias:availability", "min_open": 2 } }
      ]
    }"#;

    fn manifest() -> Manifest {
        let json = MANIFEST.replace(
            r#""families": {"#,
            r#""families": { "glossary": { "reward_key": "g" }, "context": { "reward_key": "c" },"#,
        );
        Manifest::from_json(&json).unwrap()
    }

    fn dec(openness: Openness) -> DecSnapshot {
        DecSnapshot {
            intensity: 5,
            openness,
            is_vulnerable: false,
            steps: vec![Step::V, Step::I, Step::A],
            save_memory: false,
            has_tech_block: false,
            tags: BTreeSet::new(),
            domain: None,
            flags: BTreeMap::new(),
            debug: DecisionDebug::default(),
        }
    }

    fn live() -> BanditConfig {
        BanditConfig {
            shadow: false,
            early: false,
            pilot_percent: 0,
            seed: Some(7),
        }
    }

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    struct Fixed(f64);

    impl Sampler for Fixed {
        fn unit(&mut self) -> f64 {
            self.0
        }
        fn standard_normal(&mut self) -> f64 {
            0.0
        }
    }

    #[test]
    fn cold_start_boost_applies_below_twenty_observations() {
        let mut sampler = Fixed(0.5);
        let cold = BanditPosterior { alpha: 2.0, beta: 2.0, count: 3 };
        let (draw, applied) = thompson_draw(&cold, 0.35, &mut sampler);
        assert!(applied);
        assert!((draw - 0.85).abs() < 1e-9);

        let warm = BanditPosterior { alpha: 30.0, beta: 10.0, count: 38 };
        let (draw, applied) = thompson_draw(&warm, 0.35, &mut sampler);
        assert!(!applied);
        assert!((draw - 0.75).abs() < 1e-9);
    }

    #[test]
    fn draws_are_clamped() {
        let mut sampler = Fixed(0.5);
        let strong = BanditPosterior { alpha: 99.0, beta: 1.0, count: 5 };
        assert_eq!(thompson_draw(&strong, 0.35, &mut sampler).0, 1.0);
    }

    #[tokio::test]
    async fn no_manifest_returns_unique_candidates() {
        let planner = FamilyPlanner::new(live());
        let analytics = InMemoryAnalytics::default();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(None, &analytics, &names(&["A.txt", "B.txt"]), &names(&["A.txt", "C.txt"]), &mut gate)
            .await;
        assert_eq!(plan.modules, names(&["A.txt", "B.txt", "C.txt"]));
        assert!(plan.decisions.is_empty());
    }

    #[tokio::test]
    async fn shadow_mode_adopts_baseline_and_logs_pick() {
        let config = BanditConfig { shadow: true, ..live() };
        let planner = FamilyPlanner::new(config);
        let analytics = InMemoryAnalytics::default();
        let m = manifest();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(Some(&m), &analytics, &names(&["TONE_DIRECT.txt", "OTHER.txt"]), &[], &mut gate)
            .await;
        let decision = &plan.decisions[0];
        assert_eq!(decision.family_id, "tone");
        assert_eq!(decision.reward_key, "tone_quality");
        assert_eq!(decision.chosen_by, ChosenBy::Shadow);
        assert_eq!(decision.chosen.as_deref(), Some("TONE_WARM.txt"));
        assert!(decision.ts_pick.is_some());
        assert!(!decision.cold_start_applied);
        assert_eq!(plan.modules, names(&["TONE_WARM.txt", "OTHER.txt"]));
    }

    #[tokio::test]
    async fn excludes_and_dependencies_propagate() {
        let planner = FamilyPlanner::new(live());
        let analytics = InMemoryAnalytics::default();
        for _ in 0..40 {
            analytics.record_outcome("tone", "TONE_DIRECT.txt", 1.0).await.unwrap();
            analytics.record_outcome("tone", "TONE_WARM.txt", 0.0).await.unwrap();
        }
        let m = manifest();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(
                Some(&m),
                &analytics,
                &names(&["TONE_WARM.txt", "LONG_CONTEXT.txt"]),
                &[],
                &mut gate,
            )
            .await;
        assert_eq!(plan.decisions[0].chosen.as_deref(), Some("TONE_DIRECT.txt"));
        assert_eq!(plan.decisions[0].chosen_by, ChosenBy::Ts);
        assert_eq!(plan.modules, names(&["TONE_DIRECT.txt", "TONE_GLOSSARY.txt"]));
        assert_eq!(plan.excluded, names(&["long_context.txt"]));
    }

    #[tokio::test]
    async fn gates_use_decision_signals_without_runtime() {
        let planner = FamilyPlanner::new(live());
        let analytics = InMemoryAnalytics::default();
        let m = manifest();
        let d = dec(Openness::Surface);
        let signals = BTreeSet::from(["bias:availability".to_string()]);
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(Some(&m), &analytics, &names(&["BIAS_ANCHORING.txt"]), &[], &mut gate)
            .await;
        let decision = &plan.decisions[0];
        // anchoring lacks its signal, availability needs openness 2
        assert!(decision.eligible_arms.iter().all(|a| !a.gate_passed));
        assert!(decision.ts_pick.is_none());
        assert_eq!(decision.chosen.as_deref(), Some("BIAS_ANCHORING.txt"));
    }

    #[tokio::test]
    async fn adopted_heuristic_arm_is_registered() {
        let engine = HeuristicsEngine::default();
        let mut runtime = engine
            .evaluate(HeuristicsInput {
                identity: Some("u1"),
                text: "antes era melhor",
                passive_signals: &[],
                flag_signals: &[],
                now_ms: 0,
            })
            .await;
        let planner = FamilyPlanner::new(live());
        let analytics = InMemoryAnalytics::default();
        let m = manifest();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: Some(&mut runtime) };
        let plan = planner
            .plan(Some(&m), &analytics, &names(&["BIAS_AVAILABILITY.txt"]), &[], &mut gate)
            .await;
        assert_eq!(plan.decisions[0].chosen.as_deref(), Some("BIAS_ANCHORING.txt"));
        assert_eq!(runtime.opened_count(), 1);
        assert_eq!(runtime.logs["bias:anchoring"].opened_arms, names(&["BIAS_ANCHORING.txt"]));
    }

    #[tokio::test]
    async fn pilot_percent_zero_keeps_baseline() {
        let config = BanditConfig { early: true, pilot_percent: 0, ..live() };
        let planner = FamilyPlanner::with_sampler(config, Box::new(Fixed(0.5)));
        let analytics = InMemoryAnalytics::default();
        let m = manifest();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(Some(&m), &analytics, &names(&["TONE_DIRECT.txt"]), &[], &mut gate)
            .await;
        assert_eq!(plan.decisions[0].chosen_by, ChosenBy::Baseline);
        assert_eq!(plan.decisions[0].chosen.as_deref(), Some("TONE_WARM.txt"));
    }

    /// Yields queued units, then its fallback; normals are always zero.
    struct Sequence {
        units: Vec<f64>,
        fallback: f64,
    }

    impl Sampler for Sequence {
        fn unit(&mut self) -> f64 {
            if self.units.is_empty() {
                self.fallback
            } else {
                self.units.remove(0)
            }
        }
        fn standard_normal(&mut self) -> f64 {
            0.0
        }
    }

    #[tokio::test]
    async fn pilot_roll_is_shared_by_every_family_in_a_turn() {
        let config = BanditConfig { early: true, pilot_percent: 50, ..live() };
        let sampler = Sequence { units: vec![0.1], fallback: 0.9 };
        let planner = FamilyPlanner::with_sampler(config, Box::new(sampler));
        let analytics = InMemoryAnalytics::default();
        let m = manifest();
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::from(["bias:anchoring".to_string()]);
        let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
        let plan = planner
            .plan(
                Some(&m),
                &analytics,
                &names(&["TONE_DIRECT.txt", "BIAS_ANCHORING.txt"]),
                &[],
                &mut gate,
            )
            .await;
        assert_eq!(plan.decisions.len(), 2);
        assert!(plan.decisions.iter().all(|d| d.chosen_by == ChosenBy::Ts));
    }

    #[tokio::test]
    async fn better_arm_wins_most_draws() {
        let analytics = InMemoryAnalytics::default();
        for i in 0..40 {
            let good = if i % 5 == 0 { 0.0 } else { 1.0 };
            let bad = if i % 3 == 0 { 1.0 } else { 0.0 };
            analytics.record_outcome("tone", "TONE_DIRECT.txt", good).await.unwrap();
            analytics.record_outcome("tone", "TONE_WARM.txt", bad).await.unwrap();
        }
        let m = manifest();
        let planner = FamilyPlanner::with_sampler(live(), Box::new(StdRngSampler::seeded(42)));
        let d = dec(Openness::Moderate);
        let signals = BTreeSet::new();
        let mut wins = 0;
        for _ in 0..200 {
            let mut gate = GateContext { dec: &d, signals: &signals, runtime: None };
            let plan = planner
                .plan(Some(&m), &analytics, &names(&["TONE_WARM.txt"]), &[], &mut gate)
                .await;
            if plan.decisions[0].ts_pick.as_deref() == Some("TONE_DIRECT.txt") {
                wins += 1;
            }
        }
        assert!(wins >= 160, "better arm won only {wins}/200");
    }
}
