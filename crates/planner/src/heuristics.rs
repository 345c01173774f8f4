//! Heuristic signal engine.
//!
//! Scores named signals (negation, rumination, `bias:*`, ...) from the
//! message text, passive behavioral cues and externally supplied flags, then
//! folds them into per-identity history:
//!
//! - scores decay with a configurable half-life between observations
//! - a signal that opened an arm is suppressed for `cooldown_turns` turns
//!   unless its fresh score reaches the hard-override threshold
//! - signals unseen for longer than the TTL are evicted
//!
//! Identity history lives in a bounded, idle-expiring cache. Each identity is
//! guarded by its own mutex so concurrent turns for the same user serialize on
//! turn-counter and cooldown updates.

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use promptweave_config::HeuristicsConfig;
use promptweave_core::decision::DecSnapshot;
use promptweave_core::signal::{HeuristicSignalDetail, SignalSource};
use promptweave_core::text::normalize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::lexicon::Lexicon;

/// Confidence assigned to signals that come from external classifier flags.
pub const FLAG_SIGNAL_SCORE: f64 = 0.78;

/// Memory token count at or above which `memoria:alta` is emitted.
pub const MEMORY_TOKENS_HIGH: usize = 220;

pub const SIGNAL_INTENSITY_HIGH: &str = "intensity:alta";
pub const SIGNAL_MEMORY_HIGH: &str = "memoria:alta";
pub const SIGNAL_RATIONAL_PRESENCE: &str = "presenca_racional";

const PATTERN_SIGNALS: [&str; 9] = [
    "negation",
    "uncertainty",
    "urgency",
    "self_blame",
    "catastrophizing",
    "rumination",
    "people_pleasing",
    "perfectionism",
    "avoidance",
];

/// Whether `signal` is scored by the engine (and so subject to decay and
/// cooldown) rather than derived from the snapshot.
pub fn is_heuristic_signal(signal: &str) -> bool {
    signal.starts_with("bias:") || PATTERN_SIGNALS.contains(&signal)
}

/// External flag → signal it raises.
const FLAG_SIGNALS: [(&str, &str); 5] = [
    ("anchoring", "bias:anchoring"),
    ("causes_over_statistics", "bias:causes_over_statistics"),
    ("emotional_certainty", "bias:emotional_certainty"),
    ("expert_intuition_excess", "bias:expert_intuition"),
    ("ignores_regression_to_mean", "bias:regression_to_mean"),
];

/// Passive cue → `(signal, boost)` pairs.
const PASSIVE_BOOSTS: [(&str, &[(&str, f64)]); 3] = [
    ("typing_bursts", &[("urgency", 0.12)]),
    ("fast_followup", &[("rumination", 0.15), ("urgency", 0.08)]),
    ("message_edits", &[("perfectionism", 0.14)]),
];

// ── Registry ──────────────────────────────────────────────────────────────

struct SignalPattern {
    name: &'static str,
    base: f64,
    increment: f64,
    lexicon: Lexicon,
}

impl SignalPattern {
    fn new(name: &'static str, base: f64, increment: f64, patterns: &[&str]) -> Self {
        Self {
            name,
            base,
            increment,
            lexicon: Lexicon::new(patterns),
        }
    }

    /// `min(1, base + (hits - 1) * increment)`, or `None` without a hit.
    fn score(&self, normalized: &str) -> Option<f64> {
        let hits = self.lexicon.count(normalized);
        (hits > 0).then(|| (self.base + (hits - 1) as f64 * self.increment).min(1.0))
    }

    fn is_bias(&self) -> bool {
        self.name.starts_with("bias:")
    }
}

fn registry() -> Vec<SignalPattern> {
    vec![
        SignalPattern::new(
            "negation",
            0.48,
            0.08,
            &[
                r"\bnao posso\b",
                r"\bnao consigo\b",
                r"\bnunca\b",
                r"\bjamais\b",
                r"\bninguem\b",
                r"\bnenhum[ao]?\b",
                r"\bnada funciona\b",
            ],
        ),
        SignalPattern::new(
            "uncertainty",
            0.5,
            0.07,
            &[
                r"\bnao sei\b",
                r"\bnao tenho certeza\b",
                r"\bincert[oa]\b",
                r"\bduvida\b",
                r"\bacho que\b",
                r"\btalvez\b",
                r"\bpode ser que\b",
            ],
        ),
        SignalPattern::new(
            "urgency",
            0.55,
            0.09,
            &[
                r"\bpreciso resolver agora\b",
                r"\bpreciso agir\b",
                r"\bnao aguento mais\b",
                r"\burgente\b",
                r"\bpra ontem\b",
                r"\bimediat[oa]\b",
                r"!!!+",
                r"\bdesesperad[ao]\b",
            ],
        ),
        SignalPattern::new(
            "self_blame",
            0.6,
            0.08,
            &[
                r"\bminha culpa\b",
                r"\bculp[ao]d[ao]?\b",
                r"\bdeveria ter\b",
                r"\bfiz tudo errado\b",
                r"\berrei feio\b",
                r"\bsempre estrago\b",
            ],
        ),
        SignalPattern::new(
            "catastrophizing",
            0.56,
            0.08,
            &[
                r"\bnada vai dar certo\b",
                r"\btudo perdido\b",
                r"\bdesastre\b",
                r"\bnunca vai melhorar\b",
                r"\bso vejo tragedia\b",
                r"\bvai dar tudo errado\b",
            ],
        ),
        SignalPattern::new(
            "rumination",
            0.52,
            0.08,
            &[
                r"\bnao paro de pensar\b",
                r"\bfico revivendo\b",
                r"\bvolto sempre nisso\b",
                r"\bpensando nisso o tempo todo\b",
                r"\brepasso mentalmente\b",
                r"\bsempre volto nessa historia\b",
            ],
        ),
        SignalPattern::new(
            "people_pleasing",
            0.5,
            0.08,
            &[
                r"\bnao sei dizer nao\b",
                r"\bpreciso agradar\b",
                r"\bagradar todo mundo\b",
                r"\bmedo de decepcionar\b",
                r"\bmedo de desapontar\b",
                r"\bcoloco todos antes de mim\b",
            ],
        ),
        SignalPattern::new(
            "perfectionism",
            0.57,
            0.07,
            &[
                r"\btem que ser perfeito\b",
                r"\bnao posso errar\b",
                r"\bperfeccionista\b",
                r"\bpreciso fazer tudo perfeito\b",
                r"\berro nao e opcao\b",
                r"\bnao aceito falhas\b",
            ],
        ),
        SignalPattern::new(
            "avoidance",
            0.46,
            0.08,
            &[
                r"\bestou evitando\b",
                r"\badi[ao]ando\b",
                r"\bsempre procrastino\b",
                r"\bfujo disso\b",
                r"\bdepois eu vejo\b",
                r"\bnao encaro\b",
            ],
        ),
        SignalPattern::new(
            "bias:anchoring",
            0.55,
            0.08,
            &[
                r"\bantes era melhor\b",
                r"\bvoltar como antes\b",
                r"\bno passado\b",
                r"\bnaquela epoca\b",
                r"\bquando eu era\b",
                r"\bdesde que (tudo|isso) aconteceu\b",
            ],
        ),
        SignalPattern::new(
            "bias:causes_over_statistics",
            0.55,
            0.08,
            &[
                r"\bconheco um caso\b",
                r"\baconteceu com meu\b",
                r"\bum amigo passou\b",
                r"\bcaso real prova\b",
                r"\bmesmo que as? estatistic",
            ],
        ),
        SignalPattern::new(
            "bias:emotional_certainty",
            0.55,
            0.08,
            &[
                r"\bsinto que e verdade\b",
                r"\bno fundo eu sei\b",
                r"\bmeu coracao diz\b",
                r"\bsensacao de certeza\b",
            ],
        ),
        SignalPattern::new(
            "bias:availability",
            0.55,
            0.08,
            &[
                r"\bnao paro de ver\b",
                r"\btoda hora vejo\b",
                r"\bultimamente so vejo\b",
                r"\bvi nas noticias\b",
                r"\baconteceu ontem de novo\b",
            ],
        ),
        SignalPattern::new(
            "bias:overconfidence",
            0.55,
            0.08,
            &[
                r"\btenho certeza absoluta\b",
                r"\bimpossivel dar errado\b",
                r"\bnunca falho\b",
                r"\bvai dar certo sim\b",
                r"\bsou muito bom nisso\b",
            ],
        ),
        SignalPattern::new(
            "bias:illusion_of_understanding",
            0.55,
            0.08,
            &[
                r"\beu sabia que\b",
                r"\bsempre soube\b",
                r"\bficou obvio depois\b",
                r"\bera claro desde o inicio\b",
            ],
        ),
        SignalPattern::new(
            "bias:illusion_of_validity",
            0.55,
            0.08,
            &[
                r"\bparece certo\b",
                r"\bparece verdade\b",
                r"\bminha intuicao diz\b",
                r"\bsigo meu feeling\b",
            ],
        ),
        SignalPattern::new(
            "bias:expert_intuition",
            0.55,
            0.08,
            &[
                r"\banos na area\b",
                r"\bminha experiencia mostra\b",
                r"\bja vi isso mil vezes\b",
                r"\bconfie em mim eu sei\b",
            ],
        ),
        SignalPattern::new(
            "bias:regression_to_mean",
            0.55,
            0.08,
            &[
                r"\bfoi muita sorte\b",
                r"\bfoi puro azar\b",
                r"\bsempre acontece assim\b",
                r"\bbate recorde toda vez\b",
                r"\blogo volta ao normal\b",
            ],
        ),
    ]
}

// ── Identity state ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct StoredSignal {
    last_score: f64,
    last_seen_ms: i64,
    source: SignalSource,
}

/// Signal history for one identity.
#[derive(Debug, Default)]
pub struct IdentityState {
    turn: u64,
    signals: HashMap<String, StoredSignal>,
    last_fired: HashMap<String, u64>,
}

impl IdentityState {
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn tracked_signals(&self) -> usize {
        self.signals.len()
    }
}

type IdentityHandle = Arc<Mutex<IdentityState>>;

// ── Runtime ───────────────────────────────────────────────────────────────

/// Per-signal trace for the debug log.
#[derive(Debug, Clone, Serialize)]
pub struct HeuristicLogEntry {
    pub signal: String,
    pub current: f64,
    pub decayed: f64,
    pub effective: f64,
    pub source: SignalSource,
    pub last_seen_at: DateTime<Utc>,
    pub ttl_seconds: u64,
    pub cooldown_active: bool,
    pub turns_since_fired: Option<u64>,
    pub opened_arms: Vec<String>,
    /// `cooldown`, `low_score` and/or `max_limit`.
    pub suppressed_by: BTreeSet<String>,
}

/// Outcome of one evaluation, consulted by the bandit gate.
#[derive(Debug)]
pub struct HeuristicsRuntime {
    pub turn: u64,
    pub identity: Option<String>,
    pub details: BTreeMap<String, HeuristicSignalDetail>,
    pub logs: BTreeMap<String, HeuristicLogEntry>,
    module_signals: HashMap<String, String>,
    opened_count: usize,
    max_arms: usize,
    state: Option<IdentityHandle>,
}

impl HeuristicsRuntime {
    fn empty(identity: Option<String>, max_arms: usize) -> Self {
        Self {
            turn: 0,
            identity,
            details: BTreeMap::new(),
            logs: BTreeMap::new(),
            module_signals: HashMap::new(),
            opened_count: 0,
            max_arms,
            state: None,
        }
    }

    pub fn detail(&self, signal: &str) -> Option<&HeuristicSignalDetail> {
        self.details.get(signal)
    }

    /// Signals passing the default threshold this turn.
    pub fn passing_signals(&self) -> impl Iterator<Item = &str> {
        self.details
            .values()
            .filter(|d| d.passes_default)
            .map(|d| d.signal.as_str())
    }

    /// Gate check for `arm`, which requires `signal`.
    ///
    /// With `min` set, the arm opens when the effective score reaches it and
    /// cooldown does not suppress the signal; otherwise `passes_default`
    /// decides. At most `max_arms` arms open per turn.
    pub fn open_arm(&mut self, arm: &str, signal: &str, min: Option<f64>) -> bool {
        let Some(detail) = self.details.get(signal) else {
            return false;
        };
        let passes = match min {
            Some(min) => detail.effective_score >= min && !detail.suppressed_by_cooldown,
            None => detail.passes_default,
        };
        if !passes {
            return false;
        }
        if self.opened_count >= self.max_arms {
            if let Some(entry) = self.logs.get_mut(signal) {
                entry.suppressed_by.insert("max_limit".into());
            }
            debug!(arm, signal, max_arms = self.max_arms, "Arm gate hit max_limit");
            return false;
        }
        self.module_signals
            .insert(arm.to_string(), signal.to_string());
        true
    }

    /// Signal that opened `arm` this turn, if any.
    pub fn signal_for(&self, arm: &str) -> Option<&str> {
        self.module_signals.get(arm).map(String::as_str)
    }

    pub fn opened_count(&self) -> usize {
        self.opened_count
    }

    /// Record that `arm` was adopted: counts it against `max_arms` and stamps
    /// the opening signal's last-fired turn. Returns that signal.
    pub async fn register_selection(&mut self, arm: &str) -> Option<String> {
        let signal = self.module_signals.get(arm)?.clone();
        self.opened_count += 1;
        if let Some(entry) = self.logs.get_mut(&signal) {
            entry.opened_arms.push(arm.to_string());
        }
        if let Some(state) = &self.state {
            state.lock().await.last_fired.insert(signal.clone(), self.turn);
        }
        debug!(arm, signal = %signal, turn = self.turn, "Heuristic arm registered");
        Some(signal)
    }
}

// ── Engine ────────────────────────────────────────────────────────────────

/// Inputs for one evaluation.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicsInput<'a> {
    pub identity: Option<&'a str>,
    pub text: &'a str,
    pub passive_signals: &'a [String],
    pub flag_signals: &'a [String],
    pub now_ms: i64,
}

pub struct HeuristicsEngine {
    config: HeuristicsConfig,
    registry: Vec<SignalPattern>,
    rational_cues: Lexicon,
    identities: Cache<String, IdentityHandle>,
}

impl HeuristicsEngine {
    pub fn new(config: HeuristicsConfig) -> Self {
        let identities = Cache::builder()
            .max_capacity(config.identity_capacity.max(1))
            .time_to_idle(Duration::from_secs(config.identity_idle_minutes.max(1) * 60))
            .build();
        Self {
            config,
            registry: registry(),
            rational_cues: Lexicon::new(&[
                r"analise racional",
                r"pensar com calma",
                r"olhar racional",
                r"quero algo objetivo",
                r"presenca racional",
                r"perspectiva logica",
                r"menos emocional",
                r"\bracional\b",
                r"\blogic[ao]\b",
            ]),
            identities,
        }
    }

    pub fn config(&self) -> &HeuristicsConfig {
        &self.config
    }

    /// Signals raised by external classifier flags.
    pub fn flag_signals(flags: &BTreeMap<String, bool>) -> Vec<String> {
        FLAG_SIGNALS
            .iter()
            .filter(|(flag, _)| flags.get(*flag).copied().unwrap_or(false))
            .map(|(_, signal)| signal.to_string())
            .collect()
    }

    /// Fresh scores for this turn: patterns, then flag signals, then passive
    /// boosts.
    pub fn score(
        &self,
        text: &str,
        flag_signals: &[String],
        passive_signals: &[String],
    ) -> BTreeMap<String, (f64, SignalSource)> {
        let normalized = normalize(text);
        let mut scores: BTreeMap<String, (f64, SignalSource)> = self
            .registry
            .iter()
            .filter_map(|p| {
                p.score(&normalized)
                    .map(|s| (p.name.to_string(), (s, SignalSource::Pattern)))
            })
            .collect();

        for signal in flag_signals.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let score = scores
                .get(signal)
                .map_or(FLAG_SIGNAL_SCORE, |(s, _)| s.max(FLAG_SIGNAL_SCORE));
            scores.insert(signal.to_string(), (score, SignalSource::Nlp));
        }

        let mut boosts: BTreeMap<&str, f64> = BTreeMap::new();
        for passive in passive_signals.iter().map(|s| s.trim().to_lowercase()) {
            let Some((_, targets)) = PASSIVE_BOOSTS.iter().find(|(name, _)| *name == passive) else {
                continue;
            };
            for &(target, boost) in targets.iter() {
                let entry = boosts.entry(target).or_insert(0.0);
                *entry = entry.max(boost);
            }
        }
        for (target, boost) in boosts {
            let (base, source) = scores
                .get(target)
                .copied()
                .unwrap_or((0.0, SignalSource::Pattern));
            let source = if source == SignalSource::Nlp {
                SignalSource::Nlp
            } else {
                SignalSource::Behavior
            };
            scores.insert(target.to_string(), ((base + boost).min(1.0), source));
        }
        scores
    }

    fn identity_state(&self, identity: &str) -> IdentityHandle {
        self.identities
            .get_with(identity.to_string(), || Arc::new(Mutex::new(IdentityState::default())))
    }

    /// Evaluate one turn and fold the result into identity history.
    pub async fn evaluate(&self, input: HeuristicsInput<'_>) -> HeuristicsRuntime {
        let identity = input
            .identity
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let text = input.text.trim();
        if text.is_empty() && input.flag_signals.is_empty() {
            return HeuristicsRuntime::empty(identity, self.config.max_arms_per_turn);
        }

        let handle = identity.as_deref().map(|id| self.identity_state(id));
        let mut guard = match &handle {
            Some(handle) => Some(handle.lock().await),
            None => None,
        };

        let turn = match guard.as_deref_mut() {
            Some(state) => {
                state.turn += 1;
                state.turn
            }
            None => 0,
        };

        let fresh = self.score(text, input.flag_signals, input.passive_signals);
        let now_ms = input.now_ms;
        let ttl_ms = self.config.ttl_seconds as i64 * 1000;
        let half_life_ms = (self.config.half_life_minutes * 60_000.0).max(1.0);

        let mut union: BTreeSet<String> = fresh.keys().cloned().collect();
        if let Some(state) = guard.as_deref() {
            union.extend(state.signals.keys().cloned());
        }

        let mut details = BTreeMap::new();
        let mut logs = BTreeMap::new();
        for signal in union {
            let observed = fresh.get(&signal).copied();
            let stored = guard
                .as_deref()
                .and_then(|state| state.signals.get(&signal).copied());

            let previous_seen_ms = stored.map_or(now_ms, |s| s.last_seen_ms);
            let age_ms = now_ms - previous_seen_ms;
            if observed.is_none() && age_ms > ttl_ms {
                if let Some(state) = guard.as_deref_mut() {
                    state.signals.remove(&signal);
                }
                debug!(signal = %signal, age_ms, "Evicted stale heuristic signal");
                continue;
            }

            let last_score = stored.map_or(0.0, |s| s.last_score);
            let source = observed
                .map(|(_, source)| source)
                .or(stored.map(|s| s.source))
                .unwrap_or_default();
            let current = observed.map_or(0.0, |(score, _)| score);
            let last_seen_ms = if observed.is_some() { now_ms } else { previous_seen_ms };

            let decayed = if age_ms > 0 && last_score > 0.0 {
                decay(last_score, age_ms as f64, half_life_ms)
            } else {
                0.0
            };
            let effective = current.max(decayed);

            let last_fired = guard
                .as_deref()
                .and_then(|state| state.last_fired.get(&signal).copied());
            let turns_since_fired = last_fired.filter(|_| turn > 0).map(|f| turn.saturating_sub(f));
            let cooldown_active =
                turns_since_fired.is_some_and(|since| since <= self.config.cooldown_turns);
            let suppressed = cooldown_active && current < self.config.hard_override;
            let passes_default = effective >= self.config.default_min_score && !suppressed;

            let last_seen_at = DateTime::from_timestamp_millis(last_seen_ms).unwrap_or_default();
            let mut suppressed_by = BTreeSet::new();
            if suppressed {
                suppressed_by.insert("cooldown".to_string());
            }
            if effective < self.config.default_min_score {
                suppressed_by.insert("low_score".to_string());
            }

            details.insert(
                signal.clone(),
                HeuristicSignalDetail {
                    signal: signal.clone(),
                    current_score: current,
                    decayed_score: decayed,
                    effective_score: effective,
                    last_seen_at,
                    ttl_seconds: self.config.ttl_seconds,
                    source,
                    cooldown_active,
                    turns_since_fired,
                    passes_default,
                    suppressed_by_cooldown: suppressed,
                },
            );
            logs.insert(
                signal.clone(),
                HeuristicLogEntry {
                    signal: signal.clone(),
                    current,
                    decayed,
                    effective,
                    source,
                    last_seen_at,
                    ttl_seconds: self.config.ttl_seconds,
                    cooldown_active,
                    turns_since_fired,
                    opened_arms: Vec::new(),
                    suppressed_by,
                },
            );

            if let Some(state) = guard.as_deref_mut() {
                if current > 0.0 {
                    state.signals.insert(
                        signal,
                        StoredSignal {
                            last_score: current,
                            last_seen_ms: now_ms,
                            source,
                        },
                    );
                } else if decayed <= 0.0 {
                    state.signals.remove(&signal);
                }
            }
        }
        drop(guard);

        debug!(
            identity = identity.as_deref().unwrap_or("anon"),
            turn,
            signals = details.len(),
            "Heuristics evaluated"
        );

        HeuristicsRuntime {
            turn,
            identity,
            details,
            logs,
            module_signals: HashMap::new(),
            opened_count: 0,
            max_arms: self.config.max_arms_per_turn,
            state: handle,
        }
    }

    /// Drop all history for `identity`.
    pub fn end_session(&self, identity: &str) {
        self.identities.invalidate(identity.trim());
        debug!(identity, "Heuristic session ended");
    }

    /// Approximate number of identities with live history.
    pub fn identity_count(&self) -> u64 {
        self.identities.run_pending_tasks();
        self.identities.entry_count()
    }

    /// Signals visible to the bandit gate and the base rules.
    ///
    /// With a runtime, every signal passing its default threshold; without
    /// one (heuristics disabled), bias pattern matches and flag-derived bias
    /// signals. Derived intensity, memory and rational-presence signals are
    /// always added.
    pub fn decision_signals(
        &self,
        runtime: Option<&HeuristicsRuntime>,
        dec: &DecSnapshot,
        text: &str,
        memory_tokens: usize,
    ) -> BTreeSet<String> {
        let normalized = normalize(text);
        let mut signals: BTreeSet<String> = match runtime {
            Some(runtime) => runtime.passing_signals().map(str::to_string).collect(),
            None => {
                let mut signals: BTreeSet<String> = self
                    .registry
                    .iter()
                    .filter(|p| p.is_bias() && p.lexicon.any(&normalized))
                    .map(|p| p.name.to_string())
                    .collect();
                signals.extend(Self::flag_signals(&dec.flags));
                signals
            }
        };
        if dec.intensity >= 7 {
            signals.insert(SIGNAL_INTENSITY_HIGH.into());
        }
        if memory_tokens >= MEMORY_TOKENS_HIGH {
            signals.insert(SIGNAL_MEMORY_HIGH.into());
        }
        if self.rational_cues.any(&normalized) {
            signals.insert(SIGNAL_RATIONAL_PRESENCE.into());
        }
        signals
    }
}

impl Default for HeuristicsEngine {
    fn default() -> Self {
        Self::new(HeuristicsConfig::default())
    }
}

/// `last * 0.5^(age / half_life)`, clamped to `[0, 1]`.
pub fn decay(last_score: f64, age_ms: f64, half_life_ms: f64) -> f64 {
    let decayed = last_score * 0.5_f64.powf(age_ms / half_life_ms.max(1.0));
    if decayed.is_finite() {
        decayed.clamp(0.0, 1.0)
    } else {
        warn!(last_score, age_ms, "Non-finite decayed score");
        0.0
    }
}
