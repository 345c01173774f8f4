//! Base module selection from the declarative selection matrix.
//!
//! Level 1 takes its `specific` list as-is. Levels 2 and 3 union `specific`
//! with their inherited layers, drop modules below their minimum intensity,
//! then apply the compiled rules: a passing rule adds its module, a failing
//! rule removes it unless it is pinned.

use promptweave_config::{ConfigError, LevelConfig, SelectionMatrixConfig};
use promptweave_core::decision::DecSnapshot;
use promptweave_core::text::normalize;
use promptweave_rules::{RuleContext, RuleSet};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::trace::{ModuleTraceEntry, TraceSource};

/// Weight of modules absent from the priority list.
pub const DEFAULT_PRIORITY: usize = 999;

/// Output of [`BaseSelector::select`].
#[derive(Debug, Clone, Default)]
pub struct BaseSelection {
    pub level: u8,
    /// Modules before gating.
    pub raw: Vec<String>,
    /// Modules after gating, sorted by priority.
    pub selected: Vec<String>,
    /// `NAME [min=N]` for every module cut by its intensity floor.
    pub cut: Vec<String>,
    pub trace: Vec<ModuleTraceEntry>,
}

pub struct BaseSelector {
    matrix: SelectionMatrixConfig,
    rules: RuleSet,
    priority: HashMap<String, usize>,
    pinned: HashSet<String>,
}

impl BaseSelector {
    /// Compile the matrix rules. Fails on an invalid expression.
    pub fn new(matrix: SelectionMatrixConfig) -> Result<Self, ConfigError> {
        let rules = matrix.compile_rules()?;
        let priority = matrix
            .priority
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let pinned = matrix.pinned.iter().cloned().collect();
        debug!(rules = rules.len(), "Base selector ready");
        Ok(Self {
            matrix,
            rules,
            priority,
            pinned,
        })
    }

    pub fn matrix(&self) -> &SelectionMatrixConfig {
        &self.matrix
    }

    pub fn is_pinned(&self, name: &str) -> bool {
        self.pinned.contains(name)
    }

    pub fn pinned(&self) -> &[String] {
        &self.matrix.pinned
    }

    pub fn identity_modules(&self) -> &[String] {
        &self.matrix.identity_modules
    }

    pub fn stitch_priority(&self, level: u8) -> &[String] {
        self.matrix
            .level(level)
            .map(|l| l.stitch_priority.as_slice())
            .unwrap_or_default()
    }

    pub fn priority_weight(&self, name: &str) -> usize {
        self.priority.get(name).copied().unwrap_or(DEFAULT_PRIORITY)
    }

    /// Deduplicate and sort by priority weight, then name.
    pub fn sort_by_priority(&self, names: impl IntoIterator<Item = String>) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out: Vec<String> = names.into_iter().filter(|n| seen.insert(n.clone())).collect();
        out.sort_by(|a, b| {
            self.priority_weight(a)
                .cmp(&self.priority_weight(b))
                .then_with(|| a.cmp(b))
        });
        out
    }

    fn level_modules(&self, level: &LevelConfig) -> Vec<String> {
        let mut seen = HashSet::new();
        level
            .specific
            .iter()
            .chain(
                level
                    .inherits
                    .iter()
                    .flat_map(|layer| self.matrix.layers.get(layer).into_iter().flatten()),
            )
            .filter(|m| seen.insert(m.as_str()))
            .cloned()
            .collect()
    }

    pub fn select(&self, dec: &DecSnapshot) -> BaseSelection {
        let level = dec.openness.level();
        let Some(config) = self.matrix.level(level) else {
            return BaseSelection {
                level,
                ..BaseSelection::default()
            };
        };
        let raw = self.level_modules(config);
        let mut trace: Vec<ModuleTraceEntry> = raw
            .iter()
            .map(|m| ModuleTraceEntry::new(m, TraceSource::Base, true, "level"))
            .collect();

        if level == 1 {
            let selected = self.sort_by_priority(raw.iter().cloned());
            return BaseSelection {
                level,
                raw,
                selected,
                cut: Vec::new(),
                trace,
            };
        }

        let mut gated: Vec<String> = raw.clone();
        let mut cut = Vec::new();
        for (module, min) in &self.matrix.min_intensity {
            if !gated.contains(module) {
                continue;
            }
            let passes = dec.intensity >= *min;
            trace.push(
                ModuleTraceEntry::new(
                    module,
                    TraceSource::Intensity,
                    passes,
                    if passes { "pass" } else { "below_min" },
                )
                .with_threshold(*min),
            );
            if !passes {
                gated.retain(|m| m != module);
                cut.push(format!("{module} [min={min}]"));
            }
        }

        let ctx = RuleContext::from_snapshot(dec);
        for outcome in self.rules.evaluate(&ctx) {
            let reason = if outcome.signals.is_empty() {
                outcome.rule.clone()
            } else {
                format!("{} [{}]", outcome.rule, outcome.signals.join(","))
            };
            trace.push(ModuleTraceEntry::new(
                &outcome.module,
                TraceSource::Rule,
                outcome.passed,
                reason,
            ));
            if outcome.passed {
                if !gated.contains(&outcome.module) {
                    gated.push(outcome.module);
                }
            } else if !self.is_pinned(&outcome.module) {
                gated.retain(|m| m != &outcome.module);
            }
        }

        let selected = self.sort_by_priority(gated);
        debug!(level, raw = raw.len(), selected = selected.len(), "Base selection done");
        BaseSelection {
            level,
            raw,
            selected,
            cut,
            trace,
        }
    }

    /// Modules of the first intent whose keywords appear in `text`.
    pub fn intent_modules(&self, text: &str) -> Vec<String> {
        let normalized = normalize(text);
        self.matrix
            .intents
            .iter()
            .find(|intent| {
                intent
                    .keywords
                    .iter()
                    .any(|k| !k.trim().is_empty() && normalized.contains(&normalize(k)))
            })
            .map(|intent| intent.modules.clone())
            .unwrap_or_default()
    }

    /// Modules switched on by caller flags such as `use_memories`.
    pub fn flag_modules(&self, dec: &DecSnapshot) -> Vec<String> {
        self.matrix
            .flag_modules
            .iter()
            .filter(|(flag, _)| dec.flag(flag))
            .map(|(_, module)| module.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptweave_config::RuleConfig;
    use promptweave_core::decision::{DecisionDebug, Openness, Step};
    use std::collections::{BTreeMap, BTreeSet};

    fn dec(intensity: u8, openness: Openness, flags: &[&str]) -> DecSnapshot {
        DecSnapshot {
            intensity,
            openness,
            is_vulnerable: openness == Openness::Deep,
            steps: vec![Step::V, Step::A],
            save_memory: intensity >= 7,
            has_tech_block: intensity >= 7,
            tags: BTreeSet::new(),
            domain: None,
            flags: flags.iter().map(|f| (f.to_string(), true)).collect::<BTreeMap<_, _>>(),
            debug: DecisionDebug::default(),
        }
    }

    fn selector() -> BaseSelector {
        BaseSelector::new(SelectionMatrixConfig::default()).unwrap()
    }

    #[test]
    fn level_one_uses_specific_only() {
        let selection = selector().select(&dec(9, Openness::Surface, &[]));
        assert_eq!(
            selection.selected,
            vec![
                "DEVELOPER_PROMPT.txt",
                "CORE_L1.txt",
                "IDENTITY_MINI.txt",
                "ANTI_SUMMARY_MIN.txt",
                "OPENNESS_SCALE.txt",
            ]
        );
        assert!(selection.cut.is_empty());
    }

    #[test]
    fn intensity_floor_cuts_modules() {
        let selection = selector().select(&dec(5, Openness::Moderate, &[]));
        assert!(!selection.selected.contains(&"VIVA_METHOD.txt".to_string()));
        assert!(!selection.selected.contains(&"MEMORY_TECH_BLOCK.txt".to_string()));
        assert!(selection.cut.contains(&"VIVA_METHOD.txt [min=7]".to_string()));
        assert!(selection.selected.contains(&"IDENTITY.txt".to_string()));
    }

    #[test]
    fn rules_gate_deep_modules() {
        let selection = selector().select(&dec(8, Openness::Deep, &[]));
        assert!(selection.selected.contains(&"VIVA_METHOD.txt".to_string()));
        assert!(selection.selected.contains(&"HEURISTIC_AVAILABILITY.txt".to_string()));

        let practical = selector().select(&dec(8, Openness::Deep, &["practical_request"]));
        assert!(!practical.selected.contains(&"VIVA_METHOD.txt".to_string()));
        assert!(!practical.selected.contains(&"HEURISTIC_AVAILABILITY.txt".to_string()));
        let rule_entry = practical
            .trace
            .iter()
            .find(|e| e.id == "VIVA_METHOD.txt" && e.source == TraceSource::Rule)
            .unwrap();
        assert!(!rule_entry.activated);
    }

    #[test]
    fn selection_is_priority_ordered() {
        let s = selector();
        let selection = s.select(&dec(8, Openness::Deep, &[]));
        let weights: Vec<usize> = selection.selected.iter().map(|m| s.priority_weight(m)).collect();
        let mut sorted = weights.clone();
        sorted.sort();
        assert_eq!(weights, sorted);
    }

    #[test]
    fn failing_rule_keeps_pinned_module() {
        let mut matrix = SelectionMatrixConfig::default();
        matrix.rules.push(RuleConfig {
            module: "DEVELOPER_PROMPT.txt".into(),
            when: "intensity >= 9".into(),
            description: String::new(),
        });
        matrix.levels.get_mut("2").unwrap().specific.push("DEVELOPER_PROMPT.txt".into());
        let selection = BaseSelector::new(matrix).unwrap().select(&dec(5, Openness::Moderate, &[]));
        assert_eq!(selection.selected[0], "DEVELOPER_PROMPT.txt");
    }

    #[test]
    fn invalid_rule_fails_construction() {
        let mut matrix = SelectionMatrixConfig::default();
        matrix.rules.push(RuleConfig {
            module: "X.txt".into(),
            when: "intensity >=".into(),
            description: String::new(),
        });
        assert!(BaseSelector::new(matrix).is_err());
    }

    #[test]
    fn intents_and_flags() {
        let s = selector();
        assert_eq!(
            s.intent_modules("Quero revisitar uma lembrança"),
            vec!["MEMORY_REVISIT.txt", "PRESENT_OBSERVER.txt"]
        );
        assert!(s.intent_modules("bom dia").is_empty());
        assert_eq!(
            s.flag_modules(&dec(3, Openness::Surface, &["use_memories"])),
            vec!["MEMORY_WEAVING.txt"]
        );
    }
}
