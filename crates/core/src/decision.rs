//! Decision snapshot: the per-turn conversational state.
//!
//! Produced exactly once per turn by the decision hub. Downstream stages only
//! read it, except for the append-only debug annotations (active biases and
//! selected modules).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Intensity at or above which the turn is worth remembering.
pub const MEMORY_THRESHOLD: u8 = 7;

/// How much conversational depth the turn warrants (1–3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Openness {
    Surface = 1,
    Moderate = 2,
    Deep = 3,
}

impl Openness {
    pub fn level(self) -> u8 {
        self as u8
    }
}

impl From<Openness> for u8 {
    fn from(value: Openness) -> Self {
        value.level()
    }
}

impl TryFrom<u8> for Openness {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Openness::Surface),
            2 => Ok(Openness::Moderate),
            3 => Ok(Openness::Deep),
            other => Err(format!("openness must be 1, 2 or 3 (got {other})")),
        }
    }
}

impl std::fmt::Display for Openness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.level())
    }
}

/// One intervention step of the response plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Step {
    /// Validate.
    V,
    /// Investigate.
    I,
    /// Act.
    A,
    Pause,
}

/// Trace of how the snapshot was derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecisionDebug {
    pub intensity_signals: Vec<String>,
    pub vulnerability_signals: Vec<String>,
    /// Heuristic signals that opened a module this turn.
    pub active_biases: Vec<String>,
    /// Final module list, filled in after stitching.
    pub selected_modules: Vec<String>,
}

/// The conversational state derived from one user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecSnapshot {
    /// Emotional charge, 0–10.
    pub intensity: u8,
    pub openness: Openness,
    pub is_vulnerable: bool,
    pub steps: Vec<Step>,
    pub save_memory: bool,
    pub has_tech_block: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub flags: BTreeMap<String, bool>,
    #[serde(default)]
    pub debug: DecisionDebug,
}

impl DecSnapshot {
    /// Case-insensitive flag lookup. Missing flags read as `false`.
    pub fn flag(&self, name: &str) -> bool {
        let key = name.trim();
        if key.is_empty() {
            return false;
        }
        self.flags
            .get(key)
            .or_else(|| self.flags.get(&key.to_lowercase()))
            .copied()
            .unwrap_or(false)
    }

    /// Append a heuristic signal that opened a module this turn.
    pub fn annotate_bias(&mut self, signal: &str) {
        if !self.debug.active_biases.iter().any(|s| s == signal) {
            self.debug.active_biases.push(signal.to_string());
        }
    }

    /// Append modules that made it into the final prompt.
    pub fn annotate_selected<I, S>(&mut self, modules: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for module in modules {
            let module = module.into();
            if !self.debug.selected_modules.contains(&module) {
                self.debug.selected_modules.push(module);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DecSnapshot {
        DecSnapshot {
            intensity: 3,
            openness: Openness::Surface,
            is_vulnerable: false,
            steps: vec![Step::V, Step::A],
            save_memory: false,
            has_tech_block: false,
            tags: BTreeSet::new(),
            domain: None,
            flags: BTreeMap::from([("greeting".to_string(), true)]),
            debug: DecisionDebug::default(),
        }
    }

    #[test]
    fn openness_serializes_as_number() {
        let json = serde_json::to_string(&Openness::Deep).unwrap();
        assert_eq!(json, "3");
        let parsed: Openness = serde_json::from_str("2").unwrap();
        assert_eq!(parsed, Openness::Moderate);
        assert!(serde_json::from_str::<Openness>("4").is_err());
    }

    #[test]
    fn flag_lookup_is_case_insensitive_and_defaults_false() {
        let dec = snapshot();
        assert!(dec.flag("greeting"));
        assert!(dec.flag("GREETING"));
        assert!(!dec.flag("crisis"));
        assert!(!dec.flag(""));
    }

    #[test]
    fn annotations_are_append_only_and_deduplicated() {
        let mut dec = snapshot();
        dec.annotate_bias("bias:anchoring");
        dec.annotate_bias("bias:anchoring");
        dec.annotate_selected(["A.txt", "B.txt"]);
        dec.annotate_selected(["A.txt"]);
        assert_eq!(dec.debug.active_biases, vec!["bias:anchoring"]);
        assert_eq!(dec.debug.selected_modules, vec!["A.txt", "B.txt"]);
    }
}
