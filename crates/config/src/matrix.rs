//! Selection matrix: which modules each openness level starts from.
//!
//! ```toml
//! priority = ["DEVELOPER_PROMPT.txt", "CORE_L1.txt"]
//! pinned = ["DEVELOPER_PROMPT.txt"]
//! identity_modules = ["IDENTITY.txt"]
//!
//! [layers]
//! core = ["IDENTITY.txt", "TONE_MODULATION.txt"]
//!
//! [levels.1]
//! specific = ["CORE_L1.txt"]
//! stitch_priority = ["CORE_L1.txt"]
//!
//! [levels.2]
//! inherits = ["core"]
//!
//! [min_intensity]
//! "VIVA_METHOD.txt" = 7
//!
//! [[rules]]
//! module = "VIVA_METHOD.txt"
//! when = "intensity>=7 && level>=2"
//! ```

use crate::ConfigError;
use promptweave_rules::RuleSet;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Modules declared for one openness level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelConfig {
    #[serde(default)]
    pub specific: Vec<String>,

    /// Layer names whose modules are appended after `specific`.
    #[serde(default)]
    pub inherits: Vec<String>,

    /// Modules placed first when stitching this level.
    #[serde(default)]
    pub stitch_priority: Vec<String>,
}

/// A boolean gate on one module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub module: String,
    pub when: String,
    #[serde(default)]
    pub description: String,
}

/// Keywords that pull extra modules into the turn.
///
/// Entries are tried in order; the first with a matching keyword wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConfig {
    pub name: String,
    /// Matched against diacritic-folded, lowercased text.
    pub keywords: Vec<String>,
    pub modules: Vec<String>,
}

/// The selection matrix document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionMatrixConfig {
    /// Global ordering; index is the module's weight, unlisted modules sort last.
    #[serde(default)]
    pub priority: Vec<String>,

    /// Modules kept regardless of budget.
    #[serde(default)]
    pub pinned: Vec<String>,

    /// Modules dropped by the stitcher at levels 2 and 3.
    #[serde(default)]
    pub identity_modules: Vec<String>,

    #[serde(default)]
    pub layers: BTreeMap<String, Vec<String>>,

    /// Keyed by level number ("1", "2", "3").
    #[serde(default)]
    pub levels: BTreeMap<String, LevelConfig>,

    #[serde(default)]
    pub min_intensity: BTreeMap<String, u8>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Snapshot flag → module added as a footer when the flag is set.
    #[serde(default)]
    pub flag_modules: BTreeMap<String, String>,

    #[serde(default)]
    pub intents: Vec<IntentConfig>,
}

impl SelectionMatrixConfig {
    /// Load a matrix file, or the built-in matrix when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let matrix: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        matrix.validate()?;
        tracing::debug!(
            path = %path.display(),
            rules = matrix.rules.len(),
            layers = matrix.layers.len(),
            "Selection matrix loaded"
        );
        Ok(matrix)
    }

    pub fn level(&self, level: u8) -> Option<&LevelConfig> {
        self.levels.get(&level.to_string())
    }

    /// Compile every rule expression.
    pub fn compile_rules(&self) -> Result<RuleSet, ConfigError> {
        RuleSet::compile(
            self.rules
                .iter()
                .map(|r| (r.module.as_str(), r.when.as_str(), r.description.as_str())),
        )
        .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for level in 1..=3u8 {
            let Some(cfg) = self.level(level) else {
                return Err(ConfigError::ValidationError(format!(
                    "selection matrix is missing level {level}"
                )));
            };
            if let Some(layer) = cfg.inherits.iter().find(|l| !self.layers.contains_key(*l)) {
                return Err(ConfigError::ValidationError(format!(
                    "level {level} inherits unknown layer '{layer}'"
                )));
            }
        }
        if let Some(key) = self.levels.keys().find(|k| !matches!(k.as_str(), "1" | "2" | "3")) {
            return Err(ConfigError::ValidationError(format!(
                "unknown level '{key}' (expected 1, 2 or 3)"
            )));
        }
        if let Some((module, v)) = self.min_intensity.iter().find(|(_, v)| **v > 10) {
            return Err(ConfigError::ValidationError(format!(
                "min_intensity for '{module}' is {v}, must be 0-10"
            )));
        }
        let identity: BTreeSet<&str> = self.identity_modules.iter().map(String::as_str).collect();
        if let Some(module) = self.pinned.iter().find(|m| identity.contains(m.as_str())) {
            return Err(ConfigError::ValidationError(format!(
                "'{module}' cannot be both pinned and an identity module"
            )));
        }
        self.compile_rules()?;
        Ok(())
    }
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn rule(module: &str, when: &str, description: &str) -> RuleConfig {
    RuleConfig {
        module: module.into(),
        when: when.into(),
        description: description.into(),
    }
}

fn intent(name: &str, keywords: &[&str], modules: &[&str]) -> IntentConfig {
    IntentConfig {
        name: name.into(),
        keywords: names(keywords),
        modules: names(modules),
    }
}

impl Default for SelectionMatrixConfig {
    fn default() -> Self {
        let deep_levels = LevelConfig {
            specific: vec![],
            inherits: names(&["core", "advanced"]),
            stitch_priority: names(&["TONE_MODULATION.txt", "SENSITIVE_CLOSING.txt"]),
        };

        Self {
            priority: names(&[
                "DEVELOPER_PROMPT.txt",
                "CORE_L1.txt",
                "IDENTITY_MINI.txt",
                "IDENTITY.txt",
                "ANTI_SUMMARY_MIN.txt",
                "OPENNESS_SCALE.txt",
                "INTENSITY_SCALE.txt",
                "TONE_MODULATION.txt",
                "VIVA_METHOD.txt",
                "HEURISTIC_AVAILABILITY.txt",
                "HEURISTIC_OVERCONFIDENCE.txt",
                "MEMORY_TECH_BLOCK.txt",
                "SENSITIVE_CLOSING.txt",
                "MEMORY_WEAVING.txt",
                "PATTERN_SYNTHESIS.txt",
            ]),
            pinned: names(&[
                "DEVELOPER_PROMPT.txt",
                "CORE_L1.txt",
                "IDENTITY_MINI.txt",
                "TONE_MODULATION.txt",
            ]),
            identity_modules: names(&["IDENTITY.txt"]),
            layers: BTreeMap::from([
                (
                    "core".to_string(),
                    names(&["IDENTITY.txt", "TONE_MODULATION.txt", "SENSITIVE_CLOSING.txt"]),
                ),
                (
                    "advanced".to_string(),
                    names(&[
                        "OPENNESS_SCALE.txt",
                        "INTENSITY_SCALE.txt",
                        "VIVA_METHOD.txt",
                        "MEMORY_TECH_BLOCK.txt",
                        "HEURISTIC_AVAILABILITY.txt",
                        "HEURISTIC_OVERCONFIDENCE.txt",
                    ]),
                ),
            ]),
            levels: BTreeMap::from([
                (
                    "1".to_string(),
                    LevelConfig {
                        specific: names(&[
                            "DEVELOPER_PROMPT.txt",
                            "CORE_L1.txt",
                            "IDENTITY_MINI.txt",
                            "ANTI_SUMMARY_MIN.txt",
                            "OPENNESS_SCALE.txt",
                        ]),
                        inherits: vec![],
                        stitch_priority: names(&["CORE_L1.txt", "ANTI_SUMMARY_MIN.txt"]),
                    },
                ),
                ("2".to_string(), deep_levels.clone()),
                ("3".to_string(), deep_levels),
            ]),
            min_intensity: BTreeMap::from([
                ("MEMORY_TECH_BLOCK.txt".to_string(), 7),
                ("VIVA_METHOD.txt".to_string(), 7),
            ]),
            rules: vec![
                rule(
                    "VIVA_METHOD.txt",
                    "intensity>=7 && level>=2 && !practical_request && !greeting && !factual && !fatigue && !venting",
                    "Full method only for charged, open turns",
                ),
                rule("MEMORY_TECH_BLOCK.txt", "intensity>=7", "Memory block when saving"),
                rule("OPENNESS_SCALE.txt", "level>=1", ""),
                rule("INTENSITY_SCALE.txt", "level>=1", ""),
                rule("SENSITIVE_CLOSING.txt", "level>=1", ""),
                rule(
                    "HEURISTIC_AVAILABILITY.txt",
                    "(intensity<=2 || intensity>=8) && level>=2 && !practical_request",
                    "Availability check at the extremes",
                ),
                rule(
                    "HEURISTIC_OVERCONFIDENCE.txt",
                    "((intensity>=2 && intensity<=6) || intensity>=8) && level>=2 && !practical_request",
                    "",
                ),
            ],
            flag_modules: BTreeMap::from([
                ("use_memories".to_string(), "MEMORY_WEAVING.txt".to_string()),
                ("pattern_synthesis".to_string(), "PATTERN_SYNTHESIS.txt".to_string()),
            ]),
            intents: vec![
                intent(
                    "revisit",
                    &["revisitar", "momento marcante", "lembranca"],
                    &["MEMORY_REVISIT.txt", "PRESENT_OBSERVER.txt"],
                ),
                intent(
                    "bias_check",
                    &["vies", "vieses", "atalho mental", "me enganando", "heuristic"],
                    &[
                        "HEURISTIC_ANCHORING.txt",
                        "HEURISTIC_AVAILABILITY.txt",
                        "HEURISTIC_OVERCONFIDENCE.txt",
                    ],
                ),
                intent(
                    "stoic",
                    &["estoic", "sob meu controle", "no seu controle"],
                    &["RATIONAL_PRESENCE.txt"],
                ),
                intent(
                    "courage",
                    &["me expor mais", "vulnerabil"],
                    &["VULNERABILITY_DEFENSES.txt"],
                ),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_matrix_is_valid() {
        let matrix = SelectionMatrixConfig::default();
        assert!(matrix.validate().is_ok());
        assert_eq!(matrix.compile_rules().unwrap().len(), matrix.rules.len());
        assert_eq!(matrix.level(1).unwrap().specific.len(), 5);
        assert_eq!(matrix.level(3).unwrap().inherits, vec!["core", "advanced"]);
    }

    #[test]
    fn builtin_roundtrips_through_toml() {
        let matrix = SelectionMatrixConfig::default();
        let text = toml::to_string_pretty(&matrix).unwrap();
        let parsed: SelectionMatrixConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, matrix);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matrix.toml");
        std::fs::write(
            &path,
            r#"
pinned = ["A.txt"]

[layers]
base = ["B.txt"]

[levels.1]
specific = ["A.txt"]

[levels.2]
inherits = ["base"]

[levels.3]
inherits = ["base"]

[[rules]]
module = "B.txt"
when = "level >= 2"
"#,
        )
        .unwrap();
        let matrix = SelectionMatrixConfig::load(Some(&path)).unwrap();
        assert_eq!(matrix.pinned, vec!["A.txt"]);
        assert_eq!(matrix.rules[0].description, "");
        assert!(matrix.intents.is_empty());
    }

    #[test]
    fn malformed_rule_is_validation_error() {
        let mut matrix = SelectionMatrixConfig::default();
        matrix.rules.push(rule("X.txt", "intensity >=", ""));
        assert!(matches!(
            matrix.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn unknown_layer_rejected() {
        let mut matrix = SelectionMatrixConfig::default();
        if let Some(level) = matrix.levels.get_mut("2") {
            level.inherits.push("ghost".into());
        }
        let err = matrix.validate().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn missing_level_rejected() {
        let mut matrix = SelectionMatrixConfig::default();
        matrix.levels.remove("3");
        assert!(matrix.validate().is_err());
    }

    #[test]
    fn pinned_identity_module_rejected() {
        let mut matrix = SelectionMatrixConfig::default();
        matrix.pinned.push("IDENTITY.txt".into());
        assert!(matrix.validate().is_err());
    }
}
