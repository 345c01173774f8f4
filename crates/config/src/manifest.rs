//! Module manifest: families and arms for the bandit planner.
//!
//! The manifest is a JSON document:
//!
//! ```json
//! {
//!   "version": "1",
//!   "defaults": { "max_aux_tokens": 350 },
//!   "families": { "tone": { "reward_key": "tone", "baseline": "tone_warm" } },
//!   "modules": [
//!     { "id": "tone_warm", "family": "tone", "role": "instruction",
//!       "size": "S", "tokens_avg": 120 }
//!   ]
//! }
//! ```
//!
//! A manifest is either fully valid or not used at all. Callers that can
//! run without one go through [`Manifest::load_or_fallback`].

use promptweave_core::{BanditPriors, ManifestError};
use promptweave_core::text::normalize_key;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

type Extra = BTreeMap<String, serde_json::Value>;

// ── Schema ──────────────────────────────────────────────────────────────────

/// Bandit and budget defaults declared by the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDefaults {
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    #[serde(default = "default_prior")]
    pub alpha_prior: f64,

    #[serde(default = "default_prior")]
    pub beta_prior: f64,

    /// Knapsack budget for optional modules
    #[serde(default = "default_max_aux_tokens")]
    pub max_aux_tokens: usize,

    /// Added to Thompson draws of arms with few observations
    #[serde(default = "default_cold_start_boost")]
    pub cold_start_boost: f64,

    #[serde(flatten)]
    extra: Extra,
}

fn default_window_days() -> u32 {
    14
}
fn default_prior() -> f64 {
    1.5
}
fn default_max_aux_tokens() -> usize {
    350
}
fn default_cold_start_boost() -> f64 {
    0.35
}
fn default_true() -> bool {
    true
}

impl Default for ManifestDefaults {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            alpha_prior: default_prior(),
            beta_prior: default_prior(),
            max_aux_tokens: default_max_aux_tokens(),
            cold_start_boost: default_cold_start_boost(),
            extra: Extra::new(),
        }
    }
}

impl From<&ManifestDefaults> for BanditPriors {
    fn from(defaults: &ManifestDefaults) -> Self {
        Self {
            window_days: defaults.window_days,
            alpha_prior: defaults.alpha_prior,
            beta_prior: defaults.beta_prior,
        }
    }
}

/// A capability family with interchangeable arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestFamily {
    /// Filled from the map key on load.
    #[serde(skip)]
    pub id: String,

    pub reward_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    extra: Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleRole {
    Instruction,
    Context,
    Toolhint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModuleSize {
    S,
    M,
    L,
}

/// Eligibility gate of an arm.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gate {
    /// Named signal (`bias:*`, a heuristic signal, `open`, `intensity:alta`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<String>,

    /// Minimum openness level (1-3)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_open: Option<u8>,

    /// Minimum signal score in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
}

/// One arm of a family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestModule {
    pub id: String,
    pub family: String,
    pub role: ModuleRole,
    pub size: ModuleSize,
    pub tokens_avg: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gate: Option<Gate>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hint: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(flatten)]
    extra: Extra,
}

impl ManifestModule {
    /// Reward key of the arm, falling back to its family's.
    pub fn reward_key_or<'a>(&'a self, family: Option<&'a ManifestFamily>) -> &'a str {
        self.reward_key
            .as_deref()
            .or(family.map(|f| f.reward_key.as_str()))
            .unwrap_or(&self.family)
    }
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    version: String,
    #[serde(default)]
    defaults: ManifestDefaults,
    #[serde(default)]
    families: BTreeMap<String, ManifestFamily>,
    #[serde(default)]
    modules: Vec<ManifestModule>,
    #[serde(flatten)]
    extra: Extra,
}

// ── Registry ────────────────────────────────────────────────────────────────

/// A loaded, validated manifest indexed by normalized module id.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub path: Option<PathBuf>,
    pub version: String,
    pub defaults: ManifestDefaults,
    families: BTreeMap<String, ManifestFamily>,
    modules: BTreeMap<String, ManifestModule>,
    by_family: BTreeMap<String, Vec<String>>,
}

impl Manifest {
    /// Parse and validate a manifest document.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest =
            serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))?;

        if raw.version.trim().is_empty() {
            return Err(ManifestError::Validation("version must not be empty".into()));
        }

        warn_unknown("manifest", &raw.extra);
        warn_unknown("defaults", &raw.defaults.extra);

        let mut families = BTreeMap::new();
        for (id, mut family) in raw.families {
            warn_unknown(&format!("families.{id}"), &family.extra);
            family.id = id.clone();
            families.insert(id, family);
        }

        let mut modules = BTreeMap::new();
        let mut by_family: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for module in raw.modules {
            warn_unknown(&format!("modules.{}", module.id), &module.extra);
            let key = normalize_key(&module.id);
            if key.is_empty() {
                return Err(ManifestError::Validation("module id must not be empty".into()));
            }
            if modules.contains_key(&key) {
                return Err(ManifestError::Validation(format!(
                    "duplicate module id '{}'",
                    module.id
                )));
            }
            by_family
                .entry(module.family.clone())
                .or_default()
                .push(key.clone());
            modules.insert(key, module);
        }

        let manifest = Self {
            path: None,
            version: raw.version,
            defaults: raw.defaults,
            families,
            modules,
            by_family,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Load a manifest file.
    pub fn load_from(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let mut manifest = Self::from_json(&content)?;
        manifest.path = Some(path.to_path_buf());
        tracing::debug!(
            path = %path.display(),
            families = manifest.families.len(),
            modules = manifest.modules.len(),
            "Manifest loaded"
        );
        Ok(manifest)
    }

    /// Load a manifest if one is configured and valid.
    ///
    /// Any failure is logged and yields `None`: the planner then runs with
    /// [`ManifestDefaults::default`] and one-arm families.
    pub fn load_or_fallback(path: Option<&Path>) -> Option<Self> {
        let path = path?;
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Manifest not found, continuing without it");
            return None;
        }
        match Self::load_from(path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Manifest rejected, using fallback defaults");
                None
            }
        }
    }

    fn validate(&self) -> Result<(), ManifestError> {
        let d = &self.defaults;
        if d.window_days == 0 {
            return Err(ManifestError::Validation("defaults.window_days must be > 0".into()));
        }
        if d.alpha_prior <= 0.0 || d.beta_prior <= 0.0 {
            return Err(ManifestError::Validation("defaults priors must be > 0".into()));
        }
        if d.max_aux_tokens == 0 {
            return Err(ManifestError::Validation(
                "defaults.max_aux_tokens must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&d.cold_start_boost) {
            return Err(ManifestError::Validation(
                "defaults.cold_start_boost must be between 0 and 1".into(),
            ));
        }

        for family in self.families.values() {
            if family.reward_key.trim().is_empty() {
                return Err(ManifestError::Validation(format!(
                    "family '{}' has an empty reward_key",
                    family.id
                )));
            }
            if let Some(baseline) = &family.baseline {
                let in_family = self
                    .module(baseline)
                    .is_some_and(|m| m.family == family.id);
                if !in_family {
                    return Err(ManifestError::Validation(format!(
                        "family '{}' baseline '{}' is not one of its modules",
                        family.id, baseline
                    )));
                }
            }
        }

        for module in self.modules.values() {
            if !self.families.contains_key(&module.family) {
                return Err(ManifestError::Validation(format!(
                    "module '{}' references unknown family '{}'",
                    module.id, module.family
                )));
            }
            if module.tokens_avg.is_nan() || module.tokens_avg <= 0.0 {
                return Err(ManifestError::Validation(format!(
                    "module '{}' must have tokens_avg > 0",
                    module.id
                )));
            }
            for (field, refs) in [("excludes", &module.excludes), ("depends_on", &module.depends_on)] {
                if let Some(missing) = refs.iter().find(|r| self.module(r).is_none()) {
                    return Err(ManifestError::Validation(format!(
                        "module '{}' {field} unknown module '{missing}'",
                        module.id
                    )));
                }
            }
            if let Some(gate) = &module.gate {
                if gate.min_open.is_some_and(|o| !(1..=3).contains(&o)) {
                    return Err(ManifestError::Validation(format!(
                        "module '{}' gate.min_open must be 1-3",
                        module.id
                    )));
                }
                if gate.min.is_some_and(|m| !(0.0..=1.0).contains(&m)) {
                    return Err(ManifestError::Validation(format!(
                        "module '{}' gate.min must be between 0 and 1",
                        module.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Look up an arm by id, ignoring case and diacritics.
    pub fn module(&self, id: &str) -> Option<&ManifestModule> {
        self.modules.get(&normalize_key(id))
    }

    pub fn family(&self, id: &str) -> Option<&ManifestFamily> {
        self.families.get(id)
    }

    /// Arms of a family in declaration order.
    pub fn arms(&self, family: &str) -> Vec<&ManifestModule> {
        self.by_family
            .get(family)
            .map(|keys| keys.iter().filter_map(|k| self.modules.get(k)).collect())
            .unwrap_or_default()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ManifestModule> {
        self.modules.values()
    }

    pub fn family_ids(&self) -> BTreeSet<&str> {
        self.families.keys().map(String::as_str).collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    pub fn family_count(&self) -> usize {
        self.families.len()
    }
}

fn warn_unknown(scope: &str, extra: &Extra) {
    if extra.is_empty() {
        return;
    }
    let fields: Vec<&str> = extra.keys().map(String::as_str).collect();
    tracing::warn!(scope, ?fields, "Manifest has unknown fields");
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
      "version": "2024-06",
      "defaults": { "max_aux_tokens": 600, "cold_start_boost": 0.2 },
      "families": {
        "tone": { "reward_key": "tone", "baseline": "tone_warm" },
        "memory": { "reward_key": "memory" }
      },
      "modules": [
        { "id": "tone_warm", "family": "tone", "role": "instruction", "size": "S", "tokens_avg": 120 },
        { "id": "tone_direct", "family": "tone", "role": "instruction", "size": "M", "tokens_avg": 180,
          "gate": { "signal": "bias:anchoring", "min_open": 2 }, "excludes": ["memory_recall"] },
        { "id": "Memória_Recall", "family": "memory", "role": "context", "size": "L", "tokens_avg": 300,
          "depends_on": ["tone_warm"] }
      ]
    }"#;

    #[test]
    fn defaults_carry_bandit_priors() {
        let manifest = Manifest::from_json(
            r#"{ "version": "p", "defaults": { "window_days": 7, "alpha_prior": 4.0 }, "modules": [] }"#,
        )
        .unwrap();
        let priors = BanditPriors::from(&manifest.defaults);
        assert_eq!(priors.window_days, 7);
        assert_eq!(priors.alpha_prior, 4.0);
        assert_eq!(priors.beta_prior, 1.5);
        assert_eq!(BanditPriors::from(&ManifestDefaults::default()), BanditPriors::default());
    }

    #[test]
    fn parses_and_indexes() {
        let m = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(m.version, "2024-06");
        assert_eq!(m.module_count(), 3);
        assert_eq!(m.family_count(), 2);
        assert_eq!(m.defaults.max_aux_tokens, 600);
        assert_eq!(m.defaults.window_days, 14);
        assert_eq!(m.arms("tone").len(), 2);
        assert_eq!(m.arms("tone")[0].id, "tone_warm");
        assert!(m.arms("unknown").is_empty());
    }

    #[test]
    fn lookup_ignores_case_and_accents() {
        let m = Manifest::from_json(SAMPLE).unwrap();
        assert_eq!(m.module("memoria_recall").unwrap().id, "Memória_Recall");
        assert_eq!(m.module("TONE_WARM").unwrap().family, "tone");
    }

    #[test]
    fn gate_and_enabled_defaults() {
        let m = Manifest::from_json(SAMPLE).unwrap();
        let direct = m.module("tone_direct").unwrap();
        let gate = direct.gate.as_ref().unwrap();
        assert_eq!(gate.signal.as_deref(), Some("bias:anchoring"));
        assert_eq!(gate.min_open, Some(2));
        assert!(direct.enabled);
        assert_eq!(direct.reward_key_or(m.family("tone")), "tone");
    }

    #[test]
    fn unknown_family_rejected() {
        let json = r#"{"version":"1","modules":[
          {"id":"a","family":"nope","role":"context","size":"S","tokens_avg":10}]}"#;
        assert!(matches!(
            Manifest::from_json(json),
            Err(ManifestError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let json = r#"{"version":"1","families":{"f":{"reward_key":"f"}},"modules":[
          {"id":"Ação","family":"f","role":"context","size":"S","tokens_avg":10},
          {"id":"acao","family":"f","role":"context","size":"S","tokens_avg":10}]}"#;
        let err = Manifest::from_json(json).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn dangling_dependency_rejected() {
        let json = r#"{"version":"1","families":{"f":{"reward_key":"f"}},"modules":[
          {"id":"a","family":"f","role":"context","size":"S","tokens_avg":10,"depends_on":["ghost"]}]}"#;
        let err = Manifest::from_json(json).unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn zero_tokens_rejected() {
        let json = r#"{"version":"1","families":{"f":{"reward_key":"f"}},"modules":[
          {"id":"a","family":"f","role":"context","size":"S","tokens_avg":0}]}"#;
        assert!(Manifest::from_json(json).is_err());
    }

    #[test]
    fn baseline_must_belong_to_family() {
        let json = r#"{"version":"1","families":{
            "f":{"reward_key":"f","baseline":"b"},"g":{"reward_key":"g"}},"modules":[
          {"id":"a","family":"f","role":"context","size":"S","tokens_avg":10},
          {"id":"b","family":"g","role":"context","size":"S","tokens_avg":10}]}"#;
        assert!(Manifest::from_json(json).is_err());
    }

    #[test]
    fn bad_enum_is_parse_error() {
        let json = r#"{"version":"1","families":{"f":{"reward_key":"f"}},"modules":[
          {"id":"a","family":"f","role":"banner","size":"S","tokens_avg":10}]}"#;
        assert!(matches!(Manifest::from_json(json), Err(ManifestError::Parse(_))));
    }

    #[test]
    fn unknown_fields_only_warn() {
        let json = r#"{"version":"1","owner":"ops","families":{"f":{"reward_key":"f","note":"x"}},
          "modules":[{"id":"a","family":"f","role":"toolhint","size":"S","tokens_avg":10,"legacy":true}]}"#;
        let m = Manifest::from_json(json).unwrap();
        assert_eq!(m.module_count(), 1);
    }

    #[test]
    fn fallback_on_missing_or_broken_file() {
        assert!(Manifest::load_or_fallback(None).is_none());
        assert!(Manifest::load_or_fallback(Some(Path::new("/nonexistent/manifest.json"))).is_none());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Manifest::load_or_fallback(Some(&path)).is_none());

        std::fs::write(&path, SAMPLE).unwrap();
        let loaded = Manifest::load_or_fallback(Some(&path)).unwrap();
        assert_eq!(loaded.path.as_deref(), Some(path.as_path()));
    }
}
