//! Configuration loading, validation, and management for PromptWeave.
//!
//! Loads configuration from `~/.promptweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.
//!
//! Two declarative documents live next to the config:
//! - [`manifest`]: module families and arms for the bandit planner (JSON).
//! - [`matrix`]: base module selection per openness level (TOML).

pub mod manifest;
pub mod matrix;

pub use manifest::{
    Gate, Manifest, ManifestDefaults, ManifestFamily, ManifestModule, ModuleRole, ModuleSize,
};
pub use matrix::{IntentConfig, LevelConfig, RuleConfig, SelectionMatrixConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.promptweave/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Heuristic signal engine tuning
    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    /// Bandit rollout flags
    #[serde(default)]
    pub bandit: BanditConfig,

    /// Token budgets
    #[serde(default)]
    pub budget: BudgetConfig,

    /// Module roots and declarative document paths
    #[serde(default)]
    pub store: StoreConfig,

    /// Context cache sizing
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Heuristic signal engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Score half-life between observations
    #[serde(default = "default_half_life_minutes")]
    pub half_life_minutes: f64,

    /// Turns a fired signal stays in cooldown
    #[serde(default = "default_cooldown_turns")]
    pub cooldown_turns: u64,

    /// Arms that may open from heuristic signals in a single turn
    #[serde(default = "default_max_arms")]
    pub max_arms_per_turn: usize,

    #[serde(default = "default_min_score")]
    pub default_min_score: f64,

    /// Current score that bypasses cooldown
    #[serde(default = "default_hard_override")]
    pub hard_override: f64,

    /// Signals not observed for this long are evicted
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum identities kept in memory
    #[serde(default = "default_identity_capacity")]
    pub identity_capacity: u64,

    /// Identities idle this long are dropped
    #[serde(default = "default_identity_idle_minutes")]
    pub identity_idle_minutes: u64,
}

fn default_true() -> bool {
    true
}
fn default_half_life_minutes() -> f64 {
    20.0
}
fn default_cooldown_turns() -> u64 {
    2
}
fn default_max_arms() -> usize {
    1
}
fn default_min_score() -> f64 {
    0.3
}
fn default_hard_override() -> f64 {
    0.8
}
fn default_ttl_seconds() -> u64 {
    1800
}
fn default_identity_capacity() -> u64 {
    10_000
}
fn default_identity_idle_minutes() -> u64 {
    120
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            half_life_minutes: default_half_life_minutes(),
            cooldown_turns: default_cooldown_turns(),
            max_arms_per_turn: default_max_arms(),
            default_min_score: default_min_score(),
            hard_override: default_hard_override(),
            ttl_seconds: default_ttl_seconds(),
            identity_capacity: default_identity_capacity(),
            identity_idle_minutes: default_identity_idle_minutes(),
        }
    }
}

/// Bandit rollout configuration.
///
/// `shadow` logs the Thompson pick but adopts the baseline. With `early`
/// set, only `pilot_percent` of turns adopt the Thompson pick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    #[serde(default = "default_true")]
    pub shadow: bool,

    #[serde(default)]
    pub early: bool,

    #[serde(default = "default_pilot_percent")]
    pub pilot_percent: u8,

    /// Fixed RNG seed for reproducible runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_pilot_percent() -> u8 {
    10
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            shadow: true,
            early: false,
            pilot_percent: default_pilot_percent(),
            seed: None,
        }
    }
}

/// Token budget configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    /// Hard budget for the stitched prompt
    #[serde(default = "default_prompt_tokens")]
    pub prompt_tokens: usize,

    /// Knapsack budget; falls back to the manifest's `max_aux_tokens`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knapsack_tokens: Option<usize>,

    /// Cost charged per module for the separator between blocks
    #[serde(default = "default_separator_tokens")]
    pub separator_tokens: usize,

    #[serde(default)]
    pub safety_margin_tokens: usize,

    /// Optional modules stop once the remainder drops below this share
    #[serde(default = "default_reserve_pct")]
    pub reserve_pct: u8,
}

fn default_prompt_tokens() -> usize {
    4000
}
fn default_separator_tokens() -> usize {
    1
}
fn default_reserve_pct() -> u8 {
    10
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            prompt_tokens: default_prompt_tokens(),
            knapsack_tokens: None,
            separator_tokens: default_separator_tokens(),
            safety_margin_tokens: 0,
            reserve_pct: default_reserve_pct(),
        }
    }
}

/// Module store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directories searched for module files, first match wins
    #[serde(default)]
    pub module_roots: Vec<PathBuf>,

    /// Fail the turn on a missing module instead of degrading to empty text
    #[serde(default)]
    pub strict_missing: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matrix_path: Option<PathBuf>,
}

/// Context cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: u64,
}

fn default_cache_capacity() -> u64 {
    512
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.promptweave/config.toml).
    ///
    /// `PROMPTWEAVE_*` environment variables override file values.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides and re-validate.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply `PROMPTWEAVE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_HALF_LIFE_MIN") {
            self.heuristics.half_life_minutes = v;
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_COOLDOWN_TURNS") {
            self.heuristics.cooldown_turns = v;
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_MAX_ARMS") {
            self.heuristics.max_arms_per_turn = v;
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_MIN_SCORE") {
            self.heuristics.default_min_score = v;
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_KNAPSACK_BUDGET") {
            self.budget.knapsack_tokens = Some(v);
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_PROMPT_BUDGET") {
            self.budget.prompt_tokens = v;
        }
        if let Some(v) = parse_flag(&lookup, "PROMPTWEAVE_STRICT_MODULES") {
            self.store.strict_missing = v;
        }
        if let Some(v) = parse_flag(&lookup, "PROMPTWEAVE_BANDIT_SHADOW") {
            self.bandit.shadow = v;
        }
        if let Some(v) = parse_flag(&lookup, "PROMPTWEAVE_BANDIT_EARLY") {
            self.bandit.early = v;
        }
        if let Some(v) = parse_env(&lookup, "PROMPTWEAVE_BANDIT_PILOT_PERCENT") {
            self.bandit.pilot_percent = v;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".promptweave")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let h = &self.heuristics;
        if h.half_life_minutes < 1.0 {
            return Err(ConfigError::ValidationError(
                "heuristics.half_life_minutes must be at least 1".into(),
            ));
        }
        for (name, value) in [
            ("default_min_score", h.default_min_score),
            ("hard_override", h.hard_override),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "heuristics.{name} must be between 0.0 and 1.0"
                )));
            }
        }
        if h.max_arms_per_turn == 0 {
            return Err(ConfigError::ValidationError(
                "heuristics.max_arms_per_turn must be > 0".into(),
            ));
        }
        if self.bandit.pilot_percent > 100 {
            return Err(ConfigError::ValidationError(
                "bandit.pilot_percent must be between 0 and 100".into(),
            ));
        }
        if self.budget.reserve_pct > 100 {
            return Err(ConfigError::ValidationError(
                "budget.reserve_pct must be between 0 and 100".into(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "cache.capacity must be > 0".into(),
            ));
        }
        Ok(())
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heuristics.cooldown_turns, 2);
        assert_eq!(config.budget.prompt_tokens, 4000);
        assert!(config.bandit.shadow);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.heuristics.half_life_minutes, 20.0);
        assert_eq!(parsed.cache.capacity, config.cache.capacity);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
[budget]
prompt_tokens = 1200

[store]
module_roots = ["/srv/modules"]
strict_missing = true
"#,
        )
        .unwrap();
        assert_eq!(parsed.budget.prompt_tokens, 1200);
        assert_eq!(parsed.budget.reserve_pct, 10);
        assert!(parsed.store.strict_missing);
        assert_eq!(parsed.store.module_roots, vec![PathBuf::from("/srv/modules")]);
        assert_eq!(parsed.heuristics.max_arms_per_turn, 1);
    }

    #[test]
    fn out_of_range_scores_rejected() {
        let mut config = AppConfig::default();
        config.heuristics.hard_override = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.heuristics.half_life_minutes = 0.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.bandit.pilot_percent = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            ("PROMPTWEAVE_HALF_LIFE_MIN", "5"),
            ("PROMPTWEAVE_COOLDOWN_TURNS", "4"),
            ("PROMPTWEAVE_KNAPSACK_BUDGET", "600"),
            ("PROMPTWEAVE_STRICT_MODULES", "true"),
            ("PROMPTWEAVE_BANDIT_SHADOW", "0"),
        ]));
        assert_eq!(config.heuristics.half_life_minutes, 5.0);
        assert_eq!(config.heuristics.cooldown_turns, 4);
        assert_eq!(config.budget.knapsack_tokens, Some(600));
        assert!(config.store.strict_missing);
        assert!(!config.bandit.shadow);
    }

    #[test]
    fn invalid_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(env(&[
            ("PROMPTWEAVE_MIN_SCORE", "high"),
            ("PROMPTWEAVE_BANDIT_EARLY", "maybe"),
        ]));
        assert_eq!(config.heuristics.default_min_score, 0.3);
        assert!(!config.bandit.early);
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().cache.capacity, 512);
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[budget\nprompt_tokens = ").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("[heuristics]"));
        assert!(toml_str.contains("prompt_tokens = 4000"));
    }
}
