//! Subcommand implementations.

pub mod assemble;
pub mod init;
pub mod manifest;
pub mod matrix;
pub mod status;

use anyhow::Context;
use promptweave_config::AppConfig;
use std::path::{Path, PathBuf};

/// Path of the config file a command reads.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

/// Load configuration with environment overrides applied.
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<AppConfig> {
    let path = config_path(explicit);
    AppConfig::load_with_env(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))
}

/// Module roots: explicit directories, else configured roots, else
/// `<config dir>/modules`.
pub fn module_roots(explicit: &[PathBuf], config: &AppConfig) -> Vec<PathBuf> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    if !config.store.module_roots.is_empty() {
        return config.store.module_roots.clone();
    }
    vec![AppConfig::config_dir().join("modules")]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_path_points_at_config_toml() {
        let path = config_path(None);
        assert!(path.ends_with(".promptweave/config.toml"));
    }

    #[test]
    fn explicit_roots_win() {
        let mut config = AppConfig::default();
        config.store.module_roots = vec![PathBuf::from("/srv/modules")];
        let roots = module_roots(&[PathBuf::from("./mods")], &config);
        assert_eq!(roots, vec![PathBuf::from("./mods")]);
        assert_eq!(module_roots(&[], &config), vec![PathBuf::from("/srv/modules")]);
    }

    #[test]
    fn missing_config_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.budget.prompt_tokens, AppConfig::default().budget.prompt_tokens);
    }
}
