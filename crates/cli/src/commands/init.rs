//! `promptweave init`: write a default config and module directory.

use promptweave_config::AppConfig;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config_path = super::config_path(config_path);
    let config_dir = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(AppConfig::config_dir);
    let modules_dir = config_dir.join("modules");

    println!("PromptWeave Setup");
    println!("=================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !modules_dir.exists() {
        std::fs::create_dir_all(&modules_dir)?;
        println!("✅ Created module directory: {}", modules_dir.display());
    }

    if config_path.exists() {
        println!("  Config file exists, leaving it untouched: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Wrote default config: {}", config_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Put module .txt files in {}", modules_dir.display());
    println!("  2. Point store.manifest_path and store.matrix_path at your documents");
    println!("  3. Run: promptweave assemble --text \"hello\"");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_writes_config_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pw").join("config.toml");

        run(Some(&path)).await.unwrap();
        assert!(path.exists());
        assert!(dir.path().join("pw").join("modules").is_dir());

        std::fs::write(&path, "[budget]\nprompt_tokens = 900\n").unwrap();
        run(Some(&path)).await.unwrap();
        let kept = std::fs::read_to_string(&path).unwrap();
        assert!(kept.contains("900"));
    }

    #[test]
    fn default_toml_parses_back() {
        let parsed: AppConfig = toml_roundtrip(&AppConfig::default_toml());
        assert_eq!(parsed.cache.capacity, AppConfig::default().cache.capacity);
    }

    fn toml_roundtrip(text: &str) -> AppConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        AppConfig::load_from(&path).unwrap()
    }
}
