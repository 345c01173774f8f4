//! `promptweave status`: show configuration and module roots.

use promptweave_config::{AppConfig, Manifest, SelectionMatrixConfig};
use promptweave_core::ModuleSource;
use promptweave_store::FileModuleSource;
use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    let path = super::config_path(config_path);
    let config = super::load_config(config_path)?;

    println!("PromptWeave Status");
    println!("==================");
    println!("  Config file:    {}", path.display());
    println!("  Prompt budget:  {} tokens", config.budget.prompt_tokens);
    println!(
        "  Aux budget:     {}",
        config
            .budget
            .knapsack_tokens
            .map(|t| format!("{t} tokens"))
            .unwrap_or_else(|| "from manifest".into())
    );
    println!("  Bandit:         {}", bandit_mode(&config));
    println!("  Heuristics:     {}", if config.heuristics.enabled { "enabled" } else { "disabled" });
    println!("  Strict modules: {}", if config.store.strict_missing { "yes" } else { "no" });
    println!("  Cache capacity: {}", config.cache.capacity);

    let roots = super::module_roots(&[], &config);
    let source = FileModuleSource::new(roots);
    println!("\n  Module roots:");
    for root in source.roots() {
        let marker = if root.is_dir() { "✅" } else { "⚠️ " };
        println!("    {marker} {}", root.display());
    }
    match source.list().await {
        Ok(names) => println!("  Modules found:  {}", names.len()),
        Err(e) => println!("  ⚠️  Module listing failed: {e}"),
    }

    match config.store.manifest_path.as_deref() {
        None => println!("\n  Manifest:       none (single-arm families)"),
        Some(p) => match Manifest::load_from(p) {
            Ok(m) => println!(
                "\n  ✅ Manifest {} ({} families, {} modules)",
                m.version,
                m.family_count(),
                m.module_count()
            ),
            Err(e) => println!("\n  ⚠️  Manifest {}: {e}", p.display()),
        },
    }

    match config.store.matrix_path.as_deref() {
        None => println!("  Matrix:         built-in"),
        Some(p) => match SelectionMatrixConfig::load_from(p) {
            Ok(m) => println!("  ✅ Matrix ({} rules, {} pinned)", m.rules.len(), m.pinned.len()),
            Err(e) => println!("  ⚠️  Matrix {}: {e}", p.display()),
        },
    }

    if !path.exists() {
        println!("\n  ⚠️  No config file, run `promptweave init` first");
    }

    Ok(())
}

fn bandit_mode(config: &AppConfig) -> String {
    let b = &config.bandit;
    if b.shadow {
        "shadow".into()
    } else if b.early {
        format!("early ({}% pilot)", b.pilot_percent)
    } else {
        "live".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandit_modes() {
        let mut config = AppConfig::default();
        assert_eq!(bandit_mode(&config), "shadow");
        config.bandit.shadow = false;
        config.bandit.early = true;
        config.bandit.pilot_percent = 25;
        assert_eq!(bandit_mode(&config), "early (25% pilot)");
        config.bandit.early = false;
        assert_eq!(bandit_mode(&config), "live");
    }
}
