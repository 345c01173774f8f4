//! `promptweave manifest validate`: parse and check a manifest.

use anyhow::Context;
use promptweave_config::Manifest;
use std::path::Path;

pub async fn validate(path: &Path) -> anyhow::Result<()> {
    let manifest = Manifest::load_from(path)
        .with_context(|| format!("Manifest {} is invalid", path.display()))?;

    println!("✅ Manifest OK: {}", path.display());
    println!("  Version:        {}", manifest.version);
    println!("  Families:       {}", manifest.family_count());
    println!("  Modules:        {}", manifest.module_count());
    println!("  Window (days):  {}", manifest.defaults.window_days);
    println!("  Aux budget:     {} tokens", manifest.defaults.max_aux_tokens);

    for family in manifest.family_ids() {
        let arms: Vec<&str> = manifest.arms(family).iter().map(|m| m.id.as_str()).collect();
        println!("  {family}: {}", arms.join(", "));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_broken_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(validate(&path).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate(&dir.path().join("nope.json")).await.is_err());
    }
}
