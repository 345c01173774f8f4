//! `promptweave matrix check`: parse a selection matrix and compile its rules.

use anyhow::Context;
use promptweave_config::SelectionMatrixConfig;
use std::path::Path;

pub async fn check(path: &Path) -> anyhow::Result<()> {
    let matrix = SelectionMatrixConfig::load_from(path)
        .with_context(|| format!("Selection matrix {} is invalid", path.display()))?;
    let rules = matrix
        .compile_rules()
        .with_context(|| format!("Rules in {} do not compile", path.display()))?;

    println!("✅ Selection matrix OK: {}", path.display());
    println!("  Pinned:   {}", matrix.pinned.join(", "));
    println!("  Layers:   {}", matrix.layers.len());
    println!("  Rules:    {}", rules.len());
    println!("  Intents:  {}", matrix.intents.len());

    for level in 1..=3u8 {
        match matrix.level(level) {
            Some(cfg) => println!(
                "  Level {level}: {} specific, inherits [{}]",
                cfg.specific.len(),
                cfg.inherits.join(", ")
            ),
            None => println!("  Level {level}: not declared"),
        }
    }

    Ok(())
}
