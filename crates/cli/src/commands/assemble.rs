//! `promptweave assemble`: build the prompt for one message.

use anyhow::Context;
use clap::Args;
use promptweave_planner::{AssembledPrompt, AssemblyRequest, PromptPipeline};
use promptweave_store::{FileModuleSource, InMemoryAnalytics};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args, Debug, Clone)]
pub struct AssembleArgs {
    /// The user message
    #[arg(short, long)]
    pub text: String,

    /// Conversation identity used for per-user heuristic state
    #[arg(short, long)]
    pub identity: Option<String>,

    /// Snapshot flag to set, e.g. `--flag crisis` (repeatable)
    #[arg(long = "flag")]
    pub flags: Vec<String>,

    /// Passive heuristic signal, e.g. `--passive fast_followup` (repeatable)
    #[arg(long = "passive")]
    pub passive_signals: Vec<String>,

    /// Module directory (repeatable, overrides config)
    #[arg(short, long = "modules")]
    pub modules: Vec<PathBuf>,

    /// Memories retrieved for this turn
    #[arg(long, default_value_t = 0)]
    pub memory_count: usize,

    /// Tokens those memories occupy
    #[arg(long, default_value_t = 0)]
    pub memory_tokens: usize,

    /// Print the full result with its debug trace as JSON
    #[arg(long)]
    pub json: bool,
}

impl AssembleArgs {
    fn request(&self) -> AssemblyRequest {
        let mut request = AssemblyRequest::new(self.text.clone());
        if let Some(identity) = &self.identity {
            request = request.with_identity(identity.clone());
        }
        for flag in &self.flags {
            request = request.with_flag(flag.clone());
        }
        for signal in &self.passive_signals {
            request = request.with_passive_signal(signal.clone());
        }
        request.memory_count = self.memory_count;
        request.memory_tokens = self.memory_tokens;
        request
    }
}

pub async fn run(config_path: Option<&Path>, args: AssembleArgs) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let roots = super::module_roots(&args.modules, &config);
    tracing::debug!(roots = ?roots, "Module roots resolved");

    let source = Arc::new(FileModuleSource::new(roots));
    let analytics = Arc::new(InMemoryAnalytics::default());
    let pipeline = PromptPipeline::new(config, source, analytics)
        .context("Failed to build prompt pipeline")?;

    let assembled = pipeline
        .assemble(&args.request())
        .await
        .context("Prompt assembly failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&assembled)?);
    } else {
        print_plain(&assembled);
    }
    Ok(())
}

fn print_plain(assembled: &AssembledPrompt) {
    println!("{}", assembled.text);
    for footer in &assembled.footers {
        println!("\n{footer}");
    }

    let trace = &assembled.trace;
    eprintln!(
        "\n[openness {} | intensity {} | {} tokens{}]",
        assembled.snapshot.openness,
        assembled.snapshot.intensity,
        trace.tokens_used,
        if trace.cache_hit { " | cached" } else { "" }
    );
    if !trace.budget_cut.is_empty() {
        eprintln!("[cut: {}]", trace.budget_cut.join("; "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: AssembleArgs,
    }

    #[test]
    fn flags_and_signals_reach_the_request() {
        let harness = Harness::parse_from([
            "assemble",
            "--text",
            "hello there",
            "--identity",
            "u1",
            "--flag",
            "crisis",
            "--passive",
            "fast_followup",
            "--memory-count",
            "2",
        ]);
        let request = harness.args.request();
        assert_eq!(request.text, "hello there");
        assert_eq!(request.identity.as_deref(), Some("u1"));
        assert_eq!(request.flags.get("crisis"), Some(&true));
        assert_eq!(request.passive_signals, vec!["fast_followup"]);
        assert_eq!(request.memory_count, 2);
    }

    #[tokio::test]
    async fn assembles_from_a_module_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CORE_L1.txt"), "Be present.").unwrap();
        let config = dir.path().join("config.toml");
        let args = AssembleArgs {
            text: "oi".into(),
            identity: None,
            flags: vec![],
            passive_signals: vec![],
            modules: vec![dir.path().to_path_buf()],
            memory_count: 0,
            memory_tokens: 0,
            json: true,
        };
        run(Some(&config), args).await.unwrap();
    }
}
