//! Evaluate command - score a fixed summarizer instruction.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};

use metagente_optimizer::{Evaluation, artifacts, load_examples, prompts};

use super::{Context, LlmOverrides, build_generators};

/// Arguments for the evaluate command.
#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// File holding the summarizer instruction (defaults to the built-in optimized one)
    #[arg(short, long)]
    pub prompt_file: Option<PathBuf>,

    /// Held-out CSV with `description` and `readme` columns
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Results CSV to write
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Examples processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Model used for every role (overrides config)
    #[arg(long)]
    pub model: Option<String>,
}

/// Run the evaluate command.
pub async fn run(args: EvaluateArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    let dataset = args
        .dataset
        .clone()
        .or_else(|| config.dataset.as_ref().and_then(|d| d.test.clone()))
        .ok_or_else(|| anyhow::anyhow!("no test dataset: pass --dataset or set [dataset] test"))?;

    let instruction = match args.prompt_file {
        Some(ref path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading prompt file {}", path.display()))?;
            let text = text.trim().to_string();
            if text.is_empty() {
                anyhow::bail!("prompt file {} is empty", path.display());
            }
            text
        }
        None => prompts::OPTIMIZED_SUMMARIZER_INSTRUCTION.to_string(),
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| config.output().dir.join("evaluation.csv"));
    let concurrency = args
        .concurrency
        .unwrap_or_else(|| config.optimizer().concurrency)
        .max(1);

    let examples = load_examples(&dataset)
        .with_context(|| format!("loading dataset {}", dataset.display()))?;

    let overrides = LlmOverrides {
        model: args.model.clone(),
        base_url: None,
    };
    let generators = build_generators(config, &overrides)?;

    let report = Evaluation::new(&generators, instruction)
        .with_concurrency(concurrency)
        .run(&examples)
        .await;
    artifacts::write_results(&output, &report.result_rows())?;

    let dim = Style::new().dim();
    let mean = report.mean();
    println!();
    println!("{}", style("Metagente Evaluation").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Dataset:"), dataset.display());
    println!("  {} {}", dim.apply_to("Scored:"), report.rows.len());
    if !report.skipped.is_empty() {
        println!(
            "  {} {}",
            dim.apply_to("Skipped:"),
            Style::new().yellow().apply_to(report.skipped.len())
        );
    }
    println!("  {} {}", dim.apply_to("Mean:"), mean);
    println!("  {} {}", dim.apply_to("Results:"), output.display());
    println!();

    Ok(())
}
