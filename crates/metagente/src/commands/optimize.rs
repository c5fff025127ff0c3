//! Optimize command - refine the summarizer instruction over a dataset.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use indicatif::{ProgressBar, ProgressStyle};

use metagente_config::MetagenteConfig;
use metagente_optimizer::{
    Aggregator, ArtifactPaths, ControllerConfig, ExampleOutcome, IterationController, ProgressFn,
    TranscriptLogger, load_examples,
};

use super::{Context, LlmOverrides, build_generators};

/// Arguments for the optimize command.
#[derive(Args, Debug)]
pub struct OptimizeArgs {
    /// Training CSV with `description` and `readme` columns
    #[arg(short, long)]
    pub dataset: Option<PathBuf>,

    /// Minimum ROUGE-L for an instruction to count as a winner
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Summarize/evaluate cycles per example
    #[arg(long)]
    pub max_turns: Option<u32>,

    /// Examples processed at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory for results, winners and the final instruction
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Model used for every role (overrides config)
    #[arg(long)]
    pub model: Option<String>,

    /// API base URL used for every role (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,
}

/// Run the optimize command.
pub async fn run(args: OptimizeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    let dataset = args
        .dataset
        .clone()
        .or_else(|| config.dataset.as_ref().and_then(|d| d.train.clone()))
        .ok_or_else(|| {
            anyhow::anyhow!("no training dataset: pass --dataset or set [dataset] train")
        })?;

    let mut settings = config.optimizer();
    if let Some(t) = args.threshold {
        settings.threshold = t;
    }
    if let Some(n) = args.max_turns {
        settings.max_turns = n;
    }
    if let Some(n) = args.concurrency {
        settings.concurrency = n;
    }
    settings.validate()?;

    let mut output = config.output();
    if let Some(ref dir) = args.output_dir {
        output.dir = dir.clone();
    }

    let examples = load_examples(&dataset)
        .with_context(|| format!("loading dataset {}", dataset.display()))?;

    let overrides = LlmOverrides {
        model: args.model.clone(),
        base_url: args.base_url.clone(),
    };
    let generators = Arc::new(build_generators(config, &overrides)?);

    let mut controller_config = ControllerConfig::default()
        .with_threshold(settings.threshold)
        .with_max_turns(settings.max_turns);
    if let Some(seed) = settings.seed_instruction.clone() {
        controller_config = controller_config.with_seed_instruction(seed);
    }

    let mut controller = IterationController::new(generators, controller_config);
    if let Some(logger) = transcript_logger(config, ctx)? {
        controller = controller.with_transcript(Arc::new(logger));
    }

    let paths = ArtifactPaths {
        results: output.results_path(),
        winners: output.winners_path(),
        final_instruction: output.final_instruction_path(),
    };

    let dim = Style::new().dim();
    println!();
    println!("{}", style("Metagente Optimization").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Dataset:"), dataset.display());
    println!("  {} {}", dim.apply_to("Examples:"), examples.len());
    println!("  {} {}", dim.apply_to("Threshold:"), settings.threshold);
    println!("  {} {}", dim.apply_to("Max turns:"), settings.max_turns);
    println!();

    let bar = ProgressBar::new(examples.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    let aggregator = Aggregator::new(controller)
        .with_concurrency(settings.concurrency)
        .with_artifacts(paths.clone())
        .with_progress(progress_callback(bar.clone()));

    let report = aggregator.aggregate(&examples).await;
    bar.finish_and_clear();
    let report = report?;

    let green = Style::new().green();
    let red = Style::new().red();
    println!("{}", style("Summary").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!("  {} {}", dim.apply_to("Examples run:"), report.examples_run());
    println!(
        "  {} {}",
        dim.apply_to("Winners:"),
        green.apply_to(report.winners.len())
    );
    if !report.failures.is_empty() {
        println!(
            "  {} {}",
            dim.apply_to("Failed:"),
            red.apply_to(report.failures.len())
        );
        if ctx.verbose {
            for failure in &report.failures {
                println!("    #{}: {}", failure.index, failure.error);
            }
        }
    }
    if !report.combined {
        println!(
            "  {}",
            dim.apply_to("No instruction reached the threshold; kept the seed instruction.")
        );
    }
    println!();
    println!("  {} {}", dim.apply_to("Results:"), paths.results.display());
    println!("  {} {}", dim.apply_to("Winner list:"), paths.winners.display());
    println!(
        "  {} {}",
        dim.apply_to("Final instruction:"),
        paths.final_instruction.display()
    );
    println!();
    println!("{}", report.final_instruction);

    Ok(())
}

fn progress_callback(bar: ProgressBar) -> ProgressFn {
    Arc::new(
        move |index: usize, result: &metagente_optimizer::Result<ExampleOutcome>| {
            match result {
                Ok(outcome) => bar.set_message(format!(
                    "#{} rougeL {:.3} after {} cycles",
                    index, outcome.scores.rouge_l, outcome.cycles
                )),
                Err(_) => bar.set_message(format!("#{} failed", index)),
            }
            bar.inc(1);
        },
    )
}

/// Transcript logger when `[logging.transcripts] enabled = true`.
fn transcript_logger(config: &MetagenteConfig, ctx: &Context) -> Result<Option<TranscriptLogger>> {
    let settings = config.transcripts();
    if !settings.enabled {
        return Ok(None);
    }
    let dir = settings
        .path
        .or_else(|| ctx.config_dir.as_ref().map(|d| d.join("transcripts")))
        .unwrap_or_else(|| PathBuf::from("transcripts"));
    let logger = TranscriptLogger::new(&dir, settings.retention_days)
        .with_context(|| format!("opening transcript directory {}", dir.display()))?;
    tracing::info!(dir = %dir.display(), run_id = logger.run_id(), "writing transcripts");
    Ok(Some(logger))
}
