//! Dataset-level pass: run the refinement loop per example, collect winners,
//! combine them into one instruction and persist the artifacts.
//!
//! Artifacts are written in two steps. The results table and the winner list
//! go to disk before the Combiner is called, so they survive a combination
//! failure; the final instruction is written last.

use std::pin::pin;
use std::sync::Arc;

use futures::StreamExt;

use crate::artifacts::{self, ArtifactPaths, ResultRow};
use crate::controller::{ExampleOutcome, IterationController};
use crate::error::{OptimizerError, Result};
use crate::prompts::{self, COMBINE_TEMPLATE, COMBINER_INSTRUCTION};
use crate::types::{AgentRole, Example};

/// Called once per finished example, in dataset order.
pub type ProgressFn = Arc<dyn Fn(usize, &Result<ExampleOutcome>) + Send + Sync>;

/// An example whose run failed.
#[derive(Debug)]
pub struct ExampleFailure {
    pub index: usize,
    pub error: OptimizerError,
}

/// Result of a full pass.
#[derive(Debug)]
pub struct AggregateReport {
    /// Successful runs, dataset order.
    pub outcomes: Vec<ExampleOutcome>,
    /// Failed runs, dataset order.
    pub failures: Vec<ExampleFailure>,
    /// Accepted instructions, dataset order.
    pub winners: Vec<String>,
    /// The combined instruction.
    pub final_instruction: String,
    /// False when there were no winners and the seed was returned as-is.
    pub combined: bool,
}

impl AggregateReport {
    pub fn examples_run(&self) -> usize {
        self.outcomes.len() + self.failures.len()
    }
}

/// Runs the controller over a dataset.
pub struct Aggregator {
    controller: IterationController,
    concurrency: usize,
    artifacts: Option<ArtifactPaths>,
    progress: Option<ProgressFn>,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("controller", &self.controller)
            .field("concurrency", &self.concurrency)
            .field("artifacts", &self.artifacts)
            .finish()
    }
}

impl Aggregator {
    /// Sequential pass, no artifacts.
    pub fn new(controller: IterationController) -> Self {
        Self {
            controller,
            concurrency: 1,
            artifacts: None,
            progress: None,
        }
    }

    /// Run up to `n` examples at once. Results still come back in dataset order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Persist artifacts to these paths.
    pub fn with_artifacts(mut self, paths: ArtifactPaths) -> Self {
        self.artifacts = Some(paths);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn controller(&self) -> &IterationController {
        &self.controller
    }

    /// Full pass: run every example, persist results and winners, combine,
    /// persist the final instruction.
    pub async fn aggregate(&self, examples: &[Example]) -> Result<AggregateReport> {
        tracing::info!(
            examples = examples.len(),
            concurrency = self.concurrency,
            max_turns = self.controller.config().max_turns,
            threshold = self.controller.config().threshold,
            "starting optimization pass"
        );

        let mut outcomes = Vec::new();
        let mut failures = Vec::new();
        for (index, result) in self.run_examples(examples).await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => failures.push(ExampleFailure { index, error }),
            }
        }

        let winners: Vec<String> = outcomes.iter().filter_map(|o| o.winner.clone()).collect();

        if let Some(ref paths) = self.artifacts {
            let rows: Vec<ResultRow> = outcomes.iter().map(ResultRow::from).collect();
            artifacts::write_results(&paths.results, &rows)?;
            artifacts::write_winners(&paths.winners, &winners)?;
        }

        let combined = !winners.is_empty();
        let final_instruction = self.combine(&winners).await?;

        if let Some(ref paths) = self.artifacts {
            artifacts::write_final_instruction(&paths.final_instruction, &final_instruction)?;
        }

        tracing::info!(
            succeeded = outcomes.len(),
            failed = failures.len(),
            winners = winners.len(),
            "optimization pass complete"
        );

        Ok(AggregateReport {
            outcomes,
            failures,
            winners,
            final_instruction,
            combined,
        })
    }

    /// Run the controller on every example with bounded concurrency.
    /// Failures are logged and returned alongside successes.
    pub async fn run_examples(
        &self,
        examples: &[Example],
    ) -> Vec<(usize, Result<ExampleOutcome>)> {
        let controller = &self.controller;
        let mut stream = pin!(
            futures::stream::iter(examples.iter().enumerate())
                .map(|(index, example)| async move {
                    (index, controller.run(index, example).await)
                })
                .buffered(self.concurrency)
        );

        let mut results = Vec::with_capacity(examples.len());
        while let Some((index, result)) = stream.next().await {
            if let Err(ref e) = result {
                tracing::error!(example = index, error = %e, "example failed, continuing");
            }
            if let Some(ref progress) = self.progress {
                progress(index, &result);
            }
            results.push((index, result));
        }
        results
    }

    /// Merge winners into one instruction.
    ///
    /// With no winners the seed instruction is returned and no model call is
    /// made. Otherwise the cleaned, numbered list goes to the Combiner once.
    pub async fn combine(&self, winners: &[String]) -> Result<String> {
        let cleaned = prompts::clean_prompt_list(winners);
        if cleaned.is_empty() {
            tracing::warn!("no winning instructions, falling back to the seed instruction");
            return Ok(self.controller.config().seed_instruction.clone());
        }

        let payload = prompts::render(
            COMBINE_TEMPLATE,
            &[("summarizer_list", prompts::number_prompts(&cleaned).as_str())],
        );

        let reply = self
            .controller
            .generators()
            .combiner
            .invoke(AgentRole::Combiner, COMBINER_INSTRUCTION, &payload)
            .await
            .map_err(|e| OptimizerError::Aggregation(e.to_string()))?;

        let combined = prompts::clean_candidate(&reply);
        if combined.is_empty() {
            return Err(OptimizerError::Aggregation(
                "combiner reply was empty after cleaning".to_string(),
            ));
        }

        tracing::info!(candidates = cleaned.len(), "combined winning instructions");
        Ok(combined)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerConfig;
    use crate::generator::{Generator, RoleGenerators};
    use metagente_llm::{MockBackend, MockResponse};
    use parking_lot::Mutex;

    /// Extractor echoes its input. Summarizer answers with the extraction when
    /// the input starts with "GOOD:", or with "LATE:" once the instruction has
    /// been revised; otherwise with noise.
    fn scripted_generators(combiner: Arc<MockBackend>) -> Arc<RoleGenerators> {
        let extractor = Arc::new(MockBackend::with_handler(|req| {
            MockResponse::text(req.last_user_text().unwrap_or_default())
        }));
        let summarizer = Arc::new(MockBackend::with_handler(|req| {
            let text = req.last_user_text().unwrap_or_default();
            let revised = req.system.as_deref() == Some("Revised");
            if let Some(rest) = text.strip_prefix("GOOD:") {
                MockResponse::text(rest)
            } else if let Some(rest) = text.strip_prefix("LATE:").filter(|_| revised) {
                MockResponse::text(rest)
            } else {
                MockResponse::text("zzz")
            }
        }));
        let teacher = Arc::new(MockBackend::with_handler(|_| MockResponse::text("Revised")));
        Arc::new(RoleGenerators {
            extractor: Generator::new(extractor, "m"),
            summarizer: Generator::new(summarizer, "m"),
            teacher: Generator::new(teacher, "m"),
            combiner: Generator::new(combiner, "m"),
        })
    }

    fn controller(combiner: Arc<MockBackend>, max_turns: u32) -> IterationController {
        IterationController::new(
            scripted_generators(combiner),
            ControllerConfig::default()
                .with_max_turns(max_turns)
                .with_seed_instruction("seed"),
        )
    }

    fn examples() -> Vec<Example> {
        vec![
            Example::new("alpha web server", "GOOD:alpha web server"),
            Example::new("beta parser", "no tagline here"),
            Example::new("gamma cli tool", "GOOD:gamma cli tool"),
        ]
    }

    #[tokio::test]
    async fn test_combiner_receives_winners_in_order() {
        let combiner = Arc::new(MockBackend::with_text("Final: combined"));
        let aggregator = Aggregator::new(controller(combiner.clone(), 2));

        let report = aggregator
            .aggregate(&[
                Example::new("alpha web server", "GOOD:alpha web server"),
                Example::new("beta parser", "no tagline here"),
                Example::new("gamma cli tool", "LATE:gamma cli tool"),
            ])
            .await
            .unwrap();

        assert_eq!(report.winners, vec!["seed".to_string(), "Revised".to_string()]);
        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.outcomes[2].cycles, 2);
        assert!(report.combined);
        assert_eq!(combiner.request_count(), 1);
        let payload = combiner.requests()[0].last_user_text().unwrap().to_string();
        let first = payload.find("1. seed").unwrap();
        let second = payload.find("2. Revised").unwrap();
        assert!(first < second);
        assert_eq!(report.final_instruction, "Final: combined");
    }

    #[tokio::test]
    async fn test_repeated_winners_each_reach_the_combiner() {
        let combiner = Arc::new(MockBackend::with_text("merged"));
        let aggregator = Aggregator::new(controller(combiner.clone(), 2));

        let report = aggregator.aggregate(&examples()).await.unwrap();

        assert_eq!(report.winners, vec!["seed".to_string(), "seed".to_string()]);
        let payload = combiner.requests()[0].last_user_text().unwrap().to_string();
        assert!(payload.contains("1. seed"));
        assert!(payload.contains("2. seed"));
        assert!(!payload.contains("3. "));
    }

    #[tokio::test]
    async fn test_combine_numbers_distinct_winners_in_order() {
        let combiner = Arc::new(MockBackend::with_text("merged"));
        let aggregator = Aggregator::new(controller(combiner.clone(), 1));

        let out = aggregator
            .combine(&["first".to_string(), " second ".to_string()])
            .await
            .unwrap();

        assert_eq!(out, "merged");
        let request = &combiner.requests()[0];
        assert_eq!(request.system.as_deref(), Some(COMBINER_INSTRUCTION));
        let payload = request.last_user_text().unwrap();
        let first = payload.find("1. first").unwrap();
        let second = payload.find("2. second").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_unmatched_example_spends_its_budget() {
        let combiner = Arc::new(MockBackend::with_text("merged"));
        let aggregator = Aggregator::new(controller(combiner, 3));

        let report = aggregator
            .aggregate(&[Example::new("alpha web server", "alpha web server")])
            .await
            .unwrap();

        assert_eq!(report.outcomes[0].cycles, 3);
        assert_eq!(report.outcomes[0].instruction, "Revised");
        assert!(report.winners.is_empty());
    }

    #[tokio::test]
    async fn test_no_winners_returns_seed_without_model_call() {
        let combiner = Arc::new(MockBackend::new(vec![]));
        let aggregator = Aggregator::new(controller(combiner.clone(), 1));

        let report = aggregator
            .aggregate(&[Example::new("beta parser", "no tagline")])
            .await
            .unwrap();

        assert!(report.winners.is_empty());
        assert!(!report.combined);
        assert_eq!(report.final_instruction, "seed");
        assert_eq!(combiner.request_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_example_does_not_stop_the_pass() {
        let combiner = Arc::new(MockBackend::with_text("merged"));
        let generators = scripted_generators(combiner);
        let failing_extractor = Arc::new(MockBackend::with_handler(|req| {
            let text = req.last_user_text().unwrap_or_default();
            if text.contains("explode") {
                MockResponse::Fail("upstream 500".into())
            } else {
                MockResponse::text(text)
            }
        }));
        let generators = Arc::new(RoleGenerators {
            extractor: Generator::new(failing_extractor, "m"),
            ..(*generators).clone()
        });
        let aggregator = Aggregator::new(IterationController::new(
            generators,
            ControllerConfig::default().with_max_turns(1),
        ));

        let report = aggregator
            .aggregate(&[
                Example::new("alpha", "GOOD:alpha"),
                Example::new("boom", "explode"),
                Example::new("gamma", "GOOD:gamma"),
            ])
            .await
            .unwrap();

        assert_eq!(report.examples_run(), 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert_eq!(report.winners.len(), 2);
    }

    #[tokio::test]
    async fn test_combination_failure_is_fatal_but_keeps_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ArtifactPaths::in_dir(dir.path());
        let combiner = Arc::new(MockBackend::new(vec![MockResponse::Fail("down".into())]));
        let aggregator = Aggregator::new(controller(combiner, 1)).with_artifacts(paths.clone());

        let err = aggregator.aggregate(&examples()).await.unwrap_err();

        assert!(matches!(err, OptimizerError::Aggregation(_)));
        assert!(paths.results.is_file());
        assert_eq!(
            std::fs::read_to_string(&paths.winners).unwrap(),
            "seed\nseed\n"
        );
        assert!(!paths.final_instruction.exists());
    }

    #[tokio::test]
    async fn test_concurrent_pass_keeps_dataset_order() {
        let combiner = Arc::new(MockBackend::with_text("merged"));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let aggregator = Aggregator::new(controller(combiner, 2))
            .with_concurrency(3)
            .with_progress(Arc::new(move |index: usize, _: &Result<ExampleOutcome>| {
                sink.lock().push(index)
            }));

        let report = aggregator.aggregate(&examples()).await.unwrap();

        let indices: Vec<_> = report.outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }
}
