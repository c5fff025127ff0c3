//! Per-example refinement loop.
//!
//! The [`IterationController`] extracts the input once, then lets the
//! Summarizer, Evaluator and Teacher take turns until the
//! [`Termination`] rule says stop:
//!
//! ```text
//! Extract ──► Summarize ──► Evaluate ──► Teach ──► Summarize ──► …
//!                               │
//!                               └──► Done (accepted | budget exhausted)
//! ```
//!
//! The Evaluator scores locally with [`rouge::score`]; every other role is a
//! model call through [`RoleGenerators`].

use std::sync::Arc;

use crate::error::{OptimizerError, Result};
use crate::generator::{Generator, RoleGenerators};
use crate::prompts::{self, EXTRACTOR_INSTRUCTION, TEACHER_INSTRUCTION, TEACHER_REVIEW_TEMPLATE};
use crate::rouge;
use crate::selection::{ROSTER, select_next};
use crate::state::SharedState;
use crate::termination::{DEFAULT_MAX_TURNS, DEFAULT_THRESHOLD, StopReason, Termination};
use crate::transcript::TranscriptLogger;
use crate::types::{AgentRole, ConversationTurn, Example, ScoreTriple};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the refinement loop.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Minimum ROUGE-L for the final output to make its instruction a winner.
    pub threshold: f64,
    /// Summarize→Evaluate cycles before giving up on an example.
    pub max_turns: u32,
    /// Instruction the Summarizer starts from.
    pub seed_instruction: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_turns: DEFAULT_MAX_TURNS,
            seed_instruction: prompts::INITIAL_SUMMARIZER_INSTRUCTION.to_string(),
        }
    }
}

impl ControllerConfig {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns;
        self
    }

    pub fn with_seed_instruction(mut self, seed: impl Into<String>) -> Self {
        self.seed_instruction = seed.into();
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Everything one example's run produced.
#[derive(Debug, Clone)]
pub struct ExampleOutcome {
    /// Dataset index.
    pub index: usize,
    /// Ground-truth output.
    pub reference: String,
    /// Condensed input produced by the Extractor.
    pub extracted: String,
    /// Instruction in the state cell when the loop stopped.
    pub instruction: String,
    /// Output in the state cell when the loop stopped.
    pub output: String,
    /// Scores of `output` against `reference`.
    pub scores: ScoreTriple,
    /// Completed Summarize→Evaluate cycles.
    pub cycles: u32,
    /// Why the loop stopped.
    pub stop: StopReason,
    /// The accepted instruction, if the final output reached the threshold.
    pub winner: Option<String>,
    /// Full conversation, Extractor turn first.
    pub history: Vec<ConversationTurn>,
}

impl ExampleOutcome {
    pub fn is_winner(&self) -> bool {
        self.winner.is_some()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Controller
// ─────────────────────────────────────────────────────────────────────────────

/// Drives the refinement loop for one example at a time.
///
/// # Example
///
/// ```rust,ignore
/// let controller = IterationController::new(generators, ControllerConfig::default());
/// let outcome = controller.run(0, &example).await?;
/// if let Some(instruction) = outcome.winner {
///     println!("accepted after {} cycles: {}", outcome.cycles, instruction);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct IterationController {
    generators: Arc<RoleGenerators>,
    config: ControllerConfig,
    transcript: Option<Arc<TranscriptLogger>>,
}

impl IterationController {
    pub fn new(generators: Arc<RoleGenerators>, config: ControllerConfig) -> Self {
        Self {
            generators,
            config,
            transcript: None,
        }
    }

    /// Record every turn to a transcript.
    pub fn with_transcript(mut self, logger: Arc<TranscriptLogger>) -> Self {
        self.transcript = Some(logger);
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn generators(&self) -> &RoleGenerators {
        &self.generators
    }

    pub fn termination(&self) -> Termination {
        Termination::new(self.config.threshold, self.config.max_turns)
    }

    /// Run the loop for one example.
    ///
    /// Any generation failure ends this example with an error; the caller
    /// decides whether the pass continues.
    pub async fn run(&self, index: usize, example: &Example) -> Result<ExampleOutcome> {
        let termination = self.termination();
        let mut history: Vec<ConversationTurn> = Vec::new();
        let mut cycles = 0u32;

        // Extract once; the condensed input is frozen for the rest of the run.
        let extracted = self
            .generator(AgentRole::Extractor)?
            .invoke(
                AgentRole::Extractor,
                EXTRACTOR_INSTRUCTION,
                &example.input_payload,
            )
            .await?;
        self.append(
            &mut history,
            index,
            cycles,
            ConversationTurn::new(AgentRole::Extractor, extracted.clone()),
        );

        let mut state = SharedState::new(self.config.seed_instruction.clone());
        let mut last_scores = ScoreTriple::zero();

        let stop = loop {
            let role = select_next(&history, &ROSTER);
            let turn = match role {
                AgentRole::Summarizer => {
                    let output = self
                        .generator(role)?
                        .invoke(AgentRole::Summarizer, state.instruction(), &extracted)
                        .await?;
                    state.set_output(output.clone());
                    ConversationTurn::new(role, output)
                }
                AgentRole::Evaluator => {
                    let output = state.output().unwrap_or_default();
                    last_scores = rouge::score(output, &example.reference);
                    cycles += 1;
                    tracing::debug!(
                        example = index,
                        cycle = cycles,
                        rouge_l = last_scores.rouge_l,
                        "evaluated candidate"
                    );
                    ConversationTurn::evaluation(last_scores)
                }
                AgentRole::Teacher => {
                    let review = prompts::render(
                        TEACHER_REVIEW_TEMPLATE,
                        &[
                            ("extracted_text", extracted.as_str()),
                            ("description", example.reference.as_str()),
                            ("generated_about", state.output().unwrap_or_default()),
                            ("rouge_score", last_scores.to_string().as_str()),
                            ("summarizer_prompt", state.instruction()),
                        ],
                    );
                    let reply = self
                        .generator(role)?
                        .invoke(AgentRole::Teacher, TEACHER_INSTRUCTION, &review)
                        .await?;
                    let revised = prompts::clean_candidate(&reply);
                    if revised.is_empty() {
                        tracing::warn!(
                            example = index,
                            cycle = cycles,
                            "teacher reply was empty after cleaning, keeping current instruction"
                        );
                    } else {
                        state.set_instruction(revised);
                    }
                    ConversationTurn::new(role, state.instruction())
                }
                other => {
                    return Err(OptimizerError::internal(format!(
                        "{} cannot take a turn inside the refinement loop",
                        other
                    )));
                }
            };

            self.append(&mut history, index, cycles, turn);

            if role == AgentRole::Evaluator
                && let Some(reason) = termination.should_stop(&history, cycles)
            {
                break reason;
            }
        };

        let output = state.output().unwrap_or_default().to_string();
        let scores = rouge::score(&output, &example.reference);
        let instruction = state.instruction().to_string();
        let winner = (scores.rouge_l >= self.config.threshold).then(|| instruction.clone());

        match stop {
            StopReason::Accepted { .. } => tracing::info!(
                example = index,
                cycles,
                rouge_l = scores.rouge_l,
                "example accepted"
            ),
            StopReason::BudgetExhausted { .. } => tracing::warn!(
                example = index,
                cycles,
                rouge_l = scores.rouge_l,
                "example exhausted its turn budget"
            ),
        }

        Ok(ExampleOutcome {
            index,
            reference: example.reference.clone(),
            extracted,
            instruction,
            output,
            scores,
            cycles,
            stop,
            winner,
            history,
        })
    }

    fn generator(&self, role: AgentRole) -> Result<&Generator> {
        self.generators
            .for_role(role)
            .ok_or_else(|| OptimizerError::internal(format!("{} has no generator", role)))
    }

    fn append(
        &self,
        history: &mut Vec<ConversationTurn>,
        index: usize,
        cycles: u32,
        turn: ConversationTurn,
    ) {
        if let Some(ref logger) = self.transcript
            && let Err(e) = logger.log_turn(index, cycles, &turn)
        {
            tracing::warn!(example = index, error = %e, "failed to write transcript");
        }
        history.push(turn);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use metagente_llm::{MockBackend, MockResponse, SharedBackend};

    const REFERENCE: &str = "A tiny web server";

    fn generators(
        extractor: SharedBackend,
        summarizer: SharedBackend,
        teacher: SharedBackend,
    ) -> Arc<RoleGenerators> {
        Arc::new(RoleGenerators {
            extractor: Generator::new(extractor, "m"),
            summarizer: Generator::new(summarizer, "m"),
            teacher: Generator::new(teacher, "m"),
            combiner: Generator::new(Arc::new(MockBackend::new(vec![])), "m"),
        })
    }

    fn example() -> Example {
        Example::new(REFERENCE, "# tiny\nA tiny web server.\n## Install\ncargo install tiny")
    }

    #[tokio::test]
    async fn test_first_candidate_accepted_after_one_cycle() {
        let summarizer = Arc::new(MockBackend::with_text(REFERENCE));
        let teacher = Arc::new(MockBackend::new(vec![]));
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("A tiny web server.")),
                summarizer.clone(),
                teacher.clone(),
            ),
            ControllerConfig::default(),
        );

        let outcome = controller.run(0, &example()).await.unwrap();

        assert_eq!(outcome.cycles, 1);
        assert!(matches!(outcome.stop, StopReason::Accepted { .. }));
        assert_eq!(outcome.scores.rouge_l, 1.0);
        assert_eq!(
            outcome.winner.as_deref(),
            Some(prompts::INITIAL_SUMMARIZER_INSTRUCTION)
        );
        assert_eq!(summarizer.request_count(), 1);
        assert_eq!(teacher.request_count(), 0);

        let roles: Vec<_> = outcome.history.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                AgentRole::Extractor,
                AgentRole::Summarizer,
                AgentRole::Evaluator
            ]
        );
    }

    #[tokio::test]
    async fn test_never_scoring_runs_exactly_max_turns() {
        let summarizer = Arc::new(MockBackend::with_handler(|_| {
            MockResponse::text("completely unrelated words")
        }));
        let teacher = Arc::new(MockBackend::with_handler(|_| {
            MockResponse::text("New Prompt: Try harder.")
        }));
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("extracted")),
                summarizer.clone(),
                teacher.clone(),
            ),
            ControllerConfig::default().with_max_turns(4),
        );

        let outcome = controller.run(2, &example()).await.unwrap();

        assert_eq!(outcome.index, 2);
        assert_eq!(outcome.cycles, 4);
        assert_eq!(outcome.stop, StopReason::BudgetExhausted { cycles: 4 });
        assert!(!outcome.is_winner());
        assert_eq!(summarizer.request_count(), 4);
        // No teacher turn after the final evaluation
        assert_eq!(teacher.request_count(), 3);
        assert_eq!(outcome.instruction, "Try harder.");
    }

    #[tokio::test]
    async fn test_teacher_revision_feeds_next_summary() {
        let summarizer = Arc::new(MockBackend::with_texts(["a server", REFERENCE]));
        let teacher = Arc::new(MockBackend::with_text("```\nUse the tagline verbatim.\n```"));
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("A tiny web server.")),
                summarizer.clone(),
                teacher.clone(),
            ),
            ControllerConfig::default(),
        );

        let outcome = controller.run(0, &example()).await.unwrap();

        assert_eq!(outcome.cycles, 2);
        assert_eq!(outcome.winner.as_deref(), Some("Use the tagline verbatim."));

        let requests = summarizer.requests();
        assert_eq!(
            requests[0].system.as_deref(),
            Some(prompts::INITIAL_SUMMARIZER_INSTRUCTION)
        );
        assert_eq!(
            requests[1].system.as_deref(),
            Some("Use the tagline verbatim.")
        );
        // Summarizer always sees the frozen extraction
        assert_eq!(requests[1].last_user_text(), Some("A tiny web server."));

        // Teacher review carries the candidate, reference and current prompt
        let review = teacher.requests()[0].last_user_text().unwrap().to_string();
        assert!(review.contains("a server"));
        assert!(review.contains(REFERENCE));
        assert!(review.contains(prompts::INITIAL_SUMMARIZER_INSTRUCTION));
        assert!(review.contains("ROUGE-L"));
    }

    #[tokio::test]
    async fn test_each_role_is_routed_to_its_own_backend() {
        let extractor = Arc::new(MockBackend::with_text("A tiny web server."));
        let summarizer = Arc::new(MockBackend::with_texts(["a server", REFERENCE]));
        let teacher = Arc::new(MockBackend::with_text("Use the tagline."));
        let combiner = Arc::new(MockBackend::new(vec![]));
        let controller = IterationController::new(
            Arc::new(RoleGenerators {
                extractor: Generator::new(extractor.clone(), "m-extract"),
                summarizer: Generator::new(summarizer.clone(), "m-summarize"),
                teacher: Generator::new(teacher.clone(), "m-teach"),
                combiner: Generator::new(combiner.clone(), "m-combine"),
            }),
            ControllerConfig::default(),
        );

        controller.run(0, &example()).await.unwrap();

        let extract = &extractor.requests()[0];
        assert_eq!(extract.model, "m-extract");
        assert_eq!(extract.system.as_deref(), Some(EXTRACTOR_INSTRUCTION));
        assert!(summarizer.requests().iter().all(|r| r.model == "m-summarize"));
        let teach = &teacher.requests()[0];
        assert_eq!(teach.model, "m-teach");
        assert_eq!(teach.system.as_deref(), Some(TEACHER_INSTRUCTION));
        assert_eq!(combiner.request_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_teacher_reply_keeps_instruction() {
        let summarizer = Arc::new(MockBackend::with_texts(["nope", "nope"]));
        let teacher = Arc::new(MockBackend::with_text("```\n```"));
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("x")),
                summarizer.clone(),
                teacher,
            ),
            ControllerConfig::default()
                .with_max_turns(2)
                .with_seed_instruction("seed"),
        );

        let outcome = controller.run(0, &example()).await.unwrap();
        assert_eq!(outcome.instruction, "seed");
        assert_eq!(summarizer.requests()[1].system.as_deref(), Some("seed"));
    }

    #[tokio::test]
    async fn test_generation_failure_aborts_example() {
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("x")),
                Arc::new(MockBackend::new(vec![MockResponse::Fail("boom".into())])),
                Arc::new(MockBackend::new(vec![])),
            ),
            ControllerConfig::default(),
        );

        let err = controller.run(0, &example()).await.unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::Generation {
                role: AgentRole::Summarizer,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_extractor_failure_aborts_before_loop() {
        let summarizer = Arc::new(MockBackend::new(vec![]));
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::new(vec![MockResponse::Filtered("no".into())])),
                summarizer.clone(),
                Arc::new(MockBackend::new(vec![])),
            ),
            ControllerConfig::default(),
        );

        let err = controller.run(0, &example()).await.unwrap_err();
        assert!(err.is_content_filter());
        assert_eq!(summarizer.request_count(), 0);
    }

    #[tokio::test]
    async fn test_transcript_records_every_turn() {
        let dir = tempfile::tempdir().unwrap();
        let logger = Arc::new(TranscriptLogger::new(dir.path(), 30).unwrap());
        let controller = IterationController::new(
            generators(
                Arc::new(MockBackend::with_text("x")),
                Arc::new(MockBackend::with_text(REFERENCE)),
                Arc::new(MockBackend::new(vec![])),
            ),
            ControllerConfig::default(),
        )
        .with_transcript(logger);

        controller.run(5, &example()).await.unwrap();

        let file = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let content = std::fs::read_to_string(file).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.lines().all(|l| l.contains("\"example\":5")));
    }
}
