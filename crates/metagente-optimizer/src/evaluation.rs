//! Held-out evaluation of a fixed summarizer instruction.
//!
//! Each example gets one Extractor call and one Summarizer call, then the
//! output is scored against the reference. No refinement happens.

use std::pin::pin;

use futures::StreamExt;

use crate::artifacts::ResultRow;
use crate::error::Result;
use crate::generator::RoleGenerators;
use crate::prompts::EXTRACTOR_INSTRUCTION;
use crate::rouge;
use crate::types::{AgentRole, Example, ScoreTriple};

/// Scores for one example.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRow {
    pub index: usize,
    pub reference: String,
    pub output: String,
    pub scores: ScoreTriple,
}

impl From<&EvaluationRow> for ResultRow {
    fn from(row: &EvaluationRow) -> Self {
        ResultRow::new(&row.reference, &row.output, row.scores)
    }
}

/// Outcome of an evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    /// Scored examples, dataset order.
    pub rows: Vec<EvaluationRow>,
    /// Indices of examples that failed and were skipped.
    pub skipped: Vec<usize>,
}

impl EvaluationReport {
    /// Mean of each metric over the scored rows.
    pub fn mean(&self) -> ScoreTriple {
        if self.rows.is_empty() {
            return ScoreTriple::zero();
        }
        let n = self.rows.len() as f64;
        let sum = self.rows.iter().fold(ScoreTriple::zero(), |acc, r| {
            ScoreTriple::new(
                acc.rouge1 + r.scores.rouge1,
                acc.rouge2 + r.scores.rouge2,
                acc.rouge_l + r.scores.rouge_l,
            )
        });
        ScoreTriple::new(sum.rouge1 / n, sum.rouge2 / n, sum.rouge_l / n)
    }

    pub fn result_rows(&self) -> Vec<ResultRow> {
        self.rows.iter().map(ResultRow::from).collect()
    }
}

/// Runs a fixed instruction over a dataset.
#[derive(Debug, Clone)]
pub struct Evaluation<'a> {
    generators: &'a RoleGenerators,
    instruction: String,
    concurrency: usize,
}

impl<'a> Evaluation<'a> {
    pub fn new(generators: &'a RoleGenerators, instruction: impl Into<String>) -> Self {
        Self {
            generators,
            instruction: instruction.into(),
            concurrency: 1,
        }
    }

    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Evaluate every example. Per-example failures are logged and skipped.
    pub async fn run(&self, examples: &[Example]) -> EvaluationReport {
        let mut stream = pin!(
            futures::stream::iter(examples.iter().enumerate())
                .map(|(index, example)| async move {
                    (index, self.score_one(index, example).await)
                })
                .buffered(self.concurrency)
        );

        let mut report = EvaluationReport::default();
        while let Some((index, result)) = stream.next().await {
            match result {
                Ok(row) => report.rows.push(row),
                Err(e) => {
                    tracing::error!(example = index, error = %e, "evaluation failed, skipping");
                    report.skipped.push(index);
                }
            }
        }

        tracing::info!(
            scored = report.rows.len(),
            skipped = report.skipped.len(),
            mean_rouge_l = report.mean().rouge_l,
            "evaluation complete"
        );
        report
    }

    async fn score_one(&self, index: usize, example: &Example) -> Result<EvaluationRow> {
        let extracted = self
            .generators
            .extractor
            .invoke(
                AgentRole::Extractor,
                EXTRACTOR_INSTRUCTION,
                &example.input_payload,
            )
            .await?;
        let output = self
            .generators
            .summarizer
            .invoke(AgentRole::Summarizer, &self.instruction, &extracted)
            .await?;
        let scores = rouge::score(&output, &example.reference);

        tracing::debug!(example = index, rouge_l = scores.rouge_l, "scored example");

        Ok(EvaluationRow {
            index,
            reference: example.reference.clone(),
            output,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::Generator;
    use metagente_llm::{MockBackend, MockResponse};
    use std::sync::Arc;

    fn generators(summarizer: Arc<MockBackend>) -> RoleGenerators {
        let extractor = Arc::new(MockBackend::with_handler(|req| {
            let text = req.last_user_text().unwrap_or_default();
            if text == "bad" {
                MockResponse::Fail("nope".into())
            } else {
                MockResponse::text(text)
            }
        }));
        let idle = Arc::new(MockBackend::new(vec![]));
        RoleGenerators {
            extractor: Generator::new(extractor, "m"),
            summarizer: Generator::new(summarizer, "m"),
            teacher: Generator::new(idle.clone(), "m"),
            combiner: Generator::new(idle, "m"),
        }
    }

    #[tokio::test]
    async fn test_scores_each_example_with_fixed_instruction() {
        let summarizer = Arc::new(MockBackend::with_handler(|req| {
            MockResponse::text(req.last_user_text().unwrap_or_default())
        }));
        let generators = generators(summarizer.clone());

        let report = Evaluation::new(&generators, "Use the tagline")
            .run(&[
                Example::new("A tiny web server", "A tiny web server"),
                Example::new("Fast JSON parser", "something else"),
            ])
            .await;

        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].scores.rouge_l, 1.0);
        assert_eq!(report.rows[1].scores.rouge_l, 0.0);
        assert!((report.mean().rouge_l - 0.5).abs() < 1e-9);
        assert!(
            summarizer
                .requests()
                .iter()
                .all(|r| r.system.as_deref() == Some("Use the tagline"))
        );
    }

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let summarizer = Arc::new(MockBackend::with_handler(|_| MockResponse::text("x")));
        let generators = generators(summarizer);

        let report = Evaluation::new(&generators, "i")
            .with_concurrency(2)
            .run(&[
                Example::new("x", "ok"),
                Example::new("y", "bad"),
                Example::new("z", "ok"),
            ])
            .await;

        assert_eq!(report.skipped, vec![1]);
        let indices: Vec<_> = report.rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(report.result_rows().len(), 2);
    }

    #[test]
    fn test_mean_of_empty_report() {
        assert_eq!(EvaluationReport::default().mean(), ScoreTriple::zero());
    }
}
