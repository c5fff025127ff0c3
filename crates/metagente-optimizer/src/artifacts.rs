//! Output files: the results table, the winner list and the final
//! instruction.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::controller::ExampleOutcome;
use crate::error::{OptimizerError, Result};
use crate::types::ScoreTriple;

const HEADER: [&str; 5] = ["Description", "Generated About", "ROUGE-1", "ROUGE-2", "ROUGE-L"];

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Generated About")]
    pub generated_about: String,
    #[serde(rename = "ROUGE-1")]
    pub rouge1: f64,
    #[serde(rename = "ROUGE-2")]
    pub rouge2: f64,
    #[serde(rename = "ROUGE-L")]
    pub rouge_l: f64,
}

impl ResultRow {
    pub fn new(
        description: impl Into<String>,
        generated_about: impl Into<String>,
        scores: ScoreTriple,
    ) -> Self {
        Self {
            description: description.into(),
            generated_about: generated_about.into(),
            rouge1: scores.rouge1,
            rouge2: scores.rouge2,
            rouge_l: scores.rouge_l,
        }
    }
}

impl From<&ExampleOutcome> for ResultRow {
    fn from(outcome: &ExampleOutcome) -> Self {
        Self::new(&outcome.reference, &outcome.output, outcome.scores)
    }
}

/// Where an optimization pass writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub results: PathBuf,
    pub winners: PathBuf,
    pub final_instruction: PathBuf,
}

impl ArtifactPaths {
    /// Default file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            results: dir.join("results.csv"),
            winners: dir.join("best_prompts.txt"),
            final_instruction: dir.join("optimized_prompt.txt"),
        }
    }
}

/// Write the results table with a header row.
pub fn write_results(path: &Path, rows: &[ResultRow]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        writer.write_record(HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| OptimizerError::artifact(path, e))?;
    tracing::info!(path = %path.display(), rows = rows.len(), "wrote results");
    Ok(())
}

/// Read a results table back.
pub fn read_results(path: &Path) -> Result<Vec<ResultRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    reader
        .deserialize()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Into::into)
}

/// Write one instruction per line; newlines inside an instruction are
/// flattened to spaces.
pub fn write_winners(path: &Path, winners: &[String]) -> Result<()> {
    let mut body = String::new();
    for winner in winners {
        body.push_str(&flatten_lines(winner));
        body.push('\n');
    }
    write_text(path, &body)?;
    tracing::info!(path = %path.display(), winners = winners.len(), "wrote winners");
    Ok(())
}

/// Write the combined instruction as-is.
pub fn write_final_instruction(path: &Path, instruction: &str) -> Result<()> {
    write_text(path, instruction)?;
    tracing::info!(path = %path.display(), "wrote final instruction");
    Ok(())
}

fn flatten_lines(text: &str) -> String {
    text.split(['\n', '\r'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn write_text(path: &Path, body: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, body).map_err(|e| OptimizerError::artifact(path, e))
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| OptimizerError::artifact(parent, e))
        }
        _ => Ok(()),
    }
}
