//! Dataset loading.
//!
//! A dataset is a CSV file with `description` (reference) and `readme`
//! (input) columns. Other columns are ignored.

use std::io::Read;
use std::path::Path;

use crate::error::{OptimizerError, Result};
use crate::types::Example;

const REQUIRED_COLUMNS: [&str; 2] = ["description", "readme"];

/// Load every row of a CSV file as an [`Example`], in file order.
pub fn load_examples(path: &Path) -> Result<Vec<Example>> {
    let file = std::fs::File::open(path).map_err(|e| {
        OptimizerError::dataset(format!("cannot open {}: {}", path.display(), e))
    })?;
    let examples = read_examples(file)?;
    tracing::info!(path = %path.display(), examples = examples.len(), "loaded dataset");
    Ok(examples)
}

/// Parse examples from any CSV source.
pub fn read_examples<R: Read>(source: R) -> Result<Vec<Example>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(source);

    let headers = reader.headers()?.clone();
    let missing: Vec<_> = REQUIRED_COLUMNS
        .iter()
        .filter(|col| !headers.iter().any(|h| h == **col))
        .copied()
        .collect();
    if !missing.is_empty() {
        return Err(OptimizerError::dataset(format!(
            "missing required column(s): {}",
            missing.join(", ")
        )));
    }

    reader
        .deserialize::<Example>()
        .enumerate()
        .map(|(row, record)| {
            record.map_err(|e| OptimizerError::dataset(format!("row {}: {}", row + 1, e)))
        })
        .collect()
}
