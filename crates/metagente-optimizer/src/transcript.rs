//! Per-turn transcript logging.
//!
//! Every [`ConversationTurn`] of every example can be appended as a
//! [`TurnRecord`] to daily-rotating JSONL files
//! (`transcripts-YYYY-MM-DD.jsonl`). Old files are removed on startup
//! according to the retention window.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::types::{AgentRole, ConversationTurn, ScoreTriple};

const FILE_PREFIX: &str = "transcripts-";
const FILE_SUFFIX: &str = ".jsonl";

// ─────────────────────────────────────────────────────────────────────────────
// Record
// ─────────────────────────────────────────────────────────────────────────────

/// One logged conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    /// Unique identifier for this record.
    pub id: String,
    /// Identifier shared by every record of one optimization pass.
    pub run_id: String,
    /// ISO-8601 timestamp.
    pub timestamp: String,
    /// Dataset index of the example.
    pub example: usize,
    /// Completed Summarize→Evaluate cycles when the turn was taken.
    pub cycle: u32,
    pub role: AgentRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreTriple>,
}

impl TurnRecord {
    pub fn from_turn(run_id: &str, example: usize, cycle: u32, turn: &ConversationTurn) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            timestamp: Utc::now().to_rfc3339(),
            example,
            cycle,
            role: turn.role,
            content: turn.content.clone(),
            scores: turn.scores,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logger
// ─────────────────────────────────────────────────────────────────────────────

/// Thread-safe JSONL writer with daily file rotation.
pub struct TranscriptLogger {
    dir: PathBuf,
    run_id: String,
    state: Mutex<WriterState>,
}

struct WriterState {
    current_date: Option<NaiveDate>,
    writer: Option<BufWriter<File>>,
}

impl std::fmt::Debug for TranscriptLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptLogger")
            .field("dir", &self.dir)
            .field("run_id", &self.run_id)
            .finish()
    }
}

impl TranscriptLogger {
    /// Create the directory if needed and run retention cleanup.
    pub fn new(dir: impl Into<PathBuf>, retention_days: u32) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        cleanup_old_files(&dir, retention_days)?;

        Ok(Self {
            dir,
            run_id: Uuid::new_v4().to_string(),
            state: Mutex::new(WriterState {
                current_date: None,
                writer: None,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Append one turn.
    pub fn log_turn(&self, example: usize, cycle: u32, turn: &ConversationTurn) -> Result<()> {
        let record = TurnRecord::from_turn(&self.run_id, example, cycle, turn);
        let line = serde_json::to_string(&record)?;

        let today = Utc::now().date_naive();
        let mut state = self.state.lock();

        // Rotate if date changed or no writer yet.
        if state.current_date != Some(today) {
            let path = self
                .dir
                .join(format!("{}{}{}", FILE_PREFIX, today, FILE_SUFFIX));
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            state.writer = Some(BufWriter::new(file));
            state.current_date = Some(today);
        }

        if let Some(ref mut w) = state.writer {
            writeln!(w, "{}", line)?;
            w.flush()?;
        }

        Ok(())
    }
}

/// Delete transcript files older than `retention_days`.
fn cleanup_old_files(dir: &Path, retention_days: u32) -> std::io::Result<()> {
    let cutoff = Utc::now().date_naive() - chrono::Duration::days(i64::from(retention_days));

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();

        if let Some(date_str) = name
            .strip_prefix(FILE_PREFIX)
            .and_then(|s| s.strip_suffix(FILE_SUFFIX))
            && let Ok(file_date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
            && file_date < cutoff
        {
            fs::remove_file(entry.path())?;
            tracing::info!(file = %name, "removed expired transcript");
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
