//! Core data types for the refinement loop.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Example
// ─────────────────────────────────────────────────────────────────────────────

/// One labeled dataset row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// Ground-truth output (`description` column).
    #[serde(rename = "description")]
    pub reference: String,
    /// Raw input text (`readme` column).
    #[serde(rename = "readme")]
    pub input_payload: String,
}

impl Example {
    pub fn new(reference: impl Into<String>, input_payload: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            input_payload: input_payload.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

/// The participants of a refinement run.
///
/// Only [`Summarizer`](AgentRole::Summarizer), [`Evaluator`](AgentRole::Evaluator)
/// and [`Teacher`](AgentRole::Teacher) take turns inside the loop. The
/// Extractor speaks once before it, the Combiner once after all examples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Extractor,
    Summarizer,
    Evaluator,
    Teacher,
    Combiner,
}

impl AgentRole {
    /// Display name used in logs and transcripts.
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Extractor => "Extractor",
            AgentRole::Summarizer => "Summarizer",
            AgentRole::Evaluator => "Evaluator",
            AgentRole::Teacher => "Teacher",
            AgentRole::Combiner => "Combiner",
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Scores
// ─────────────────────────────────────────────────────────────────────────────

/// F-measures of ROUGE-1, ROUGE-2 and ROUGE-L, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreTriple {
    pub rouge1: f64,
    pub rouge2: f64,
    pub rouge_l: f64,
}

impl ScoreTriple {
    pub fn new(rouge1: f64, rouge2: f64, rouge_l: f64) -> Self {
        Self {
            rouge1,
            rouge2,
            rouge_l,
        }
    }

    /// All zeros.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl std::fmt::Display for ScoreTriple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ROUGE-1: {:.4}, ROUGE-2: {:.4}, ROUGE-L: {:.4}",
            self.rouge1, self.rouge2, self.rouge_l
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversation
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the append-only conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Who spoke.
    pub role: AgentRole,
    /// What was said.
    pub content: String,
    /// Scores reported by an Evaluator turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreTriple>,
}

impl ConversationTurn {
    /// A turn with text only.
    pub fn new(role: AgentRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            scores: None,
        }
    }

    /// An Evaluator turn carrying its scores.
    pub fn evaluation(scores: ScoreTriple) -> Self {
        Self {
            role: AgentRole::Evaluator,
            content: scores.to_string(),
            scores: Some(scores),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
