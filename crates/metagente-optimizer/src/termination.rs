//! Stop conditions for the refinement loop.

use crate::types::{AgentRole, ConversationTurn};

/// Default minimum ROUGE-L for acceptance.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// Default number of Summarize→Evaluate cycles per example.
pub const DEFAULT_MAX_TURNS: u32 = 45;

/// Why a loop stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StopReason {
    /// The latest evaluation reached the threshold.
    Accepted { rouge_l: f64 },
    /// The cycle budget ran out first.
    BudgetExhausted { cycles: u32 },
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Accepted { rouge_l } => write!(f, "accepted (ROUGE-L {:.4})", rouge_l),
            StopReason::BudgetExhausted { cycles } => {
                write!(f, "budget exhausted after {} cycles", cycles)
            }
        }
    }
}

/// Decides when the loop ends. Consulted right after each Evaluator turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Termination {
    pub threshold: f64,
    pub max_turns: u32,
}

impl Default for Termination {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            max_turns: DEFAULT_MAX_TURNS,
        }
    }
}

impl Termination {
    pub fn new(threshold: f64, max_turns: u32) -> Self {
        Self {
            threshold,
            max_turns,
        }
    }

    /// Returns a reason to stop, or `None` to keep going.
    ///
    /// Acceptance wins over budget exhaustion when both hold, so a final
    /// passing cycle is reported as accepted.
    pub fn should_stop(&self, history: &[ConversationTurn], cycles: u32) -> Option<StopReason> {
        if let Some(rouge_l) = latest_rouge_l(history)
            && rouge_l >= self.threshold
        {
            return Some(StopReason::Accepted { rouge_l });
        }
        if cycles >= self.max_turns {
            return Some(StopReason::BudgetExhausted { cycles });
        }
        None
    }
}

/// ROUGE-L of the most recent Evaluator turn.
fn latest_rouge_l(history: &[ConversationTurn]) -> Option<f64> {
    history
        .iter()
        .rev()
        .find(|turn| turn.role == AgentRole::Evaluator)
        .and_then(|turn| turn.scores)
        .map(|scores| scores.rouge_l)
}
