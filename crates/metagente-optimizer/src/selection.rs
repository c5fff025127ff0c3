//! Turn selection for the refinement loop.

use crate::types::{AgentRole, ConversationTurn};

/// The roles that take turns inside the loop, in speaking order.
pub const ROSTER: [AgentRole; 3] = [
    AgentRole::Summarizer,
    AgentRole::Evaluator,
    AgentRole::Teacher,
];

/// Pick the next speaker from `roster`.
///
/// Counts only turns by roster roles (the Extractor's turn is ignored) and
/// returns `roster[count % 3]`. Content is never consulted.
pub fn select_next(history: &[ConversationTurn], roster: &[AgentRole; 3]) -> AgentRole {
    let count = history
        .iter()
        .filter(|turn| roster.contains(&turn.role))
        .count();
    roster[count % roster.len()]
}
