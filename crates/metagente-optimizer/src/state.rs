//! Per-example shared state: the latest instruction and the latest output.

/// Single-slot store written by the Summarizer (output) and the Teacher
/// (instruction). Owned by one controller run; turns are serialized, so it
/// needs no locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedState {
    instruction: String,
    output: Option<String>,
}

impl SharedState {
    /// Start from a seed instruction with no output yet.
    pub fn new(seed_instruction: impl Into<String>) -> Self {
        Self {
            instruction: seed_instruction.into(),
            output: None,
        }
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    pub fn set_instruction(&mut self, instruction: impl Into<String>) {
        self.instruction = instruction.into();
    }

    /// Latest generated output, if the Summarizer has spoken.
    pub fn output(&self) -> Option<&str> {
        self.output.as_deref()
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_state() {
        let state = SharedState::new("Summarize this");
        assert_eq!(state.instruction(), "Summarize this");
        assert!(state.output().is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let mut state = SharedState::new("seed");
        state.set_output("first");
        state.set_output("second");
        state.set_instruction("revised");
        assert_eq!(state.output(), Some("second"));
        assert_eq!(state.instruction(), "revised");
    }
}
