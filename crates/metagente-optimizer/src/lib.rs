//! Multi-agent prompt refinement for Metagente.
//!
//! Improves a summarization instruction by running a feedback loop over a
//! labeled dataset: an Extractor condenses each input, a Summarizer produces
//! a candidate with the current instruction, an Evaluator scores it with
//! ROUGE, and a Teacher rewrites the instruction. Instructions that reach the
//! threshold are combined into one final instruction.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Aggregator                                                 │
//! │  - runs one controller per example (bounded concurrency)    │
//! │  - collects winners in dataset order                        │
//! │  - combines winners, writes artifacts                       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  IterationController                                        │
//! │  Extract → (Summarize → Evaluate → Teach)* → Done           │
//! └─────────────────────────────────────────────────────────────┘
//!          │              │              │              │
//!          ▼              ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │select_next │ │Termination │ │SharedState │ │ Generator  │
//!   │            │ │            │ │            │ │(metagente- │
//!   │            │ │            │ │            │ │    llm)    │
//!   └────────────┘ └────────────┘ └────────────┘ └────────────┘
//! ```

pub mod aggregator;
pub mod artifacts;
pub mod controller;
pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod generator;
pub mod prompts;
pub mod rouge;
pub mod selection;
pub mod state;
pub mod termination;
pub mod transcript;
pub mod types;

pub use aggregator::{AggregateReport, Aggregator, ExampleFailure, ProgressFn};
pub use artifacts::{ArtifactPaths, ResultRow};
pub use controller::{ControllerConfig, ExampleOutcome, IterationController};
pub use dataset::{load_examples, read_examples};
pub use error::{OptimizerError, Result};
pub use evaluation::{Evaluation, EvaluationReport, EvaluationRow};
pub use generator::{Generator, RoleGenerators};
pub use selection::{ROSTER, select_next};
pub use state::SharedState;
pub use termination::{StopReason, Termination};
pub use transcript::{TranscriptLogger, TurnRecord};
pub use types::{AgentRole, ConversationTurn, Example, ScoreTriple};
