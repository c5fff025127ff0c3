//! Model client abstraction for Metagente.
//!
//! Every role in the optimization loop (extractor, summarizer, teacher,
//! combiner) produces text through the [`LlmBackend`] trait, so the loop
//! itself never knows which provider sits behind a role.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  LlmBackend trait                       │
//! │  - complete() -> CompletionResponse     │
//! └─────────────────────────────────────────┘
//!                    │
//!            ┌───────┴────────┐
//!            ▼                ▼
//!   ┌───────────────┐  ┌─────────────┐
//!   │ OpenAiBackend │  │ MockBackend │
//!   └───────────────┘  └─────────────┘
//! ```

pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use backend::{LlmBackend, MockBackend, MockResponse, SharedBackend, with_retry};
pub use error::{LlmError, RateLimitInfo, Result};
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, Usage};

pub use openai::{OpenAiBackend, OpenAiConfig, create_shared_backend};
