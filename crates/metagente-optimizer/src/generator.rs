//! Role-bound model invocation.
//!
//! A [`Generator`] pairs a backend with the model settings for one role and
//! turns `(instruction, payload)` into text. [`RoleGenerators`] holds one per
//! model-backed role.

use metagente_llm::{CompletionRequest, LlmError, Message, SharedBackend};

use crate::error::{OptimizerError, Result};
use crate::types::AgentRole;

/// Default completion token cap.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// A backend plus the request settings for one role.
#[derive(Clone)]
pub struct Generator {
    backend: SharedBackend,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl Generator {
    pub fn new(backend: SharedBackend, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send `instruction` as the system message and `payload` as the user
    /// message. Blank replies are treated as failures.
    pub async fn invoke(&self, role: AgentRole, instruction: &str, payload: &str) -> Result<String> {
        let mut request =
            CompletionRequest::new(&self.model, vec![Message::user(payload)], self.max_tokens)
                .with_system(instruction);
        if let Some(t) = self.temperature {
            request = request.with_temperature(t);
        }

        tracing::debug!(
            role = %role,
            backend = self.backend.name(),
            model = %self.model,
            payload_len = payload.len(),
            "invoking model"
        );

        let response = self
            .backend
            .complete(request)
            .await
            .map_err(|e| OptimizerError::generation(role, e))?;

        if response.is_empty() {
            return Err(OptimizerError::generation(
                role,
                LlmError::EmptyResponse(format!("{} returned no text", self.backend.name())),
            ));
        }

        tracing::debug!(
            role = %role,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "model replied"
        );

        Ok(response.text().to_string())
    }
}

/// One generator per model-backed role.
#[derive(Debug, Clone)]
pub struct RoleGenerators {
    pub extractor: Generator,
    pub summarizer: Generator,
    pub teacher: Generator,
    pub combiner: Generator,
}

impl RoleGenerators {
    /// Every role uses the same generator.
    pub fn uniform(generator: Generator) -> Self {
        Self {
            extractor: generator.clone(),
            summarizer: generator.clone(),
            teacher: generator.clone(),
            combiner: generator,
        }
    }

    /// The generator bound to `role`. The Evaluator scores locally and has none.
    pub fn for_role(&self, role: AgentRole) -> Option<&Generator> {
        match role {
            AgentRole::Extractor => Some(&self.extractor),
            AgentRole::Summarizer => Some(&self.summarizer),
            AgentRole::Teacher => Some(&self.teacher),
            AgentRole::Combiner => Some(&self.combiner),
            AgentRole::Evaluator => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use metagente_llm::{MockBackend, MockResponse};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_invoke_sends_instruction_as_system() {
        let backend = Arc::new(MockBackend::with_text("  A tiny web server \n"));
        let generator = Generator::new(backend.clone(), "gpt-4o-mini").with_temperature(0.0);

        let out = generator
            .invoke(AgentRole::Summarizer, "Summarize", "README body")
            .await
            .unwrap();
        assert_eq!(out, "A tiny web server");

        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some("Summarize"));
        assert_eq!(requests[0].last_user_text(), Some("README body"));
        assert_eq!(requests[0].model, "gpt-4o-mini");
        assert_eq!(requests[0].temperature, Some(0.0));
        assert_eq!(requests[0].max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_blank_reply_is_a_failure() {
        let generator = Generator::new(Arc::new(MockBackend::with_text("   ")), "m");
        let err = generator
            .invoke(AgentRole::Teacher, "i", "p")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OptimizerError::Generation {
                role: AgentRole::Teacher,
                source: LlmError::EmptyResponse(_)
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_names_the_role() {
        let backend = MockBackend::new(vec![MockResponse::Filtered("policy".into())]);
        let generator = Generator::new(Arc::new(backend), "m").with_max_tokens(64);
        let err = generator
            .invoke(AgentRole::Extractor, "i", "p")
            .await
            .unwrap_err();
        assert!(err.is_content_filter());
        assert!(err.to_string().starts_with("Extractor"));
    }

    #[test]
    fn test_evaluator_has_no_generator() {
        let generators =
            RoleGenerators::uniform(Generator::new(Arc::new(MockBackend::new(vec![])), "m"));
        assert!(generators.for_role(AgentRole::Evaluator).is_none());
        assert_eq!(
            generators.for_role(AgentRole::Combiner).unwrap().model(),
            "m"
        );
    }
}
