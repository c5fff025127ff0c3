//! LLM Backend trait and implementations.
//!
//! This module defines the abstraction layer over chat-completion providers
//! and provides a mock implementation for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{LlmError, Result, is_retryable};
use crate::types::{CompletionRequest, CompletionResponse, StopReason, Usage};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors (network failures, rate limits). Non-retryable
/// errors are returned immediately. A provider-supplied `retry_after` replaces the
/// computed backoff for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0u32;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                if !is_retryable(&e) || attempt >= max_retries {
                    return Err(e);
                }

                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LLM Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for LLM backend providers.
///
/// Implementations provide the actual connection to a model service. Every
/// role in the optimization loop talks to the model through this trait, so a
/// test can swap any of them for a [`MockBackend`].
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Execute a completion request and return the full response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Check if the backend is available and properly configured.
    async fn health_check(&self) -> Result<()>;
}

/// A backend that can be shared across threads.
pub type SharedBackend = Arc<dyn LlmBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted reply for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Reply with this text.
    Text(String),
    /// Fail the request with a backend error carrying this message.
    Fail(String),
    /// Fail the request as if the provider filtered the content.
    Filtered(String),
}

impl MockResponse {
    /// Shorthand for a text reply.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

type Handler = dyn Fn(&CompletionRequest) -> MockResponse + Send + Sync;

/// A mock backend for testing purposes.
///
/// Either replays pre-configured responses in order, or answers every request
/// through a handler closure (useful when several roles share one backend and
/// the reply depends on which role is asking).
pub struct MockBackend {
    name: String,
    responses: Mutex<Vec<MockResponse>>,
    handler: Option<Box<Handler>>,
    request_log: Mutex<Vec<CompletionRequest>>,
}

impl std::fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("scripted", &self.handler.is_none())
            .finish()
    }
}

impl MockBackend {
    /// Create a new mock backend with the given responses.
    ///
    /// Responses are returned in order. If more requests are made than
    /// responses available, an error is returned.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(responses),
            handler: None,
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend that replays the given texts in order.
    pub fn with_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| MockResponse::Text(t.into())).collect())
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::new(vec![MockResponse::Text(text.into())])
    }

    /// Create a mock backend that computes every reply from the request.
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> MockResponse + Send + Sync + 'static,
    {
        Self {
            name: "mock".to_string(),
            responses: Mutex::new(Vec::new()),
            handler: Some(Box::new(handler)),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Rename the backend (shows up in logs and errors).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    fn next_reply(&self, request: &CompletionRequest) -> Option<MockResponse> {
        if let Some(ref handler) = self.handler {
            return Some(handler(request));
        }
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            None
        } else {
            Some(responses.remove(0))
        }
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let reply = self.next_reply(&request);
        let model = request.model.clone();
        self.request_log.lock().push(request);

        match reply {
            None => Err(LlmError::Backend(format!(
                "{}: no more responses available",
                self.name
            ))),
            Some(MockResponse::Text(text)) => {
                let count = self.request_count();
                Ok(CompletionResponse::new(
                    format!("mock_msg_{}", count),
                    model,
                    text,
                    StopReason::EndTurn,
                    Usage::new(10, 20),
                ))
            }
            Some(MockResponse::Fail(message)) => Err(LlmError::Backend(message)),
            Some(MockResponse::Filtered(message)) => Err(LlmError::ContentFilter(message)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Message;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new("test-model", vec![Message::user(text)], 100)
    }

    #[tokio::test]
    async fn test_mock_backend_single_response() {
        let backend = MockBackend::with_text("Hello!");

        let response = backend.complete(request("Hi")).await.unwrap();

        assert_eq!(response.text(), "Hello!");
        assert_eq!(response.model, "test-model");
        assert_eq!(backend.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_backend_multiple_responses() {
        let backend = MockBackend::with_texts(["First", "Second"]);

        let r1 = backend.complete(request("1")).await.unwrap();
        let r2 = backend.complete(request("2")).await.unwrap();

        assert_eq!(r1.text(), "First");
        assert_eq!(r2.text(), "Second");
        assert_eq!(backend.request_count(), 2);
        assert_eq!(backend.requests()[1].last_user_text(), Some("2"));
    }

    #[tokio::test]
    async fn test_mock_backend_exhausted() {
        let backend = MockBackend::new(vec![]);
        let result = backend.complete(request("Hi")).await;
        assert!(matches!(result, Err(LlmError::Backend(_))));
    }

    #[tokio::test]
    async fn test_mock_backend_scripted_failures() {
        let backend = MockBackend::new(vec![
            MockResponse::Fail("boom".into()),
            MockResponse::Filtered("nope".into()),
        ]);

        let first = backend.complete(request("a")).await.unwrap_err();
        assert!(first.to_string().contains("boom"));

        let second = backend.complete(request("b")).await.unwrap_err();
        assert!(second.is_content_filter());
    }

    #[tokio::test]
    async fn test_mock_backend_handler() {
        let backend = MockBackend::with_handler(|req| {
            let text = req.last_user_text().unwrap_or_default().to_uppercase();
            MockResponse::Text(text)
        })
        .named("shouty");

        let response = backend.complete(request("quiet")).await.unwrap();
        assert_eq!(response.text(), "QUIET");
        assert_eq!(backend.name(), "shouty");
    }

    #[tokio::test]
    async fn test_mock_backend_health_check() {
        let backend = MockBackend::with_text("test");
        assert!(backend.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_error() {
        let attempts = AtomicU32::new(0);

        let result = with_retry(3, Duration::from_millis(1), "test", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(LlmError::Network("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_max() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = with_retry(2, Duration::from_millis(1), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::rate_limit("slow down")) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::RateLimit(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_fatal_errors() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = with_retry(5, Duration::from_millis(1), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Auth("bad key".into())) }
        })
        .await;

        assert!(matches!(result, Err(LlmError::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
