//! LLM provider abstraction.
//!
//! Three concrete providers are supported: Gemini (native function calling),
//! Perplexity (text-protocol tool calls injected into the prompt), and
//! HuggingFace (chat-template prompt completion reusing the text-protocol
//! parser). All three implement the same [`LlmService`] trait so the agent
//! loop never has to know which provider it is talking to.

mod error;
mod gemini;
mod huggingface;
mod perplexity;
mod registry;
mod retry;
mod text_protocol;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use gemini::GeminiService;
pub use huggingface::HuggingFaceService;
pub use perplexity::PerplexityService;
pub use registry::{LlmConfig, ModelRegistry};
pub use retry::with_retry;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Common interface implemented by every LLM provider.
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Issue a single completion request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Stable identifier for this model, e.g. `"gemini-2.0-flash"`.
    fn model_id(&self) -> &str;

    /// Maximum input context window, in tokens, used for budgeting (see
    /// [`token_budget`]).
    fn context_window(&self) -> usize;

    /// Which wire provider this service talks to.
    fn provider(&self) -> LlmProvider;
}

/// Logging wrapper for LLM services. Records duration, token usage, and
/// errors via `tracing` around every completion.
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.complete(request).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    finish_reason = ?response.finish_reason,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn context_window(&self) -> usize {
        self.inner.context_window()
    }

    fn provider(&self) -> LlmProvider {
        self.inner.provider()
    }
}
