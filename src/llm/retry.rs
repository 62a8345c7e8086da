//! Retry wrapper around [`super::LlmService::complete`].
//!
//! Grounded in the original's `llm/retry.py` `tenacity`-based
//! `with_retry(max_attempts=3, min_wait=1, max_wait=10)` decorator,
//! generalizing the teacher's `LlmErrorKind::is_retryable` classification.
//! Expressed as a plain async function rather than a decorator/macro, in
//! keeping with Rust's preference for explicit composition — it sits
//! alongside the `LlmService` trait the way the teacher keeps
//! `LoggingService` as a wrapping implementation of the same trait.

use rand::Rng;
use std::time::Duration;

use super::{LlmError, LlmRequest, LlmResponse, LlmService};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub min_wait: Duration,
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_wait: Duration::from_secs(1),
            max_wait: Duration::from_secs(10),
        }
    }
}

/// Issue `service.complete(request)`, retrying with exponential backoff and
/// jitter on `Network`/`RateLimit`/`ServerError` failures. `Auth`/
/// `InvalidRequest`/`Unknown` errors are re-raised on the first attempt.
pub async fn with_retry(
    service: &dyn LlmService,
    request: &LlmRequest,
    policy: RetryPolicy,
) -> Result<LlmResponse, LlmError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match service.complete(request).await {
            Ok(response) => return Ok(response),
            Err(err) if err.kind.is_retryable() && attempt < policy.max_attempts => {
                let wait = backoff_wait(attempt, policy, err.retry_after);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    wait_ms = wait.as_millis(),
                    error = %err.message,
                    "retrying LLM request"
                );
                tokio::time::sleep(wait).await;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff_wait(attempt: u32, policy: RetryPolicy, retry_after: Option<Duration>) -> Duration {
    if let Some(hint) = retry_after {
        return hint.clamp(policy.min_wait, policy.max_wait);
    }
    let exp = policy.min_wait.as_secs_f64() * 2f64.powi(attempt as i32 - 1);
    let base = Duration::from_secs_f64(exp).min(policy.max_wait);
    let jitter_ms = rand::thread_rng().gen_range(0..=100);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{FinishReason, LlmErrorKind, LlmProvider, Usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyService {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmService for FlakyService {
        async fn complete(&self, _request: &LlmRequest) -> Result<LlmResponse, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(LlmError::network("connection reset"));
            }
            Ok(LlmResponse {
                content: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
            })
        }

        fn model_id(&self) -> &str {
            "flaky"
        }

        fn context_window(&self) -> usize {
            1000
        }

        fn provider(&self) -> LlmProvider {
            LlmProvider::Gemini
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            min_wait: Duration::from_millis(1),
            max_wait: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let service = FlakyService {
            fail_times: 2,
            calls: AtomicU32::new(0),
        };
        let request = LlmRequest {
            system: vec![],
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: 0.0,
        };
        let result = with_retry(&service, &request, fast_policy()).await;
        assert!(result.is_ok());
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let service = FlakyService {
            fail_times: 10,
            calls: AtomicU32::new(0),
        };
        let request = LlmRequest {
            system: vec![],
            messages: vec![],
            tools: vec![],
            max_tokens: None,
            temperature: 0.0,
        };
        let result = with_retry(&service, &request, fast_policy()).await;
        assert!(matches!(
            result.unwrap_err().kind,
            LlmErrorKind::Network
        ));
        assert_eq!(service.calls.load(Ordering::SeqCst), 3);
    }
}
