//! Request-rate limiting.
//!
//! Out of scope per the core design (a thin external collaborator) but
//! still part of the ambient stack a real deployment carries; the gateway
//! needs *something* enforcing the per-minute caps the configuration
//! exposes. Grounded in the `governor` crate as used by
//! `Crescent-Moon-AI-agent-rs` (a token-bucket `RateLimiter` per quota)
//! from the example pack, rather than hand-rolling a counter.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorLimiter};

use crate::config::Settings;

/// Which quota a request should be checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Agent,
    Codegen,
    Default,
}

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Three independent per-minute token buckets, one per [`Category`].
///
/// A single process-wide bucket per category (not per client) matches the
/// original's module-level limiter instances; nothing in the
/// specification asks for per-API-key quotas.
pub struct RateLimiter {
    agent: DirectLimiter,
    codegen: DirectLimiter,
    default: DirectLimiter,
    enabled: bool,
}

impl RateLimiter {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Arc<Self> {
        Arc::new(Self {
            agent: build_limiter(settings.rate_limit_agent_per_min),
            codegen: build_limiter(settings.rate_limit_codegen_per_min),
            default: build_limiter(settings.rate_limit_default_per_min),
            enabled: settings.rate_limit_enabled,
        })
    }

    /// Returns `true` if the request is allowed, `false` if the caller
    /// should receive a 429. Always returns `true` when rate limiting is
    /// disabled in configuration.
    #[must_use]
    pub fn check(&self, category: Category) -> bool {
        if !self.enabled {
            return true;
        }
        let limiter = match category {
            Category::Agent => &self.agent,
            Category::Codegen => &self.codegen,
            Category::Default => &self.default,
        };
        limiter.check().is_ok()
    }
}

fn build_limiter(per_minute: u32) -> DirectLimiter {
    let quota = Quota::per_minute(NonZeroU32::new(per_minute.max(1)).unwrap());
    GovernorLimiter::direct(quota)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_limits(agent: u32) -> Settings {
        Settings {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![],
            rate_limit_enabled: true,
            rate_limit_agent_per_min: agent,
            rate_limit_codegen_per_min: 20,
            rate_limit_default_per_min: 60,
            max_steps_cap: 50,
            llm_timeout_secs: 120,
            browser_timeout_secs: 30,
            agent_timeout_secs: 300,
            llm_retry_max_attempts: 3,
            llm_retry_min_wait_secs: 1,
            llm_retry_max_wait_secs: 10,
            screenshot_quality: 80,
            gemini_api_key: None,
            perplexity_api_key: None,
            huggingface_api_key: None,
        }
    }

    #[test]
    fn exhausts_the_bucket_then_rejects() {
        let limiter = RateLimiter::from_settings(&settings_with_limits(2));
        assert!(limiter.check(Category::Agent));
        assert!(limiter.check(Category::Agent));
        assert!(!limiter.check(Category::Agent));
    }

    #[test]
    fn categories_are_independent() {
        let limiter = RateLimiter::from_settings(&settings_with_limits(1));
        assert!(limiter.check(Category::Agent));
        assert!(!limiter.check(Category::Agent));
        assert!(limiter.check(Category::Codegen));
    }

    #[test]
    fn disabled_always_allows() {
        let mut settings = settings_with_limits(1);
        settings.rate_limit_enabled = false;
        let limiter = RateLimiter::from_settings(&settings);
        assert!(limiter.check(Category::Agent));
        assert!(limiter.check(Category::Agent));
        assert!(limiter.check(Category::Agent));
    }
}
