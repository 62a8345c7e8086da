//! HTTP gateway: request validation, API-key/rate-limit enforcement, and
//! SSE bridging for the agent and code-generation endpoints.
//!
//! Grounded in the original's `api/routes.py` + `main.py` wiring, kept
//! deliberately thin per the specification — the engineering lives in
//! [`crate::agent`], [`crate::tools`], and [`crate::llm`] beneath it.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;
pub use types::*;

use std::sync::Arc;

use crate::config::Settings;
use crate::ratelimit::RateLimiter;
use crate::session::SessionRegistry;

/// Shared application state threaded through every handler via
/// `axum::extract::State`.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub settings: Arc<Settings>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    #[must_use]
    pub fn new(settings: Arc<Settings>) -> Self {
        let rate_limiter = RateLimiter::from_settings(&settings);
        Self {
            sessions: SessionRegistry::new(),
            settings,
            rate_limiter,
        }
    }
}
