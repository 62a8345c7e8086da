//! Wire types for the HTTP surface: request bodies and response payloads.
//!
//! Grounded in the original's `models/api.py` Pydantic models
//! (`AgentRequest`, `CodeGenRequest`); reshaped into plain `serde` structs
//! in the teacher's style, with manual `Default`-backed field omission via
//! `#[serde(default)]` rather than a validation layer.

use serde::{Deserialize, Serialize};

use crate::agent::{Framework, Language, TestStep};
use crate::llm::LlmProvider;

/// HTTP basic-auth credentials passed through to the browser adapter for
/// sites that require them.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpCredentials {
    pub username: String,
    pub password: String,
}

fn default_true() -> bool {
    true
}

/// `POST /api/agent` request body. Bit-exact with the specification's wire
/// schema: `task`/`url`/`provider` required, everything else optional with
/// the original's defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentRequest {
    pub task: String,
    pub url: String,
    pub provider: LlmProvider,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub framework: Framework,

    #[serde(default)]
    pub language: Language,

    #[serde(default = "default_true")]
    pub headless: bool,

    #[serde(default = "default_true")]
    pub use_boost_prompt: bool,

    #[serde(default)]
    pub use_structured_execution: bool,

    #[serde(default = "default_true")]
    pub verify_each_step: bool,

    #[serde(default)]
    pub http_credentials: Option<HttpCredentials>,
}

impl AgentRequest {
    /// Validate the two required-shape invariants the specification names:
    /// a non-empty task, and an http/https URL with a non-empty host.
    pub fn validate(&self) -> Result<(), String> {
        if self.task.trim().is_empty() {
            return Err("task must not be empty".to_string());
        }

        let Some((scheme, rest)) = self.url.split_once("://") else {
            return Err("url must include an http:// or https:// scheme".to_string());
        };
        if scheme != "http" && scheme != "https" {
            return Err(format!("url scheme must be http or https, got {scheme}"));
        }
        let host = rest.split(['/', '?', '#']).next().unwrap_or("");
        let host = host.rsplit('@').next().unwrap_or(host);
        let host = host.split(':').next().unwrap_or(host);
        if host.is_empty() {
            return Err("url must have a non-empty host".to_string());
        }
        Ok(())
    }
}

/// `POST /api/generate-code` request body.
#[derive(Debug, Clone, Deserialize)]
pub struct CodeGenRequest {
    pub steps: Vec<TestStep>,

    #[serde(default)]
    pub framework: Framework,

    #[serde(default)]
    pub language: Language,
}

/// `POST /api/generate-code` response body.
#[derive(Debug, Clone, Serialize)]
pub struct CodeGenResponse {
    pub code: String,
    pub filename: String,
}

/// `GET /api/agent/sessions` response body.
#[derive(Debug, Clone, Serialize)]
pub struct SessionListResponse {
    pub active_sessions: Vec<String>,
    pub count: usize,
}

/// `POST /api/agent/stop/{id}` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub status: &'static str,
    pub session_id: String,
    pub message: String,
}

/// `POST /api/agent/stop-all` response body.
#[derive(Debug, Clone, Serialize)]
pub struct StopAllResponse {
    pub status: &'static str,
    pub stopped_count: usize,
    pub message: String,
}

/// `GET /api/health` response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Generic JSON error body, matching [`crate::error::AppError`]'s shape.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}
