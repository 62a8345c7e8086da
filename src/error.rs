//! Crate-wide error taxonomy.
//!
//! Mirrors the shape of [`crate::llm::LlmError`]/[`crate::tools::browser::BrowserError`]:
//! a `thiserror`-derived enum classifying failures so the `RequestGateway` can
//! map them onto an HTTP status and JSON body without re-deriving the
//! classification at the boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing/invalid API key, unknown provider, invalid URL.
    #[error("{0}")]
    Configuration(String),

    /// Network timeout, 429, 5xx from the LLM provider. Retried internally
    /// by [`crate::llm::retry::with_retry`]; only reaches the boundary if
    /// retries are exhausted.
    #[error("{provider} is temporarily unavailable: {message}")]
    TransientRemote { provider: String, message: String },

    /// 400/401/403/404 from the LLM provider.
    #[error("{provider} rejected the request: {message}")]
    PermanentRemote { provider: String, message: String },

    /// Timeout or locator failure at the browser layer that escaped a
    /// `ToolResult` and propagated as a hard error (e.g. during launch).
    #[error("browser error: {0}")]
    Browser(String),

    /// Same tool call repeated past the loop-detection threshold with no
    /// corrective effect, or too many turns with no tool call at all.
    #[error("agent loop stalled: {0}")]
    LoopStall(String),

    /// Cooperative cancellation observed at an iteration boundary.
    #[error("cancelled")]
    CancellationRequested,

    /// `AgentConfig.max_steps` reached without completion.
    #[error("reached maximum steps ({0})")]
    MaxStepsExceeded(u32),

    /// Session id not found, or already removed from the registry.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("validation error: {0}")]
    Validation(String),
}

impl AppError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::Configuration(msg.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Configuration(_) => (StatusCode::BAD_REQUEST, "configuration_error"),
            AppError::TransientRemote { .. } => (StatusCode::BAD_GATEWAY, "transient_remote_error"),
            AppError::PermanentRemote { .. } => (StatusCode::BAD_GATEWAY, "permanent_remote_error"),
            AppError::Browser(_) => (StatusCode::INTERNAL_SERVER_ERROR, "browser_error"),
            AppError::LoopStall(_) => (StatusCode::INTERNAL_SERVER_ERROR, "loop_stall"),
            AppError::CancellationRequested => (StatusCode::OK, "cancelled"),
            AppError::MaxStepsExceeded(_) => (StatusCode::OK, "max_steps_exceeded"),
            AppError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "session_not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
        };

        let body = json!({
            "error": code,
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Unauthorized API-key resolution failure. Kept distinct from [`AppError`]
/// so the `WWW-Authenticate` header can be attached, matching the original's
/// dedicated `APIKeyError` subclass.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ApiKeyError(pub String);

impl IntoResponse for ApiKeyError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": "unauthorized",
            "message": self.0,
        });
        let mut response = (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        response
            .headers_mut()
            .insert("WWW-Authenticate", "X-API-Key".parse().unwrap());
        response
    }
}
