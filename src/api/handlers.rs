//! Route handlers: start/stop/list agent runs, standalone code generation,
//! and liveness.
//!
//! Grounded in the original's `api/routes.py` (`/api/agent`,
//! `/api/agent/stop/{id}`, `/api/generate-code`, `/api/health`), reshaped
//! into axum extractors in the teacher's handler style (one `async fn` per
//! route, `AppState` via `State`, errors via `?` into [`AppError`]).

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use crate::agent::{AgentConfig, AgentEvent, AgentLoop};
use crate::codegen::CodeGenerator;
use crate::error::AppError;
use crate::llm::ModelRegistry;
use crate::ratelimit::Category;
use crate::security::resolve_api_key;

use super::sse::agent_event_stream;
use super::types::{
    AgentRequest, CodeGenRequest, CodeGenResponse, ErrorResponse, HealthResponse, SessionListResponse, StopAllResponse,
    StopResponse,
};
use super::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/agent", post(start_agent))
        .route("/api/agent/stop/:id", post(stop_agent))
        .route("/api/agent/stop-all", post(stop_all))
        .route("/api/agent/sessions", get(list_sessions))
        .route("/api/generate-code", post(generate_code))
        .route("/api/health", get(health))
        .with_state(state)
}

fn header_api_key(headers: &HeaderMap) -> Option<&str> {
    headers.get("X-API-Key").and_then(|v| v.to_str().ok())
}

fn rate_limited(message: &str) -> Response {
    let body = Json(ErrorResponse {
        error: "rate_limited".to_string(),
        message: message.to_string(),
    });
    (StatusCode::TOO_MANY_REQUESTS, body).into_response()
}

/// `POST /api/agent`. Validates the request, resolves an API key,
/// rate-limits, then streams the run as Server-Sent Events. The `session`
/// event is sent before the agent loop itself starts so it is always the
/// first frame, even if the browser later fails to launch.
async fn start_agent(State(state): State<AppState>, headers: HeaderMap, Json(request): Json<AgentRequest>) -> Response {
    if let Err(message) = request.validate() {
        return AppError::Validation(message).into_response();
    }

    if !state.rate_limiter.check(Category::Agent) {
        return rate_limited("agent rate limit exceeded");
    }

    let api_key = match resolve_api_key(request.provider, header_api_key(&headers), request.api_key.as_deref(), &state.settings) {
        Ok(key) => key,
        Err(err) => return err.into_response(),
    };

    let llm = ModelRegistry::build(request.provider, &api_key, None);

    let mut config = AgentConfig {
        headless: request.headless,
        framework: request.framework,
        language: request.language,
        use_boost_prompt: request.use_boost_prompt,
        use_structured_execution: request.use_structured_execution,
        verify_each_step: request.verify_each_step,
        http_credentials: request
            .http_credentials
            .as_ref()
            .map(|c| (c.username.clone(), c.password.clone())),
        ..AgentConfig::default()
    };
    config.max_steps = config.max_steps.min(state.settings.max_steps_cap);

    let session = state.sessions.create().await;
    let session_id = session.id;

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let _ = tx.send(AgentEvent::Session { session_id: session_id.to_string() });

    let agent_loop = AgentLoop::new(llm, config, Some(session.clone()), request.task, request.url);
    let registry = state.sessions.clone();

    tokio::spawn(async move {
        agent_loop.run(tx).await;
        session.mark_completed();
        tokio::time::sleep(crate::session::REMOVAL_GRACE).await;
        registry.remove(session_id).await;
    });

    agent_event_stream(rx).into_response()
}

async fn stop_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<StopResponse>, AppError> {
    if state.sessions.stop(id).await {
        Ok(Json(StopResponse {
            status: "stopping",
            session_id: id.to_string(),
            message: "stop requested".to_string(),
        }))
    } else {
        Err(AppError::SessionNotFound(id.to_string()))
    }
}

async fn stop_all(State(state): State<AppState>) -> impl IntoResponse {
    let stopped_count = state.sessions.stop_all().await;
    Json(StopAllResponse {
        status: "success",
        stopped_count,
        message: format!("stopped {stopped_count} session(s)"),
    })
}

async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let active = state.sessions.list_active().await;
    Json(SessionListResponse {
        count: active.len(),
        active_sessions: active.into_iter().map(|id| id.to_string()).collect(),
    })
}

async fn generate_code(State(state): State<AppState>, Json(request): Json<CodeGenRequest>) -> Result<impl IntoResponse, AppError> {
    if !state.rate_limiter.check(Category::Codegen) {
        return Err(AppError::Validation("codegen rate limit exceeded".to_string()));
    }
    let (code, filename) = CodeGenerator::generate(&request.steps, request.framework, request.language);
    Ok(Json(CodeGenResponse { code, filename }))
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now(),
    })
}
