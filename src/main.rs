//! Browser-automation agent orchestrator: given a natural-language task
//! and a starting URL, drives a real browser to completion via an
//! LLM-directed observe/think/act loop, streaming progress as
//! Server-Sent Events and emitting a generated Playwright script at the
//! end of each run.

mod agent;
mod api;
mod codegen;
mod config;
mod error;
mod llm;
mod ratelimit;
mod security;
mod session;
mod tools;

use std::net::SocketAddr;
use std::sync::Arc;

use api::{create_router, AppState};
use config::Settings;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "browser_agent=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let settings = Arc::new(Settings::from_env());

    if settings.gemini_api_key.is_none() && settings.perplexity_api_key.is_none() && settings.huggingface_api_key.is_none() {
        tracing::warn!("no server-side LLM API keys configured; requests must supply their own via X-API-Key or apiKey");
    }

    let state = AppState::new(settings.clone());

    let cors = if settings.cors_origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let origins = settings
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
            .collect::<Vec<_>>();
        CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
    };

    let compression = CompressionLayer::new().gzip(true).br(true).deflate(true).zstd(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    tracing::info!("browser agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
