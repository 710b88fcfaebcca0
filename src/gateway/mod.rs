//! HTTP surface: the per-agent webhook and a health check.

pub mod traits;
pub mod webhook;

pub use traits::{WebhookError, WebhookOutcome};
pub use webhook::{handle_webhook, SECRET_HEADER};

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;

use crate::auto_reply::{create_dispatcher, CommandDispatcher, RetryPolicy};
use crate::channels::{create_platform, PlatformApi};
use crate::config::RouteConfig;
use crate::infra::{create_dead_letter_sink, DeadLetterSink};
use crate::memory::{create_memory, MemoryStore};
use crate::providers::{create_registry, ProviderRegistry};
use crate::routing::{create_gate, HandleGate};

/// Maximum accepted request body.
pub const MAX_BODY_SIZE: usize = 1024 * 1024;
pub const HEALTH_PATH: &str = "/telegram/healthz";
pub const SERVICE_NAME: &str = "agent-router";
pub const BODY_TOO_LARGE: &str = "Request body too large.";

/// Shared state for all axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RouteConfig>,
    pub platform: Arc<dyn PlatformApi>,
    pub memory: Arc<MemoryStore>,
    pub providers: Arc<ProviderRegistry>,
    pub commands: Arc<CommandDispatcher>,
    pub gate: Arc<dyn HandleGate>,
    pub dead_letters: Arc<dyn DeadLetterSink>,
    pub retry: RetryPolicy,
}

impl AppState {
    /// Wire every component from `config`.
    pub fn from_config(config: Arc<RouteConfig>) -> Result<Self> {
        Ok(Self {
            platform: create_platform(Arc::clone(&config)),
            memory: Arc::new(create_memory(&config)),
            providers: Arc::new(create_registry(&config)?),
            commands: Arc::new(create_dispatcher()),
            gate: Arc::from(create_gate()),
            dead_letters: create_dead_letter_sink(&config),
            retry: RetryPolicy::from_config(&config.delivery),
            config,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    let webhook_route = state.config.webhook_route();
    Router::new()
        .route(HEALTH_PATH, get(handle_health))
        .route(&webhook_route, post(handle_webhook))
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)))
        .layer(middleware::map_response(body_limit_as_json))
        .with_state(state)
}

/// The body limit answers with plain text; re-render it like every other
/// webhook refusal.
async fn body_limit_as_json(response: Response) -> Response {
    if response.status() != StatusCode::PAYLOAD_TOO_LARGE {
        return response;
    }
    let trace_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(trace_id = %trace_id, limit = MAX_BODY_SIZE, "request body too large");
    traits::render(
        &Err(WebhookError::rejected(
            StatusCode::PAYLOAD_TOO_LARGE,
            BODY_TOO_LARGE,
        )),
        &trace_id,
    )
}

/// GET /telegram/healthz
async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "ok": true,
        "service": SERVICE_NAME,
        "supabase_memory": state.memory.is_remote_enabled(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Bind and serve until SIGINT/SIGTERM.
pub async fn run_gateway(config: Arc<RouteConfig>, host: &str, port: u16) -> Result<()> {
    let state = AppState::from_config(Arc::clone(&config))?;
    tracing::info!(
        platform = state.platform.name(),
        gate = state.gate.name(),
        dead_letters = state.dead_letters.name(),
        memory = %crate::memory::effective_memory_backend_name(&state.memory),
        routed_agents = ?state.providers.list(),
        bridge = state.providers.has_bridge(),
        commands = ?state.commands.list().iter().map(|(name, _)| *name).collect::<Vec<_>>(),
        "router components ready"
    );
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;

    tracing::info!(
        addr = %addr,
        webhook = %config.webhook_route_label(),
        health = HEALTH_PATH,
        "router listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    () = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
                tracing::info!("received SIGINT, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
        tracing::info!("received SIGINT, shutting down");
    }
}
