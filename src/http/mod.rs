//! HTTP endpoints: health, readiness, metrics, and the OAuth callback

use crate::context::ServerContext;
use crate::identity::IdentityLinker;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub shards_total: usize,
    pub shards_booted: usize,
    pub populations: Vec<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: String,
}

/// Application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<ServerContext>,
    pub linker: Arc<IdentityLinker>,
}

/// Create the HTTP router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/oauth", get(oauth_handler))
        .with_state(state)
}

/// Health endpoint - always returns 200 if process is running
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Readiness endpoint - returns 200 once every shard has booted
async fn ready_handler(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.ctx.readiness.is_ready();
    let shard_state = state.ctx.pool.state();

    let response = ReadyResponse {
        ready,
        shards_total: shard_state.shard_count(),
        shards_booted: shard_state.ready_shards(),
        populations: state.ctx.pool.populations(),
    };

    if ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Metrics endpoint - returns Prometheus format metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    state
        .ctx
        .metrics
        .set_shards_ready(state.ctx.pool.state().ready_shards());

    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.ctx.metrics.render(),
    )
}

/// Identity callback - runs the linking pipeline and returns its page
async fn oauth_handler(
    State(state): State<AppState>,
    Query(callback): Query<OAuthCallback>,
) -> impl IntoResponse {
    let response = state.linker.link(&callback.code).await;
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Html(response.body))
}
