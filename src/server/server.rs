use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

use crate::config::settings::MainConfig;
use crate::observability::metrics::Metrics;
use crate::observability::routes;
use crate::tokens::{TokenHealth, TokenManager, TokenStatus};

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenManager,
    pub config: Arc<MainConfig>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(tokens: TokenManager, config: MainConfig, metrics: Metrics) -> Self {
        Self {
            tokens,
            config: Arc::new(config),
            metrics,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/token-status", get(token_status))
            .route("/force-refresh", post(force_refresh))
            .route("/config", get(public_config))
            .merge(routes::router(&self.config.server.metrics))
            .with_state(self.clone())
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: TokenHealth,
    token_available: bool,
    background_service_running: bool,
}

#[derive(Debug, Serialize)]
struct RefreshResponse {
    refresh_successful: bool,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = state.tokens.status().await;
    Json(HealthResponse {
        status: status.health,
        token_available: status.token_available,
        background_service_running: status.background_service_running,
    })
}

async fn token_status(State(state): State<AppState>) -> Json<TokenStatus> {
    Json(state.tokens.status().await)
}

async fn force_refresh(State(state): State<AppState>) -> Json<RefreshResponse> {
    Json(RefreshResponse {
        refresh_successful: state.tokens.force_refresh().await,
    })
}

async fn public_config(State(state): State<AppState>) -> Json<MainConfig> {
    Json(state.config.redacted())
}

/// Serve the status routes until `shutdown` resolves.
pub async fn start<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let server = &state.config.server;
    let address = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("status server listening on {address}");

    let app = state.router();
    state.metrics.up.set(1);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("status server failed");
    state.metrics.up.set(0);
    served
}
