//! HTTP API
//!
//! `GET /?action=<name>` (also mounted at `/api`) answers one action per request.
//! Aggregation actions reply with `application/json`, `usercolors` with
//! `text/css`. `GET /health` is a liveness probe.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use btstats_core::{Error, QueryService};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub type SharedState = Arc<QueryService>;

/// Build the axum Router with all endpoints.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(handle_action))
        .route("/api", get(handle_action))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: SharedState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[derive(Debug, Deserialize)]
struct ActionParams {
    action: Option<String>,
}

async fn health() -> &'static str {
    "ok"
}

async fn handle_action(
    State(service): State<SharedState>,
    query: Result<Query<ActionParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(params) = query?;
    let action = params
        .action
        .filter(|a| !a.is_empty())
        .ok_or(ApiError::MissingAction)?;

    let reply = service.handle(&action).await?;
    Ok((
        [(header::CONTENT_TYPE, reply.content_type())],
        reply.into_body(),
    )
        .into_response())
}

/// Error wrapper mapping core errors onto HTTP statuses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing action parameter")]
    MissingAction,

    #[error("invalid query string: {0}")]
    InvalidQuery(#[from] QueryRejection),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingAction | ApiError::InvalidQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Core(e) if e.is_upstream_error() => StatusCode::BAD_GATEWAY,
            ApiError::Core(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to clients; store internals stay in the log.
    fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::BAD_REQUEST => self.to_string(),
            StatusCode::BAD_GATEWAY => "user color service unavailable".to_string(),
            _ => "query failed".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        }

        let body = serde_json::json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        });
        (status, Json(body)).into_response()
    }
}
