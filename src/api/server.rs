//! HTTP transport for the control API.
//!
//! Mounts the handlers behind an axum router and serves them until the
//! shared cancellation token fires.

use std::sync::Arc;

use axum::routing::{get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handlers;
use super::AppState;
use crate::{AppError, Result};

/// Build the control API router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/task", post(handlers::register_task))
        .route("/task/{id}", patch(handlers::patch_task).get(handlers::get_task))
        .route("/task/{id}/kill", post(handlers::kill_task))
        .route("/tasks", get(handlers::list_tasks))
        .route("/stats", get(handlers::stats))
        .with_state(state)
}

/// Bind `config.http_host:http_port` and serve the control API.
///
/// # Errors
///
/// Returns `AppError::Config` if the server fails to bind, or
/// `AppError::Http` if serving fails.
pub async fn serve_http(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_address();
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind control API on {bind}: {err}")))?;
    serve_on(listener, state, ct).await
}

/// Serve the control API on an already-bound listener.
///
/// # Errors
///
/// Returns `AppError::Http` if the server stops with an error.
pub async fn serve_on(
    listener: TcpListener,
    state: Arc<AppState>,
    ct: CancellationToken,
) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Http(format!("listener has no local address: {err}")))?;
    info!(%local, "starting control API");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            ct.cancelled().await;
        })
        .await
        .map_err(|err| AppError::Http(format!("control API error: {err}")))?;

    info!("control API shut down");
    Ok(())
}
