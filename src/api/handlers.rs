//! Control API request handlers.
//!
//! Handlers only touch the store (plus a detached signal task for kills),
//! so every request returns as soon as the store mutation is done.
//! Requests from different wrappers may arrive in any order.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use tracing::{debug, info_span};

use super::AppState;
use crate::models::session::{NewSession, Session, StatusPatch};
use crate::orchestrator::session_manager;
use crate::store::StoreStats;
use crate::{AppError, Result};

/// `GET /health`: returns 200 OK with a plain-text body.
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /task`: register a session or refresh an existing registration.
///
/// # Errors
///
/// Returns `AppError::BadRequest` when `id` is blank.
pub async fn register_task(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NewSession>,
) -> Result<Json<Session>> {
    let _guard = info_span!("register_task", session_id = %body.id).entered();
    if body.id.trim().is_empty() {
        return Err(AppError::BadRequest("id must not be empty".into()));
    }
    Ok(Json(state.store.register(body)))
}

/// `PATCH /task/{id}`: apply a wrapper status patch.
///
/// Patches on finished sessions succeed without effect.
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids and
/// `AppError::InvalidTransition` for a `PENDING` patch.
pub async fn patch_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(patch): Json<StatusPatch>,
) -> Result<Json<Session>> {
    let _guard = info_span!("patch_task", session_id = %id).entered();
    let applied = state.store.apply_patch(&id, &patch)?;
    debug!(transition = ?applied.transition, "patch applied");
    Ok(Json(applied.session))
}

/// `GET /task/{id}`: fetch one session.
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    state
        .store
        .get(&id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))
}

/// `GET /tasks`: point-in-time snapshot of every session.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<Session>> {
    Json(state.store.list())
}

/// `POST /task/{id}/kill`: operator kill.
///
/// # Errors
///
/// Returns `AppError::NotFound` for unknown ids.
pub async fn kill_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>> {
    session_manager::kill_session(&state.store, &id).map(Json)
}

/// `GET /stats`: counts by status.
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StoreStats> {
    Json(state.store.stats())
}
