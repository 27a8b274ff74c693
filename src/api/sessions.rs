//! Per-device session management endpoints.
//!
//! - GET `/` - List the caller's live sessions
//! - DELETE `/{id}` - Close one of the caller's other sessions
//! - DELETE `/` - Close every session except the current one

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{delete, get},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ResultExt};
use crate::auth::{AnyRole, Auth};
use crate::db::{Database, Session};
use crate::impl_has_auth_backend;
use crate::jwt::JwtConfig;

#[derive(Clone)]
pub struct SessionsState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

impl_has_auth_backend!(SessionsState);

pub fn router(state: SessionsState) -> Router {
    Router::new()
        .route("/", get(list_sessions).delete(close_other_sessions))
        .route("/{id}", delete(close_session))
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionInfo {
    id: i64,
    device_info: Option<String>,
    ip_address: Option<String>,
    created_at: i64,
    last_used_at: i64,
    expires_at: i64,
    is_current: bool,
}

impl SessionInfo {
    fn new(session: Session, current: Option<i64>) -> Self {
        Self {
            is_current: current == Some(session.id),
            id: session.id,
            device_info: session.device_info,
            ip_address: session.ip_address,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
        }
    }
}

#[derive(Serialize)]
struct ListSessionsResponse {
    sessions: Vec<SessionInfo>,
}

/// List live sessions of the caller. Never shows other users' sessions.
async fn list_sessions(
    State(state): State<SessionsState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth.user();
    let sessions = state
        .db
        .sessions()
        .list_for_user(user.user_id)
        .await
        .db_err("Failed to list sessions")?;

    let current = user.session_id();
    Ok(Json(ListSessionsResponse {
        sessions: sessions
            .into_iter()
            .map(|s| SessionInfo::new(s, current))
            .collect(),
    }))
}

/// Close a single session owned by the caller.
async fn close_session(
    State(state): State<SessionsState>,
    auth: Auth<AnyRole>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth.user();
    if user.session_id() == Some(id) {
        return Err(ApiError::bad_request(
            "No puedes cerrar la sesión actual desde aquí; usa cerrar sesión",
        ));
    }

    let deleted = state
        .db
        .sessions()
        .delete_by_id(id, user.user_id)
        .await
        .db_err("Failed to delete session")?;
    if !deleted {
        return Err(ApiError::not_found("Sesión no encontrada"));
    }

    info!(user_id = user.user_id, session_id = id, "Session closed remotely");
    Ok(Json(serde_json::json!({ "message": "Sesión cerrada" })))
}

/// Close every other session of the caller.
async fn close_other_sessions(
    State(state): State<SessionsState>,
    auth: Auth<AnyRole>,
) -> Result<impl IntoResponse, ApiError> {
    let user = auth.user();
    let current = user
        .session_id()
        .ok_or_else(|| ApiError::bad_request("El token no está asociado a una sesión"))?;

    let closed = state
        .db
        .sessions()
        .delete_all_for_user(user.user_id, Some(current))
        .await
        .db_err("Failed to delete sessions")?;

    info!(user_id = user.user_id, closed, "Other sessions closed");
    Ok(Json(serde_json::json!({ "message": "Otras sesiones cerradas", "closed": closed })))
}
