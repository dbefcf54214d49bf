use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::error;

use parley_types::api::{Claims, UserEntry, UserListResponse};

use crate::auth::AppState;

/// Sidebar listing: every registered user with their online flag.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users_with_presence())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let users = rows
        .into_iter()
        .map(|row| UserEntry {
            name: row.name,
            online: row.online,
        })
        .collect();

    Ok(Json(UserListResponse { users }))
}

/// The client-initiated idle-timeout signal: 60 seconds without user
/// activity and the client asks to be shown offline. Best-effort — a client
/// that crashes never sends this, which is what the expiry sweep is for.
pub async fn set_offline(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let uid = claims.sub.to_string();
    tokio::task::spawn_blocking(move || db.set_offline(&uid))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::OK)
}
