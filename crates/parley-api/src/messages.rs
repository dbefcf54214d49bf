use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use parley_types::api::{Claims, MessageListResponse, SendMessageRequest};
use parley_types::models::ChatMessage;

use crate::auth::AppState;

/// Persist a message. The sender is the verified token's display name, not
/// a client-supplied field.
///
/// Deliberately no relay fan-out here: publication is client-driven. The
/// sending client notifies the relay itself once this call succeeds, so the
/// "message added" signal and the persisted row can never disagree about
/// who confirmed the write.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.body.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message_id = Uuid::new_v4();

    // Run blocking DB insert off the async runtime
    let db = state.db.clone();
    let mid = message_id.to_string();
    let sender = claims.name.clone();
    let body = req.body.clone();
    let stamp = tokio::task::spawn_blocking(move || db.append_message(&mid, &sender, &body))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(ChatMessage {
            sender: claims.name,
            body: req.body,
            created_at: parse_stamp(&stamp, &message_id.to_string()),
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_messages())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let messages: Vec<ChatMessage> = rows
        .into_iter()
        .map(|row| ChatMessage {
            created_at: parse_stamp(&row.created_at, &row.id),
            sender: row.sender,
            body: row.body,
        })
        .collect();

    Ok(Json(MessageListResponse { messages }))
}

fn parse_stamp(stamp: &str, message_id: &str) -> DateTime<Utc> {
    stamp
        .parse::<DateTime<Utc>>()
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on message '{}': {}", stamp, message_id, e);
            DateTime::default()
        })
}
