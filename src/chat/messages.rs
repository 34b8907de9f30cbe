//! REST endpoints for the contact sidebar, conversation history, and
//! sending messages. Sending is the one path that touches the realtime
//! core: after the message is durably persisted, the recipient's live
//! connection (if any) gets a best-effort push.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::middleware::Claims;
use crate::chat::store;
use crate::db::models::Message;
use crate::media::{self, MediaError};
use crate::state::AppState;
use crate::ws::{broadcast, UserId};

/// Maximum message text length (chars).
const MAX_TEXT_LENGTH: usize = 4000;

type ApiError = (StatusCode, Json<Value>);

fn err(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn internal() -> ApiError {
    err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
}

/// GET /api/messages/users — all users except the caller. JWT auth required.
pub async fn get_contacts(
    State(state): State<AppState>,
    claims: Claims,
) -> Result<Json<Value>, ApiError> {
    let db = state.db.clone();
    let me = claims.sub;

    let users = tokio::task::spawn_blocking(move || store::list_contacts(&db, me))
        .await
        .map_err(|_| internal())?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to list contacts");
            internal()
        })?;

    Ok(Json(json!({ "users": users })))
}

/// GET /api/messages/{id} — conversation with user {id}, ascending by
/// creation time. JWT auth required.
pub async fn get_messages(
    State(state): State<AppState>,
    claims: Claims,
    Path(other): Path<UserId>,
) -> Result<Json<Value>, ApiError> {
    let db = state.db.clone();
    let me = claims.sub;

    let messages = tokio::task::spawn_blocking(move || store::find_messages(&db, me, other))
        .await
        .map_err(|_| internal())?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch messages");
            internal()
        })?;

    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: String,
}

/// POST /api/messages/send/{id} — persist a message to user {id}, then push
/// it to the recipient's live connection if they have one.
///
/// Persistence succeeds or fails on its own; the delivery push is
/// best-effort and never rolls back or fails the create.
pub async fn send_message(
    State(state): State<AppState>,
    claims: Claims,
    Path(receiver_id): Path<UserId>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let text = body.text.trim().to_string();
    if text.is_empty() && body.image.is_empty() {
        return Err(err(
            StatusCode::BAD_REQUEST,
            "Message text or image is required",
        ));
    }
    if text.len() > MAX_TEXT_LENGTH {
        return Err(err(StatusCode::PAYLOAD_TOO_LARGE, "Message text too long"));
    }

    let db = state.db.clone();
    let data_dir = state.data_dir.clone();
    let sender_id = claims.sub;

    let message: Message = tokio::task::spawn_blocking(move || -> Result<Message, ApiError> {
        // Upload the image (if any) before touching the DB.
        let image_url = if body.image.is_empty() {
            String::new()
        } else {
            media::save_image(&data_dir, &body.image).map_err(|e| match e {
                MediaError::TooLarge => err(StatusCode::PAYLOAD_TOO_LARGE, "Image too large"),
                MediaError::InvalidPayload => err(StatusCode::BAD_REQUEST, "Invalid image data"),
                MediaError::Io(io_err) => {
                    tracing::error!(error = %io_err, "Failed to store image");
                    err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
                }
            })?
        };

        let recipient_exists: bool = {
            let conn = db.lock().map_err(|_| internal())?;
            conn.query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![receiver_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false)
        };
        if !recipient_exists {
            return Err(err(StatusCode::NOT_FOUND, "Recipient not found"));
        }

        store::create_message(&db, sender_id, receiver_id, &text, &image_url).map_err(|e| {
            tracing::error!(error = %e, "Failed to save message");
            err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to save message")
        })
    })
    .await
    .map_err(|_| internal())??;

    // Message is durable; notify the recipient's connection if present.
    // Delivery failure evicts the stale connection and nothing more.
    broadcast::notify_new_message(&state.connections, receiver_id, &message);

    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}
