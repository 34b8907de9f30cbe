//! Profile endpoints.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::accounts::find_user_by_id;
use crate::auth::middleware::Claims;
use crate::db::models::User;
use crate::media::{self, MediaError};
use crate::state::AppState;

type ApiError = (StatusCode, Json<Value>);

fn err(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(rename = "profilePic")]
    pub profile_pic: String,
}

/// PUT /api/user/update-profile — replace the caller's profile picture.
/// Body: { "profilePic": "data:image/...;base64,..." }. JWT auth required.
pub async fn update_profile(
    State(state): State<AppState>,
    claims: Claims,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, ApiError> {
    if body.profile_pic.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "profilePic is required"));
    }

    let db = state.db.clone();
    let data_dir = state.data_dir.clone();
    let user_id = claims.sub;

    let user: User = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let image_url = media::save_image(&data_dir, &body.profile_pic).map_err(|e| match e {
            MediaError::TooLarge => err(StatusCode::PAYLOAD_TOO_LARGE, "Image too large"),
            MediaError::InvalidPayload => err(StatusCode::BAD_REQUEST, "Invalid image data"),
            MediaError::Io(io_err) => {
                tracing::error!(error = %io_err, "Failed to store profile image");
                err(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to upload profile image",
                )
            }
        })?;

        let conn = db
            .lock()
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))?;

        let updated = conn
            .execute(
                "UPDATE users SET profile_pic = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![image_url, Utc::now().to_rfc3339(), user_id],
            )
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile"))?;
        if updated == 0 {
            return Err(err(StatusCode::NOT_FOUND, "User not found"));
        }

        find_user_by_id(&conn, user_id)
            .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))?
            .ok_or_else(|| err(StatusCode::NOT_FOUND, "User not found"))
    })
    .await
    .map_err(|_| err(StatusCode::INTERNAL_SERVER_ERROR, "internal server error"))??;

    tracing::info!(user_id, "Profile picture updated");

    Ok(Json(json!({ "user": user })))
}
