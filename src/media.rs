//! Media storage: content-addressed images on local disk.
//!
//! Clients send images as `data:image/...;base64,` payloads. Decoded bytes
//! are stored under `{data_dir}/media/{sha256}.{ext}` and served back at
//! `/api/media/{name}`. Storing the same image twice is idempotent.

use axum::{
    extract::{Path as AxumPath, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::state::AppState;

/// Maximum decoded image size: 10 MiB.
const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug)]
pub enum MediaError {
    /// Payload is not a base64 image data URI.
    InvalidPayload,
    /// Decoded image exceeds the size limit.
    TooLarge,
    Io(std::io::Error),
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidPayload => write!(f, "invalid image payload"),
            MediaError::TooLarge => write!(f, "image exceeds size limit"),
            MediaError::Io(e) => write!(f, "media I/O error: {}", e),
        }
    }
}

impl std::error::Error for MediaError {}

fn media_dir(data_dir: &str) -> PathBuf {
    Path::new(data_dir).join("media")
}

/// Map a data-URI MIME type to a file extension. Unknown image types are
/// stored but get a generic extension.
fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "img",
    }
}

fn content_type_for(name: &str) -> &'static str {
    match name.rsplit('.').next() {
        Some("png") => "image/png",
        Some("jpg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Decode a `data:image/...;base64,` payload, store it content-addressed,
/// and return the URL path it is served at.
pub fn save_image(data_dir: &str, data_uri: &str) -> Result<String, MediaError> {
    let rest = data_uri
        .strip_prefix("data:")
        .ok_or(MediaError::InvalidPayload)?;
    let (mime, payload) = rest.split_once(";base64,").ok_or(MediaError::InvalidPayload)?;
    if !mime.starts_with("image/") {
        return Err(MediaError::InvalidPayload);
    }

    let bytes = BASE64
        .decode(payload)
        .map_err(|_| MediaError::InvalidPayload)?;
    if bytes.is_empty() {
        return Err(MediaError::InvalidPayload);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::TooLarge);
    }

    let hash = hex::encode(Sha256::digest(&bytes));
    let name = format!("{}.{}", hash, extension_for(mime));

    let dir = media_dir(data_dir);
    std::fs::create_dir_all(&dir).map_err(MediaError::Io)?;

    let file_path = dir.join(&name);
    if !file_path.exists() {
        std::fs::write(&file_path, &bytes).map_err(MediaError::Io)?;
        tracing::debug!(file = %name, size = bytes.len(), "Stored media file");
    }

    Ok(format!("/api/media/{}", name))
}

/// GET /api/media/{name} — serve a stored media file.
pub async fn serve_media(
    State(state): State<AppState>,
    AxumPath(name): AxumPath<String>,
) -> Result<impl IntoResponse, StatusCode> {
    // Names are hex hashes plus an extension; anything else is rejected.
    if name.contains('/') || name.contains("..") {
        return Err(StatusCode::BAD_REQUEST);
    }

    let file_path = media_dir(&state.data_dir).join(&name);
    let bytes = tokio::task::spawn_blocking(move || std::fs::read(&file_path))
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_err(|_| StatusCode::NOT_FOUND)?;

    Ok((
        [(header::CONTENT_TYPE, content_type_for(&name))],
        bytes,
    ))
}
