//! WebSocket upgrade endpoint and handshake authentication.
//!
//! The credential is carried by the handshake: `?token=JWT` query parameter,
//! falling back to the `auth_token` cookie set at login. Auth failures
//! upgrade and then immediately close with an application close code, so the
//! client can distinguish expired from invalid tokens.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap},
    response::Response,
};
use serde::Deserialize;

use crate::auth::jwt;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// WebSocket close codes:
/// 4001 = token expired
/// 4002 = token missing or invalid
const CLOSE_TOKEN_EXPIRED: u16 = 4001;
const CLOSE_TOKEN_INVALID: u16 = 4002;

/// GET /api/ws
/// WebSocket upgrade endpoint. On auth success, runs the connection's full
/// lifecycle; the response future completes when the connection closes.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = params.token.or_else(|| cookie_token(&headers));

    let Some(token) = token else {
        tracing::warn!("WebSocket handshake missing credential");
        return close_after_upgrade(ws, CLOSE_TOKEN_INVALID, "Token missing");
    };

    match jwt::validate_token(&state.jwt_secret, &token) {
        Ok(claims) => {
            tracing::info!(user_id = claims.sub, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| actor::run_connection(socket, state, claims.sub))
        }
        Err(err) => {
            let (close_code, reason) = match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    (CLOSE_TOKEN_EXPIRED, "Token expired")
                }
                _ => (CLOSE_TOKEN_INVALID, "Token invalid"),
            };

            tracing::warn!(close_code, reason, "WebSocket auth failed");
            close_after_upgrade(ws, close_code, reason)
        }
    }
}

/// Upgrade the connection, then immediately close with the given code.
/// The connection is never registered and never receives a push.
fn close_after_upgrade(ws: WebSocketUpgrade, code: u16, reason: &'static str) -> Response {
    ws.on_upgrade(move |mut socket: WebSocket| async move {
        let close_frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let _ = socket.send(Message::Close(Some(close_frame))).await;
    })
}

/// Extract the auth token from the Cookie header, if present.
fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix("auth_token="))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
