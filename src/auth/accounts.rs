//! Account endpoints: signup, login, logout, and session check.
//!
//! Tokens are returned in the JSON body and also set as an HttpOnly
//! `auth_token` cookie, which the WebSocket handshake can fall back to.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::auth::jwt::{self, COOKIE_NAME};
use crate::auth::middleware::Claims;
use crate::db::models::User;
use crate::state::AppState;
use crate::ws::UserId;

type ApiError = (StatusCode, Json<Value>);

fn err(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn internal(message: &str) -> ApiError {
    err(StatusCode::INTERNAL_SERVER_ERROR, message)
}

/// Set-Cookie header installing the auth token (24-hour lifetime).
fn auth_cookie(token: &str) -> [(header::HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age=86400",
            COOKIE_NAME, token
        ),
    )]
}

/// Set-Cookie header clearing the auth token.
fn clear_cookie() -> [(header::HeaderName, String); 1] {
    [(
        header::SET_COOKIE,
        format!("{}=; Path=/; HttpOnly; SameSite=Strict; Max-Age=0", COOKIE_NAME),
    )]
}

fn user_body(user: &User) -> Value {
    json!({
        "id": user.id,
        "fullname": user.full_name,
        "email": user.email,
        "profilePic": user.profile_pic,
        "created_at": user.created_at,
        "updated_at": user.updated_at,
    })
}

pub(crate) fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password_hash: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const USER_COLUMNS: &str =
    "id, email, full_name, password_hash, profile_pic, created_at, updated_at";

pub(crate) fn find_user_by_id(
    conn: &rusqlite::Connection,
    user_id: UserId,
) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
        rusqlite::params![user_id],
        row_to_user,
    )
    .optional()
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub fullname: String,
    pub email: String,
    pub password: String,
}

/// POST /api/auth/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.fullname.is_empty() || body.email.is_empty() || body.password.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "all fields are required"));
    }
    if !body.email.contains('@') {
        return Err(err(StatusCode::BAD_REQUEST, "email is incorrect"));
    }
    if body.password.len() < 6 {
        return Err(err(
            StatusCode::BAD_REQUEST,
            "password should be at least 6 characters",
        ));
    }

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        // Hash before taking the DB lock; bcrypt is the slow part.
        let password_hash = bcrypt::hash(&body.password, bcrypt::DEFAULT_COST)
            .map_err(|_| internal("could not save the password"))?;

        let conn = db.lock().map_err(|_| internal("internal server error"))?;

        let email_taken: bool = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE email = ?1",
                rusqlite::params![body.email],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )
            .unwrap_or(false);
        if email_taken {
            return Err(err(StatusCode::BAD_REQUEST, "email already in use"));
        }

        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (email, full_name, password_hash, profile_pic, created_at, updated_at)
             VALUES (?1, ?2, ?3, '', ?4, ?5)",
            rusqlite::params![body.email, body.fullname, password_hash, now, now],
        )
        .map_err(|_| internal("could not create user"))?;

        Ok(User {
            id: conn.last_insert_rowid(),
            email: body.email,
            full_name: body.fullname,
            password_hash,
            profile_pic: String::new(),
            created_at: now.clone(),
            updated_at: now,
        })
    })
    .await
    .map_err(|_| internal("internal server error"))??;

    let token = jwt::issue_token(&state.jwt_secret, user.id, &user.full_name)
        .map_err(|_| internal("failed to generate token"))?;

    tracing::info!(user_id = user.id, "User signed up");

    Ok((
        StatusCode::OK,
        auth_cookie(&token),
        Json(json!({ "user": user_body(&user), "token": token })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.email.is_empty() || body.password.is_empty() {
        return Err(err(StatusCode::BAD_REQUEST, "email and password are required"));
    }

    let db = state.db.clone();
    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let existing = {
            let conn = db.lock().map_err(|_| internal("internal server error"))?;
            conn.query_row(
                &format!("SELECT {} FROM users WHERE email = ?1", USER_COLUMNS),
                rusqlite::params![body.email],
                row_to_user,
            )
            .optional()
            .map_err(|_| internal("internal server error"))?
        };

        // Same error for unknown email and wrong password.
        let user = existing
            .ok_or_else(|| err(StatusCode::BAD_REQUEST, "invalid email or password"))?;
        let valid = bcrypt::verify(&body.password, &user.password_hash)
            .map_err(|_| internal("internal server error"))?;
        if !valid {
            return Err(err(StatusCode::BAD_REQUEST, "invalid email or password"));
        }
        Ok(user)
    })
    .await
    .map_err(|_| internal("internal server error"))??;

    let token = jwt::issue_token(&state.jwt_secret, user.id, &user.full_name)
        .map_err(|_| internal("could not create JWT token"))?;

    tracing::info!(user_id = user.id, "User logged in");

    Ok((
        StatusCode::OK,
        auth_cookie(&token),
        Json(json!({ "user": user_body(&user), "token": token })),
    ))
}

/// POST /api/auth/logout
/// Clears the auth cookie. The token itself stays valid until expiry.
pub async fn logout() -> impl IntoResponse {
    (
        StatusCode::ACCEPTED,
        clear_cookie(),
        Json(json!({ "message": "successfully logged out" })),
    )
}

/// GET /api/auth/check
/// Returns the signed-in user. JWT auth required.
pub async fn check(
    State(state): State<AppState>,
    claims: Claims,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let db = state.db.clone();
    let user_id = claims.sub;

    let user = tokio::task::spawn_blocking(move || -> Result<User, ApiError> {
        let conn = db.lock().map_err(|_| internal("internal server error"))?;
        find_user_by_id(&conn, user_id)
            .map_err(|_| internal("internal server error"))?
            .ok_or_else(|| err(StatusCode::UNAUTHORIZED, "user not found"))
    })
    .await
    .map_err(|_| internal("internal server error"))??;

    // Echo back the credential the client authenticated with.
    let token = request_token(&headers);

    Ok(Json(json!({
        "user": {
            "id": user.id,
            "fullname": user.full_name,
            "email": user.email,
            "profilePic": user.profile_pic,
        },
        "token": token,
    })))
}

/// Extract the raw token from the request the same way the Claims
/// extractor does (Bearer header first, then cookie).
fn request_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    bearer.or_else(|| {
        let raw = headers.get(header::COOKIE)?.to_str().ok()?;
        let prefix = format!("{}=", COOKIE_NAME);
        raw.split(';')
            .map(str::trim)
            .find_map(|pair| pair.strip_prefix(prefix.as_str()))
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}
