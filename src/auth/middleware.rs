use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::COOKIE_NAME;
use crate::ws::UserId;

/// JWT claims extracted from the Authorization: Bearer header or the
/// auth_token cookie. Implements axum's FromRequestParts for use as an
/// extractor on authenticated routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID (users.id)
    pub sub: UserId,
    /// Display name at issue time
    pub name: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl<S> FromRequestParts<S> for Claims
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .or_else(|| cookie_token(parts))
            .ok_or(StatusCode::UNAUTHORIZED)?;

        // Get JWT secret from request extensions (set by middleware layer)
        let jwt_secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

        let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
        let token_data = jsonwebtoken::decode::<Claims>(
            &token,
            &jsonwebtoken::DecodingKey::from_secret(&jwt_secret.0),
            &validation,
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(token_data.claims)
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn cookie_token(parts: &Parts) -> Option<String> {
    let raw = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{}=", COOKIE_NAME);
    raw.split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(prefix.as_str()))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// JWT secret stored in request extensions for the Claims extractor
#[derive(Clone)]
pub struct JwtSecret(pub Vec<u8>);
