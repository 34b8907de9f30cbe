use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;

use crate::auth::middleware::Claims;
use crate::ws::UserId;

/// Name of the cookie carrying the auth token.
pub const COOKIE_NAME: &str = "auth_token";

/// Token lifetime: 24 hours.
const TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Load or generate the JWT signing key (256-bit random secret).
/// Key is stored as raw bytes in data_dir/jwt_secret.
pub fn load_or_generate_jwt_secret(data_dir: &str) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let key_path = Path::new(data_dir).join("jwt_secret");

    if key_path.exists() {
        let key = std::fs::read(&key_path)?;
        if key.len() == 32 {
            tracing::info!("JWT signing key loaded from {}", key_path.display());
            return Ok(key);
        }
        // Invalid key file — regenerate
        tracing::warn!("JWT key file has wrong size ({}), regenerating", key.len());
    }

    let key: [u8; 32] = rand::rng().random();
    std::fs::write(&key_path, key)?;
    tracing::info!("JWT signing key generated at {}", key_path.display());
    Ok(key.to_vec())
}

/// Issue an access token for a user.
/// Claims: sub=user_id, name=display name, iat, exp (24 hours).
pub fn issue_token(
    secret: &[u8],
    user_id: UserId,
    name: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id,
        name: name.to_string(),
        iat: now,
        exp: now + TOKEN_TTL_SECS,
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(secret),
    )
}

/// Validate a token and extract its claims. Expiry is checked by the
/// decoder; an expired token surfaces as ErrorKind::ExpiredSignature.
pub fn validate_token(
    secret: &[u8],
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> Vec<u8> {
        vec![7u8; 32]
    }

    #[test]
    fn issue_and_validate_roundtrip() {
        let token = issue_token(&secret(), 42, "Test User").unwrap();
        let claims = validate_token(&secret(), &token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.name, "Test User");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_is_rejected() {
        // Hand-craft a token whose exp is outside the default leeway.
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: 1,
            name: "Old".to_string(),
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&secret()),
        )
        .unwrap();

        let err = validate_token(&secret(), &token).unwrap_err();
        assert!(matches!(
            err.kind(),
            jsonwebtoken::errors::ErrorKind::ExpiredSignature
        ));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token(&secret(), 1, "User").unwrap();
        assert!(validate_token(&[9u8; 32], &token).is_err());
    }
}
