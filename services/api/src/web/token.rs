//! services/api/src/web/token.rs
//!
//! Session token minting and verification. The token is a signed JWT carrying
//! the user id, valid for exactly three hours; expiry is the only revocation
//! mechanism, so there is no server-side token state to clean up.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the HTTP-only cookie the token travels in.
pub const COOKIE_NAME: &str = "token";

/// Fixed token lifetime.
pub const TOKEN_TTL_HOURS: i64 = 3;

/// Claims embedded in the session token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// The owning user's id.
    pub sub: Uuid,
    /// Issued-at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
}

/// Mints a fresh session token for a user.
pub fn issue(secret: &str, user_id: Uuid) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id,
        iat: now.timestamp(),
        exp: (now + Duration::hours(TOKEN_TTL_HOURS)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verifies a session token's signature and expiry, returning the user id.
pub fn verify(secret: &str, token: &str) -> Result<Uuid, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims.sub)
}

/// The Set-Cookie value carrying a fresh token.
pub fn session_cookie(token: &str) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=None; Path=/; Max-Age={}",
        COOKIE_NAME,
        token,
        TOKEN_TTL_HOURS * 60 * 60
    )
}

/// The Set-Cookie value that clears the session cookie.
pub fn clear_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=None; Path=/; Max-Age=0",
        COOKIE_NAME
    )
}
