//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::error::RequestError;
use crate::web::{state::AppState, token};

/// Middleware that verifies the session token cookie and extracts the user id.
///
/// If valid, inserts the user id into request extensions for handlers to use.
/// If missing, invalid, or expired, rejects with 401 before the handler runs.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, RequestError> {
    // 1. Extract the token from the cookie header
    let raw_token = req
        .headers()
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookie_header| {
            cookie_header.split(';').find_map(|c| {
                c.trim()
                    .strip_prefix(token::COOKIE_NAME)
                    .and_then(|rest| rest.strip_prefix('='))
            })
        })
        .ok_or_else(|| RequestError::Auth("No token, authorization denied".to_string()))?
        .to_string();

    // 2. Verify signature and expiry, recover the user id
    let user_id = token::verify(&state.config.jwt_secret, &raw_token).map_err(|e| {
        warn!("Session token rejected: {e}");
        RequestError::Auth("Token is not valid".to_string())
    })?;

    // 3. Insert the user id into request extensions
    req.extensions_mut().insert(user_id);

    // 4. Continue to the handler
    Ok(next.run(req).await)
}
