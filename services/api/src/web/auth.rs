//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for user registration, login, login checks, and logout.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Extension, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RequestError;
use crate::web::{state::AppState, token};
use chat_core::domain::PublicProfile;
use chat_core::ports::PortError;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
const MIN_PASSWORD_LEN: usize = 6;

//=========================================================================================
// Request/Response Types
//=========================================================================================

/// Fields are optional so that missing ones surface as field-level validation
/// messages instead of a body-deserialization rejection.
#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    /// Date of birth, `YYYY-MM-DD`.
    pub dob: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub msg: String,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "User registered successfully", body = MessageResponse),
        (status = 400, description = "Validation failure or duplicate user"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, RequestError> {
    // 1. Validate fields, collecting one message per problem
    let email_regex = Regex::new(EMAIL_PATTERN).unwrap();
    let mut errors = Vec::new();

    let username = req.username.as_deref().map(str::trim).unwrap_or("");
    if username.is_empty() {
        errors.push("Username is required".to_string());
    }

    let email = req
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if !email_regex.is_match(&email) {
        errors.push("Please include a valid email".to_string());
    }

    let password = req.password.as_deref().unwrap_or("");
    if password.len() < MIN_PASSWORD_LEN {
        errors.push("Password must be 6 or more characters".to_string());
    }

    let dob = match req.dob.as_deref().map(str::trim) {
        None | Some("") => {
            errors.push("Date of birth is required".to_string());
            None
        }
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                errors.push("Date of birth must be a valid YYYY-MM-DD date".to_string());
                None
            }
        },
    };

    if !errors.is_empty() {
        return Err(RequestError::Validation(errors));
    }
    let Some(dob) = dob else {
        return Err(RequestError::Validation(vec![
            "Date of birth is required".to_string(),
        ]));
    };

    // 2. Hash the password with a fresh per-record salt
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            RequestError::Server
        })?
        .to_string();

    // 3. Create the user; a unique violation means the email or username is taken
    let user = state
        .db
        .create_user(username, &email, &password_hash, dob)
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => RequestError::Conflict("User already exists".to_string()),
            other => {
                error!("Failed to create user: {:?}", other);
                RequestError::Server
            }
        })?;

    // 4. Issue the session token and set it as an HTTP-only cookie
    let cookie = issue_session_cookie(&state, user.id)?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            msg: "User registered successfully".to_string(),
        }),
    ))
}

/// POST /api/auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = MessageResponse),
        (status = 400, description = "Malformed input"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, RequestError> {
    // 1. Validate input shape before touching any external service
    let email_regex = Regex::new(EMAIL_PATTERN).unwrap();
    let mut errors = Vec::new();

    let email = req
        .email
        .as_deref()
        .map(|e| e.trim().to_lowercase())
        .unwrap_or_default();
    if !email_regex.is_match(&email) {
        errors.push("Please include a valid email".to_string());
    }

    let password = req.password.as_deref().unwrap_or("");
    if password.is_empty() {
        errors.push("Password is required".to_string());
    }

    if !errors.is_empty() {
        return Err(RequestError::Validation(errors));
    }

    // 2. Look up the user; an unknown email reads the same as a bad password
    let credentials = state.db.get_user_by_email(&email).await.map_err(|e| {
        if matches!(e, PortError::NotFound(_)) {
            RequestError::Auth("Invalid credentials".to_string())
        } else {
            error!("Failed to look up user: {:?}", e);
            RequestError::Server
        }
    })?;

    // 3. Verify the password against the stored hash
    let parsed_hash = PasswordHash::new(&credentials.password_hash).map_err(|e| {
        error!("Failed to parse stored password hash: {:?}", e);
        RequestError::Server
    })?;

    let valid = Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok();
    if !valid {
        return Err(RequestError::Auth("Invalid credentials".to_string()));
    }

    // 4. Issue a fresh token and cookie
    let cookie = issue_session_cookie(&state, credentials.id)?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            msg: "Login successful".to_string(),
        }),
    ))
}

/// GET /api/auth/check-login - Resolve the session token to the user's public profile
#[utoipa::path(
    get,
    path = "/api/auth/check-login",
    responses(
        (status = 200, description = "Token is valid"),
        (status = 401, description = "Missing, invalid, or expired token")
    )
)]
pub async fn check_login_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, RequestError> {
    let user = state.db.get_user_by_id(user_id).await.map_err(|e| {
        // A valid token for a vanished user is an auth failure, not a 404.
        if matches!(e, PortError::NotFound(_)) {
            RequestError::Auth("Token is not valid".to_string())
        } else {
            error!("Failed to load user profile: {:?}", e);
            RequestError::Server
        }
    })?;

    let profile = PublicProfile {
        id: user.id,
        username: user.username,
        email: user.email,
    };

    Ok(Json(json!({ "msg": "Authenticated", "user": profile })))
}

/// POST /api/auth/logout - Clear the session cookie
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse)
    )
)]
pub async fn logout_handler() -> impl IntoResponse {
    // Idempotent: clearing an absent cookie is still a successful logout.
    (
        StatusCode::OK,
        [(header::SET_COOKIE, token::clear_cookie())],
        Json(MessageResponse {
            msg: "Logged out successfully".to_string(),
        }),
    )
}

fn issue_session_cookie(state: &AppState, user_id: Uuid) -> Result<String, RequestError> {
    let raw_token = token::issue(&state.config.jwt_secret, user_id).map_err(|e| {
        error!("Failed to sign session token: {:?}", e);
        RequestError::Server
    })?;
    Ok(token::session_cookie(&raw_token))
}
