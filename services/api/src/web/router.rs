//! services/api/src/web/router.rs
//!
//! Assembles the API router and holds the master OpenAPI definition.

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use utoipa::OpenApi;

use crate::extract::MAX_FILE_BYTES;
use crate::web::{
    auth::{check_login_handler, login_handler, logout_handler, register_handler},
    chat::{
        get_session_history_handler, list_sessions_handler, post_question_handler,
        save_history_handler,
    },
    middleware::require_auth,
    state::AppState,
};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::register_handler,
        crate::web::auth::login_handler,
        crate::web::auth::check_login_handler,
        crate::web::auth::logout_handler,
        crate::web::chat::post_question_handler,
        crate::web::chat::save_history_handler,
        crate::web::chat::list_sessions_handler,
        crate::web::chat::get_session_history_handler,
    ),
    components(schemas(
        crate::web::auth::RegisterRequest,
        crate::web::auth::LoginRequest,
        crate::web::auth::MessageResponse,
        crate::web::chat::SaveHistoryRequest,
    )),
    tags(
        (name = "Chat Assistant API", description = "API endpoints for the streaming chat assistant.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Router Assembly
//=========================================================================================

/// Builds the full API router over a prepared application state.
///
/// The body limit sits above the upload ceiling so that the ceiling itself is
/// what callers observe; multipart framing overhead rides in the margin.
pub fn api_router(state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/logout", post(logout_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/api/auth/check-login", get(check_login_handler))
        .route("/api/chat", post(post_question_handler))
        .route("/api/chat/save-history", post(save_history_handler))
        .route("/api/chat/history", get(list_sessions_handler))
        .route(
            "/api/chat/history/{session_id}",
            get(get_session_history_handler),
        )
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_FILE_BYTES + 64 * 1024))
        .with_state(state)
}
