//! services/api/src/web/chat.rs
//!
//! The chat endpoints: question streaming, history flushing, and session
//! listing/retrieval.
//!
//! The streaming handler is the one genuine concurrency concern in the
//! service: the HTTP response stays open and is flushed fragment by fragment
//! until the provider's sequence terminates, and a provider failure
//! mid-stream degrades into an in-band apology instead of severing the
//! connection.

use axum::{
    body::Body,
    extract::{Extension, Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use async_stream::stream;
use bytes::Bytes;
use chrono::Utc;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::RequestError;
use crate::extract::{compose_message, extract_text, validate_content_type};
use crate::web::state::AppState;
use chat_core::domain::{ChatSessionLog, ChatTurn};
use chat_core::transcript::GATEWAY_APOLOGY;

/// Newest-first cap on the session listing.
const SESSION_LIST_LIMIT: i64 = 20;

//=========================================================================================
// Request Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct SaveHistoryRequest {
    /// The client's accumulated turn log for this browsing session.
    #[schema(value_type = Vec<Object>)]
    pub history: Vec<ChatTurn>,
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/chat - Ask a question, optionally with an attached file, and
/// stream the answer back as chunked plain text.
#[utoipa::path(
    post,
    path = "/api/chat",
    request_body(content_type = "multipart/form-data", description = "A `question` text field and an optional `file` attachment."),
    responses(
        (status = 200, description = "Chunked text/plain stream of answer fragments"),
        (status = 400, description = "Missing question or unsupported file"),
        (status = 401, description = "Not authenticated"),
        (status = 413, description = "File over the size ceiling"),
        (status = 500, description = "Completion provider unavailable")
    )
)]
pub async fn post_question_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, RequestError> {
    // 1. Pull the question and the optional upload out of the multipart body.
    let mut question: Option<String> = None;
    let mut upload: Option<(String, Bytes)> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        error!("Failed to read multipart body: {e}");
        RequestError::Validation(vec!["Malformed multipart body".to_string()])
    })? {
        let field_name = field.name().map(|n| n.to_string());
        match field_name.as_deref() {
            Some("question") => {
                let text = field.text().await.map_err(|e| {
                    error!("Failed to read question field: {e}");
                    RequestError::Validation(vec!["Malformed question field".to_string()])
                })?;
                question = Some(text);
            }
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(|ct| ct.to_string())
                    .unwrap_or_default();
                // Reject disallowed types before buffering a byte of content.
                validate_content_type(&content_type)?;
                let data = field.bytes().await.map_err(|e| {
                    error!("Failed to read uploaded file: {e}");
                    RequestError::FileTooLarge
                })?;
                upload = Some((content_type, data));
            }
            _ => {}
        }
    }

    let question = question.map(|q| q.trim().to_string()).unwrap_or_default();
    if question.is_empty() {
        return Err(RequestError::Validation(vec![
            "Question is required".to_string(),
        ]));
    }

    // 2. Extract text from the upload, if any.
    let file_text = match &upload {
        Some((content_type, data)) => Some(extract_text(content_type, data)?),
        None => None,
    };

    // 3. Compose the provider message and snapshot the caller's rolling context.
    let message = compose_message(file_text.as_deref(), &question);
    let history = state.memory.snapshot(user_id).await;

    // 4. Open the provider stream. A failure here happens before any byte has
    //    been sent, so it can still surface as a proper HTTP error.
    let mut fragments = state
        .completion
        .generate(&message, &history)
        .await
        .map_err(|e| {
            error!("Failed to start completion stream: {e}");
            RequestError::Server
        })?;

    // 5. Relay fragments as they arrive, reconstructing the full answer on
    //    the side. Once the stream is drained, both sides of the exchange
    //    join the rolling history.
    let body_stream = stream! {
        let mut answer = String::new();
        while let Some(item) = fragments.next().await {
            match item {
                Ok(fragment) => {
                    answer.push_str(&fragment);
                    yield Ok::<Bytes, Infallible>(Bytes::from(fragment));
                }
                Err(e) => {
                    error!("Completion stream failed mid-answer: {e}");
                    answer.push_str(GATEWAY_APOLOGY);
                    yield Ok(Bytes::from(GATEWAY_APOLOGY));
                    break;
                }
            }
        }
        state.memory.append_exchange(user_id, &message, &answer).await;
    };

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body_stream),
    ))
}

/// POST /api/chat/save-history - Persist the client's accumulated turn log as
/// one chat session.
#[utoipa::path(
    post,
    path = "/api/chat/save-history",
    request_body = SaveHistoryRequest,
    responses(
        (status = 200, description = "Chat history saved"),
        (status = 400, description = "Empty or malformed history"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn save_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Json(req): Json<SaveHistoryRequest>,
) -> Result<impl IntoResponse, RequestError> {
    if req.history.is_empty() {
        return Err(RequestError::BadRequest(
            "Chat history is invalid or empty.".to_string(),
        ));
    }

    let log = ChatSessionLog {
        user_id,
        chat_session_id: Utc::now().timestamp_millis().to_string(),
        history: req.history,
        created_at: Utc::now(),
    };

    state.db.save_chat_log(log).await.map_err(|e| {
        error!("Failed to save chat history: {:?}", e);
        RequestError::Server
    })?;

    Ok(Json(json!({ "msg": "Chat history saved successfully" })))
}

/// GET /api/chat/history - List the caller's most recent chat sessions.
#[utoipa::path(
    get,
    path = "/api/chat/history",
    responses(
        (status = 200, description = "Session ids and creation timestamps, newest first"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_sessions_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
) -> Result<impl IntoResponse, RequestError> {
    let sessions = state
        .db
        .list_chat_logs(user_id, SESSION_LIST_LIMIT)
        .await
        .map_err(|e| {
            error!("Failed to list chat sessions: {:?}", e);
            RequestError::Server
        })?;

    Ok(Json(json!({ "chatHistory": sessions })))
}

/// GET /api/chat/history/{session_id} - Fetch one session's full turn sequence.
#[utoipa::path(
    get,
    path = "/api/chat/history/{session_id}",
    params(
        ("session_id" = String, Path, description = "The chat session id to fetch.")
    ),
    responses(
        (status = 200, description = "The session's turn sequence"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Unknown session, or owned by another user")
    )
)]
pub async fn get_session_history_handler(
    State(state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, RequestError> {
    // Ownership is enforced inside the lookup query; a session id belonging
    // to another user is indistinguishable from an unknown one.
    let history = state
        .db
        .get_chat_log(user_id, &session_id)
        .await
        .map_err(|e| match e {
            chat_core::ports::PortError::NotFound(_) => {
                RequestError::NotFound("Chat session not found".to_string())
            }
            other => {
                error!("Failed to fetch chat session: {:?}", other);
                RequestError::Server
            }
        })?;

    Ok(Json(json!({ "history": history })))
}
