//! crates/chat_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{ChatSessionLog, ChatTurn, SessionSummary, User, UserCredentials};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Conflict(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Completion provider error: {0}")]
    Gateway(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// A lazy sequence of answer text fragments. Each `Ok` item is one fragment;
/// an `Err` item is terminal and no further fragments follow it.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, PortError>> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- User Management ---
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        dob: NaiveDate,
    ) -> PortResult<User>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User>;

    // --- Chat Session Logs ---
    async fn save_chat_log(&self, log: ChatSessionLog) -> PortResult<()>;

    async fn list_chat_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<SessionSummary>>;

    /// Fetches one session's turn sequence. The `user_id` predicate inside the
    /// lookup is the authorization check: a session id belonging to another
    /// user resolves to `NotFound`, never to their data.
    async fn get_chat_log(&self, user_id: Uuid, chat_session_id: &str)
        -> PortResult<Vec<ChatTurn>>;
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Sends one composed message plus the rolling history to the completion
    /// provider and returns the fragments of its answer as they arrive.
    async fn generate(&self, message: &str, history: &[ChatTurn]) -> PortResult<FragmentStream>;
}
