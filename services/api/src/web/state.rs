//! services/api/src/web/state.rs
//!
//! Defines the application's shared state, including the per-user rolling
//! conversation history.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use chat_core::domain::{ChatRole, ChatTurn};
use chat_core::ports::{CompletionService, DatabaseService};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub completion: Arc<dyn CompletionService>,
    pub config: Arc<Config>,
    pub memory: RollingHistory,
}

//=========================================================================================
// RollingHistory (Per-User Conversation Context)
//=========================================================================================

/// The in-memory rolling history replayed to the completion provider.
///
/// Keyed by authenticated user id: one user's turns are never visible in
/// another user's context. Entries live for the process lifetime; the
/// persisted record of a conversation is the chat log flushed by the client,
/// not this map.
#[derive(Default)]
pub struct RollingHistory {
    inner: Mutex<HashMap<Uuid, Vec<ChatTurn>>>,
}

impl RollingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of the caller's rolling context, for replay to the provider.
    pub async fn snapshot(&self, user_id: Uuid) -> Vec<ChatTurn> {
        self.inner
            .lock()
            .await
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Appends one completed exchange (the composed user message and the full
    /// reconstructed answer) to the caller's rolling context.
    pub async fn append_exchange(&self, user_id: Uuid, message: &str, answer: &str) {
        let mut inner = self.inner.lock().await;
        let turns = inner.entry(user_id).or_default();
        turns.push(ChatTurn::new(ChatRole::User, message));
        turns.push(ChatTurn::new(ChatRole::Assistant, answer));
    }
}
