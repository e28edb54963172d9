//! crates/chat_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or web framework; the serde
//! derives exist because chat turns cross both the HTTP and persistence
//! boundaries as JSON.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents a registered user.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub dob: NaiveDate,
    pub created_at: DateTime<Utc>,
}

// Only used internally for login/registration - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// The user fields safe to hand back to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct PublicProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// Who produced a chat turn. Exactly two values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One text segment of a turn. Assistant turns accumulate one part per
/// streamed fragment; user turns usually carry a single part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPart {
    pub text: String,
}

/// A single message exchange unit: either user input or assistant output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub parts: Vec<TurnPart>,
}

impl ChatTurn {
    /// Builds a single-part turn.
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![TurnPart { text: text.into() }],
        }
    }

    /// The turn's full text, with its ordered parts concatenated.
    pub fn text(&self) -> String {
        self.parts.iter().map(|p| p.text.as_str()).collect()
    }
}

/// A persisted, named collection of turns for one browsing session.
/// Append-only at the application layer: written once, never mutated.
#[derive(Debug, Clone)]
pub struct ChatSessionLog {
    pub user_id: Uuid,
    pub chat_session_id: String,
    pub history: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
}

/// The id-and-timestamp view of a session log used by history listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    #[serde(rename = "chatSessionId")]
    pub chat_session_id: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}
