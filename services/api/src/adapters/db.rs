//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use chat_core::domain::{ChatSessionLog, ChatTurn, SessionSummary, User, UserCredentials};
use chat_core::ports::{DatabaseService, PortError, PortResult};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn map_insert_error(e: sqlx::Error) -> PortError {
    match e.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => {
            PortError::Conflict("record already exists".to_string())
        }
        _ => PortError::Unexpected(e.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    dob: NaiveDate,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            dob: self.dob,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
}
impl CredentialsRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            id: self.id,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
        }
    }
}

#[derive(FromRow)]
struct SummaryRecord {
    chat_session_id: String,
    created_at: DateTime<Utc>,
}
impl SummaryRecord {
    fn to_domain(self) -> SessionSummary {
        SessionSummary {
            chat_session_id: self.chat_session_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct HistoryRecord {
    history: serde_json::Value,
}
impl HistoryRecord {
    fn to_domain(self) -> PortResult<Vec<ChatTurn>> {
        serde_json::from_value(self.history)
            .map_err(|e| PortError::Unexpected(format!("corrupt history column: {e}")))
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        dob: NaiveDate,
    ) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (id, username, email, password_hash, dob) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id, username, email, dob, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(dob)
        .fetch_one(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, username, email, password_hash FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        Ok(record.to_domain())
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> PortResult<User> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, email, dob, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => PortError::Unexpected(e.to_string()),
        })?;

        Ok(record.to_domain())
    }

    async fn save_chat_log(&self, log: ChatSessionLog) -> PortResult<()> {
        let history = serde_json::to_value(&log.history)
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        sqlx::query(
            "INSERT INTO chat_logs (id, user_id, chat_session_id, history, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::new_v4())
        .bind(log.user_id)
        .bind(&log.chat_session_id)
        .bind(history)
        .bind(log.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn list_chat_logs(&self, user_id: Uuid, limit: i64) -> PortResult<Vec<SessionSummary>> {
        let records = sqlx::query_as::<_, SummaryRecord>(
            "SELECT chat_session_id, created_at FROM chat_logs \
             WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    // The user_id predicate in this query IS the authorization check: another
    // user's session id behaves exactly like an unknown one.
    async fn get_chat_log(
        &self,
        user_id: Uuid,
        chat_session_id: &str,
    ) -> PortResult<Vec<ChatTurn>> {
        let record = sqlx::query_as::<_, HistoryRecord>(
            "SELECT history FROM chat_logs WHERE user_id = $1 AND chat_session_id = $2",
        )
        .bind(user_id)
        .bind(chat_session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Chat session {} not found", chat_session_id))
            }
            _ => PortError::Unexpected(e.to_string()),
        })?;

        record.to_domain()
    }
}
