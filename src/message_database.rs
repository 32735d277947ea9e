use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::error::{AppError, AppResult};

pub const MAX_NAME_CHARS: usize = 50;
pub const MAX_TEXT_CHARS: usize = 200;
pub const DEFAULT_MAX_MESSAGES: u32 = 100;
/// Most entries any listing returns, whatever the configured capacity.
pub const LATEST_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
#[derive(Serialize, Deserialize, sqlx::FromRow)]
pub struct Message {
    pub id: i64,
    pub name: String,
    pub text: String,
    pub timestamp: String, // RFC 3339, UTC, millisecond precision
}

pub type Messages = Vec<Message>;

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
    max_messages: u32,
}

impl MessageStore {
    pub fn with_capacity(pool: SqlitePool, max_messages: u32) -> MessageStore {
        MessageStore { pool, max_messages }
    }

    pub fn max_messages(&self) -> u32 {
        self.max_messages
    }

    pub async fn list_latest(&self, limit: u32) -> AppResult<Messages> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, name, text, timestamp FROM messages ORDER BY id DESC LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    pub async fn count(&self) -> AppResult<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// The capacity check and the insert are one statement, so the ceiling
    /// holds under concurrent appends: SQLite runs writers one at a time and
    /// a full table makes the `INSERT ... SELECT` insert nothing.
    pub async fn append(&self, name: Option<&str>, text: Option<&str>) -> AppResult<Message> {
        let (name, text) = validate(name, text)?;
        let timestamp = now_timestamp();

        let result = sqlx::query(
            "INSERT INTO messages (name, text, timestamp)
             SELECT ?, ?, ?
             WHERE (SELECT COUNT(*) FROM messages) < ?",
        )
        .bind(name)
        .bind(text)
        .bind(&timestamp)
        .bind(i64::from(self.max_messages))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::CapacityExceeded);
        }

        let message = Message {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            text: text.to_string(),
            timestamp,
        };
        tracing::debug!("stored message {} from {:?}", message.id, message.name);
        Ok(message)
    }
}

pub fn validate<'a>(
    name: Option<&'a str>,
    text: Option<&'a str>,
) -> AppResult<(&'a str, &'a str)> {
    // Whitespace-only fields pass here and fail the length rules below.
    let (name, text) = match (name, text) {
        (Some(name), Some(text)) if !name.is_empty() && !text.is_empty() => {
            (name.trim(), text.trim())
        }
        _ => return Err(AppError::validation("Name and message are required")),
    };

    if !within(name, MAX_NAME_CHARS) {
        return Err(AppError::validation(format!(
            "Name must be between 1 and {} characters",
            MAX_NAME_CHARS
        )));
    }
    if !within(text, MAX_TEXT_CHARS) {
        return Err(AppError::validation(format!(
            "Message must be between 1 and {} characters",
            MAX_TEXT_CHARS
        )));
    }
    Ok((name, text))
}

fn within(value: &str, max: usize) -> bool {
    (1..=max).contains(&value.chars().count())
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
