//! Append-only direct message history.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::params;

use alumnet_shared::types::{MessageId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::Message;

/// Durable message history as seen by the presence/delivery core.
///
/// Records are never mutated once appended.
pub trait MessageStore {
    /// Persist a new message, assigning its canonical id and server timestamp.
    fn append(&self, sender: &UserId, receiver: &UserId, content: &str) -> Result<Message>;

    /// Every message exchanged between `a` and `b`, in either direction,
    /// ordered by `created_at` ascending (insertion order breaks ties).
    fn list_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>>;
}

impl MessageStore for Database {
    fn append(&self, sender: &UserId, receiver: &UserId, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(StoreError::EmptyContent);
        }

        // Truncate so the returned record equals what a later read yields.
        let message = Message {
            id: MessageId::new(),
            sender_id: sender.clone(),
            receiver_id: receiver.clone(),
            content: content.to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.insert_message(&message)?;

        tracing::debug!(
            id = %message.id,
            sender = %sender,
            receiver = %receiver,
            "message appended"
        );
        Ok(message)
    }

    fn list_between(&self, a: &UserId, b: &UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, receiver_id, content, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(params![a.as_str(), b.as_str()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }
}

impl Database {
    /// Insert a fully-formed record. Used by [`MessageStore::append`] and by
    /// imports that already carry canonical ids.
    pub fn insert_message(&self, message: &Message) -> Result<()> {
        self.conn().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                message.id.as_str(),
                message.sender_id.as_str(),
                message.receiver_id.as_str(),
                message.content,
                format_timestamp(message.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_message(&self, id: &MessageId) -> Result<Message> {
        self.conn()
            .query_row(
                "SELECT id, sender_id, receiver_id, content, created_at
                 FROM messages WHERE id = ?1",
                params![id.as_str()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    pub fn count_messages(&self) -> Result<u64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Fixed-width UTC form, so lexical order in SQLite equals time order.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id: String = row.get(0)?;
    let sender_id: String = row.get(1)?;
    let receiver_id: String = row.get(2)?;
    let content: String = row.get(3)?;
    let ts_str: String = row.get(4)?;

    let created_at = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id: MessageId(id),
        sender_id: UserId(sender_id),
        receiver_id: UserId(receiver_id),
        content,
        created_at,
    })
}
