//! The canonical direct message.
//!
//! Core logic on both sides only ever handles [`Message`]. The legacy
//! `text` / `message` body duplication is resolved by the wire adapter in
//! [`crate::protocol`] before a value of this type exists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::DEDUP_TOLERANCE_MS;
use crate::types::{MessageId, UserId};

/// A single direct message between two users. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Canonical id from the store, or a fallback derived from sender + time.
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    /// Server timestamp assigned on append.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// The other participant, seen from `viewer`. `None` if `viewer` is not
    /// part of this conversation.
    pub fn counterpart_of(&self, viewer: &UserId) -> Option<&UserId> {
        if &self.sender_id == viewer {
            Some(&self.receiver_id)
        } else if &self.receiver_id == viewer {
            Some(&self.sender_id)
        } else {
            None
        }
    }

    /// Whether `other` is another representation of the same logical message.
    ///
    /// Ids match, or, when at least one side carries a fallback id, sender
    /// and content match with timestamps inside [`DEDUP_TOLERANCE_MS`]. Two
    /// store-assigned ids are distinct messages even with identical text.
    pub fn is_same_as(&self, other: &Message) -> bool {
        if self.id == other.id {
            return true;
        }
        if !self.id.is_fallback() && !other.id.is_fallback() {
            return false;
        }
        self.sender_id == other.sender_id
            && self.content == other.content
            && (self.created_at - other.created_at)
                .num_milliseconds()
                .abs()
                <= DEDUP_TOLERANCE_MS
    }
}
