//! JSON protocol spoken over the live WebSocket channel and the history API.
//!
//! Frames are adjacently tagged: `{"event": "new-message", "data": {...}}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::Message;
use crate::types::{MessageId, UserId};

/// A message as it appears on the wire.
///
/// Older records carry the body under `message`, newer clients send `text`,
/// and the push payload may use `content`. Incoming values may have any one of
/// them; outgoing values always fill both `text` and `message`. The id comes as
/// `id`, as the store's `_id`, or as both.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, rename = "_id", skip_serializing)]
    pub store_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Body from whichever field the sender filled in, first non-empty wins.
    pub fn body(&self) -> Option<&str> {
        [&self.text, &self.message, &self.content]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
    }

    /// Normalize into the canonical [`Message`].
    ///
    /// A missing id is replaced by [`MessageId::fallback`], so the live copy
    /// and the history copy of an id-less message collapse to one entry.
    pub fn into_message(self) -> Result<Message, ProtocolError> {
        let content = self
            .body()
            .map(str::to_string)
            .ok_or(ProtocolError::EmptyContent)?;
        let sender_id = self.sender_id.ok_or(ProtocolError::MissingField("senderId"))?;
        let receiver_id = self
            .receiver_id
            .ok_or(ProtocolError::MissingField("receiverId"))?;
        let created_at = self
            .created_at
            .ok_or(ProtocolError::MissingField("createdAt"))?;
        let id = match [self.id, self.store_id].into_iter().flatten().find(|id| !id.is_empty()) {
            Some(id) => MessageId(id),
            None => MessageId::fallback(&sender_id, created_at),
        };

        Ok(Message {
            id,
            sender_id,
            receiver_id,
            content,
            created_at,
        })
    }
}

impl From<&Message> for WireMessage {
    fn from(m: &Message) -> Self {
        Self {
            id: Some(m.id.0.clone()),
            store_id: None,
            sender_id: Some(m.sender_id.clone()),
            receiver_id: Some(m.receiver_id.clone()),
            text: Some(m.content.clone()),
            message: Some(m.content.clone()),
            content: None,
            created_at: Some(m.created_at),
        }
    }
}

/// Acknowledgment returned to the sender after a push attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SendAck {
    /// `true` when the receiver's live connection accepted the push.
    pub success: bool,
    pub message: WireMessage,
}

/// Events pushed from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Every currently bound user id, sorted.
    OnlineSetChanged(Vec<UserId>),
    NewMessage(WireMessage),
    SendAck(SendAck),
    /// A `push-message` was malformed and has been dropped.
    PushRejected { reason: String },
}

/// Events sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientEvent {
    RequestOnlineSet,
    /// Live delivery of an already-persisted message.
    PushMessage(WireMessage),
}

impl ServerEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl ClientEvent {
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Body of `POST /api/messages/:id`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessageRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SendMessageRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            message: Some(content.into()),
            text: None,
        }
    }

    /// Non-blank body, preferring `message` (the field the store expects).
    pub fn body(&self) -> Option<&str> {
        [&self.message, &self.text]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .find(|s| !s.trim().is_empty())
    }
}
