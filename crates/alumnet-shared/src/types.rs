use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::FALLBACK_ID_PREFIX;
use crate::error::ProtocolError;

// User identity is owned by the account service; we only ever reference it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First eight characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Fresh canonical id, assigned by the durable store.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Deterministic id for a message the server delivered without one.
    ///
    /// Only used for transient deduplication: two copies of the same event
    /// (live push and history record) derive the same value.
    pub fn fallback(sender: &UserId, created_at: DateTime<Utc>) -> Self {
        Self(format!(
            "{FALLBACK_ID_PREFIX}-{}-{}",
            sender,
            created_at.timestamp_millis()
        ))
    }

    pub fn is_fallback(&self) -> bool {
        self.0
            .strip_prefix(FALLBACK_ID_PREFIX)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Server-side handle of one live WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Public view of another user, as listed in the conversation sidebar.
/// Never carries credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", try_from = "PartnerRecord")]
pub struct Partner {
    pub id: UserId,
    pub full_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub profile_pic: Option<String>,
}

/// Incoming shape of [`Partner`]: the id may be keyed `id`, `_id`, or both.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartnerRecord {
    #[serde(default)]
    id: Option<UserId>,
    #[serde(default, rename = "_id")]
    store_id: Option<UserId>,
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    profile_pic: Option<String>,
}

impl TryFrom<PartnerRecord> for Partner {
    type Error = ProtocolError;

    fn try_from(record: PartnerRecord) -> Result<Self, Self::Error> {
        let id = record
            .id
            .or(record.store_id)
            .ok_or(ProtocolError::MissingField("id"))?;
        Ok(Self {
            id,
            full_name: record.full_name,
            email: record.email,
            profile_pic: record.profile_pic,
        })
    }
}
