//! Domain model structs persisted in the SQLite database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use alumnet_shared::types::UserId;

pub use alumnet_shared::message::Message;

/// A user account as mirrored from the account service.
///
/// `password_hash` is stored only so the row matches the upstream record;
/// other users only ever see the
/// [`Partner`](alumnet_shared::types::Partner) columns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub full_name: String,
    pub email: Option<String>,
    pub profile_pic: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}
