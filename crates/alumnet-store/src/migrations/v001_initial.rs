//! v001 -- Initial schema creation.
//!
//! Creates `users` (mirrored from the account service) and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Users (written by the account service, read here)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY NOT NULL,
    full_name     TEXT NOT NULL,
    email         TEXT,
    profile_pic   TEXT,
    password_hash TEXT,                         -- never leaves this crate
    created_at    TEXT NOT NULL                 -- RFC-3339
);

-- ----------------------------------------------------------------
-- Direct messages (append-only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id          TEXT PRIMARY KEY NOT NULL,      -- UUID v4
    sender_id   TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    content     TEXT NOT NULL,
    created_at  TEXT NOT NULL                   -- RFC-3339, microsecond precision, UTC
);

CREATE INDEX IF NOT EXISTS idx_messages_pair_ts
    ON messages(sender_id, receiver_id, created_at);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
