//! # alumnet-store
//!
//! Durable message history for alumnet, backed by SQLite.
//!
//! The crate exposes a synchronous [`Database`] handle wrapping a
//! `rusqlite::Connection`, typed helpers for users and messages, and the
//! [`MessageStore`] contract the server core depends on.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod users;

mod error;

pub use database::Database;
pub use error::{Result, StoreError};
pub use messages::MessageStore;
pub use models::*;
