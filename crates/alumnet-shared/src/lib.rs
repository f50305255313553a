//! # alumnet-shared
//!
//! Types shared by the alumnet server and client: user / message / connection
//! identifiers, the canonical [`Message`](message::Message) record, and the
//! JSON event protocol spoken over the live WebSocket channel.

pub mod constants;
pub mod error;
pub mod message;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use message::Message;
pub use types::{ConnectionId, MessageId, Partner, UserId};
