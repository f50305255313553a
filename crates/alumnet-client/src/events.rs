//! Notices the session raises for the user interface.
//!
//! None of these block anything; a front end may show them or drop them.

use std::fmt;

use alumnet_shared::message::Message;
use alumnet_shared::types::UserId;

/// Display name used when the sender is not in the cached partner list.
pub const UNKNOWN_SENDER_NAME: &str = "Someone";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Connected,
    Disconnected,
    OnlineChanged { online: usize },
    /// A message arrived for a conversation that is not open.
    NewMessage { from: UserId, name: String },
    /// A message arrived for the open conversation.
    Incoming(Message),
    /// The receiver was offline; the message waits in history.
    NotDelivered { receiver: UserId },
    /// The server dropped a live frame.
    Rejected { reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Connected => write!(f, "* connected"),
            Notice::Disconnected => write!(f, "* connection lost, reconnecting"),
            Notice::OnlineChanged { online } => write!(f, "* {online} online"),
            Notice::NewMessage { name, .. } => write!(f, "* New message from {name}"),
            Notice::Incoming(m) => write!(
                f,
                "[{}] {}: {}",
                m.created_at.format("%H:%M"),
                m.sender_id.short(),
                m.content
            ),
            Notice::NotDelivered { receiver } => {
                write!(f, "* {} is offline, message saved", receiver.short())
            }
            Notice::Rejected { reason } => write!(f, "! server rejected message: {reason}"),
        }
    }
}
