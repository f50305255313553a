//! Delivery router: live push of an already-persisted message.
//!
//! The message reaches this module only after the HTTP append succeeded, so
//! a failed or skipped push loses nothing: the receiver finds it in history.
//! Nothing is queued for offline receivers.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use alumnet_shared::message::Message;
use alumnet_shared::protocol::{SendAck, ServerEvent, WireMessage};
use alumnet_shared::types::{ConnectionId, UserId};
use alumnet_shared::ProtocolError;

use crate::presence::PresenceRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("push-message has no receiverId")]
    MissingReceiver,

    #[error("push-message has no sender and the connection is anonymous")]
    MissingSender,

    #[error("push-message has no content")]
    EmptyContent,
}

/// Outcome of one accepted push attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub message: Message,
    /// Whether the receiver's connection accepted the `new-message` event.
    pub pushed: bool,
}

/// Route `payload` to its receiver's live connection and acknowledge to
/// `origin`.
///
/// The sender is the user bound to `origin` when there is one; only an
/// anonymous connection may name the sender in the payload. A payload
/// without `createdAt` is stamped with `now`.
///
/// Malformed payloads are logged and answered with `push-rejected` on the
/// origin connection; the returned error is informational only.
pub fn deliver(
    registry: &PresenceRegistry,
    origin: ConnectionId,
    bound_sender: Option<&UserId>,
    payload: WireMessage,
    now: DateTime<Utc>,
) -> Result<DeliveryReport, DeliveryError> {
    let message = match normalize(bound_sender, payload, now) {
        Ok(message) => message,
        Err(e) => {
            warn!(conn = %origin, error = %e, "rejected push-message");
            registry.send_to(
                origin,
                ServerEvent::PushRejected {
                    reason: e.to_string(),
                },
            );
            return Err(e);
        }
    };

    let wire = WireMessage::from(&message);

    let pushed = match registry.lookup(&message.receiver_id) {
        Some(target) => {
            let ok = registry.send_to(target, ServerEvent::NewMessage(wire.clone()));
            if !ok {
                debug!(
                    receiver = %message.receiver_id,
                    conn = %target,
                    "receiver connection closed before push"
                );
            }
            ok
        }
        None => {
            debug!(receiver = %message.receiver_id, "receiver offline, history only");
            false
        }
    };

    registry.send_to(
        origin,
        ServerEvent::SendAck(SendAck {
            success: pushed,
            message: wire,
        }),
    );

    Ok(DeliveryReport { message, pushed })
}

fn normalize(
    bound_sender: Option<&UserId>,
    mut payload: WireMessage,
    now: DateTime<Utc>,
) -> Result<Message, DeliveryError> {
    if payload.receiver_id.is_none() {
        return Err(DeliveryError::MissingReceiver);
    }
    if let Some(sender) = bound_sender {
        payload.sender_id = Some(sender.clone());
    }
    payload.created_at.get_or_insert(now);

    payload.into_message().map_err(|e| match e {
        ProtocolError::MissingField("senderId") => DeliveryError::MissingSender,
        ProtocolError::MissingField(_) => DeliveryError::MissingReceiver,
        ProtocolError::EmptyContent | ProtocolError::Json(_) => DeliveryError::EmptyContent,
    })
}
