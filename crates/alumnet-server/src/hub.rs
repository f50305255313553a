//! Connection hub: the single owner of the [`PresenceRegistry`].
//!
//! Each WebSocket task talks to the registry only through a cloned [`Hub`].
//! Registry operations never await, so holding the lock for the duration of
//! one connection event serializes all presence mutations.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use alumnet_shared::protocol::{ClientEvent, ServerEvent};
use alumnet_shared::types::{ConnectionId, UserId};

use crate::delivery;
use crate::presence::PresenceRegistry;

#[derive(Clone)]
pub struct Hub {
    registry: Arc<Mutex<PresenceRegistry>>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(PresenceRegistry::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a freshly opened connection. Binds it when the handshake
    /// carried a user id; otherwise it stays anonymous.
    pub fn open(&self, user: Option<UserId>) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let handle = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::unbounded_channel();

        self.with_registry(|registry| {
            registry.attach(handle, tx);
            match user {
                Some(user) => registry.bind(handle, user),
                None => debug!(conn = %handle, "anonymous connection, not bound"),
            }
        });

        (handle, rx)
    }

    /// Connection closed. Safe to call more than once.
    pub fn close(&self, handle: ConnectionId) {
        self.with_registry(|registry| {
            registry.detach(handle);
        });
    }

    /// Dispatch one decoded client event. `user` is the identity the
    /// connection presented on its handshake.
    pub fn handle_client_event(&self, handle: ConnectionId, user: Option<&UserId>, event: ClientEvent) {
        self.with_registry(|registry| match event {
            ClientEvent::RequestOnlineSet => {
                registry.send_to(handle, registry.online_set_event());
            }
            ClientEvent::PushMessage(payload) => {
                // Rejections are already logged and signalled to the origin.
                if let Ok(report) = delivery::deliver(registry, handle, user, payload, Utc::now()) {
                    debug!(
                        id = %report.message.id,
                        sender = %report.message.sender_id,
                        receiver = %report.message.receiver_id,
                        pushed = report.pushed,
                        "push attempt finished"
                    );
                }
            }
        });
    }

    /// Tell one connection that its last frame was dropped.
    pub fn reject(&self, handle: ConnectionId, reason: String) {
        self.with_registry(|registry| {
            registry.send_to(handle, ServerEvent::PushRejected { reason });
        });
    }

    pub fn online_users(&self) -> BTreeSet<UserId> {
        self.with_registry(|registry| registry.snapshot())
    }

    pub fn connection_count(&self) -> usize {
        self.with_registry(|registry| registry.connection_count())
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut PresenceRegistry) -> R) -> R {
        // Registry stays usable after a panicking handler.
        let mut guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}
