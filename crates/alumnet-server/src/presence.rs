//! Presence registry: who is online, and on which connection.
//!
//! Every live WebSocket connection owns an [`Outbox`] registered here. A
//! connection that supplied a user id on the handshake is additionally
//! *bound* to that user. One user has at most one binding; a newer
//! connection silently takes over (last connection wins). Bindings are
//! removed by connection handle, never by user id, so a late close of an
//! old connection cannot evict the user's current one.
//!
//! The registry lives in memory only and is empty after a restart.

use std::collections::{BTreeSet, HashMap};

use tokio::sync::mpsc;
use tracing::{debug, info};

use alumnet_shared::protocol::ServerEvent;
use alumnet_shared::types::{ConnectionId, UserId};

/// Sending half of a connection's event queue. Never blocks.
pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Default)]
pub struct PresenceRegistry {
    connections: HashMap<ConnectionId, Outbox>,
    bindings: HashMap<UserId, ConnectionId>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an open connection so it receives broadcasts.
    pub fn attach(&mut self, handle: ConnectionId, outbox: Outbox) {
        self.connections.insert(handle, outbox);
        debug!(conn = %handle, total = self.connections.len(), "connection attached");
    }

    /// Forget a closed connection and release its binding, if any.
    pub fn detach(&mut self, handle: ConnectionId) -> Option<UserId> {
        self.connections.remove(&handle);
        self.unbind(handle)
    }

    /// Bind `user` to `handle`, replacing any earlier binding of that user,
    /// then broadcast the online set to every connection.
    pub fn bind(&mut self, handle: ConnectionId, user: UserId) {
        // One binding per handle.
        self.bindings.retain(|_, bound| *bound != handle);

        if let Some(previous) = self.bindings.insert(user.clone(), handle) {
            if previous != handle {
                debug!(user = %user, old = %previous, new = %handle, "binding replaced");
            }
        }
        info!(user = %user, conn = %handle, online = self.online_count(), "user online");

        self.broadcast_online_set();
    }

    /// Remove the binding held by `handle`. Unknown handles are a no-op.
    /// The online set is broadcast to the remaining connections either way.
    pub fn unbind(&mut self, handle: ConnectionId) -> Option<UserId> {
        let user = self
            .bindings
            .iter()
            .find(|(_, bound)| **bound == handle)
            .map(|(user, _)| user.clone());

        if let Some(ref user) = user {
            self.bindings.remove(user);
            info!(user = %user, conn = %handle, online = self.online_count(), "user offline");
        }

        self.broadcast_online_set();
        user
    }

    pub fn lookup(&self, user: &UserId) -> Option<ConnectionId> {
        self.bindings.get(user).copied()
    }

    /// Every currently bound user id.
    pub fn snapshot(&self) -> BTreeSet<UserId> {
        self.bindings.keys().cloned().collect()
    }

    pub fn online_count(&self) -> usize {
        self.bindings.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Queue `event` for one connection. Returns `false` if the connection is
    /// unknown or already closed.
    pub fn send_to(&self, handle: ConnectionId, event: ServerEvent) -> bool {
        match self.connections.get(&handle) {
            Some(outbox) => outbox.send(event).is_ok(),
            None => false,
        }
    }

    pub fn online_set_event(&self) -> ServerEvent {
        ServerEvent::OnlineSetChanged(self.snapshot().into_iter().collect())
    }

    fn broadcast_online_set(&self) {
        let event = self.online_set_event();
        for (handle, outbox) in &self.connections {
            if outbox.send(event.clone()).is_err() {
                debug!(conn = %handle, "skipping broadcast to closing connection");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outbox() -> (Outbox, mpsc::UnboundedReceiver<ServerEvent>) {
        mpsc::unbounded_channel()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn last_connection_wins() {
        let mut registry = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (h1, h2) = (ConnectionId(1), ConnectionId(2));

        registry.attach(h1, outbox().0);
        registry.attach(h2, outbox().0);
        registry.bind(h1, alice.clone());
        registry.bind(h2, alice.clone());

        assert_eq!(registry.lookup(&alice), Some(h2));
        assert_eq!(registry.online_count(), 1);
        assert_eq!(registry.snapshot().len(), 1);
    }

    #[test]
    fn late_close_of_old_connection_keeps_new_binding() {
        let mut registry = PresenceRegistry::new();
        let alice = UserId::from("alice");
        let (h1, h2) = (ConnectionId(1), ConnectionId(2));

        registry.bind(h1, alice.clone());
        registry.bind(h2, alice.clone());

        assert_eq!(registry.detach(h1), None);
        assert_eq!(registry.lookup(&alice), Some(h2));
    }

    #[test]
    fn unbind_unknown_handle_is_noop() {
        let mut registry = PresenceRegistry::new();
        let bob = UserId::from("bob");
        registry.bind(ConnectionId(7), bob.clone());

        assert_eq!(registry.unbind(ConnectionId(99)), None);
        assert_eq!(registry.unbind(ConnectionId(99)), None);
        assert_eq!(registry.lookup(&bob), Some(ConnectionId(7)));
        assert_eq!(registry.online_count(), 1);

        assert_eq!(registry.unbind(ConnectionId(7)), Some(bob.clone()));
        assert_eq!(registry.unbind(ConnectionId(7)), None);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn rebinding_a_handle_drops_its_old_user() {
        let mut registry = PresenceRegistry::new();
        let h = ConnectionId(1);
        registry.bind(h, UserId::from("a"));
        registry.bind(h, UserId::from("b"));

        assert_eq!(registry.lookup(&UserId::from("a")), None);
        assert_eq!(registry.lookup(&UserId::from("b")), Some(h));
    }

    #[test]
    fn bind_and_unbind_broadcast_to_all_connections() {
        let mut registry = PresenceRegistry::new();
        let (anon_tx, mut anon_rx) = outbox();
        let (alice_tx, mut alice_rx) = outbox();

        registry.attach(ConnectionId(1), anon_tx);
        registry.attach(ConnectionId(2), alice_tx);
        registry.bind(ConnectionId(2), UserId::from("alice"));

        let expected = ServerEvent::OnlineSetChanged(vec![UserId::from("alice")]);
        assert_eq!(drain(&mut anon_rx), vec![expected.clone()]);
        assert_eq!(drain(&mut alice_rx), vec![expected]);

        registry.detach(ConnectionId(2));
        assert_eq!(
            drain(&mut anon_rx),
            vec![ServerEvent::OnlineSetChanged(vec![])]
        );
        // The closed connection no longer receives anything.
        assert!(drain(&mut alice_rx).is_empty());
    }

    #[test]
    fn anonymous_connection_is_invisible() {
        let mut registry = PresenceRegistry::new();
        registry.attach(ConnectionId(1), outbox().0);

        assert_eq!(registry.connection_count(), 1);
        assert_eq!(registry.online_count(), 0);
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn send_to_closed_connection_fails_quietly() {
        let mut registry = PresenceRegistry::new();
        let (tx, rx) = outbox();
        registry.attach(ConnectionId(1), tx);
        drop(rx);

        assert!(!registry.send_to(ConnectionId(1), ServerEvent::OnlineSetChanged(vec![])));
        assert!(!registry.send_to(ConnectionId(2), ServerEvent::OnlineSetChanged(vec![])));
    }
}
