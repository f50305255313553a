//! A logged-in chat session: the conversation cache wired to the server.
//!
//! Sending is two independent steps. The durable append goes through
//! [`ChatApi::post_message`]; only its canonical result is cached and then
//! handed to the live channel for immediate delivery. When the append fails
//! nothing is cached and nothing is pushed.

use tracing::{debug, info, warn};

use alumnet_shared::message::Message;
use alumnet_shared::protocol::ServerEvent;
use alumnet_shared::types::{Partner, UserId};

use crate::api::ChatApi;
use crate::error::{ClientError, Result};
use crate::events::{Notice, UNKNOWN_SENDER_NAME};
use crate::live::{LiveEvent, LiveSender};
use crate::snapshot::SnapshotStore;
use crate::state::{self, AddOutcome, CacheState, ConversationState};

pub struct ChatSession<A> {
    api: A,
    state: ConversationState,
    partners: Vec<Partner>,
    notifications: bool,
    live: Option<LiveSender>,
}

impl<A: ChatApi> ChatSession<A> {
    pub fn new(api: A, viewer: UserId) -> Self {
        Self {
            api,
            state: ConversationState::new(viewer),
            partners: Vec::new(),
            notifications: true,
            live: None,
        }
    }

    /// Route pushes through `live` from now on.
    pub fn attach_live(&mut self, live: LiveSender) {
        self.live = Some(live);
    }

    pub fn viewer(&self) -> &UserId {
        self.state.viewer()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn partners(&self) -> &[Partner] {
        &self.partners
    }

    pub async fn refresh_partners(&mut self) -> Result<&[Partner]> {
        let viewer = self.state.viewer().clone();
        let mut partners = self.api.list_partners(&viewer).await?;
        partners.retain(|p| p.id != viewer);
        self.partners = partners;
        Ok(&self.partners)
    }

    /// Display name from the cached partner list.
    pub fn partner_name(&self, id: &UserId) -> &str {
        self.partners
            .iter()
            .find(|p| &p.id == id)
            .map(|p| p.full_name.as_str())
            .unwrap_or(UNKNOWN_SENDER_NAME)
    }

    /// Make `counterpart` active without fetching. Returns the state of its
    /// cache so the caller can decide whether to load history.
    pub fn select_conversation(&mut self, counterpart: UserId) -> CacheState {
        let cache = self.state.cache_state(&counterpart);
        self.state.select_conversation(counterpart);
        cache
    }

    /// Zero the unread counter of `counterpart`, or of the selected
    /// conversation when `None`. Returns whose counter was cleared.
    pub fn mark_read(&mut self, counterpart: Option<UserId>) -> Result<UserId> {
        let counterpart = match counterpart {
            Some(id) => id,
            None => self.state.selected().cloned().ok_or(ClientError::NoSelection)?,
        };
        self.state.mark_read(&counterpart);
        Ok(counterpart)
    }

    /// Fetch history for `counterpart` into the cache.
    ///
    /// Returns `Ok(false)` when a newer request for the same counterpart
    /// superseded this one. On error the previous cache stays as it was.
    pub async fn load_history(&mut self, counterpart: &UserId) -> Result<bool> {
        let ticket = self.state.begin_history(counterpart);
        let viewer = self.state.viewer().clone();

        match self.api.fetch_history(&viewer, counterpart).await {
            Ok(history) => Ok(self.state.apply_history(ticket, history)),
            Err(e) => {
                warn!(counterpart = %counterpart.short(), error = %e, "history fetch failed");
                Err(e)
            }
        }
    }

    /// Send `content` to the selected counterpart.
    pub async fn send(&mut self, content: &str) -> Result<Message> {
        let receiver = self
            .state
            .selected()
            .cloned()
            .ok_or(ClientError::NoSelection)?;
        if content.trim().is_empty() {
            return Err(ClientError::EmptyContent);
        }

        let viewer = self.state.viewer().clone();
        let message = self.api.post_message(&viewer, &receiver, content).await?;
        info!(id = %message.id, receiver = %receiver.short(), "message stored");

        self.state.add_message(message.clone());

        match &self.live {
            Some(live) => {
                if let Err(e) = live.push_message(&message) {
                    debug!(error = %e, "live push skipped");
                }
            }
            None => debug!("no live channel, message is history-only"),
        }

        Ok(message)
    }

    /// Apply one live channel event and return what the user should see.
    pub fn handle_event(&mut self, event: LiveEvent) -> Option<Notice> {
        match event {
            LiveEvent::Connected => Some(Notice::Connected),
            LiveEvent::Disconnected => Some(Notice::Disconnected),
            LiveEvent::Server(event) => self.handle_server_event(event),
        }
    }

    fn handle_server_event(&mut self, event: ServerEvent) -> Option<Notice> {
        match event {
            ServerEvent::OnlineSetChanged(users) => {
                self.state.set_online(users);
                Some(Notice::OnlineChanged {
                    online: self.state.online().len(),
                })
            }
            ServerEvent::NewMessage(wire) => {
                let message = match state::message_from_wire(wire) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!(error = %e, "dropping malformed new-message");
                        return None;
                    }
                };
                let sender = message.sender_id.clone();
                match self.state.add_message(message.clone()) {
                    AddOutcome::Added { unread: true, .. } => {
                        // `unread` already means: not ours, not the open conversation.
                        self.notifications.then(|| Notice::NewMessage {
                            name: self.partner_name(&sender).to_string(),
                            from: sender,
                        })
                    }
                    AddOutcome::Added { counterpart, .. } => {
                        let open = self.state.selected() == Some(&counterpart);
                        open.then_some(Notice::Incoming(message))
                    }
                    AddOutcome::Duplicate | AddOutcome::Foreign => None,
                }
            }
            ServerEvent::SendAck(ack) => {
                if ack.success {
                    return None;
                }
                ack.message
                    .receiver_id
                    .map(|receiver| Notice::NotDelivered { receiver })
            }
            ServerEvent::PushRejected { reason } => Some(Notice::Rejected { reason }),
        }
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications
    }

    pub fn set_notifications(&mut self, enabled: bool) {
        self.notifications = enabled;
    }

    /// Restore the persisted cache for this user, if any.
    pub fn resume(&mut self, store: &SnapshotStore) -> Result<bool> {
        match store.load(self.state.viewer())? {
            Some(snapshot) => Ok(self.state.restore(snapshot)),
            None => Ok(false),
        }
    }

    pub fn save(&self, store: &SnapshotStore) -> Result<()> {
        store.save(&self.state.snapshot())
    }

    /// Drop all cached state and the persisted snapshot.
    pub fn logout(&mut self, store: &SnapshotStore) -> Result<()> {
        self.state.reset();
        self.partners.clear();
        self.live = None;
        store.clear(self.state.viewer())
    }
}
