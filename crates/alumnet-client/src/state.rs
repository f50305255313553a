//! Client-side conversation cache.
//!
//! [`ConversationState`] holds one message sequence per counterpart, the
//! currently selected counterpart, unread counters and the last known online
//! set. Messages reach it from two independent channels (history fetches and
//! live pushes) with no ordering guarantee between them; every insertion goes
//! through [`Message::is_same_as`] so both copies of one message collapse into
//! a single entry.
//!
//! Each counterpart's cache is either `Empty` or `Loaded`. Switching the
//! selection never discards an inactive cache, and a failed fetch leaves the
//! last good sequence in place.

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::{debug, trace};

use alumnet_shared::message::Message;
use alumnet_shared::protocol::WireMessage;
use alumnet_shared::types::UserId;
use alumnet_shared::ProtocolError;

use crate::snapshot::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Empty,
    Loaded,
}

/// What [`ConversationState::add_message`] did with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added {
        counterpart: UserId,
        /// The message bumped the counterpart's unread counter.
        unread: bool,
    },
    /// Another representation of an already cached message.
    Duplicate,
    /// The viewer is neither sender nor receiver.
    Foreign,
}

/// Proof that a history request was issued. Only the ticket of the most
/// recent request for a counterpart is accepted by
/// [`ConversationState::apply_history`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTicket {
    counterpart: UserId,
    generation: u64,
}

#[derive(Debug, Default)]
struct Conversation {
    messages: Vec<Message>,
    loaded: bool,
}

impl Conversation {
    fn contains(&self, message: &Message) -> bool {
        self.messages.iter().any(|m| m.is_same_as(message))
    }

    /// Insert by `created_at`, after any entries with an equal timestamp.
    fn insert(&mut self, message: Message) {
        let at = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(at, message);
    }
}

#[derive(Debug)]
pub struct ConversationState {
    viewer: UserId,
    conversations: HashMap<UserId, Conversation>,
    selected: Option<UserId>,
    unread: HashMap<UserId, u32>,
    online: BTreeSet<UserId>,
    generations: HashMap<UserId, u64>,
}

impl ConversationState {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            conversations: HashMap::new(),
            selected: None,
            unread: HashMap::new(),
            online: BTreeSet::new(),
            generations: HashMap::new(),
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Cache `message` unless an equivalent one is already present.
    ///
    /// A message from someone other than the viewer and the selected
    /// counterpart increments that sender's unread counter.
    pub fn add_message(&mut self, message: Message) -> AddOutcome {
        let Some(counterpart) = message.counterpart_of(&self.viewer).cloned() else {
            debug!(id = %message.id, "ignoring message for another user");
            return AddOutcome::Foreign;
        };

        let conversation = self.conversations.entry(counterpart.clone()).or_default();
        if conversation.contains(&message) {
            trace!(id = %message.id, "duplicate message");
            return AddOutcome::Duplicate;
        }

        let unread = message.sender_id != self.viewer
            && self.selected.as_ref() != Some(&message.sender_id);
        if unread {
            *self.unread.entry(message.sender_id.clone()).or_insert(0) += 1;
        }

        conversation.insert(message);
        AddOutcome::Added {
            counterpart,
            unread,
        }
    }

    /// Start a history fetch for `counterpart`. Any ticket issued earlier for
    /// the same counterpart becomes stale.
    pub fn begin_history(&mut self, counterpart: &UserId) -> HistoryTicket {
        let generation = self.generations.entry(counterpart.clone()).or_insert(0);
        *generation += 1;
        HistoryTicket {
            counterpart: counterpart.clone(),
            generation: *generation,
        }
    }

    /// Install a fetched history as the counterpart's cache and zero its
    /// unread counter.
    ///
    /// Every history row is kept, even two with the same text close together.
    /// Cached messages the history does not contain (a push that raced the
    /// fetch) are kept. Returns `false` and changes nothing when a newer
    /// request has been issued since `ticket`.
    pub fn apply_history(&mut self, ticket: HistoryTicket, history: Vec<Message>) -> bool {
        let current = self.generations.get(&ticket.counterpart).copied();
        if current != Some(ticket.generation) {
            debug!(
                counterpart = %ticket.counterpart.short(),
                generation = ticket.generation,
                "discarding stale history response"
            );
            return false;
        }

        let counterpart = ticket.counterpart;
        let mut fresh = Conversation {
            messages: Vec::with_capacity(history.len()),
            loaded: true,
        };
        for message in history {
            if message.counterpart_of(&self.viewer) != Some(&counterpart) {
                continue;
            }
            fresh.insert(message);
        }

        let previous = self.conversations.remove(&counterpart).unwrap_or_default();
        for message in previous.messages {
            if !fresh.contains(&message) {
                fresh.insert(message);
            }
        }

        debug!(
            counterpart = %counterpart.short(),
            count = fresh.messages.len(),
            "history loaded"
        );
        self.unread.remove(&counterpart);
        self.conversations.insert(counterpart, fresh);
        true
    }

    /// [`begin_history`](Self::begin_history) followed by
    /// [`apply_history`](Self::apply_history), for callers that fetch inline.
    pub fn load_history(&mut self, counterpart: &UserId, history: Vec<Message>) {
        let ticket = self.begin_history(counterpart);
        self.apply_history(ticket, history);
    }

    pub fn messages(&self, counterpart: &UserId) -> &[Message] {
        self.conversations
            .get(counterpart)
            .map(|c| c.messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn cache_state(&self, counterpart: &UserId) -> CacheState {
        match self.conversations.get(counterpart) {
            Some(c) if c.loaded => CacheState::Loaded,
            _ => CacheState::Empty,
        }
    }

    // -----------------------------------------------------------------------
    // Selection and unread counters
    // -----------------------------------------------------------------------

    /// Make `counterpart` the active conversation and zero its counter.
    /// Does not fetch anything.
    pub fn select_conversation(&mut self, counterpart: UserId) {
        self.unread.remove(&counterpart);
        self.selected = Some(counterpart);
    }

    pub fn selected(&self) -> Option<&UserId> {
        self.selected.as_ref()
    }

    pub fn mark_read(&mut self, counterpart: &UserId) {
        self.unread.remove(counterpart);
    }

    pub fn unread_count(&self, counterpart: &UserId) -> u32 {
        self.unread.get(counterpart).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    /// Counterparts with unread messages, sorted by id.
    pub fn unread_counterparts(&self) -> Vec<(UserId, u32)> {
        let mut out: Vec<_> = self
            .unread
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(id, n)| (id.clone(), *n))
            .collect();
        out.sort();
        out
    }

    // -----------------------------------------------------------------------
    // Presence
    // -----------------------------------------------------------------------

    /// Replace the online set with the server's latest broadcast.
    pub fn set_online(&mut self, users: impl IntoIterator<Item = UserId>) {
        self.online = users.into_iter().collect();
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    pub fn online(&self) -> &BTreeSet<UserId> {
        &self.online
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Persistable view: non-empty caches, which of them were loaded, the
    /// selection and unread counters. The online set is transient and not
    /// included.
    pub fn snapshot(&self) -> SessionSnapshot {
        let conversations: HashMap<UserId, Vec<Message>> = self
            .conversations
            .iter()
            .filter(|(_, c)| !c.messages.is_empty())
            .map(|(id, c)| (id.clone(), c.messages.clone()))
            .collect();
        let mut loaded: Vec<UserId> = self
            .conversations
            .iter()
            .filter(|(id, c)| c.loaded && conversations.contains_key(*id))
            .map(|(id, _)| id.clone())
            .collect();
        loaded.sort();

        SessionSnapshot {
            viewer: self.viewer.clone(),
            saved_at: Utc::now(),
            selected: self.selected.clone(),
            unread: self
                .unread
                .iter()
                .filter(|(id, n)| **n > 0 && conversations.contains_key(*id))
                .map(|(id, n)| (id.clone(), *n))
                .collect(),
            conversations,
            loaded,
        }
    }

    /// Replace the cache with `snapshot`. Returns `false` and leaves the state
    /// untouched when the snapshot belongs to another user.
    pub fn restore(&mut self, snapshot: SessionSnapshot) -> bool {
        if snapshot.viewer != self.viewer {
            return false;
        }

        self.reset();
        self.selected = snapshot.selected;
        self.unread = snapshot.unread;
        for (counterpart, messages) in snapshot.conversations {
            let mut conversation = Conversation {
                messages: Vec::with_capacity(messages.len()),
                loaded: snapshot.loaded.contains(&counterpart),
            };
            for message in messages {
                conversation.insert(message);
            }
            self.conversations.insert(counterpart, conversation);
        }
        self.unread
            .retain(|id, n| *n > 0 && self.conversations.contains_key(id));
        true
    }

    /// Drop everything except the viewer identity.
    pub fn reset(&mut self) {
        self.conversations.clear();
        self.selected = None;
        self.unread.clear();
        self.online.clear();
        self.generations.clear();
    }
}

/// Normalize a pushed wire payload. A payload without a timestamp is stamped
/// with the local clock.
pub fn message_from_wire(mut wire: WireMessage) -> Result<Message, ProtocolError> {
    wire.created_at.get_or_insert_with(Utc::now);
    wire.into_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alumnet_shared::types::MessageId;
    use chrono::{DateTime, Duration, TimeZone};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: &str, from: &str, to: &str, content: &str, at: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::from(id),
            sender_id: UserId::from(from),
            receiver_id: UserId::from(to),
            content: content.into(),
            created_at: at,
        }
    }

    fn state() -> ConversationState {
        ConversationState::new(UserId::from("me"))
    }

    fn contents(state: &ConversationState, counterpart: &str) -> Vec<String> {
        state
            .messages(&UserId::from(counterpart))
            .iter()
            .map(|m| m.content.clone())
            .collect()
    }

    #[test]
    fn same_id_is_duplicate() {
        let mut s = state();
        let m = msg("m1", "bob", "me", "hi", t(0));
        assert!(matches!(s.add_message(m.clone()), AddOutcome::Added { .. }));
        assert_eq!(s.add_message(m), AddOutcome::Duplicate);
        assert_eq!(s.messages(&UserId::from("bob")).len(), 1);
    }

    #[test]
    fn push_and_history_copies_collapse_with_different_ids() {
        let mut s = state();
        let pushed = msg("local-bob-1700000000000", "bob", "me", "hi", t(0));
        s.add_message(pushed);

        let stored = msg("65f1c0", "bob", "me", "hi", t(0) + Duration::milliseconds(400));
        s.load_history(&UserId::from("bob"), vec![stored]);

        assert_eq!(contents(&s, "bob"), vec!["hi"]);
    }

    #[test]
    fn same_text_outside_tolerance_is_kept() {
        let mut s = state();
        s.add_message(msg("m1", "bob", "me", "ok", t(0)));
        s.add_message(msg("m2", "bob", "me", "ok", t(5)));
        assert_eq!(contents(&s, "bob"), vec!["ok", "ok"]);
    }

    #[test]
    fn stored_messages_with_same_text_close_together_are_both_kept() {
        let mut s = state();
        let first = msg("uuid-1", "bob", "me", "ok", t(0));
        let second = msg("uuid-2", "bob", "me", "ok", t(0) + Duration::milliseconds(300));
        assert!(matches!(s.add_message(first), AddOutcome::Added { .. }));
        assert!(matches!(s.add_message(second), AddOutcome::Added { .. }));
        assert_eq!(contents(&s, "bob"), vec!["ok", "ok"]);
        assert_eq!(s.unread_count(&UserId::from("bob")), 2);
    }

    #[test]
    fn history_rows_are_never_collapsed_into_each_other() {
        let mut s = state();
        let history = vec![
            msg("uuid-1", "bob", "me", "ok", t(0)),
            msg("uuid-2", "bob", "me", "ok", t(0) + Duration::milliseconds(300)),
        ];
        s.load_history(&UserId::from("bob"), history);
        assert_eq!(contents(&s, "bob"), vec!["ok", "ok"]);
    }

    #[test]
    fn own_repeated_sends_are_both_shown() {
        let mut s = state();
        s.select_conversation(UserId::from("bob"));
        s.add_message(msg("uuid-1", "me", "bob", "thanks", t(0)));
        s.add_message(msg("uuid-2", "me", "bob", "thanks", t(0) + Duration::milliseconds(200)));
        assert_eq!(contents(&s, "bob"), vec!["thanks", "thanks"]);
    }

    #[test]
    fn mark_read_zeroes_one_counter() {
        let mut s = state();
        s.add_message(msg("m1", "bob", "me", "a", t(0)));
        s.add_message(msg("m2", "carol", "me", "b", t(1)));
        s.mark_read(&UserId::from("bob"));
        assert_eq!(s.unread_count(&UserId::from("bob")), 0);
        assert_eq!(s.unread_counterparts(), vec![(UserId::from("carol"), 1)]);
        // The selection is untouched.
        assert_eq!(s.selected(), None);
    }

    #[test]
    fn unread_counts_distinct_messages_from_unselected_sender() {
        let mut s = state();
        for i in 0..3 {
            s.add_message(msg(&format!("m{i}"), "carol", "me", &format!("#{i}"), t(i * 10)));
        }
        // Redelivery does not count twice.
        s.add_message(msg("m0", "carol", "me", "#0", t(0)));
        assert_eq!(s.unread_count(&UserId::from("carol")), 3);
        assert_eq!(s.total_unread(), 3);

        s.select_conversation(UserId::from("carol"));
        assert_eq!(s.unread_count(&UserId::from("carol")), 0);
        assert_eq!(s.total_unread(), 0);
    }

    #[test]
    fn selected_and_own_messages_are_not_unread() {
        let mut s = state();
        s.select_conversation(UserId::from("bob"));

        let from_bob = s.add_message(msg("m1", "bob", "me", "hey", t(0)));
        let from_me = s.add_message(msg("m2", "me", "carol", "yo", t(1)));

        assert_eq!(
            from_bob,
            AddOutcome::Added {
                counterpart: UserId::from("bob"),
                unread: false
            }
        );
        assert_eq!(
            from_me,
            AddOutcome::Added {
                counterpart: UserId::from("carol"),
                unread: false
            }
        );
        assert_eq!(s.total_unread(), 0);
    }

    #[test]
    fn foreign_messages_are_ignored() {
        let mut s = state();
        assert_eq!(
            s.add_message(msg("m1", "bob", "carol", "psst", t(0))),
            AddOutcome::Foreign
        );
        assert!(s.messages(&UserId::from("bob")).is_empty());
    }

    #[test]
    fn out_of_order_arrivals_are_sorted_by_time() {
        let mut s = state();
        s.add_message(msg("m2", "bob", "me", "second", t(10)));
        s.add_message(msg("m1", "me", "bob", "first", t(0)));
        s.add_message(msg("m3", "bob", "me", "third", t(10)));
        assert_eq!(contents(&s, "bob"), vec!["first", "second", "third"]);
    }

    #[test]
    fn history_zeroes_unread_and_marks_loaded() {
        let mut s = state();
        let bob = UserId::from("bob");
        s.add_message(msg("m1", "bob", "me", "hi", t(0)));
        assert_eq!(s.cache_state(&bob), CacheState::Empty);
        assert_eq!(s.unread_count(&bob), 1);

        s.load_history(&bob, vec![msg("m1", "bob", "me", "hi", t(0))]);
        assert_eq!(s.cache_state(&bob), CacheState::Loaded);
        assert_eq!(s.unread_count(&bob), 0);
    }

    #[test]
    fn history_keeps_push_that_raced_the_fetch() {
        let mut s = state();
        let bob = UserId::from("bob");
        let ticket = s.begin_history(&bob);

        s.add_message(msg("m3", "bob", "me", "late push", t(30)));
        let applied = s.apply_history(
            ticket,
            vec![
                msg("m1", "me", "bob", "hello", t(0)),
                msg("m2", "bob", "me", "hey", t(10)),
            ],
        );

        assert!(applied);
        assert_eq!(contents(&s, "bob"), vec!["hello", "hey", "late push"]);
    }

    #[test]
    fn stale_history_response_is_discarded() {
        let mut s = state();
        let bob = UserId::from("bob");
        let first = s.begin_history(&bob);
        let second = s.begin_history(&bob);

        assert!(s.apply_history(second, vec![msg("m2", "bob", "me", "new", t(10))]));
        assert!(!s.apply_history(first, vec![msg("m1", "bob", "me", "old", t(0))]));
        assert_eq!(contents(&s, "bob"), vec!["new"]);
    }

    #[test]
    fn switching_keeps_inactive_caches() {
        let mut s = state();
        let (bob, carol) = (UserId::from("bob"), UserId::from("carol"));
        s.load_history(&bob, vec![msg("m1", "bob", "me", "hi", t(0))]);
        s.select_conversation(bob.clone());
        s.select_conversation(carol.clone());

        assert_eq!(s.cache_state(&bob), CacheState::Loaded);
        assert_eq!(s.cache_state(&carol), CacheState::Empty);
        assert_eq!(s.selected(), Some(&carol));
    }

    #[test]
    fn wire_message_without_id_gets_fallback() {
        let wire = WireMessage {
            sender_id: Some(UserId::from("bob")),
            receiver_id: Some(UserId::from("me")),
            text: Some("yo".into()),
            created_at: Some(t(0)),
            ..Default::default()
        };
        let message = message_from_wire(wire).unwrap();
        assert!(message.id.is_fallback());
        assert_eq!(message.created_at, t(0));
    }

    #[test]
    fn wire_message_without_timestamp_is_stamped_locally() {
        let before = Utc::now();
        let wire = WireMessage {
            id: Some("m1".into()),
            sender_id: Some(UserId::from("bob")),
            receiver_id: Some(UserId::from("me")),
            text: Some("yo".into()),
            ..Default::default()
        };
        let message = message_from_wire(wire).unwrap();
        assert!(message.created_at >= before);
        assert!(message.created_at <= Utc::now());
    }

    #[test]
    fn online_set_is_replaced_wholesale() {
        let mut s = state();
        s.set_online(vec![UserId::from("a"), UserId::from("b")]);
        s.set_online(vec![UserId::from("b")]);
        assert!(!s.is_online(&UserId::from("a")));
        assert!(s.is_online(&UserId::from("b")));
        assert_eq!(s.online().len(), 1);
    }

    #[test]
    fn snapshot_restore_round_trip() {
        let mut s = state();
        let bob = UserId::from("bob");
        s.load_history(&bob, vec![msg("m1", "bob", "me", "hi", t(0))]);
        s.add_message(msg("m2", "carol", "me", "ping", t(5)));
        s.select_conversation(bob.clone());
        s.set_online(vec![bob.clone()]);

        let snap = s.snapshot();
        assert_eq!(snap.loaded, vec![bob.clone()]);

        let mut restored = state();
        assert!(restored.restore(snap));
        assert_eq!(restored.selected(), Some(&bob));
        assert_eq!(restored.cache_state(&bob), CacheState::Loaded);
        assert_eq!(contents(&restored, "bob"), vec!["hi"]);
        assert!(restored.online().is_empty());
    }

    #[test]
    fn unread_messages_survive_restore_with_their_counter() {
        let mut s = state();
        let carol = UserId::from("carol");
        s.add_message(msg("m1", "carol", "me", "ping", t(0)));
        s.add_message(msg("m2", "carol", "me", "you there?", t(5)));

        let mut restored = state();
        assert!(restored.restore(s.snapshot()));
        assert_eq!(restored.unread_count(&carol), 2);
        assert_eq!(contents(&restored, "carol"), vec!["ping", "you there?"]);
        // Never fetched, so opening it still loads the full history.
        assert_eq!(restored.cache_state(&carol), CacheState::Empty);
    }

    #[test]
    fn counters_without_cached_messages_are_not_restored() {
        let mut s = state();
        s.add_message(msg("m1", "carol", "me", "ping", t(0)));
        let mut snap = s.snapshot();
        snap.conversations.clear();

        let mut restored = state();
        assert!(restored.restore(snap));
        assert_eq!(restored.total_unread(), 0);
    }

    #[test]
    fn restore_keeps_every_stored_row() {
        let mut s = state();
        let bob = UserId::from("bob");
        s.load_history(
            &bob,
            vec![
                msg("uuid-1", "bob", "me", "ok", t(0)),
                msg("uuid-2", "bob", "me", "ok", t(0) + Duration::milliseconds(300)),
            ],
        );

        let mut restored = state();
        assert!(restored.restore(s.snapshot()));
        assert_eq!(contents(&restored, "bob"), vec!["ok", "ok"]);
    }

    #[test]
    fn restore_rejects_other_users_snapshot() {
        let mut other = ConversationState::new(UserId::from("someone-else"));
        other.add_message(msg("m1", "bob", "someone-else", "hi", t(0)));

        let mut s = state();
        s.add_message(msg("m2", "bob", "me", "mine", t(0)));
        assert!(!s.restore(other.snapshot()));
        assert_eq!(contents(&s, "bob"), vec!["mine"]);
    }
}
