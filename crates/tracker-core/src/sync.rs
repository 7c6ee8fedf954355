//! Message synchronizer
//!
//! Owns the canonical message list and reconciles it with the initial bulk
//! load and the change feed. Feed events that arrive before the load has
//! completed are buffered and replayed afterwards, so a row seen by both the
//! snapshot and the feed is never duplicated.

use crate::message::{Message, MessageId};
use crate::store::FeedEvent;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, warn};

/// Number of most-recent messages fetched by the initial load
pub const DEFAULT_FETCH_LIMIT: usize = 100;

/// Feed events held while a load is outstanding
const MAX_BUFFERED_EVENTS: usize = 1000;

/// Updates for unknown ids parked until their insert arrives
const MAX_PENDING_UPDATES: usize = 100;

/// State of the initial load
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Ready,
    Failed(String),
}

/// Outcome of applying an insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new message was prepended
    Added,
    /// A message with that id already existed and was replaced in place
    Replaced,
    /// Held until the initial load completes
    Buffered,
}

/// Outcome of applying an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Replaced,
    /// No message with that id; the list is unchanged
    Unknown,
    Buffered,
}

/// A read-flag mutation to send to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadToggle {
    pub id: MessageId,
    pub is_read: bool,
}

/// Canonical message list plus the bookkeeping needed to keep it
/// consistent with the change feed.
#[derive(Debug)]
pub struct Synchronizer {
    messages: Vec<Message>,
    state: LoadState,
    buffered: VecDeque<FeedEvent>,
    pending_updates: HashMap<MessageId, Message>,
    pending_order: VecDeque<MessageId>,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synchronizer {
    /// Create an empty synchronizer waiting for its initial load
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            state: LoadState::Loading,
            buffered: VecDeque::new(),
            pending_updates: HashMap::new(),
            pending_order: VecDeque::new(),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> &LoadState {
        &self.state
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| &m.id == id)
    }

    pub fn unread_count(&self) -> usize {
        self.messages.iter().filter(|m| !m.is_read).count()
    }

    /// Enter the loading state. Feed events are buffered until
    /// [`finish_load`](Self::finish_load) succeeds.
    pub fn begin_load(&mut self) {
        debug!("Starting message load");
        self.state = LoadState::Loading;
    }

    /// Complete a load.
    ///
    /// On success the list is replaced wholesale (sorted newest first) and
    /// buffered feed events are replayed; the inserts that turned out to be
    /// new are returned. On failure the list is cleared and the error kept.
    pub fn finish_load(&mut self, result: Result<Vec<Message>, String>) -> Vec<Message> {
        match result {
            Ok(mut messages) => {
                messages.sort_by(|a, b| b.received_at.cmp(&a.received_at));
                let mut seen = std::collections::HashSet::new();
                messages.retain(|m| seen.insert(m.id.clone()));

                info!("Loaded {} messages", messages.len());
                self.messages = messages;
                self.state = LoadState::Ready;
                self.pending_updates.clear();
                self.pending_order.clear();
                self.replay_buffered()
            }
            Err(error) => {
                warn!("Message load failed: {}", error);
                self.messages.clear();
                self.state = LoadState::Failed(error);
                Vec::new()
            }
        }
    }

    fn replay_buffered(&mut self) -> Vec<Message> {
        let mut added = Vec::new();
        if !self.buffered.is_empty() {
            debug!("Replaying {} buffered feed events", self.buffered.len());
        }
        while let Some(event) = self.buffered.pop_front() {
            match event {
                FeedEvent::Insert(message) => {
                    let id = message.id.clone();
                    if self.apply_insert(message) == InsertOutcome::Added {
                        added.extend(self.get(&id).cloned());
                    }
                }
                FeedEvent::Update(message) => {
                    self.apply_update(message);
                }
                FeedEvent::Status(_) => {}
            }
        }
        added
    }

    fn buffer(&mut self, event: FeedEvent) {
        if self.buffered.len() >= MAX_BUFFERED_EVENTS {
            warn!("Feed buffer full, dropping oldest event");
            self.buffered.pop_front();
        }
        self.buffered.push_back(event);
    }

    /// Apply a feed event. Returns the message when it was newly added.
    pub fn apply(&mut self, event: FeedEvent) -> Option<Message> {
        match event {
            FeedEvent::Insert(message) => {
                let id = message.id.clone();
                match self.apply_insert(message) {
                    InsertOutcome::Added => self.get(&id).cloned(),
                    _ => None,
                }
            }
            FeedEvent::Update(message) => {
                self.apply_update(message);
                None
            }
            FeedEvent::Status(_) => None,
        }
    }

    /// Apply an inserted row.
    ///
    /// New ids are prepended without re-sorting; an id already present is
    /// replaced where it stands. A parked out-of-order update for the same id
    /// takes precedence over the inserted snapshot.
    pub fn apply_insert(&mut self, message: Message) -> InsertOutcome {
        if self.state != LoadState::Ready {
            self.buffer(FeedEvent::Insert(message));
            return InsertOutcome::Buffered;
        }

        let message = match self.take_pending(&message.id) {
            Some(newer) => {
                debug!("Applying parked update for {}", newer.id);
                newer
            }
            None => message,
        };

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            debug!("Insert for existing message {}, replacing", message.id);
            *existing = message;
            return InsertOutcome::Replaced;
        }

        self.messages.insert(0, message);
        InsertOutcome::Added
    }

    /// Apply an updated row. Unknown ids leave the list unchanged.
    pub fn apply_update(&mut self, message: Message) -> UpdateOutcome {
        if self.state != LoadState::Ready {
            self.buffer(FeedEvent::Update(message));
            return UpdateOutcome::Buffered;
        }

        if let Some(existing) = self.messages.iter_mut().find(|m| m.id == message.id) {
            *existing = message;
            return UpdateOutcome::Replaced;
        }

        debug!("Update for unknown message {}, parking", message.id);
        self.park(message);
        UpdateOutcome::Unknown
    }

    fn park(&mut self, message: Message) {
        let id = message.id.clone();
        if self.pending_updates.insert(id.clone(), message).is_none() {
            self.pending_order.push_back(id);
        }
        while self.pending_order.len() > MAX_PENDING_UPDATES {
            if let Some(oldest) = self.pending_order.pop_front() {
                self.pending_updates.remove(&oldest);
            }
        }
    }

    fn take_pending(&mut self, id: &MessageId) -> Option<Message> {
        let message = self.pending_updates.remove(id)?;
        self.pending_order.retain(|p| p != id);
        Some(message)
    }

    /// Build the mutation that flips the read flag of a message.
    ///
    /// The local list is not touched; the confirmed row arrives through the
    /// feed as an UPDATE.
    pub fn toggle_read(&self, id: &MessageId) -> Option<ReadToggle> {
        self.get(id).map(|m| ReadToggle {
            id: m.id.clone(),
            is_read: !m.is_read,
        })
    }
}
