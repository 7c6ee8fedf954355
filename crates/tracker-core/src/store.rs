//! Boundaries to the remote message store and its change feed

use crate::message::{Message, MessageId};
use crate::CoreResult;
use async_trait::async_trait;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Query and mutation access to the `messages` table
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Fetch up to `limit` messages, newest first by `received_at`
    async fn fetch_recent(&self, limit: usize) -> CoreResult<Vec<Message>>;

    /// Set the read flag of one message
    async fn set_read(&self, id: &MessageId, is_read: bool) -> CoreResult<()>;
}

/// Connection state of a change-feed subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// The connection dropped; the feed will retry
    Dropped,
    /// The feed gave up or was shut down
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Dropped => "dropped",
            ConnectionStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Row-level change delivered by the feed, each carrying a full row snapshot
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Insert(Message),
    Update(Message),
    Status(ConnectionStatus),
}

/// Push-based change notifications for the `messages` table
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Start delivering INSERT and UPDATE events
    async fn subscribe(&self) -> CoreResult<FeedSubscription>;
}

/// Cancellable handle over a stream of [`FeedEvent`]s.
///
/// Once [`unsubscribe`](Self::unsubscribe) is called, or the handle is
/// dropped, the producer is told to stop and no further event is yielded.
pub struct FeedSubscription {
    events: mpsc::Receiver<FeedEvent>,
    active: bool,
}

impl FeedSubscription {
    /// Create a subscription and the producer half that feeds it.
    pub fn channel(capacity: usize) -> (FeedSender, Self) {
        let (event_tx, event_rx) = mpsc::channel(capacity);
        let sender = FeedSender { events: event_tx };
        let subscription = Self {
            events: event_rx,
            active: true,
        };
        (sender, subscription)
    }

    /// Wait for the next event. Returns `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        if !self.active {
            return None;
        }
        self.events.recv().await
    }

    /// Stop the feed. Buffered, undelivered events are discarded.
    pub fn unsubscribe(&mut self) {
        if self.active {
            debug!("Unsubscribing from change feed");
            self.active = false;
        }
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }

    pub fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl Stream for FeedSubscription {
    type Item = FeedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if !this.active {
            return Poll::Ready(None);
        }
        this.events.poll_recv(cx)
    }
}

/// Producer half of a [`FeedSubscription`], held by the feed worker
#[derive(Debug, Clone)]
pub struct FeedSender {
    events: mpsc::Sender<FeedEvent>,
}

impl FeedSender {
    /// Deliver an event. Returns `false` if the subscriber has gone away.
    pub async fn send(&self, event: FeedEvent) -> bool {
        self.events.send(event).await.is_ok()
    }

    /// Resolves when the subscriber unsubscribes or drops the handle
    pub async fn cancelled(&self) {
        self.events.closed().await
    }

    pub fn is_cancelled(&self) -> bool {
        self.events.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::fixtures::message;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_flow_until_unsubscribe() {
        let (sender, mut subscription) = FeedSubscription::channel(8);

        assert!(sender.send(FeedEvent::Insert(message(1, 0))).await);
        assert_eq!(
            subscription.recv().await,
            Some(FeedEvent::Insert(message(1, 0)))
        );

        assert!(sender.send(FeedEvent::Update(message(1, 0))).await);
        subscription.unsubscribe();

        assert!(!subscription.is_active());
        assert_eq!(subscription.recv().await, None);
        assert!(!sender.send(FeedEvent::Insert(message(2, 0))).await);
    }

    #[tokio::test]
    async fn test_drop_signals_producer() {
        let (sender, subscription) = FeedSubscription::channel(8);
        assert!(!sender.is_cancelled());
        drop(subscription);
        sender.cancelled().await;
        assert!(sender.is_cancelled());
    }

    #[tokio::test]
    async fn test_stream_ends_after_unsubscribe() {
        let (sender, mut subscription) = FeedSubscription::channel(8);
        sender
            .send(FeedEvent::Status(ConnectionStatus::Connected))
            .await;
        assert_eq!(
            subscription.next().await,
            Some(FeedEvent::Status(ConnectionStatus::Connected))
        );
        subscription.unsubscribe();
        assert_eq!(subscription.next().await, None);
    }
}
