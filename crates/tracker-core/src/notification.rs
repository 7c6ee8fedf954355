//! Transient user-facing notices

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Default cap on visible notifications
pub const DEFAULT_MAX_NOTIFICATIONS: usize = 50;

/// Notification identifier, unique within a queue
pub type NotificationId = u64;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Error,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::Info => f.write_str("info"),
            NotificationKind::Error => f.write_str("error"),
        }
    }
}

/// A notice shown until dismissed or expired
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub message: String,
    pub kind: NotificationKind,
    #[serde(skip)]
    pub created_at: Instant,
}

/// Insertion-ordered queue of notifications.
///
/// Ids come from a counter so two pushes in the same instant never collide.
/// When the cap is reached the oldest entry is dropped.
#[derive(Debug)]
pub struct NotificationQueue {
    entries: VecDeque<Notification>,
    next_id: NotificationId,
    max_len: usize,
    ttl: Option<Duration>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOTIFICATIONS, None)
    }
}

impl NotificationQueue {
    /// Create a queue holding at most `max_len` entries (at least one).
    /// With a `ttl`, [`expire`](Self::expire) removes entries older than it.
    pub fn new(max_len: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: VecDeque::new(),
            next_id: 1,
            max_len: max_len.max(1),
            ttl,
        }
    }

    /// Append a notification and return its id
    pub fn push(&mut self, message: impl Into<String>, kind: NotificationKind) -> NotificationId {
        let id = self.next_id;
        self.next_id += 1;

        if self.entries.len() >= self.max_len {
            if let Some(dropped) = self.entries.pop_front() {
                debug!("Notification queue full, dropping {}", dropped.id);
            }
        }

        self.entries.push_back(Notification {
            id,
            message: message.into(),
            kind,
            created_at: Instant::now(),
        });
        id
    }

    pub fn info(&mut self, message: impl Into<String>) -> NotificationId {
        self.push(message, NotificationKind::Info)
    }

    pub fn error(&mut self, message: impl Into<String>) -> NotificationId {
        self.push(message, NotificationKind::Error)
    }

    /// Remove a notification. Unknown ids are ignored.
    pub fn dismiss(&mut self, id: NotificationId) -> bool {
        match self.entries.iter().position(|n| n.id == id) {
            Some(idx) => {
                self.entries.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Drop entries older than the ttl, returning the removed ids
    pub fn expire(&mut self, now: Instant) -> Vec<NotificationId> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };

        let mut expired = Vec::new();
        self.entries.retain(|n| {
            let keep = now.saturating_duration_since(n.created_at) < ttl;
            if !keep {
                expired.push(n.id);
            }
            keep
        });
        expired
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notification> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_then_dismiss() {
        let mut queue = NotificationQueue::default();
        let id = queue.info("New message from Ms. Rivera");
        assert_eq!(queue.len(), 1);
        assert!(queue.dismiss(id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_dismiss_unknown_is_noop() {
        let mut queue = NotificationQueue::default();
        queue.error("Error updating message");
        assert!(!queue.dismiss(999));
        assert!(!queue.dismiss(999));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ids_unique_and_ordered() {
        let mut queue = NotificationQueue::default();
        let a = queue.info("a");
        let b = queue.info("b");
        let c = queue.error("c");
        assert!(a < b && b < c);

        let messages: Vec<&str> = queue.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["a", "b", "c"]);
        assert_eq!(queue.iter().last().map(|n| n.kind), Some(NotificationKind::Error));
    }

    #[test]
    fn test_cap_drops_oldest_under_storm() {
        let mut queue = NotificationQueue::new(3, None);
        for i in 0..1000 {
            queue.info(format!("notice {}", i));
        }
        assert_eq!(queue.len(), 3);
        let messages: Vec<&str> = queue.iter().map(|n| n.message.as_str()).collect();
        assert_eq!(messages, vec!["notice 997", "notice 998", "notice 999"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_after_ttl() {
        let mut queue = NotificationQueue::new(10, Some(Duration::from_secs(5)));
        let first = queue.info("first");
        tokio::time::advance(Duration::from_secs(3)).await;
        let second = queue.info("second");

        assert!(queue.expire(Instant::now()).is_empty());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(queue.expire(Instant::now()), vec![first]);
        assert_eq!(queue.iter().map(|n| n.id).collect::<Vec<_>>(), vec![second]);
    }

    #[test]
    fn test_no_ttl_never_expires() {
        let mut queue = NotificationQueue::default();
        queue.info("stays");
        assert!(queue.expire(Instant::now() + Duration::from_secs(3600)).is_empty());
        assert_eq!(queue.len(), 1);
    }
}
