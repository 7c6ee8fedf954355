//! Core logic for Oakes Tracker
//!
//! Provides the message synchronizer, view filtering, notifications, and the
//! dashboard engine that ties them to a remote store and its change feed.

mod config;
mod dashboard;
mod error;
mod filter;
mod message;
mod notification;
mod store;
mod sync;

pub use config::TrackerConfig;
pub use dashboard::{
    create_dashboard_channels, Dashboard, DashboardCommand, DashboardEngine, DashboardEvent,
    DashboardHandle, DashboardView, TOGGLE_ERROR_TEXT,
};
pub use error::{CoreError, CoreResult};
pub use filter::{filter_messages, matches_query, SourceFilter, StatusFilter, ViewFilter};
pub use message::{parse_timestamp, Message, MessageId, Source, PREVIEW_CHARS};
pub use notification::{Notification, NotificationId, NotificationKind, NotificationQueue};
pub use store::{
    ChangeFeed, ConnectionStatus, FeedEvent, FeedSender, FeedSubscription, MessageStore,
};
pub use sync::{InsertOutcome, LoadState, ReadToggle, Synchronizer, UpdateOutcome};

/// Re-export config constants for convenience
pub mod env {
    pub use crate::config::{ENV_API_KEY, ENV_URL};
}
