pub mod client;
pub mod error;
pub mod realtime;
pub mod types;

pub use client::RestClient;
pub use error::{SupabaseError, SupabaseResult};
pub use realtime::{Backoff, RealtimeFeed};
pub use types::*;
