//! Tracker configuration

use crate::notification::DEFAULT_MAX_NOTIFICATIONS;
use crate::sync::DEFAULT_FETCH_LIMIT;
use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable holding the project URL
pub const ENV_URL: &str = "SUPABASE_URL";
/// Environment variable holding the anon/service key
pub const ENV_API_KEY: &str = "SUPABASE_ANON_KEY";

/// Connection and behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Project base URL, e.g. `https://abcd.supabase.co`
    pub supabase_url: String,
    /// API key sent with every request
    pub api_key: String,
    /// Database schema of the messages table
    pub schema: String,
    /// Name of the messages table
    pub table: String,
    /// Number of most-recent messages loaded at startup
    pub fetch_limit: usize,
    /// Cap on visible notifications
    pub max_notifications: usize,
    /// Auto-dismiss notifications after this many seconds
    pub notification_ttl_secs: Option<u64>,
    /// First delay before reconnecting a dropped feed
    pub reconnect_initial_delay_secs: u64,
    /// Upper bound for the reconnect delay
    pub reconnect_max_delay_secs: u64,
    /// Feed keepalive interval
    pub heartbeat_interval_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            api_key: String::new(),
            schema: "public".to_string(),
            table: "messages".to_string(),
            fetch_limit: DEFAULT_FETCH_LIMIT,
            max_notifications: DEFAULT_MAX_NOTIFICATIONS,
            notification_ttl_secs: None,
            reconnect_initial_delay_secs: 1,
            reconnect_max_delay_secs: 60,
            heartbeat_interval_secs: 30,
        }
    }
}

impl TrackerConfig {
    pub fn new(supabase_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Read a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        info!("Loading config from {}", path.display());
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a config from `SUPABASE_URL` and `SUPABASE_ANON_KEY`
    pub fn from_env() -> CoreResult<Self> {
        let url = std::env::var(ENV_URL)
            .map_err(|_| CoreError::Config(format!("{} is not set", ENV_URL)))?;
        let key = std::env::var(ENV_API_KEY)
            .map_err(|_| CoreError::Config(format!("{} is not set", ENV_API_KEY)))?;
        let config = Self::new(url, key);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.supabase_url.trim().is_empty() {
            return Err(CoreError::Config("supabase_url is empty".to_string()));
        }
        if self.api_key.trim().is_empty() {
            return Err(CoreError::Config("api_key is empty".to_string()));
        }
        if self.table.is_empty() || self.schema.is_empty() {
            return Err(CoreError::Config("schema and table must be set".to_string()));
        }
        if self.fetch_limit == 0 {
            return Err(CoreError::Config("fetch_limit must be positive".to_string()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(CoreError::Config(
                "heartbeat_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn notification_ttl(&self) -> Option<Duration> {
        self.notification_ttl_secs.map(Duration::from_secs)
    }

    pub fn reconnect_initial_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_initial_delay_secs.max(1))
    }

    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_max_delay_secs).max(self.reconnect_initial_delay())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}
