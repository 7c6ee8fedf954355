//! Message model synced from the remote `messages` table

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Content previews are cut to this many characters
pub const PREVIEW_CHARS: usize = 200;

/// Opaque, stable message identifier assigned by the remote store.
///
/// The store may hand out integer or text keys; both are kept as text so the
/// identifier can be echoed back verbatim in `id=eq.<id>` filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl Serialize for MessageId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MessageId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Int(i64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Int(n) => MessageId(n.to_string()),
            RawId::Text(s) => MessageId(s),
        })
    }
}

/// Where a message was synced from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Source {
    #[default]
    Arbor,
    Gmail,
    /// Any tag the dashboard does not know about
    Other(String),
}

impl Source {
    pub fn as_str(&self) -> &str {
        match self {
            Source::Arbor => "arbor",
            Source::Gmail => "gmail",
            Source::Other(s) => s,
        }
    }

    /// Upper-case badge text
    pub fn badge(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        match s {
            "" | "arbor" => Source::Arbor,
            "gmail" => Source::Gmail,
            other => Source::Other(other.to_string()),
        }
    }
}

impl Serialize for Source {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Source {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Source::from).unwrap_or_default())
    }
}

/// A message row as delivered by the store and the change feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub sender_email: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Source,
    #[serde(deserialize_with = "timestamp")]
    pub received_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_read: bool,
}

impl Message {
    /// Sender name, falling back to the address when the name is absent or empty
    pub fn sender_display(&self) -> &str {
        match self.sender_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.sender_email,
        }
    }

    /// First [`PREVIEW_CHARS`] characters of the content, with `...` when cut
    pub fn preview(&self) -> String {
        let Some(content) = self.content.as_deref() else {
            return String::new();
        };

        let mut chars = content.char_indices();
        match chars.nth(PREVIEW_CHARS) {
            Some((cut, _)) => format!("{}...", &content[..cut]),
            None => content.to_string(),
        }
    }

    /// Label for the per-message toggle action
    pub fn toggle_label(&self) -> &'static str {
        if self.is_read {
            "Mark as Unread"
        } else {
            "Mark as Read"
        }
    }
}

/// Parse a row timestamp. Values without an offset (plain `timestamp`
/// columns) are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).ok_or_else(|| de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn message(id: i64, minutes: i64) -> Message {
        Message {
            id: MessageId::from(id),
            subject: format!("Subject {}", id),
            sender_name: Some(format!("Sender {}", id)),
            sender_email: format!("sender{}@example.com", id),
            content: Some(format!("Body of message {}", id)),
            source: Source::Arbor,
            received_at: Utc.with_ymd_and_hms(2024, 9, 1, 8, 0, 0).unwrap()
                + chrono::Duration::minutes(minutes),
            is_read: false,
        }
    }
}
