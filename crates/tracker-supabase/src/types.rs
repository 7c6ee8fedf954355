use crate::error::{SupabaseError, SupabaseResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracker_core::{FeedEvent, Message};

pub const EVENT_JOIN: &str = "phx_join";
pub const EVENT_LEAVE: &str = "phx_leave";
pub const EVENT_REPLY: &str = "phx_reply";
pub const EVENT_ERROR: &str = "phx_error";
pub const EVENT_CLOSE: &str = "phx_close";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_SYSTEM: &str = "system";

/// Topic used for heartbeats
pub const PHOENIX_TOPIC: &str = "phoenix";

/// A Phoenix channel frame (JSON serializer v1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

impl PhoenixMessage {
    pub fn new(topic: impl Into<String>, event: &str, payload: Value, reference: u64) -> Self {
        Self {
            topic: topic.into(),
            event: event.to_string(),
            payload,
            reference: Some(reference.to_string()),
        }
    }

    pub fn heartbeat(reference: u64) -> Self {
        Self::new(PHOENIX_TOPIC, EVENT_HEARTBEAT, json!({}), reference)
    }

    /// Join request subscribing to INSERT and UPDATE on one table
    pub fn join(topic: &str, schema: &str, table: &str, access_token: &str, reference: u64) -> Self {
        let payload = json!({
            "config": {
                "broadcast": { "ack": false, "self": false },
                "presence": { "key": "" },
                "postgres_changes": [
                    { "event": "INSERT", "schema": schema, "table": table },
                    { "event": "UPDATE", "schema": schema, "table": table },
                ],
            },
            "access_token": access_token,
        });
        Self::new(topic, EVENT_JOIN, payload, reference)
    }

    pub fn leave(topic: &str, reference: u64) -> Self {
        Self::new(topic, EVENT_LEAVE, json!({}), reference)
    }
}

/// Channel topic for a table, e.g. `realtime:public:messages`
pub fn channel_topic(schema: &str, table: &str) -> String {
    format!("realtime:{}:{}", schema, table)
}

/// `data` object of a `postgres_changes` frame
#[derive(Debug, Clone, Deserialize)]
pub struct PostgresChange {
    #[serde(rename = "type")]
    pub change_type: String,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub record: Option<Value>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostgresChangesPayload {
    data: PostgresChange,
}

/// Status carried in a `phx_reply` payload
#[derive(Debug, Clone, Deserialize)]
struct ReplyPayload {
    status: String,
    #[serde(default)]
    response: Value,
}

/// What an incoming frame means to the feed worker
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// A row change to deliver
    Change(FeedEvent),
    /// Our join request was accepted
    Joined,
    /// Reply to some other request (heartbeat, leave)
    Ack,
    /// The server refused the join or reported a channel error
    Rejected(String),
    /// The server closed the channel
    Closed,
    /// Anything we do not act on
    Ignored,
}

/// Interpret a frame received on the websocket
pub fn classify(frame: &PhoenixMessage, topic: &str, join_ref: Option<&str>) -> SupabaseResult<Incoming> {
    if frame.topic != topic && frame.topic != PHOENIX_TOPIC {
        return Ok(Incoming::Ignored);
    }

    match frame.event.as_str() {
        EVENT_REPLY => {
            let reply: ReplyPayload = serde_json::from_value(frame.payload.clone())
                .map_err(|e| SupabaseError::ParseError(e.to_string()))?;
            let is_join = join_ref.is_some() && frame.reference.as_deref() == join_ref;
            match (is_join, reply.status.as_str()) {
                (true, "ok") => Ok(Incoming::Joined),
                (true, _) => Ok(Incoming::Rejected(reply.response.to_string())),
                (false, _) => Ok(Incoming::Ack),
            }
        }
        EVENT_POSTGRES_CHANGES => {
            let payload: PostgresChangesPayload = serde_json::from_value(frame.payload.clone())
                .map_err(|e| SupabaseError::ParseError(e.to_string()))?;
            change_to_event(payload.data)
        }
        EVENT_SYSTEM => {
            let status = frame.payload.get("status").and_then(Value::as_str);
            if status == Some("error") {
                let message = frame
                    .payload
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                Ok(Incoming::Rejected(message.to_string()))
            } else {
                Ok(Incoming::Ignored)
            }
        }
        EVENT_ERROR => Ok(Incoming::Rejected(frame.payload.to_string())),
        EVENT_CLOSE => Ok(Incoming::Closed),
        _ => Ok(Incoming::Ignored),
    }
}

fn change_to_event(change: PostgresChange) -> SupabaseResult<Incoming> {
    let record = match change.record {
        Some(record) => record,
        None => return Ok(Incoming::Ignored),
    };

    let build = |record: Value| -> SupabaseResult<Message> {
        serde_json::from_value(record).map_err(|e| SupabaseError::ParseError(e.to_string()))
    };

    match change.change_type.as_str() {
        "INSERT" => Ok(Incoming::Change(FeedEvent::Insert(build(record)?))),
        "UPDATE" => Ok(Incoming::Change(FeedEvent::Update(build(record)?))),
        _ => Ok(Incoming::Ignored),
    }
}
