//! Realtime change feed over Phoenix channels
//!
//! One worker task per subscription keeps a websocket open, joins the table
//! channel, forwards INSERT/UPDATE rows and reconnects with jittered
//! exponential backoff when the connection drops.

use crate::error::{SupabaseError, SupabaseResult};
use crate::types::{channel_topic, classify, Incoming, PhoenixMessage, EVENT_REPLY, PHOENIX_TOPIC};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};
use tracker_core::{
    ChangeFeed, ConnectionStatus, CoreResult, FeedEvent, FeedSender, FeedSubscription,
    TrackerConfig,
};
use url::Url;

const SOCKET_PATH: &str = "realtime/v1/websocket";
const PROTOCOL_VERSION: &str = "1.0.0";
const FEED_CAPACITY: usize = 256;

/// Exponential reconnect delay with jitter.
///
/// Each delay is drawn from the upper half of the current window, and the
/// window doubles up to `max` after every failed attempt.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max: max.max(initial),
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let window = self.current;
        self.current = (self.current * 2).min(self.max);

        let half = window / 2;
        let jitter_ms = half.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        half + jitter
    }

    /// Back to the initial window after a successful join
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

#[derive(Debug, Clone)]
struct FeedSettings {
    socket_url: Url,
    topic: String,
    schema: String,
    table: String,
    api_key: String,
    heartbeat_interval: Duration,
    reconnect_initial: Duration,
    reconnect_max: Duration,
}

/// Change feed backed by the Supabase realtime service
pub struct RealtimeFeed {
    settings: Arc<FeedSettings>,
}

impl RealtimeFeed {
    pub fn new(config: &TrackerConfig) -> SupabaseResult<Self> {
        let settings = FeedSettings {
            socket_url: socket_url(&config.supabase_url, &config.api_key)?,
            topic: channel_topic(&config.schema, &config.table),
            schema: config.schema.clone(),
            table: config.table.clone(),
            api_key: config.api_key.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            reconnect_initial: config.reconnect_initial_delay(),
            reconnect_max: config.reconnect_max_delay(),
        };
        Ok(Self {
            settings: Arc::new(settings),
        })
    }

    pub fn topic(&self) -> &str {
        &self.settings.topic
    }
}

#[async_trait]
impl ChangeFeed for RealtimeFeed {
    async fn subscribe(&self) -> CoreResult<FeedSubscription> {
        info!("Subscribing to {}", self.settings.topic);
        let (sender, subscription) = FeedSubscription::channel(FEED_CAPACITY);
        tokio::spawn(feed_worker(self.settings.clone(), sender));
        Ok(subscription)
    }
}

/// Websocket endpoint for a project URL
pub fn socket_url(base_url: &str, api_key: &str) -> SupabaseResult<Url> {
    let mut url = Url::parse(base_url)?.join(SOCKET_PATH)?;
    let scheme = if url.scheme() == "http" { "ws" } else { "wss" };
    url.set_scheme(scheme)
        .map_err(|_| SupabaseError::ParseError(format!("cannot use {} for realtime", base_url)))?;
    url.query_pairs_mut()
        .append_pair("apikey", api_key)
        .append_pair("vsn", PROTOCOL_VERSION);
    Ok(url)
}

/// Worker loop that maintains the realtime connection for one subscription
async fn feed_worker(settings: Arc<FeedSettings>, sender: FeedSender) {
    let mut backoff = Backoff::new(settings.reconnect_initial, settings.reconnect_max);

    loop {
        if !sender
            .send(FeedEvent::Status(ConnectionStatus::Connecting))
            .await
        {
            break;
        }

        let result = tokio::select! {
            _ = sender.cancelled() => {
                info!("Realtime feed cancelled for {}", settings.topic);
                break;
            }
            result = run_session(&settings, &sender, &mut backoff) => result,
        };

        match result {
            // Subscriber went away mid-session
            Ok(()) => break,
            Err(e) => error!("Realtime connection for {} lost: {}", settings.topic, e),
        }

        if !sender
            .send(FeedEvent::Status(ConnectionStatus::Dropped))
            .await
        {
            break;
        }

        let delay = backoff.next_delay();
        info!("Reconnecting realtime feed in {:?}", delay);
        tokio::select! {
            _ = sender.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    debug!("Realtime feed worker stopped for {}", settings.topic);
}

fn encode(frame: &PhoenixMessage) -> SupabaseResult<WsMessage> {
    let text = serde_json::to_string(frame).map_err(|e| SupabaseError::ParseError(e.to_string()))?;
    Ok(WsMessage::Text(text))
}

/// One connection: join, then forward changes until something breaks.
/// Returns `Ok(())` only when the subscriber has gone away.
async fn run_session(
    settings: &FeedSettings,
    sender: &FeedSender,
    backoff: &mut Backoff,
) -> SupabaseResult<()> {
    debug!("Connecting to realtime at {}", settings.socket_url.host_str().unwrap_or_default());
    let (socket, _) = connect_async(settings.socket_url.as_str()).await?;
    let (mut sink, mut stream) = socket.split();

    let mut next_ref: u64 = 1;
    let join_ref = next_ref.to_string();
    let join = PhoenixMessage::join(
        &settings.topic,
        &settings.schema,
        &settings.table,
        &settings.api_key,
        next_ref,
    );
    next_ref += 1;
    sink.send(encode(&join)?).await?;

    let mut heartbeat = tokio::time::interval(settings.heartbeat_interval);
    heartbeat.tick().await;
    let mut pending_heartbeat: Option<String> = None;

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                if let Some(reference) = &pending_heartbeat {
                    warn!("Heartbeat {} was never acknowledged", reference);
                    return Err(SupabaseError::ConnectionClosed);
                }
                pending_heartbeat = Some(next_ref.to_string());
                sink.send(encode(&PhoenixMessage::heartbeat(next_ref))?).await?;
                next_ref += 1;
            }
            frame = stream.next() => {
                let frame = match frame {
                    Some(frame) => frame?,
                    None => return Err(SupabaseError::ConnectionClosed),
                };

                let text = match frame {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => return Err(SupabaseError::ConnectionClosed),
                    _ => continue,
                };

                let message: PhoenixMessage = match serde_json::from_str(&text) {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Ignoring undecodable realtime frame: {}", e);
                        continue;
                    }
                };

                if message.topic == PHOENIX_TOPIC
                    && message.event == EVENT_REPLY
                    && message.reference == pending_heartbeat
                {
                    pending_heartbeat = None;
                }

                match classify(&message, &settings.topic, Some(&join_ref)) {
                    Ok(Incoming::Joined) => {
                        info!("Joined realtime channel {}", settings.topic);
                        backoff.reset();
                        if !sender.send(FeedEvent::Status(ConnectionStatus::Connected)).await {
                            let _ = sink.send(encode(&PhoenixMessage::leave(&settings.topic, next_ref))?).await;
                            return Ok(());
                        }
                    }
                    Ok(Incoming::Change(event)) => {
                        if !sender.send(event).await {
                            let _ = sink.send(encode(&PhoenixMessage::leave(&settings.topic, next_ref))?).await;
                            return Ok(());
                        }
                    }
                    Ok(Incoming::Rejected(reason)) => return Err(SupabaseError::JoinRejected(reason)),
                    Ok(Incoming::Closed) => return Err(SupabaseError::ConnectionClosed),
                    Ok(Incoming::Ack) | Ok(Incoming::Ignored) => {}
                    Err(e) => warn!("Dropping malformed change: {}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EVENT_JOIN;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tracker_core::MessageId;

    #[test]
    fn test_socket_url() {
        let url = socket_url("https://abcd.supabase.co", "anon").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://abcd.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );

        let url = socket_url("http://127.0.0.1:54321", "anon").unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(54321));
    }

    #[test]
    fn test_backoff_grows_and_resets() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(8));
        let windows = [1, 2, 4, 8, 8, 8];
        for window in windows {
            let delay = backoff.next_delay();
            let window = Duration::from_secs(window);
            assert!(delay >= window / 2 && delay <= window, "{:?} vs {:?}", delay, window);
        }

        backoff.reset();
        assert!(backoff.next_delay() <= Duration::from_secs(1));
    }

    #[test]
    fn test_backoff_max_below_initial() {
        let mut backoff = Backoff::new(Duration::from_secs(4), Duration::from_secs(1));
        for _ in 0..3 {
            assert!(backoff.next_delay() <= Duration::from_secs(4));
        }
    }

    fn config_for(base_url: String) -> TrackerConfig {
        let mut config = TrackerConfig::new(base_url, "anon");
        config.reconnect_initial_delay_secs = 1;
        config.reconnect_max_delay_secs = 2;
        config
    }

    #[tokio::test]
    async fn test_join_and_receive_insert() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let join: PhoenixMessage = loop {
                if let WsMessage::Text(text) = ws.next().await.unwrap().unwrap() {
                    break serde_json::from_str(&text).unwrap();
                }
            };
            assert_eq!(join.event, EVENT_JOIN);
            assert_eq!(join.topic, "realtime:public:messages");

            let reply = json!({
                "topic": join.topic,
                "event": "phx_reply",
                "ref": join.reference,
                "payload": { "status": "ok", "response": { "postgres_changes": [] } }
            });
            ws.send(WsMessage::Text(reply.to_string())).await.unwrap();

            let change = json!({
                "topic": join.topic,
                "event": "postgres_changes",
                "ref": null,
                "payload": { "data": {
                    "type": "INSERT",
                    "schema": "public",
                    "table": "messages",
                    "record": {
                        "id": 11,
                        "subject": "Picture day",
                        "sender_name": "Front Office",
                        "sender_email": "office@school.org",
                        "content": null,
                        "source": "arbor",
                        "received_at": "2024-09-05T08:00:00Z",
                        "is_read": false
                    }
                }}
            });
            ws.send(WsMessage::Text(change.to_string())).await.unwrap();

            while let Some(Ok(_)) = ws.next().await {}
        });

        let feed = RealtimeFeed::new(&config_for(format!("http://{}", addr))).unwrap();
        let mut subscription = feed.subscribe().await.unwrap();

        let mut received = Vec::new();
        while received.len() < 3 {
            let event = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
                .await
                .expect("timed out")
                .expect("feed ended");
            received.push(event);
        }

        assert_eq!(received[0], FeedEvent::Status(ConnectionStatus::Connecting));
        assert_eq!(received[1], FeedEvent::Status(ConnectionStatus::Connected));
        match &received[2] {
            FeedEvent::Insert(message) => {
                assert_eq!(message.id, MessageId::from(11));
                assert_eq!(message.subject, "Picture day");
            }
            other => panic!("unexpected {:?}", other),
        }

        subscription.unsubscribe();
        assert_eq!(subscription.recv().await, None);
        tokio::time::timeout(Duration::from_secs(10), server)
            .await
            .expect("server did not see the disconnect")
            .unwrap();
    }

    #[tokio::test]
    async fn test_unreachable_server_reports_drop_and_stops_on_cancel() {
        // Bind then release a port so nothing is listening on it
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let feed = RealtimeFeed::new(&config_for(format!("http://{}", addr))).unwrap();
        let (sender, mut subscription) = FeedSubscription::channel(FEED_CAPACITY);
        let worker = tokio::spawn(feed_worker(feed.settings.clone(), sender));

        let first = subscription.recv().await;
        assert_eq!(first, Some(FeedEvent::Status(ConnectionStatus::Connecting)));
        let second = tokio::time::timeout(Duration::from_secs(10), subscription.recv())
            .await
            .expect("timed out");
        assert_eq!(second, Some(FeedEvent::Status(ConnectionStatus::Dropped)));

        subscription.unsubscribe();
        tokio::time::timeout(Duration::from_secs(5), worker)
            .await
            .expect("worker kept running after unsubscribe")
            .unwrap();
    }
}
