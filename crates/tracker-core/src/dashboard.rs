//! Dashboard engine
//!
//! A single tokio task owns every piece of mutable dashboard state. User
//! intents, the change feed, the initial load and read-toggle mutations all
//! resolve into this one loop, so state is only ever written from one place.

use crate::filter::{SourceFilter, StatusFilter, ViewFilter};
use crate::message::{Message, MessageId};
use crate::notification::{Notification, NotificationId, NotificationKind, NotificationQueue};
use crate::store::{ChangeFeed, ConnectionStatus, FeedEvent, FeedSubscription, MessageStore};
use crate::sync::{LoadState, ReadToggle, Synchronizer};
use crate::{CoreError, CoreResult, TrackerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// How often expired notifications are swept
const EXPIRY_TICK: Duration = Duration::from_secs(1);

/// Text shown for a failed read toggle
pub const TOGGLE_ERROR_TEXT: &str = "Error updating message";

/// Commands sent from the presentation layer to the engine
#[derive(Debug, Clone)]
pub enum DashboardCommand {
    /// Flip the read flag of a message
    ToggleRead { id: MessageId },
    SetStatusFilter(StatusFilter),
    SetSourceFilter(SourceFilter),
    SetSearch(String),
    /// Dismiss a notification
    Dismiss(NotificationId),
    /// Re-run the initial load
    Reload,
    /// Stop the engine
    Shutdown,
}

/// Events sent from the engine to the presentation layer
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    LoadStarted,
    LoadCompleted { count: usize },
    LoadFailed { error: String },
    /// A message not seen before arrived on the feed
    NewMessage(Message),
    /// The store accepted a read toggle; the row follows on the feed
    ToggleAccepted { id: MessageId, is_read: bool },
    /// A read toggle was rejected by the store
    ToggleFailed { id: MessageId, error: String },
    ConnectionChanged(ConnectionStatus),
    /// Fresh snapshot of everything the view renders
    ViewUpdated(DashboardView),
}

/// Everything needed to render the dashboard
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub state: LoadState,
    /// Filtered messages in display order
    pub messages: Vec<Message>,
    /// Size of the canonical list
    pub total: usize,
    pub unread: usize,
    pub notifications: Vec<Notification>,
    pub filter: ViewFilter,
    pub connection: Option<ConnectionStatus>,
}

impl DashboardView {
    /// Placeholder text when there is nothing to list
    pub fn placeholder(&self) -> Option<String> {
        match &self.state {
            LoadState::Loading => Some("Loading messages...".to_string()),
            LoadState::Failed(error) => Some(format!("Error: {}", error)),
            LoadState::Ready if self.messages.is_empty() => Some("No messages found".to_string()),
            LoadState::Ready => None,
        }
    }
}

/// The state owned by the engine task
#[derive(Debug)]
pub struct Dashboard {
    sync: Synchronizer,
    notifications: NotificationQueue,
    filter: ViewFilter,
    connection: Option<ConnectionStatus>,
}

impl Dashboard {
    pub fn new(notifications: NotificationQueue) -> Self {
        Self {
            sync: Synchronizer::new(),
            notifications,
            filter: ViewFilter::default(),
            connection: None,
        }
    }

    pub fn sync(&self) -> &Synchronizer {
        &self.sync
    }

    pub fn notifications(&self) -> &NotificationQueue {
        &self.notifications
    }

    pub fn filter(&self) -> &ViewFilter {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: ViewFilter) {
        self.filter = filter;
    }

    pub fn begin_load(&mut self) {
        self.sync.begin_load();
    }

    /// Complete a load, announcing rows that arrived on the feed meanwhile
    pub fn finish_load(&mut self, result: Result<Vec<Message>, String>) -> Vec<Message> {
        let added = self.sync.finish_load(result);
        for message in &added {
            self.announce(message);
        }
        added
    }

    /// Apply a feed event, announcing messages that are new
    pub fn apply_feed_event(&mut self, event: FeedEvent) -> Option<Message> {
        if let FeedEvent::Status(status) = &event {
            info!("Realtime status: {}", status);
            self.connection = Some(*status);
            return None;
        }

        let added = self.sync.apply(event)?;
        self.announce(&added);
        Some(added)
    }

    fn announce(&mut self, message: &Message) {
        self.notifications
            .info(format!("New message from {}", message.sender_display()));
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            state: self.sync.state().clone(),
            messages: self.filter.apply(self.sync.messages()).into_iter().cloned().collect(),
            total: self.sync.messages().len(),
            unread: self.sync.unread_count(),
            notifications: self.notifications.iter().cloned().collect(),
            filter: self.filter.clone(),
            connection: self.connection,
        }
    }
}

type LoadResult = (u64, CoreResult<Vec<Message>>);
type ToggleResult = (ReadToggle, CoreResult<()>);

struct EngineState {
    store: Arc<dyn MessageStore>,
    dashboard: Dashboard,
    fetch_limit: usize,
    event_tx: mpsc::Sender<DashboardEvent>,
    load_tx: mpsc::Sender<LoadResult>,
    toggle_tx: mpsc::Sender<ToggleResult>,
    generation: u64,
    load_task: Option<JoinHandle<()>>,
}

/// Engine that runs in a background tokio task
pub struct DashboardEngine {
    store: Arc<dyn MessageStore>,
    feed: Arc<dyn ChangeFeed>,
    config: TrackerConfig,
    command_rx: mpsc::Receiver<DashboardCommand>,
    event_tx: mpsc::Sender<DashboardEvent>,
}

impl DashboardEngine {
    /// Create a new dashboard engine
    pub fn new(
        store: Arc<dyn MessageStore>,
        feed: Arc<dyn ChangeFeed>,
        config: TrackerConfig,
        command_rx: mpsc::Receiver<DashboardCommand>,
        event_tx: mpsc::Sender<DashboardEvent>,
    ) -> Self {
        Self {
            store,
            feed,
            config,
            command_rx,
            event_tx,
        }
    }

    /// Spawn the engine on the current runtime
    pub fn spawn(
        store: Arc<dyn MessageStore>,
        feed: Arc<dyn ChangeFeed>,
        config: TrackerConfig,
    ) -> (DashboardHandle, mpsc::Receiver<DashboardEvent>, JoinHandle<()>) {
        let (cmd_tx, cmd_rx, evt_tx, evt_rx) = create_dashboard_channels();
        let engine = Self::new(store, feed, config, cmd_rx, evt_tx);
        let task = tokio::spawn(engine.run());
        (DashboardHandle { command_tx: cmd_tx }, evt_rx, task)
    }

    /// Run the engine until shutdown or until every command sender is gone
    pub async fn run(self) {
        info!("Dashboard engine started");

        let DashboardEngine {
            store,
            feed,
            config,
            mut command_rx,
            event_tx,
        } = self;

        let (load_tx, mut load_rx) = mpsc::channel::<LoadResult>(4);
        let (toggle_tx, mut toggle_rx) = mpsc::channel::<ToggleResult>(32);

        let notifications =
            NotificationQueue::new(config.max_notifications, config.notification_ttl());
        let expire_enabled = notifications.ttl().is_some();

        let mut state = EngineState {
            store,
            dashboard: Dashboard::new(notifications),
            fetch_limit: config.fetch_limit,
            event_tx,
            load_tx,
            toggle_tx,
            generation: 0,
            load_task: None,
        };

        // Subscribe before loading so nothing committed during the load is missed
        let mut subscription = match feed.subscribe().await {
            Ok(subscription) => Some(subscription),
            Err(e) => {
                error!("Failed to subscribe to change feed: {}", e);
                state
                    .dashboard
                    .notifications
                    .error(format!("Realtime updates unavailable: {}", e));
                None
            }
        };

        state.start_load().await;

        let mut expiry = tokio::time::interval(EXPIRY_TICK);
        expiry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = command_rx.recv() => match command {
                    Some(command) => {
                        if !state.handle_command(command).await {
                            break;
                        }
                    }
                    None => {
                        info!("Command channel closed, dashboard engine shutting down");
                        break;
                    }
                },
                event = next_feed_event(&mut subscription) => match event {
                    Some(event) => state.handle_feed_event(event).await,
                    None => {
                        warn!("Change feed ended");
                        subscription = None;
                        state.handle_feed_event(FeedEvent::Status(ConnectionStatus::Closed)).await;
                    }
                },
                Some((generation, result)) = load_rx.recv() => {
                    state.handle_load_result(generation, result).await;
                }
                Some((toggle, result)) = toggle_rx.recv() => {
                    state.handle_toggle_result(toggle, result).await;
                }
                _ = expiry.tick(), if expire_enabled => {
                    state.expire_notifications().await;
                }
            }
        }

        if let Some(mut subscription) = subscription.take() {
            subscription.unsubscribe();
        }
        if let Some(task) = state.load_task.take() {
            task.abort();
        }

        info!("Dashboard engine stopped");
    }
}

async fn next_feed_event(subscription: &mut Option<FeedSubscription>) -> Option<FeedEvent> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

impl EngineState {
    async fn emit(&self, event: DashboardEvent) {
        let _ = self.event_tx.send(event).await;
    }

    async fn emit_view(&self) {
        self.emit(DashboardEvent::ViewUpdated(self.dashboard.view()))
            .await;
    }

    /// Start a load, superseding any load still in flight
    async fn start_load(&mut self) {
        if let Some(task) = self.load_task.take() {
            debug!("Aborting superseded load");
            task.abort();
        }

        self.generation += 1;
        let generation = self.generation;
        self.dashboard.begin_load();

        let store = self.store.clone();
        let limit = self.fetch_limit;
        let load_tx = self.load_tx.clone();
        self.load_task = Some(tokio::spawn(async move {
            let result = store.fetch_recent(limit).await;
            let _ = load_tx.send((generation, result)).await;
        }));

        self.emit(DashboardEvent::LoadStarted).await;
        self.emit_view().await;
    }

    async fn handle_load_result(&mut self, generation: u64, result: CoreResult<Vec<Message>>) {
        if generation != self.generation {
            debug!("Ignoring stale load result {}", generation);
            return;
        }
        self.load_task = None;

        match result {
            Ok(messages) => {
                let added = self.dashboard.finish_load(Ok(messages));
                let count = self.dashboard.sync.messages().len();
                self.emit(DashboardEvent::LoadCompleted { count }).await;
                for message in added {
                    self.emit(DashboardEvent::NewMessage(message)).await;
                }
            }
            Err(e) => {
                error!("Error loading messages: {}", e);
                let error = e.to_string();
                self.dashboard.finish_load(Err(error.clone()));
                self.emit(DashboardEvent::LoadFailed { error }).await;
            }
        }
        self.emit_view().await;
    }

    async fn handle_feed_event(&mut self, event: FeedEvent) {
        if let FeedEvent::Status(status) = &event {
            self.emit(DashboardEvent::ConnectionChanged(*status)).await;
        }
        if let Some(added) = self.dashboard.apply_feed_event(event) {
            self.emit(DashboardEvent::NewMessage(added)).await;
        }
        self.emit_view().await;
    }

    /// Returns `false` once the engine should stop
    async fn handle_command(&mut self, command: DashboardCommand) -> bool {
        match command {
            DashboardCommand::ToggleRead { id } => self.toggle_read(id).await,
            DashboardCommand::SetStatusFilter(status) => {
                self.dashboard.filter.status = status;
            }
            DashboardCommand::SetSourceFilter(source) => {
                self.dashboard.filter.source = source;
            }
            DashboardCommand::SetSearch(query) => {
                self.dashboard.filter.query = query;
            }
            DashboardCommand::Dismiss(id) => {
                if !self.dashboard.notifications.dismiss(id) {
                    debug!("Dismiss for unknown notification {}", id);
                }
            }
            DashboardCommand::Reload => {
                info!("Reloading messages");
                self.start_load().await;
                return true;
            }
            DashboardCommand::Shutdown => {
                info!("Dashboard engine shutting down");
                return false;
            }
        }
        self.emit_view().await;
        true
    }

    /// Ask the store to flip the read flag; local state waits for the feed
    async fn toggle_read(&mut self, id: MessageId) {
        let Some(toggle) = self.dashboard.sync.toggle_read(&id) else {
            let error = CoreError::MessageNotFound(id.to_string());
            warn!("Cannot toggle read status: {}", error);
            self.dashboard
                .notifications
                .push(TOGGLE_ERROR_TEXT, NotificationKind::Error);
            self.emit(DashboardEvent::ToggleFailed {
                id,
                error: error.to_string(),
            })
            .await;
            return;
        };

        debug!("Setting is_read={} for {}", toggle.is_read, toggle.id);
        let store = self.store.clone();
        let toggle_tx = self.toggle_tx.clone();
        tokio::spawn(async move {
            let result = store.set_read(&toggle.id, toggle.is_read).await;
            let _ = toggle_tx.send((toggle, result)).await;
        });
    }

    async fn handle_toggle_result(&mut self, toggle: ReadToggle, result: CoreResult<()>) {
        match result {
            Ok(()) => {
                debug!("Store accepted is_read={} for {}", toggle.is_read, toggle.id);
                self.emit(DashboardEvent::ToggleAccepted {
                    id: toggle.id,
                    is_read: toggle.is_read,
                })
                .await;
            }
            Err(e) => {
                error!("Error updating message {}: {}", toggle.id, e);
                self.dashboard
                    .notifications
                    .push(TOGGLE_ERROR_TEXT, NotificationKind::Error);
                self.emit(DashboardEvent::ToggleFailed {
                    id: toggle.id,
                    error: e.to_string(),
                })
                .await;
                self.emit_view().await;
            }
        }
    }

    async fn expire_notifications(&mut self) {
        let now = tokio::time::Instant::now();
        if !self.dashboard.notifications.expire(now).is_empty() {
            self.emit_view().await;
        }
    }
}

/// Command-side handle to a running engine
#[derive(Debug, Clone)]
pub struct DashboardHandle {
    command_tx: mpsc::Sender<DashboardCommand>,
}

impl DashboardHandle {
    pub fn new(command_tx: mpsc::Sender<DashboardCommand>) -> Self {
        Self { command_tx }
    }

    pub async fn send(&self, command: DashboardCommand) -> CoreResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| CoreError::EngineStopped)
    }

    pub async fn toggle_read(&self, id: MessageId) -> CoreResult<()> {
        self.send(DashboardCommand::ToggleRead { id }).await
    }

    pub async fn set_status_filter(&self, status: StatusFilter) -> CoreResult<()> {
        self.send(DashboardCommand::SetStatusFilter(status)).await
    }

    pub async fn set_source_filter(&self, source: SourceFilter) -> CoreResult<()> {
        self.send(DashboardCommand::SetSourceFilter(source)).await
    }

    pub async fn set_search(&self, query: impl Into<String>) -> CoreResult<()> {
        self.send(DashboardCommand::SetSearch(query.into())).await
    }

    pub async fn dismiss(&self, id: NotificationId) -> CoreResult<()> {
        self.send(DashboardCommand::Dismiss(id)).await
    }

    pub async fn reload(&self) -> CoreResult<()> {
        self.send(DashboardCommand::Reload).await
    }

    pub async fn shutdown(&self) -> CoreResult<()> {
        self.send(DashboardCommand::Shutdown).await
    }
}

/// Create dashboard engine channels
/// Returns (command_sender, command_receiver, event_sender, event_receiver)
pub fn create_dashboard_channels() -> (
    mpsc::Sender<DashboardCommand>,
    mpsc::Receiver<DashboardCommand>,
    mpsc::Sender<DashboardEvent>,
    mpsc::Receiver<DashboardEvent>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<DashboardCommand>(100);
    let (evt_tx, evt_rx) = mpsc::channel::<DashboardEvent>(100);
    (cmd_tx, cmd_rx, evt_tx, evt_rx)
}
