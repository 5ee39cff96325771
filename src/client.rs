//! `CollabClient`: the cloneable handle applications hold.
//!
//! Every async method is a request to the session task and resolves once the
//! task has applied it. The synchronous getters read the last state the task
//! published, which always includes the effects of any request that already
//! resolved.

use std::sync::Arc;

use frames::{Body, Dimensions, Point};
use serde::Serialize;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::info;

use crate::config::{REDACTED, SessionConfig};
use crate::error::SessionError;
use crate::events::{CollabEvent, Subscription, spawn_listener};
use crate::registry::RemoteParticipant;
use crate::router::Router;
use crate::session::{Command, ConnectionState, Delivery, Session, Snapshot};
use crate::store::{CanvasStore, EventBus};
use crate::transport::{Connector, WsConnector};

/// Host capabilities injected at initialization.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn Connector>,
    pub store: Arc<dyn CanvasStore>,
    pub bus: Option<Arc<dyn EventBus>>,
}

impl Collaborators {
    pub fn new(connector: Arc<dyn Connector>, store: Arc<dyn CanvasStore>) -> Self {
        Self {
            connector,
            store,
            bus: None,
        }
    }

    /// Real WebSocket transport over `store`.
    pub fn websocket(store: Arc<dyn CanvasStore>) -> Self {
        Self::new(Arc::new(WsConnector), store)
    }

    #[must_use]
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }
}

/// Diagnostic view of the session with credentials redacted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub state: ConnectionState,
    pub server_url: String,
    pub auth_token: String,
    pub user_id: String,
    pub canvas_id: Option<String>,
    pub remote_users: usize,
    pub queued_messages: usize,
    pub pending_acks: usize,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub auto_reconnect: bool,
    pub heartbeat_interval_ms: u128,
    pub cursor_throttle_ms: u128,
    pub last_activity_ms: Option<i64>,
}

#[derive(Clone)]
pub struct CollabClient {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Snapshot>,
    events: broadcast::Sender<CollabEvent>,
    config: Arc<SessionConfig>,
}

impl CollabClient {
    /// Validate `config` and start the session task on the current runtime.
    ///
    /// The session starts disconnected; call [`Self::connect`] to dial.
    ///
    /// # Errors
    ///
    /// `SessionError::Config` for an invalid config, `SessionError::NoRuntime`
    /// when called outside a tokio runtime.
    pub fn initialize(config: SessionConfig, collaborators: Collaborators) -> Result<Self, SessionError> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let (commands, command_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (snapshot_tx, snapshot) = watch::channel(Snapshot::default());

        let Collaborators { connector, store, bus } = collaborators;
        let router = Router::new(store, bus);
        let session = Session::new(config.clone(), connector, router, command_rx, events.clone(), snapshot_tx);
        runtime.spawn(session.run());

        info!(url = %config.server_url, user_id = %config.user.id, "collab: session initialized");
        Ok(Self {
            commands,
            snapshot,
            events,
            config: Arc::new(config),
        })
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Dial, authenticate and flush anything queued while offline.
    ///
    /// Resolves once the server acknowledges the auth frame. Resolves
    /// immediately when already connected.
    ///
    /// # Errors
    ///
    /// `ConnectInProgress` while another attempt runs; `ConnectTimeout`,
    /// `Transport`, `AuthRejected` or `ClosedDuringHandshake` when this
    /// attempt fails; `Disconnected` if `disconnect()` interrupts it.
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Connect { reply }).await?
    }

    /// Close the socket and drop all session state. Never reconnects.
    ///
    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        self.request(|reply| Command::Disconnect { reply }).await?
    }

    /// Enter a canvas, leaving the current one first. Queued while offline.
    ///
    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn join_canvas(&self, canvas_id: impl Into<String>) -> Result<Delivery, SessionError> {
        let canvas_id = canvas_id.into();
        self.request(|reply| Command::JoinCanvas { canvas_id, reply })
            .await
    }

    /// Leave the joined canvas. `Skipped`, with the canvas kept for the next
    /// rejoin, unless connected.
    ///
    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn leave_canvas(&self) -> Result<Delivery, SessionError> {
        self.request(|reply| Command::LeaveCanvas { reply }).await
    }

    // =========================================================================
    // BROADCASTS
    // =========================================================================
    //
    // All of these are skipped unless connected with a canvas joined.

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_create(&self, widget: Value) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetCreate { widget }).await
    }

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_update(
        &self,
        widget_id: impl Into<String>,
        changes: Value,
    ) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetUpdate {
            widget_id: widget_id.into(),
            changes,
        })
        .await
    }

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_delete(&self, widget_id: impl Into<String>) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetDelete {
            widget_id: widget_id.into(),
        })
        .await
    }

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_move(
        &self,
        widget_id: impl Into<String>,
        position: Point,
    ) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetMove {
            widget_id: widget_id.into(),
            position,
        })
        .await
    }

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_resize(
        &self,
        widget_id: impl Into<String>,
        dimensions: Dimensions,
    ) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetResize {
            widget_id: widget_id.into(),
            dimensions,
        })
        .await
    }

    /// Broadcast widget state; `partial` asks receivers to merge rather than
    /// replace.
    ///
    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_widget_state(
        &self,
        widget_id: impl Into<String>,
        state: Value,
        partial: bool,
    ) -> Result<Delivery, SessionError> {
        self.broadcast(Body::WidgetState {
            widget_id: widget_id.into(),
            state,
            partial,
        })
        .await
    }

    /// Report the local cursor. Throttled: at most one frame per throttle
    /// interval, and the latest position always goes out.
    ///
    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_cursor(&self, x: f64, y: f64) -> Result<Delivery, SessionError> {
        let position = Point::new(x, y);
        self.request(|reply| Command::Cursor { position, reply }).await
    }

    /// # Errors
    ///
    /// Only `SessionClosed` if the session task is gone.
    pub async fn broadcast_selection(&self, selected_ids: Vec<String>) -> Result<Delivery, SessionError> {
        self.broadcast(Body::SelectionChange { selected_ids }).await
    }

    // =========================================================================
    // EVENTS
    // =========================================================================

    /// A fresh receiver for every event emitted from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<CollabEvent> {
        self.events.subscribe()
    }

    /// Call `handler` for every event until the returned subscription is
    /// dropped. Must be called within a tokio runtime.
    pub fn on_event<F>(&self, handler: F) -> Subscription
    where
        F: FnMut(CollabEvent) + Send + 'static,
    {
        spawn_listener(self.events.subscribe(), handler)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    #[must_use]
    pub fn current_canvas_id(&self) -> Option<String> {
        self.snapshot.borrow().canvas_id.clone()
    }

    /// Remote participants in the joined canvas, ordered by name.
    #[must_use]
    pub fn remote_users(&self) -> Vec<RemoteParticipant> {
        self.snapshot.borrow().participants.clone()
    }

    #[must_use]
    pub fn debug_info(&self) -> DebugInfo {
        let snap = self.snapshot.borrow();
        let config = &self.config;
        DebugInfo {
            state: snap.state,
            server_url: redact_url(&config.server_url),
            auth_token: if config.auth_token.is_empty() {
                String::new()
            } else {
                REDACTED.to_owned()
            },
            user_id: config.user.id.clone(),
            canvas_id: snap.canvas_id.clone(),
            remote_users: snap.participants.len(),
            queued_messages: snap.queued,
            pending_acks: snap.pending_acks,
            reconnect_attempts: snap.reconnect_attempts,
            max_reconnect_attempts: config.max_reconnect_attempts,
            auto_reconnect: config.auto_reconnect,
            heartbeat_interval_ms: config.heartbeat_interval.as_millis(),
            cursor_throttle_ms: config.cursor_throttle.as_millis(),
            last_activity_ms: snap.last_activity_ms,
        }
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn broadcast(&self, body: Body) -> Result<Delivery, SessionError> {
        self.request(|reply| Command::Broadcast { body, reply }).await
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| SessionError::SessionClosed)?;
        rx.await.map_err(|_| SessionError::SessionClosed)
    }
}

/// Drop any query string, which may carry credentials.
fn redact_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?{REDACTED}"),
        None => url.to_owned(),
    }
}

#[cfg(test)]
#[path = "client_test.rs"]
mod tests;
