//! Local lifecycle and domain events.
//!
//! DESIGN
//! ======
//! Events fan out on a `tokio::sync::broadcast` channel. Every subscriber owns
//! its receiver, so a slow or panicking consumer cannot stall the session task
//! or starve other subscribers. A lagging receiver skips what it missed and
//! keeps going.
//!
//! `on_event` wraps a receiver in its own task and returns a `Subscription`;
//! dropping the subscription (or calling `unsubscribe`) detaches it.

use frames::{Dimensions, Point};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::registry::RemoteParticipant;

/// Something the UI layer may want to react to.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum CollabEvent {
    /// Authenticated and ready to send.
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "disconnected")]
    Disconnected { code: Option<u16>, reason: String },
    #[serde(rename = "reconnecting")]
    Reconnecting { attempt: u32, delay_ms: u64 },
    /// Connect failure, exhausted reconnects, or a server `error` frame.
    #[serde(rename = "error")]
    Error { code: String, message: String },
    #[serde(rename = "canvas:joined")]
    CanvasJoined { canvas_id: String },
    #[serde(rename = "canvas:left")]
    CanvasLeft { canvas_id: String },
    #[serde(rename = "user:joined")]
    UserJoined { participant: RemoteParticipant },
    #[serde(rename = "user:left")]
    UserLeft { user_id: String },
    #[serde(rename = "cursor:moved")]
    CursorMoved { user_id: String, cursor: Point },
    #[serde(rename = "selection:changed")]
    SelectionChanged { user_id: String, selected_ids: Vec<String> },
    #[serde(rename = "widget")]
    Widget { widget: WidgetEvent },
    /// Local liveness tick while connected.
    #[serde(rename = "heartbeat")]
    Heartbeat { at_ms: i64 },
}

impl CollabEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Error { .. } => "error",
            Self::CanvasJoined { .. } => "canvas:joined",
            Self::CanvasLeft { .. } => "canvas:left",
            Self::UserJoined { .. } => "user:joined",
            Self::UserLeft { .. } => "user:left",
            Self::CursorMoved { .. } => "cursor:moved",
            Self::SelectionChanged { .. } => "selection:changed",
            Self::Widget { .. } => "widget",
            Self::Heartbeat { .. } => "heartbeat",
        }
    }
}

// =============================================================================
// WIDGET EVENTS
// =============================================================================

/// A remote widget mutation, normalized from its `widget:*` frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetEvent {
    pub canvas_id: Option<String>,
    pub user_id: Option<String>,
    pub timestamp: Option<i64>,
    #[serde(flatten)]
    pub change: WidgetChange,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WidgetChange {
    Created { widget: Value },
    Updated { widget_id: String, changes: Value },
    Deleted { widget_id: String },
    Moved { widget_id: String, position: Point },
    Resized { widget_id: String, dimensions: Dimensions },
    StateChanged { widget_id: String, state: Value, partial: bool },
}

impl WidgetEvent {
    /// Namespaced name used on the application event bus.
    #[must_use]
    pub fn bus_name(&self) -> &'static str {
        match self.change {
            WidgetChange::Created { .. } => "collaboration:widget:created",
            WidgetChange::Updated { .. } => "collaboration:widget:updated",
            WidgetChange::Deleted { .. } => "collaboration:widget:deleted",
            WidgetChange::Moved { .. } => "collaboration:widget:moved",
            WidgetChange::Resized { .. } => "collaboration:widget:resized",
            WidgetChange::StateChanged { .. } => "collaboration:widget:state",
        }
    }
}

// =============================================================================
// SUBSCRIPTIONS
// =============================================================================

/// Handle for a callback registered with `on_event`. Detaches on drop.
#[derive(Debug)]
pub struct Subscription {
    task: JoinHandle<()>,
}

impl Subscription {
    /// Stop delivering events to the handler.
    pub fn unsubscribe(self) {
        self.task.abort();
    }

    /// False once the handler task has stopped (unsubscribed, session gone,
    /// or the handler panicked).
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drive `handler` from `rx` on its own task.
pub(crate) fn spawn_listener<F>(mut rx: broadcast::Receiver<CollabEvent>, mut handler: F) -> Subscription
where
    F: FnMut(CollabEvent) + Send + 'static,
{
    let task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => handler(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "events: subscriber lagged, skipping ahead");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    Subscription { task }
}

#[cfg(test)]
#[path = "events_test.rs"]
mod tests;
