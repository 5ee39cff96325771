//! Inbound frame routing.
//!
//! DESIGN
//! ======
//! `dispatch_frame` is a single exhaustive match over the payload type. Each
//! arm applies its effect synchronously, in arrival order:
//! - `ack` is returned to the caller for the ack coordinator.
//! - `presence:*`, plus relayed `cursor:move` and `selection:change`, update
//!   the participant registry.
//! - `widget:*` is applied to the canvas store exactly once, then mirrored on
//!   the application event bus and as a local event.
//! - `auth`, `join` and `leave` only flow client to server and are ignored.
//!
//! Frames stamped with a canvas other than the joined one are dropped; they
//! are leftovers from a room this client already left.
//!
//! ERROR HANDLING
//! ==============
//! Nothing in here fails. Malformed frames, unknown types and frames with a
//! missing subject are logged and dropped.

use std::sync::Arc;

use frames::{Body, Frame, Point, decode_frame, now_ms};
use tracing::{debug, warn};

use crate::ack::AckReply;
use crate::events::{CollabEvent, WidgetChange, WidgetEvent};
use crate::registry::{JoinOutcome, ParticipantRegistry};
use crate::store::{CanvasStore, EventBus};

/// What the session still has to do after a frame was routed.
#[derive(Debug, Default)]
pub struct Routed {
    pub ack: Option<AckReply>,
    pub events: Vec<CollabEvent>,
}

impl Routed {
    fn event(event: CollabEvent) -> Self {
        Self {
            ack: None,
            events: vec![event],
        }
    }
}

pub struct Router {
    store: Arc<dyn CanvasStore>,
    bus: Option<Arc<dyn EventBus>>,
}

impl Router {
    pub fn new(store: Arc<dyn CanvasStore>, bus: Option<Arc<dyn EventBus>>) -> Self {
        Self { store, bus }
    }

    /// Decode and route one text frame.
    pub fn dispatch_text(&self, text: &str, registry: &mut ParticipantRegistry, canvas_id: Option<&str>) -> Routed {
        match decode_frame(text) {
            Ok(frame) => self.dispatch_frame(frame, registry, canvas_id),
            Err(e) if e.is_unknown_type() => {
                debug!(error = %e, "router: unknown message type, dropping");
                Routed::default()
            }
            Err(e) => {
                warn!(error = %e, len = text.len(), "router: malformed frame, dropping");
                Routed::default()
            }
        }
    }

    pub fn dispatch_frame(&self, frame: Frame, registry: &mut ParticipantRegistry, canvas_id: Option<&str>) -> Routed {
        if let (Some(frame_canvas), Some(current)) = (frame.canvas_id.as_deref(), canvas_id) {
            if frame_canvas != current {
                debug!(kind = %frame.kind(), %frame_canvas, %current, "router: frame for another canvas, dropping");
                return Routed::default();
            }
        }

        if matches!(frame.body, Body::Ack { .. }) {
            let ack = AckReply::from_frame(&frame);
            if ack.is_none() {
                debug!("router: ack without a correlation id, dropping");
            }
            return Routed {
                ack,
                events: Vec::new(),
            };
        }

        let Frame {
            body,
            timestamp,
            canvas_id: frame_canvas,
            user_id,
            ..
        } = frame;

        match body {
            // Taken by the early return above.
            Body::Ack { .. } => Routed::default(),

            Body::Error { code, message } => {
                let code = code.unwrap_or_else(|| "E_SERVER".to_owned());
                warn!(%code, %message, "router: server reported error");
                Routed::event(CollabEvent::Error { code, message })
            }

            Body::PresenceJoin { user } => {
                let user_id = user.id.clone();
                match registry.join(user, now_ms()) {
                    JoinOutcome::Inserted(participant) => {
                        debug!(%user_id, "router: participant joined");
                        Routed::event(CollabEvent::UserJoined { participant })
                    }
                    JoinOutcome::Refreshed => {
                        debug!(%user_id, "router: participant refreshed");
                        Routed::default()
                    }
                    JoinOutcome::IgnoredLocal => Routed::default(),
                }
            }

            Body::PresenceLeave => {
                let Some(user_id) = user_id else {
                    debug!("router: presence:leave without userId, dropping");
                    return Routed::default();
                };
                match registry.leave(&user_id) {
                    Some(_) => {
                        debug!(%user_id, "router: participant left");
                        Routed::event(CollabEvent::UserLeft { user_id })
                    }
                    None => Routed::default(),
                }
            }

            Body::PresenceUpdate { cursor, selected_ids } => presence(registry, user_id, cursor, selected_ids),
            Body::CursorMove { cursor } => presence(registry, user_id, Some(cursor), None),
            Body::SelectionChange { selected_ids } => presence(registry, user_id, None, Some(selected_ids)),

            Body::WidgetCreate { widget } => {
                self.store.apply_create(widget.clone());
                self.widget(frame_canvas, user_id, timestamp, WidgetChange::Created { widget })
            }
            Body::WidgetUpdate { widget_id, changes } => {
                self.store.apply_update(&widget_id, changes.clone());
                self.widget(
                    frame_canvas,
                    user_id,
                    timestamp,
                    WidgetChange::Updated { widget_id, changes },
                )
            }
            Body::WidgetDelete { widget_id } => {
                self.store.apply_delete(&widget_id);
                self.widget(frame_canvas, user_id, timestamp, WidgetChange::Deleted { widget_id })
            }
            Body::WidgetMove { widget_id, position } => {
                self.store.apply_move(&widget_id, position);
                self.widget(
                    frame_canvas,
                    user_id,
                    timestamp,
                    WidgetChange::Moved { widget_id, position },
                )
            }
            Body::WidgetResize { widget_id, dimensions } => {
                self.store.apply_resize(&widget_id, dimensions);
                self.widget(
                    frame_canvas,
                    user_id,
                    timestamp,
                    WidgetChange::Resized { widget_id, dimensions },
                )
            }
            Body::WidgetState {
                widget_id,
                state,
                partial,
            } => {
                self.store.apply_state(&widget_id, state.clone(), partial);
                self.widget(
                    frame_canvas,
                    user_id,
                    timestamp,
                    WidgetChange::StateChanged {
                        widget_id,
                        state,
                        partial,
                    },
                )
            }

            body @ (Body::Auth { .. } | Body::Join { .. } | Body::Leave) => {
                debug!(kind = %body.kind(), "router: client-to-server type echoed back, ignoring");
                Routed::default()
            }
        }
    }

    /// Mirror an applied widget mutation on the bus and as a local event.
    fn widget(
        &self,
        canvas_id: Option<String>,
        user_id: Option<String>,
        timestamp: Option<i64>,
        change: WidgetChange,
    ) -> Routed {
        let widget = WidgetEvent {
            canvas_id,
            user_id,
            timestamp,
            change,
        };
        if let Some(bus) = &self.bus {
            match serde_json::to_value(&widget) {
                Ok(payload) => bus.emit(widget.bus_name(), payload),
                Err(e) => warn!(error = %e, name = widget.bus_name(), "router: bus payload not serializable"),
            }
        }
        Routed::event(CollabEvent::Widget { widget })
    }
}

fn presence(
    registry: &mut ParticipantRegistry,
    user_id: Option<String>,
    cursor: Option<Point>,
    selected_ids: Option<Vec<String>>,
) -> Routed {
    let Some(user_id) = user_id else {
        debug!("router: presence frame without userId, dropping");
        return Routed::default();
    };
    let Some(change) = registry.update(&user_id, cursor, selected_ids, now_ms()) else {
        debug!(%user_id, "router: presence for unknown participant, ignoring");
        return Routed::default();
    };

    let mut events = Vec::new();
    if let Some(cursor) = change.cursor {
        events.push(CollabEvent::CursorMoved {
            user_id: user_id.clone(),
            cursor,
        });
    }
    if let Some(selected_ids) = change.selected_ids {
        events.push(CollabEvent::SelectionChanged { user_id, selected_ids });
    }
    Routed { ack: None, events }
}

#[cfg(test)]
#[path = "router_test.rs"]
mod tests;
