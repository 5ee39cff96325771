//! Capabilities the session needs from the host application.
//!
//! The session never links against a concrete document store or event bus.
//! The host hands it these trait objects at `initialize`, and tests hand it
//! recording fakes.

use frames::{Dimensions, Point};
use serde_json::Value;

/// Mutation API of the local canvas document model.
///
/// Called from the session task for every inbound `widget:*` frame, in
/// arrival order. Implementations should return quickly; heavy work belongs
/// on the host's own executor.
pub trait CanvasStore: Send + Sync {
    fn apply_create(&self, widget: Value);
    fn apply_update(&self, widget_id: &str, changes: Value);
    fn apply_delete(&self, widget_id: &str);
    fn apply_move(&self, widget_id: &str, position: Point);
    fn apply_resize(&self, widget_id: &str, dimensions: Dimensions);
    fn apply_state(&self, widget_id: &str, state: Value, partial: bool);
}

/// Application-wide bus accepting namespaced events such as
/// `collaboration:widget:created`.
pub trait EventBus: Send + Sync {
    fn emit(&self, event: &str, payload: Value);
}
