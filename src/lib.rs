//! Client-side real-time collaboration session for a shared canvas.
//!
//! A [`CollabClient`] keeps one authenticated WebSocket to the collaboration
//! server. It joins a canvas room, relays local widget edits, cursor and
//! selection to the other participants, and applies their edits to the host's
//! [`CanvasStore`]. Connection loss is recovered with exponential backoff;
//! messages sent while offline are queued and flushed in order once the
//! session is authenticated again.
//!
//! ## Module layout
//!
//! | Module | Role |
//! |--------|------|
//! | [`client`] | Public handle, collaborators and diagnostics |
//! | [`session`] | Session task: lifecycle state machine, timers, send path |
//! | [`router`] | Inbound frame routing to registry, store and bus |
//! | [`registry`] | Remote participants and their presence |
//! | [`transport`] | Connector seam and the tokio-tungstenite implementation |
//! | [`ack`] | Pending-ack bookkeeping for request/reply frames |
//! | [`queue`] | Bounded FIFO of frames held while offline |
//! | [`throttle`] | Trailing-edge cursor throttle |
//! | [`backoff`] | Reconnect delay policy |
//! | [`events`] | Local lifecycle events and subscriptions |
//! | [`store`] | Canvas store and event bus traits implemented by the host |
//! | [`config`] | Session configuration and `COLLAB_*` environment loading |
//! | [`error`] | Session error taxonomy and error codes |
//!
//! The wire format lives in the `frames` crate.

pub mod ack;
pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod queue;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;
pub mod throttle;
pub mod transport;

pub use client::{CollabClient, Collaborators, DebugInfo};
pub use config::{ConfigError, LocalUser, SessionConfig};
pub use error::{ErrorCode, SessionError};
pub use events::{CollabEvent, Subscription, WidgetChange, WidgetEvent};
pub use frames::{Dimensions, Point};
pub use registry::RemoteParticipant;
pub use session::{ConnectionState, Delivery};
pub use store::{CanvasStore, EventBus};
pub use transport::{Connector, Incoming, LinkPeer, Outgoing, SocketLink, TransportError, WsConnector};
