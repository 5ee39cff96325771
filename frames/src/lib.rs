//! Shared frame model and JSON codec for the realtime collaboration socket.
//!
//! This crate owns the wire representation spoken between a collaboration
//! client and its relay server. Every message is a flat JSON object: a small
//! envelope (`id`, `timestamp`, `canvasId`, `userId`) plus a `type` tag that
//! selects the payload shape.
//!
//! DESIGN
//! ======
//! - The payload is a closed sum type ([`Body`]); routing code matches on it
//!   exhaustively, so a new message kind is a compile error everywhere it
//!   matters rather than a silent fallthrough.
//! - [`decode_frame`] separates "well-formed JSON with a `type` we don't know"
//!   ([`CodecError::UnknownType`]) from genuinely malformed input, so callers
//!   can skip protocol additions without treating them as corruption.
//! - Widget payloads stay as `serde_json::Value`: the session engine relays
//!   them into the local document model and never interprets them.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`encode_frame`] and [`decode_frame`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON.
    #[error("invalid frame json: {0}")]
    Json(#[source] serde_json::Error),
    /// The JSON object has no string `type` field.
    #[error("frame is missing a `type` tag")]
    MissingType,
    /// The `type` tag is not part of this protocol version.
    #[error("unknown frame type: {0}")]
    UnknownType(String),
    /// The `type` is known but the payload does not match its schema.
    #[error("invalid payload for {kind}: {source}")]
    Payload {
        kind: MessageType,
        #[source]
        source: serde_json::Error,
    },
    /// Serialization failed.
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl CodecError {
    /// True when the frame was well-formed but carried an unrecognized type.
    #[must_use]
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownType(_))
    }
}

// =============================================================================
// MESSAGE TYPES
// =============================================================================

/// The fixed enumeration of `type` tags understood on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Auth,
    Join,
    Leave,
    PresenceJoin,
    PresenceLeave,
    PresenceUpdate,
    WidgetCreate,
    WidgetUpdate,
    WidgetDelete,
    WidgetMove,
    WidgetResize,
    WidgetState,
    CursorMove,
    SelectionChange,
    Ack,
    Error,
}

impl MessageType {
    /// Every message type, in protocol order.
    pub const ALL: [MessageType; 16] = [
        Self::Auth,
        Self::Join,
        Self::Leave,
        Self::PresenceJoin,
        Self::PresenceLeave,
        Self::PresenceUpdate,
        Self::WidgetCreate,
        Self::WidgetUpdate,
        Self::WidgetDelete,
        Self::WidgetMove,
        Self::WidgetResize,
        Self::WidgetState,
        Self::CursorMove,
        Self::SelectionChange,
        Self::Ack,
        Self::Error,
    ];

    /// Wire tag for this type, e.g. `"presence:join"`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Join => "join",
            Self::Leave => "leave",
            Self::PresenceJoin => "presence:join",
            Self::PresenceLeave => "presence:leave",
            Self::PresenceUpdate => "presence:update",
            Self::WidgetCreate => "widget:create",
            Self::WidgetUpdate => "widget:update",
            Self::WidgetDelete => "widget:delete",
            Self::WidgetMove => "widget:move",
            Self::WidgetResize => "widget:resize",
            Self::WidgetState => "widget:state",
            Self::CursorMove => "cursor:move",
            Self::SelectionChange => "selection:change",
            Self::Ack => "ack",
            Self::Error => "error",
        }
    }

    /// Widget mutations are relayed verbatim into the document model.
    #[must_use]
    pub fn is_widget(self) -> bool {
        self.as_str().starts_with("widget:")
    }
}

impl FromStr for MessageType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CodecError::UnknownType(s.to_owned()))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// PAYLOAD TYPES
// =============================================================================

/// A point in canvas (world) coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Width and height of a widget in canvas units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: f64,
    pub height: f64,
}

/// Identity of a participant as announced on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    #[serde(alias = "displayName")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Type-specific payload, tagged on the wire by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum Body {
    /// Handshake carrying the credential; answered by an `ack` for `"auth"`.
    #[serde(rename = "auth")]
    Auth {
        token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserInfo>,
    },
    #[serde(rename = "join")]
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<UserInfo>,
    },
    #[serde(rename = "leave")]
    Leave,
    #[serde(rename = "presence:join")]
    PresenceJoin { user: UserInfo },
    /// Subject is the envelope `userId`.
    #[serde(rename = "presence:leave")]
    PresenceLeave,
    /// Subject is the envelope `userId`. Absent fields mean "unchanged".
    #[serde(rename = "presence:update")]
    PresenceUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cursor: Option<Point>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        selected_ids: Option<Vec<String>>,
    },
    #[serde(rename = "widget:create")]
    WidgetCreate { widget: Value },
    #[serde(rename = "widget:update")]
    WidgetUpdate { widget_id: String, changes: Value },
    #[serde(rename = "widget:delete")]
    WidgetDelete { widget_id: String },
    #[serde(rename = "widget:move")]
    WidgetMove { widget_id: String, position: Point },
    #[serde(rename = "widget:resize")]
    WidgetResize {
        widget_id: String,
        dimensions: Dimensions,
    },
    #[serde(rename = "widget:state")]
    WidgetState {
        widget_id: String,
        state: Value,
        #[serde(default)]
        partial: bool,
    },
    #[serde(rename = "cursor:move")]
    CursorMove { cursor: Point },
    #[serde(rename = "selection:change")]
    SelectionChange { selected_ids: Vec<String> },
    /// Reply to a prior frame. Correlates by `originalMessageId`, falling
    /// back to the envelope `id`.
    #[serde(rename = "ack")]
    Ack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original_message_id: Option<String>,
        #[serde(default)]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        message: String,
    },
}

impl Body {
    /// The wire type of this payload.
    #[must_use]
    pub fn kind(&self) -> MessageType {
        match self {
            Self::Auth { .. } => MessageType::Auth,
            Self::Join { .. } => MessageType::Join,
            Self::Leave => MessageType::Leave,
            Self::PresenceJoin { .. } => MessageType::PresenceJoin,
            Self::PresenceLeave => MessageType::PresenceLeave,
            Self::PresenceUpdate { .. } => MessageType::PresenceUpdate,
            Self::WidgetCreate { .. } => MessageType::WidgetCreate,
            Self::WidgetUpdate { .. } => MessageType::WidgetUpdate,
            Self::WidgetDelete { .. } => MessageType::WidgetDelete,
            Self::WidgetMove { .. } => MessageType::WidgetMove,
            Self::WidgetResize { .. } => MessageType::WidgetResize,
            Self::WidgetState { .. } => MessageType::WidgetState,
            Self::CursorMove { .. } => MessageType::CursorMove,
            Self::SelectionChange { .. } => MessageType::SelectionChange,
            Self::Ack { .. } => MessageType::Ack,
            Self::Error { .. } => MessageType::Error,
        }
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// A single message on the collaboration socket. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(flatten)]
    pub body: Body,
    /// Present on frames that expect an `ack`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Milliseconds since the Unix epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    /// Canvas (room) context, present once a room is joined.
    #[serde(rename = "canvasId", default, skip_serializing_if = "Option::is_none")]
    pub canvas_id: Option<String>,
    /// Participant the frame is about or from.
    #[serde(rename = "userId", default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Frame {
    /// Build a frame stamped with the current time.
    #[must_use]
    pub fn new(body: Body) -> Self {
        Self {
            body,
            id: None,
            timestamp: Some(now_ms()),
            canvas_id: None,
            user_id: None,
        }
    }

    /// Build an `ack` replying to `original_id`.
    #[must_use]
    pub fn ack(original_id: impl Into<String>, success: bool) -> Self {
        let original_id = original_id.into();
        Self::new(Body::Ack {
            original_message_id: Some(original_id.clone()),
            success,
            message: None,
        })
        .with_id(original_id)
    }

    /// Build a server-style `error` frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Body::Error {
            code: Some(code.into()),
            message: message.into(),
        })
    }

    #[must_use]
    pub fn kind(&self) -> MessageType {
        self.body.kind()
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_canvas_id(mut self, canvas_id: impl Into<String>) -> Self {
        self.canvas_id = Some(canvas_id.into());
        self
    }

    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a frame as JSON text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if a widget payload cannot be serialized.
pub fn encode_frame(frame: &Frame) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(CodecError::Encode)
}

/// Decode JSON text into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] for text that is not JSON,
/// [`CodecError::MissingType`] when no `type` tag is present,
/// [`CodecError::UnknownType`] for tags outside [`MessageType::ALL`], and
/// [`CodecError::Payload`] when a known type carries a malformed payload.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let value: Value = serde_json::from_str(text).map_err(CodecError::Json)?;
    let Some(tag) = value.get("type").and_then(Value::as_str) else {
        return Err(CodecError::MissingType);
    };
    let kind: MessageType = tag.parse()?;
    serde_json::from_value(value).map_err(|source| CodecError::Payload { kind, source })
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
