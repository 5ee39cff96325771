//! Ack coordinator: correlates outbound commands with their server replies.
//!
//! DESIGN
//! ======
//! A command frame registers a pending entry under its message id (the auth
//! handshake uses the fixed key `"auth"`) before it is sent. The entry is a
//! `oneshot` sender; the caller keeps the receiver as its deferred result. An
//! inbound `ack` removes the matching entry and completes it with success or
//! rejection. Acks with no matching entry are dropped: the request was
//! already settled, or the server answered an id this client never sent.
//!
//! Teardown rejects every outstanding entry so nothing awaits forever.

use std::collections::HashMap;

use frames::{Body, Frame};
use tokio::sync::oneshot;
use tracing::debug;

/// Pending-ack key (and frame id) of the authentication handshake.
pub const AUTH_ACK_KEY: &str = "auth";

/// A decoded `ack` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReply {
    /// Id of the frame being acknowledged.
    pub key: String,
    pub success: bool,
    pub message: Option<String>,
}

impl AckReply {
    /// Extract the reply from an `ack` frame.
    ///
    /// The key is `originalMessageId` when present, else the envelope `id`.
    /// Returns `None` for other frame types or an ack with neither.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let Body::Ack {
            original_message_id,
            success,
            message,
        } = &frame.body
        else {
            return None;
        };
        let key = original_message_id.clone().or_else(|| frame.id.clone())?;
        Some(Self {
            key,
            success: *success,
            message: message.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AckError {
    #[error("request {key} was rejected: {message}")]
    Rejected { key: String, message: String },
    #[error("an acknowledgement for {0} is already pending")]
    Duplicate(String),
    #[error("request {key} was cancelled: {reason}")]
    Cancelled { key: String, reason: String },
}

pub type AckResult = Result<AckReply, AckError>;

// =============================================================================
// COORDINATOR
// =============================================================================

#[derive(Debug, Default)]
pub struct AckCoordinator {
    pending: HashMap<String, oneshot::Sender<AckResult>>,
}

impl AckCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending entry and return the receiving half.
    ///
    /// An entry whose receiver has been dropped is replaced silently.
    ///
    /// # Errors
    ///
    /// Returns [`AckError::Duplicate`] when a live entry already exists.
    pub fn register(&mut self, key: impl Into<String>) -> Result<oneshot::Receiver<AckResult>, AckError> {
        let key = key.into();
        if let Some(existing) = self.pending.get(&key) {
            if !existing.is_closed() {
                return Err(AckError::Duplicate(key));
            }
        }
        let (tx, rx) = oneshot::channel();
        self.pending.insert(key, tx);
        Ok(rx)
    }

    /// Complete the entry matching `reply.key`. Returns false if none matched.
    pub fn resolve(&mut self, reply: AckReply) -> bool {
        let Some(tx) = self.pending.remove(&reply.key) else {
            debug!(key = %reply.key, "ack: no pending entry, ignoring");
            return false;
        };
        let result = if reply.success {
            Ok(reply)
        } else {
            Err(AckError::Rejected {
                message: reply
                    .message
                    .clone()
                    .unwrap_or_else(|| "rejected by server".to_owned()),
                key: reply.key,
            })
        };
        let _ = tx.send(result);
        true
    }

    /// Reject a single entry, e.g. when its request timed out.
    pub fn cancel(&mut self, key: &str, reason: &str) -> bool {
        let Some(tx) = self.pending.remove(key) else {
            return false;
        };
        let _ = tx.send(Err(AckError::Cancelled {
            key: key.to_owned(),
            reason: reason.to_owned(),
        }));
        true
    }

    /// Reject every outstanding entry. Returns how many were rejected.
    pub fn reject_all(&mut self, reason: &str) -> usize {
        let count = self.pending.len();
        for (key, tx) in self.pending.drain() {
            let _ = tx.send(Err(AckError::Cancelled {
                key,
                reason: reason.to_owned(),
            }));
        }
        count
    }

    #[must_use]
    pub fn is_pending(&self, key: &str) -> bool {
        self.pending.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
#[path = "ack_test.rs"]
mod tests;
