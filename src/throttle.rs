//! Cursor broadcast throttle.
//!
//! DESIGN
//! ======
//! Keeps cursor frames at or below one per `interval` without losing the
//! latest position:
//! - If `interval` has elapsed since the last send, the offer is sent now.
//! - Otherwise the offer overwrites the single pending slot, and a deadline
//!   is armed for when the interval elapses (unless one already is).
//! - When the deadline fires, the pending value is sent.
//!
//! The throttle owns no timer. The session task polls [`CursorThrottle::deadline`]
//! and calls [`CursorThrottle::fire`] when it passes, which keeps this type
//! synchronous and clock-injectable for tests.

use std::time::Duration;

use frames::Point;
use tokio::time::Instant;

/// Outcome of offering a cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Send the offered position now.
    SendNow,
    /// Held in the pending slot until the deadline.
    Deferred,
}

#[derive(Debug)]
pub struct CursorThrottle {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<Point>,
    deadline: Option<Instant>,
}

impl CursorThrottle {
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
            deadline: None,
        }
    }

    /// Offer a new position at `now`.
    ///
    /// On `SendNow` the caller must transmit `position`; the send time is
    /// already recorded and any older pending value is discarded.
    pub fn offer(&mut self, position: Point, now: Instant) -> ThrottleDecision {
        let ready = self
            .last_sent
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if ready {
            self.last_sent = Some(now);
            self.pending = None;
            self.deadline = None;
            return ThrottleDecision::SendNow;
        }

        self.pending = Some(position);
        if self.deadline.is_none() {
            if let Some(last) = self.last_sent {
                self.deadline = Some(last + self.interval);
            }
        }
        ThrottleDecision::Deferred
    }

    /// When the deferred send is due, if one is armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Take the pending value for sending at `now` and disarm the deadline.
    pub fn fire(&mut self, now: Instant) -> Option<Point> {
        self.deadline = None;
        let pending = self.pending.take()?;
        self.last_sent = Some(now);
        Some(pending)
    }

    #[must_use]
    pub fn pending(&self) -> Option<Point> {
        self.pending
    }

    /// Drop any pending value and disarm the deadline.
    pub fn cancel(&mut self) {
        self.pending = None;
        self.deadline = None;
    }

    /// Forget send history as well, e.g. after a room change.
    pub fn reset(&mut self) {
        self.cancel();
        self.last_sent = None;
    }
}

#[cfg(test)]
#[path = "throttle_test.rs"]
mod tests;
