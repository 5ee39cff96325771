//! Outbound queue: frames waiting for an authenticated socket.
//!
//! DESIGN
//! ======
//! Strict FIFO: never reordered, never deduplicated. Drained oldest-first
//! once per successful (re)connect, after the auth ack. High-frequency
//! presence (cursor moves) bypasses the queue through the throttle, so in
//! practice it holds a handful of control frames. A capacity bound keeps a
//! long outage from growing it without limit; frames past the bound are
//! refused, not evicted, so what is queued keeps its order.

use std::collections::VecDeque;

use frames::Frame;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

#[derive(Debug)]
pub struct OutboundQueue {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity.min(64)),
            capacity: capacity.max(1),
        }
    }

    /// Append a frame. Returns false (and drops it) when the queue is full.
    pub fn push(&mut self, frame: Frame) -> bool {
        if self.frames.len() >= self.capacity {
            return false;
        }
        self.frames.push_back(frame);
        true
    }

    /// Take the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    /// Put a frame back at the head after a failed send.
    pub fn restore(&mut self, frame: Frame) {
        self.frames.push_front(frame);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
#[path = "queue_test.rs"]
mod tests;
