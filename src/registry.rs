//! Remote participant registry: who else is in the joined canvas.
//!
//! DESIGN
//! ======
//! Entries exist only while a peer is present in the current room: created by
//! `presence:join`, updated by `presence:update`, removed by `presence:leave`
//! and bulk-cleared when this client leaves the room or loses its socket.
//! The local user is never tracked, even if the server echoes our own
//! presence back.
//!
//! Updates for unknown ids are dropped. A peer must join before it can move.

use std::collections::{BTreeSet, HashMap};

use frames::{Point, UserInfo};
use serde::Serialize;

/// Colors handed to participants that do not announce one.
const PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#4363d8", "#f58231", "#911eb4", "#42d4f4", "#f032e6", "#469990", "#9a6324",
    "#800000",
];

/// A peer in the joined canvas and its live presence.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteParticipant {
    pub id: String,
    pub name: String,
    /// Canonical `#rrggbb`.
    pub color: String,
    pub avatar: Option<String>,
    pub role: Option<String>,
    pub cursor: Option<Point>,
    pub selected_ids: BTreeSet<String>,
    /// Milliseconds since epoch of the last presence frame for this peer.
    pub last_seen_ms: i64,
}

/// Result of a `presence:join`.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinOutcome {
    /// The subject is the local user.
    IgnoredLocal,
    /// A new participant was inserted.
    Inserted(RemoteParticipant),
    /// Identity refreshed on an existing participant; live presence kept.
    Refreshed,
}

/// Which presence fields an update touched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresenceChange {
    pub cursor: Option<Point>,
    pub selected_ids: Option<Vec<String>>,
}

#[derive(Debug)]
pub struct ParticipantRegistry {
    local_user_id: String,
    participants: HashMap<String, RemoteParticipant>,
}

impl ParticipantRegistry {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
            participants: HashMap::new(),
        }
    }

    #[must_use]
    pub fn is_local(&self, user_id: &str) -> bool {
        self.local_user_id == user_id
    }

    pub fn join(&mut self, user: UserInfo, now_ms: i64) -> JoinOutcome {
        if self.is_local(&user.id) {
            return JoinOutcome::IgnoredLocal;
        }
        let color = user
            .color
            .as_deref()
            .map_or_else(|| palette_color(&user.id).to_owned(), |c| normalize_hex_color(c, palette_color(&user.id)));

        if let Some(existing) = self.participants.get_mut(&user.id) {
            existing.name = user.name;
            existing.color = color;
            existing.avatar = user.avatar;
            existing.role = user.role;
            existing.last_seen_ms = now_ms;
            return JoinOutcome::Refreshed;
        }

        let participant = RemoteParticipant {
            id: user.id.clone(),
            name: user.name,
            color,
            avatar: user.avatar,
            role: user.role,
            cursor: None,
            selected_ids: BTreeSet::new(),
            last_seen_ms: now_ms,
        };
        self.participants.insert(user.id, participant.clone());
        JoinOutcome::Inserted(participant)
    }

    pub fn leave(&mut self, user_id: &str) -> Option<RemoteParticipant> {
        self.participants.remove(user_id)
    }

    /// Apply a presence update. `None` fields are left unchanged.
    ///
    /// Returns `None` when the subject is local or unknown.
    pub fn update(
        &mut self,
        user_id: &str,
        cursor: Option<Point>,
        selected_ids: Option<Vec<String>>,
        now_ms: i64,
    ) -> Option<PresenceChange> {
        if self.is_local(user_id) {
            return None;
        }
        let participant = self.participants.get_mut(user_id)?;
        participant.last_seen_ms = now_ms;
        if let Some(cursor) = cursor {
            participant.cursor = Some(cursor);
        }
        if let Some(ids) = &selected_ids {
            participant.selected_ids = ids.iter().cloned().collect();
        }
        Some(PresenceChange { cursor, selected_ids })
    }

    /// Drop every participant. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.participants.len();
        self.participants.clear();
        count
    }

    #[must_use]
    pub fn get(&self, user_id: &str) -> Option<&RemoteParticipant> {
        self.participants.get(user_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// All participants ordered by name, then id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RemoteParticipant> {
        let mut out: Vec<_> = self.participants.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }
}

// =============================================================================
// COLORS
// =============================================================================

/// Stable palette entry for an id.
fn palette_color(id: &str) -> &'static str {
    let hash = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(u32::from(b)));
    PALETTE[hash as usize % PALETTE.len()]
}

/// Parse `#RGB` or `#RRGGBB` values into RGB channels.
fn parse_hex_rgb(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.trim().strip_prefix('#')?;
    if !hex.is_ascii() {
        return None;
    }
    match hex.len() {
        3 => {
            let r = u8::from_str_radix(&hex[0..1].repeat(2), 16).ok()?;
            let g = u8::from_str_radix(&hex[1..2].repeat(2), 16).ok()?;
            let b = u8::from_str_radix(&hex[2..3].repeat(2), 16).ok()?;
            Some((r, g, b))
        }
        6 => {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            Some((r, g, b))
        }
        _ => None,
    }
}

/// Normalize a color to canonical lowercase `#rrggbb`.
fn normalize_hex_color(value: &str, fallback: &str) -> String {
    let fallback_rgb = parse_hex_rgb(fallback).unwrap_or((138, 129, 120));
    let (r, g, b) = parse_hex_rgb(value).unwrap_or(fallback_rgb);
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
