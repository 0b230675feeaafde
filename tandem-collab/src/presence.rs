//! Ephemeral participant presence: who is editing, their color, their
//! cursor.
//!
//! Presence is a per-participant field map, replaced wholesale on every
//! update and dropped on disconnect. It travels in its own frame kind and
//! never enters the document's merge state, so it can never leak into a
//! snapshot or outlive the connection that produced it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::events::{EventHub, EventStream};
use crate::protocol::CodecError;

/// A single presence field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Flag(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Self::Flag(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Flag(b)
    }
}

/// One participant's presence: an ephemeral map of field name to value.
///
/// The well-known fields `name`, `color` and `cursor` drive identity and
/// cursor decorations; anything else is carried opaquely for the editing
/// surface.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    fields: BTreeMap<String, FieldValue>,
}

impl PresenceRecord {
    /// Display name field.
    pub const NAME: &'static str = "name";
    /// Cursor/selection color field (hex string).
    pub const COLOR: &'static str = "color";
    /// Cursor offset field (character index into the document).
    pub const CURSOR: &'static str = "cursor";

    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with_field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn set(&mut self, key: &str, value: impl Into<FieldValue>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn name(&self) -> Option<&str> {
        self.get(Self::NAME).and_then(FieldValue::as_text)
    }

    pub fn color(&self) -> Option<&str> {
        self.get(Self::COLOR).and_then(FieldValue::as_text)
    }

    pub fn cursor(&self) -> Option<u32> {
        self.get(Self::CURSOR)
            .and_then(FieldValue::as_number)
            .map(|n| n.max(0.0) as u32)
    }

    /// Encode to binary (bincode).
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Decode from binary.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (record, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(record)
    }
}

/// Presence updates observed from peers.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// A peer joined or replaced its presence record.
    Updated {
        peer_id: Uuid,
        record: PresenceRecord,
    },
    /// A peer disconnected or went idle; its presence is gone.
    Removed { peer_id: Uuid },
}

/// A remote peer's presence as tracked locally.
struct PeerPresence {
    record: PresenceRecord,
    seq: u64,
    last_seen: Instant,
}

/// Tracks remote participants' presence for one session and fans changes
/// out to attachments.
pub struct PresenceChannel {
    peers: Mutex<HashMap<Uuid, PeerPresence>>,
    hub: EventHub<PresenceEvent>,
    idle_timeout: Duration,
}

impl PresenceChannel {
    pub(crate) fn new(event_capacity: usize, idle_timeout: Duration) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            hub: EventHub::new(event_capacity),
            idle_timeout,
        }
    }

    /// Subscribe to peer presence changes.
    pub fn subscribe(&self) -> EventStream<PresenceEvent> {
        self.hub.subscribe()
    }

    /// Apply a presence replacement received from a peer.
    ///
    /// Frames carry a per-sender sequence number; a replacement older than
    /// the newest one already seen is dropped so reordered frames cannot
    /// resurrect stale state. Returns whether the record was applied.
    pub fn apply_remote(&self, peer_id: Uuid, seq: u64, record: PresenceRecord) -> bool {
        {
            let mut peers = self.peers.lock().unwrap();
            match peers.get_mut(&peer_id) {
                Some(existing) => {
                    if seq < existing.seq {
                        return false;
                    }
                    existing.record = record.clone();
                    existing.seq = seq;
                    existing.last_seen = Instant::now();
                }
                None => {
                    peers.insert(
                        peer_id,
                        PeerPresence {
                            record: record.clone(),
                            seq,
                            last_seen: Instant::now(),
                        },
                    );
                }
            }
        }
        self.hub.emit(PresenceEvent::Updated { peer_id, record });
        true
    }

    /// Remove a peer's presence (clean disconnect). Returns whether the
    /// peer was known.
    pub fn remove(&self, peer_id: Uuid) -> bool {
        let removed = self.peers.lock().unwrap().remove(&peer_id).is_some();
        if removed {
            self.hub.emit(PresenceEvent::Removed { peer_id });
        }
        removed
    }

    /// Drop every peer, emitting a removal for each. Used when the
    /// transport goes away: presence must not survive the connection.
    pub fn clear(&self) {
        let removed: Vec<Uuid> = self.peers.lock().unwrap().drain().map(|(id, _)| id).collect();
        for peer_id in removed {
            self.hub.emit(PresenceEvent::Removed { peer_id });
        }
    }

    /// Remove peers that have been silent longer than the idle timeout.
    pub fn prune_idle(&self) -> Vec<Uuid> {
        let timeout = self.idle_timeout;
        let stale: Vec<Uuid> = {
            let mut peers = self.peers.lock().unwrap();
            let stale: Vec<Uuid> = peers
                .iter()
                .filter(|(_, p)| p.last_seen.elapsed() > timeout)
                .map(|(id, _)| *id)
                .collect();
            for id in &stale {
                peers.remove(id);
            }
            stale
        };
        for peer_id in &stale {
            self.hub.emit(PresenceEvent::Removed { peer_id: *peer_id });
        }
        stale
    }

    /// Current peers and their records.
    pub fn peers(&self) -> Vec<(Uuid, PresenceRecord)> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .map(|(id, p)| (*id, p.record.clone()))
            .collect()
    }

    pub fn peer(&self, peer_id: &Uuid) -> Option<PresenceRecord> {
        self.peers.lock().unwrap().get(peer_id).map(|p| p.record.clone())
    }

    pub fn peer_count(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Render-ready cursor decorations for every peer with a cursor.
    pub fn cursor_decorations(&self) -> Vec<CursorDecoration> {
        self.peers
            .lock()
            .unwrap()
            .iter()
            .filter_map(|(id, p)| CursorDecoration::from_record(*id, &p.record))
            .collect()
    }
}

/// Data needed to render one remote cursor in the editing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorDecoration {
    pub peer_id: Uuid,
    pub name: String,
    pub color: String,
    pub offset: u32,
}

impl CursorDecoration {
    /// Fallback color for peers that never declared one.
    const DEFAULT_COLOR: &'static str = "#4285f4";

    fn from_record(peer_id: Uuid, record: &PresenceRecord) -> Option<Self> {
        let offset = record.cursor()?;
        let name = record
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Peer-{}", &peer_id.to_string()[..8]));
        let color = record
            .color()
            .unwrap_or(Self::DEFAULT_COLOR)
            .to_string();
        Some(Self {
            peer_id,
            name,
            color,
            offset,
        })
    }
}
