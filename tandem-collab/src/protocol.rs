//! Binary wire protocol for document-session frames.
//!
//! Frame layout (bincode-encoded):
//! ```text
//! ┌──────────┬───────────┬──────────┬──────────┬──────────┐
//! │ kind     │ peer_id   │ doc_id   │ seq      │ payload  │
//! │ 1 byte   │ 16 bytes  │ variable │ 8 bytes  │ variable │
//! └──────────┴───────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! Delta and sync-state payloads are opaque update bytes produced by the
//! CRDT engine and are carried byte for byte; this module never inspects
//! them. Presence payloads are encoded [`PresenceRecord`]s and stay in
//! their own frame kinds, outside the merge path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::presence::PresenceRecord;

/// Frame kinds carried between peers of one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    /// State vector, asking peers for everything the sender is missing
    SyncRequest = 1,
    /// State diff answering a SyncRequest
    SyncState = 2,
    /// Incremental update delta
    Delta = 3,
    /// Presence record replacement
    Presence = 4,
    /// Peer joined the document, payload is its initial presence
    PeerJoined = 5,
    /// Peer left the document
    PeerLeft = 6,
}

/// Top-level protocol frame.
///
/// Serialized with bincode for minimal overhead. `seq` orders presence
/// replacements from one sender; delta ordering deliberately carries no
/// meaning because merges commute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: FrameKind,
    pub peer_id: Uuid,
    pub doc_id: String,
    pub seq: u64,
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Create an update-delta frame.
    pub fn delta(peer_id: Uuid, doc_id: &str, update: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Delta,
            peer_id,
            doc_id: doc_id.to_string(),
            seq: 0,
            payload: update,
        }
    }

    /// Create a sync request carrying the sender's state vector.
    pub fn sync_request(peer_id: Uuid, doc_id: &str, state_vector: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::SyncRequest,
            peer_id,
            doc_id: doc_id.to_string(),
            seq: 0,
            payload: state_vector,
        }
    }

    /// Create a sync state frame carrying a state diff.
    pub fn sync_state(peer_id: Uuid, doc_id: &str, diff: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::SyncState,
            peer_id,
            doc_id: doc_id.to_string(),
            seq: 0,
            payload: diff,
        }
    }

    /// Create a presence replacement frame.
    pub fn presence(peer_id: Uuid, doc_id: &str, seq: u64, record: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::Presence,
            peer_id,
            doc_id: doc_id.to_string(),
            seq,
            payload: record,
        }
    }

    /// Create a peer-joined frame carrying the sender's initial presence.
    pub fn peer_joined(peer_id: Uuid, doc_id: &str, record: Vec<u8>) -> Self {
        Self {
            kind: FrameKind::PeerJoined,
            peer_id,
            doc_id: doc_id.to_string(),
            seq: 0,
            payload: record,
        }
    }

    /// Create a peer-left frame.
    pub fn peer_left(peer_id: Uuid, doc_id: &str) -> Self {
        Self {
            kind: FrameKind::PeerLeft,
            peer_id,
            doc_id: doc_id.to_string(),
            seq: 0,
            payload: Vec::new(),
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CodecError::Encode(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let (frame, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(frame)
    }

    /// Parse the presence payload of a Presence or PeerJoined frame.
    pub fn presence_record(&self) -> Result<PresenceRecord, CodecError> {
        if !matches!(self.kind, FrameKind::Presence | FrameKind::PeerJoined) {
            return Err(CodecError::WrongKind);
        }
        PresenceRecord::decode(&self.payload)
    }
}

/// Codec errors.
#[derive(Debug, Clone)]
pub enum CodecError {
    Encode(String),
    Decode(String),
    WrongKind,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Encode(e) => write!(f, "encode error: {e}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
            Self::WrongKind => write!(f, "frame kind carries no such payload"),
        }
    }
}

impl std::error::Error for CodecError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::FieldValue;

    #[test]
    fn test_delta_roundtrip() {
        let peer = Uuid::new_v4();
        let payload = vec![1, 2, 3, 4, 5];

        let frame = Envelope::delta(peer, "notes/readme", payload.clone());
        let encoded = frame.encode().unwrap();
        let decoded = Envelope::decode(&encoded).unwrap();

        assert_eq!(decoded.kind, FrameKind::Delta);
        assert_eq!(decoded.peer_id, peer);
        assert_eq!(decoded.doc_id, "notes/readme");
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_delta_payload_is_byte_exact() {
        // Payload bytes must survive untouched, including invalid UTF-8
        // and every byte value.
        let payload: Vec<u8> = (0..=255).collect();
        let frame = Envelope::delta(Uuid::new_v4(), "d", payload.clone());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn test_sync_request_roundtrip() {
        let peer = Uuid::new_v4();
        let sv = vec![10, 20, 30];

        let frame = Envelope::sync_request(peer, "doc", sv.clone());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, FrameKind::SyncRequest);
        assert_eq!(decoded.payload, sv);
    }

    #[test]
    fn test_sync_state_roundtrip() {
        let peer = Uuid::new_v4();
        let diff = vec![100, 200];

        let frame = Envelope::sync_state(peer, "doc", diff.clone());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, FrameKind::SyncState);
        assert_eq!(decoded.payload, diff);
    }

    #[test]
    fn test_presence_roundtrip() {
        let peer = Uuid::new_v4();
        let record = PresenceRecord::new()
            .with_field("name", FieldValue::Text("Alice".into()))
            .with_field("cursor", FieldValue::Number(12.0));

        let frame = Envelope::presence(peer, "doc", 7, record.encode().unwrap());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, FrameKind::Presence);
        assert_eq!(decoded.seq, 7);
        assert_eq!(decoded.presence_record().unwrap(), record);
    }

    #[test]
    fn test_peer_joined_roundtrip() {
        let peer = Uuid::new_v4();
        let record = PresenceRecord::new().with_field("name", FieldValue::Text("Bob".into()));

        let frame = Envelope::peer_joined(peer, "doc", record.encode().unwrap());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, FrameKind::PeerJoined);
        assert_eq!(decoded.presence_record().unwrap(), record);
    }

    #[test]
    fn test_peer_left_roundtrip() {
        let peer = Uuid::new_v4();

        let frame = Envelope::peer_left(peer, "doc");
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();

        assert_eq!(decoded.kind, FrameKind::PeerLeft);
        assert_eq!(decoded.peer_id, peer);
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_wrong_kind_has_no_presence_payload() {
        let frame = Envelope::delta(Uuid::new_v4(), "doc", vec![1, 2, 3]);
        assert!(frame.presence_record().is_err());
    }

    #[test]
    fn test_decode_invalid_bytes() {
        let garbage = vec![0xFF, 0xFE, 0xFD];
        assert!(Envelope::decode(&garbage).is_err());
    }

    #[test]
    fn test_empty_delta() {
        let frame = Envelope::delta(Uuid::new_v4(), "doc", Vec::new());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_large_delta() {
        // A batch update from a long offline period: 64KB.
        let update = vec![42u8; 65536];
        let frame = Envelope::delta(Uuid::new_v4(), "doc", update.clone());
        let decoded = Envelope::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded.payload, update);
    }

    #[test]
    fn test_frame_kind_values() {
        assert_eq!(FrameKind::SyncRequest as u8, 1);
        assert_eq!(FrameKind::SyncState as u8, 2);
        assert_eq!(FrameKind::Delta as u8, 3);
        assert_eq!(FrameKind::Presence as u8, 4);
        assert_eq!(FrameKind::PeerJoined as u8, 5);
        assert_eq!(FrameKind::PeerLeft as u8, 6);
    }
}
