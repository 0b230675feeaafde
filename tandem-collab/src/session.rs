//! A live shared-document session, one per document identifier.
//!
//! The session owns the CRDT document, the transport channel and the
//! presence channel. Every mutation flows through update deltas:
//!
//! ```text
//! local edit ──► transaction ──► delta ──► broadcast to peers
//!                     │
//! peer delta ──► merge (apply_incoming) ──► attachment events
//! ```
//!
//! Merge order never matters: deltas commute and re-applying one is a
//! no-op, both guaranteed by the engine and preserved here by carrying
//! delta bytes untouched. Malformed bytes are logged and skipped; the
//! session keeps running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;
use yrs::undo::UndoManager;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{
    Doc, GetString, ReadTxn, StateVector, Text, TextRef, Transact, TransactionMut, Update,
};

use crate::events::{EventHub, EventStream};
use crate::import;
use crate::presence::{PresenceChannel, PresenceEvent, PresenceRecord};
use crate::protocol::{Envelope, FrameKind};
use crate::transport::{DocumentChannel, TransportError};

/// Root text branch every session edits.
pub(crate) const CONTENT_ROOT: &str = "content";

/// Transaction origin for edits made through this attachment's surface.
/// Only these are undoable.
const LOCAL_ORIGIN: &str = "tandem:local";
/// Transaction origin for merged peer deltas.
const REMOTE_ORIGIN: &str = "tandem:remote";
/// Transaction origin for one-shot content imports.
const IMPORT_ORIGIN: &str = "tandem:import";

/// Session errors.
///
/// There is deliberately no conflict variant: merging a well-formed delta
/// always succeeds by construction of the data model.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// Update bytes that the engine could not parse.
    MalformedDelta(String),
    /// The peer channel failed; content stays editable locally.
    Transport(TransportError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MalformedDelta(e) => write!(f, "malformed delta: {e}"),
            Self::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<yrs::encoding::read::Error> for SessionError {
    fn from(e: yrs::encoding::read::Error) -> Self {
        Self::MalformedDelta(e.to_string())
    }
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Events buffered per attachment subscriber.
    pub event_capacity: usize,
    /// Silence after which a peer's presence is pruned.
    pub presence_idle_timeout: Duration,
    /// How often the housekeeping task checks for idle peers.
    pub housekeeping_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            presence_idle_timeout: Duration::from_secs(30),
            housekeeping_interval: Duration::from_secs(10),
        }
    }
}

/// Connectivity as seen by attachments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

/// Content-side events delivered to attachments.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A peer's delta was merged into the shared document.
    RemoteDelta { peer_id: Uuid, update: Vec<u8> },
    /// The transport's health changed.
    Connectivity(ConnectionState),
}

/// Counters for one session, read via [`Session::stats`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionStats {
    pub deltas_applied: u64,
    pub deltas_sent: u64,
    pub malformed_dropped: u64,
    pub presence_updates: u64,
}

/// Lock-free counters updated on the receive path.
struct AtomicSessionStats {
    deltas_applied: AtomicU64,
    deltas_sent: AtomicU64,
    malformed_dropped: AtomicU64,
    presence_updates: AtomicU64,
}

impl AtomicSessionStats {
    fn new() -> Self {
        Self {
            deltas_applied: AtomicU64::new(0),
            deltas_sent: AtomicU64::new(0),
            malformed_dropped: AtomicU64::new(0),
            presence_updates: AtomicU64::new(0),
        }
    }

    fn snapshot(&self) -> SessionStats {
        SessionStats {
            deltas_applied: self.deltas_applied.load(Ordering::Relaxed),
            deltas_sent: self.deltas_sent.load(Ordering::Relaxed),
            malformed_dropped: self.malformed_dropped.load(Ordering::Relaxed),
            presence_updates: self.presence_updates.load(Ordering::Relaxed),
        }
    }
}

/// One live shared document.
///
/// Owned by the registry; attachments hold non-owning `Arc` references
/// and must route every mutation through the merge/apply operations here.
pub struct Session {
    id: String,
    peer_id: Uuid,
    doc: Doc,
    text: TextRef,
    undo: Mutex<UndoManager<()>>,
    channel: Box<dyn DocumentChannel>,
    presence: PresenceChannel,
    local_presence: Mutex<PresenceRecord>,
    presence_seq: AtomicU64,
    events: EventHub<SessionEvent>,
    stats: AtomicSessionStats,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Session {
    /// Open a session over an established peer channel, announce
    /// ourselves and start the receive loop.
    pub(crate) async fn open(
        id: &str,
        channel: Box<dyn DocumentChannel>,
        config: &SessionConfig,
    ) -> Arc<Self> {
        let doc = Doc::new();
        let text = doc.get_or_insert_text(CONTENT_ROOT);
        let mut undo = UndoManager::new(&doc, &text);
        undo.include_origin(LOCAL_ORIGIN);

        let incoming = channel.take_incoming();

        let session = Arc::new(Session {
            id: id.to_string(),
            peer_id: Uuid::new_v4(),
            doc,
            text,
            undo: Mutex::new(undo),
            channel,
            presence: PresenceChannel::new(config.event_capacity, config.presence_idle_timeout),
            local_presence: Mutex::new(PresenceRecord::new()),
            presence_seq: AtomicU64::new(0),
            events: EventHub::new(config.event_capacity),
            stats: AtomicSessionStats::new(),
            tasks: Mutex::new(Vec::new()),
        });

        // Announce ourselves and pull whatever the peers already have.
        let record = session.local_presence.lock().unwrap().clone();
        let payload = record.encode().unwrap_or_default();
        session
            .send_frame(Envelope::peer_joined(session.peer_id, id, payload))
            .await;
        session.send_sync_request().await;

        let mut tasks = Vec::new();
        if let Some(rx) = incoming {
            let reader = tokio::spawn(Self::run_loop(session.clone(), rx));
            tasks.push(reader);
        }
        tasks.push(tokio::spawn(Self::housekeeping(
            Arc::downgrade(&session),
            config.housekeeping_interval,
        )));
        *session.tasks.lock().unwrap() = tasks;

        log::info!("session open for {id} as peer {}", session.peer_id);
        session
    }

    /// Document identifier this session serves.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// This session's participant id on the wire.
    pub fn peer_id(&self) -> Uuid {
        self.peer_id
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }

    /// The session's presence channel.
    pub fn presence(&self) -> &PresenceChannel {
        &self.presence
    }

    /// Subscribe to content-side events (merged peer deltas,
    /// connectivity).
    pub fn update_events(&self) -> EventStream<SessionEvent> {
        self.events.subscribe()
    }

    /// Subscribe to peer presence changes.
    pub fn presence_events(&self) -> EventStream<PresenceEvent> {
        self.presence.subscribe()
    }

    // ───────────────────────────────────────────────────────────────
    // Merge paths
    // ───────────────────────────────────────────────────────────────

    /// Merge an update delta received from a peer or an external source.
    ///
    /// Fails only on unparseable bytes; a well-formed delta always merges,
    /// and merging it again is a no-op.
    pub fn apply_incoming(&self, update: &[u8]) -> Result<(), SessionError> {
        self.merge(update, REMOTE_ORIGIN)?;
        self.stats.deltas_applied.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Encode the full current state as one update delta.
    pub fn snapshot(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Current text content.
    pub fn content(&self) -> String {
        let txn = self.doc.transact();
        self.text.get_string(&txn)
    }

    /// Merge a one-shot content snapshot through the normal delta path.
    ///
    /// Concurrent peer edits survive: the snapshot becomes an ordinary
    /// delta and merges, it never replaces the document wholesale. If the
    /// document already has content the merge may interleave; callers
    /// that mean "replace everything" must clear the text through
    /// ordinary edits first.
    pub async fn apply_content(&self, raw: &str) -> Result<(), SessionError> {
        let update = import::import_content(raw);
        self.merge(&update, IMPORT_ORIGIN)?;
        self.stats.deltas_applied.fetch_add(1, Ordering::Relaxed);
        self.broadcast_delta(update).await;
        Ok(())
    }

    fn merge(&self, update: &[u8], origin: &'static str) -> Result<(), SessionError> {
        let decoded = Update::decode_v1(update)?;
        let mut txn = self.doc.transact_mut_with(origin);
        txn.apply_update(decoded)
            .map_err(|e| SessionError::MalformedDelta(e.to_string()))?;
        Ok(())
    }

    // ───────────────────────────────────────────────────────────────
    // Local edits
    // ───────────────────────────────────────────────────────────────

    /// Run a local edit, then broadcast the resulting delta to peers.
    ///
    /// The closure mutates the root text inside one transaction; its
    /// delta is captured on commit and applied locally by the same
    /// transaction, so local state and the wire always agree.
    pub async fn edit<F>(&self, f: F)
    where
        F: FnOnce(&mut TransactionMut, &TextRef),
    {
        let update = {
            let mut txn = self.doc.transact_mut_with(LOCAL_ORIGIN);
            f(&mut txn, &self.text);
            txn.encode_update_v1()
        };
        self.broadcast_delta(update).await;
    }

    /// Insert text at a character offset.
    pub async fn insert(&self, index: u32, chunk: &str) {
        self.edit(|txn, text| text.insert(txn, index, chunk)).await;
    }

    /// Remove a range of characters.
    pub async fn remove(&self, index: u32, len: u32) {
        self.edit(|txn, text| text.remove_range(txn, index, len))
            .await;
    }

    // ───────────────────────────────────────────────────────────────
    // Undo / redo
    // ───────────────────────────────────────────────────────────────

    /// Undo the local participant's most recent edit.
    ///
    /// Only transactions from this attachment's own edits are tracked;
    /// peers' concurrent changes are never rewritten. The reversal itself
    /// travels to peers as an ordinary merged delta.
    pub async fn undo(&self) -> bool {
        let before = {
            let txn = self.doc.transact();
            txn.state_vector()
        };
        let undone = self.undo.lock().unwrap().undo_blocking();
        if undone {
            let delta = {
                let txn = self.doc.transact();
                txn.encode_diff_v1(&before)
            };
            self.broadcast_delta(delta).await;
        }
        undone
    }

    /// Reapply the local participant's most recently undone edit.
    pub async fn redo(&self) -> bool {
        let before = {
            let txn = self.doc.transact();
            txn.state_vector()
        };
        let redone = self.undo.lock().unwrap().redo_blocking();
        if redone {
            let delta = {
                let txn = self.doc.transact();
                txn.encode_diff_v1(&before)
            };
            self.broadcast_delta(delta).await;
        }
        redone
    }

    // ───────────────────────────────────────────────────────────────
    // Presence
    // ───────────────────────────────────────────────────────────────

    /// Replace the local participant's presence record and broadcast it.
    pub async fn set_local_presence(&self, record: PresenceRecord) {
        *self.local_presence.lock().unwrap() = record.clone();
        let seq = self.presence_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let payload = record.encode().unwrap_or_default();
        self.send_frame(Envelope::presence(self.peer_id, &self.id, seq, payload))
            .await;
    }

    /// The local participant's current presence record.
    pub fn local_presence(&self) -> PresenceRecord {
        self.local_presence.lock().unwrap().clone()
    }

    // ───────────────────────────────────────────────────────────────
    // Wire plumbing
    // ───────────────────────────────────────────────────────────────

    async fn send_sync_request(&self) {
        let sv = {
            let txn = self.doc.transact();
            txn.state_vector().encode_v1()
        };
        self.send_frame(Envelope::sync_request(self.peer_id, &self.id, sv))
            .await;
    }

    async fn broadcast_delta(&self, update: Vec<u8>) {
        self.stats.deltas_sent.fetch_add(1, Ordering::Relaxed);
        self.send_frame(Envelope::delta(self.peer_id, &self.id, update))
            .await;
    }

    /// Best-effort send. Transport failures are connectivity status, not
    /// merge failures: content stays editable and resync happens on
    /// reconnect.
    async fn send_frame(&self, frame: Envelope) {
        match frame.encode() {
            Ok(bytes) => {
                if let Err(e) = self.channel.send(bytes).await {
                    log::warn!("send failed for {}: {e}", self.id);
                    self.events
                        .emit(SessionEvent::Connectivity(ConnectionState::Disconnected));
                }
            }
            Err(e) => log::error!("frame encode failed for {}: {e}", self.id),
        }
    }

    async fn run_loop(session: Arc<Session>, mut incoming: mpsc::Receiver<Vec<u8>>) {
        while let Some(bytes) = incoming.recv().await {
            match Envelope::decode(&bytes) {
                Ok(frame) => session.handle_frame(frame).await,
                Err(e) => {
                    log::warn!("discarding undecodable frame for {}: {e}", session.id);
                    session
                        .stats
                        .malformed_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        // Transport gone: presence does not outlive the connection.
        session
            .events
            .emit(SessionEvent::Connectivity(ConnectionState::Disconnected));
        session.presence.clear();
    }

    async fn handle_frame(&self, frame: Envelope) {
        if frame.peer_id == self.peer_id {
            return; // our own broadcast echoed back
        }
        if frame.doc_id != self.id {
            log::debug!("frame for {} reached session {}", frame.doc_id, self.id);
            return;
        }

        match frame.kind {
            FrameKind::Delta | FrameKind::SyncState => match self.apply_incoming(&frame.payload) {
                Ok(()) => {
                    self.events.emit(SessionEvent::RemoteDelta {
                        peer_id: frame.peer_id,
                        update: frame.payload,
                    });
                }
                Err(e) => {
                    log::warn!("dropping malformed delta from {}: {e}", frame.peer_id);
                    self.stats
                        .malformed_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            },
            FrameKind::SyncRequest => match StateVector::decode_v1(&frame.payload) {
                Ok(sv) => {
                    let diff = {
                        let txn = self.doc.transact();
                        txn.encode_diff_v1(&sv)
                    };
                    self.send_frame(Envelope::sync_state(self.peer_id, &self.id, diff))
                        .await;
                }
                Err(e) => {
                    log::warn!("dropping malformed state vector from {}: {e}", frame.peer_id);
                    self.stats
                        .malformed_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            },
            FrameKind::PeerJoined => {
                match frame.presence_record() {
                    Ok(record) => {
                        if self.presence.apply_remote(frame.peer_id, frame.seq, record) {
                            self.stats.presence_updates.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Err(e) => log::warn!("unreadable join presence from {}: {e}", frame.peer_id),
                }
                // The joiner broadcast its own sync request; this pulls
                // any content the joiner brought with it.
                self.send_sync_request().await;
            }
            FrameKind::Presence => match frame.presence_record() {
                Ok(record) => {
                    if self.presence.apply_remote(frame.peer_id, frame.seq, record) {
                        self.stats.presence_updates.fetch_add(1, Ordering::Relaxed);
                    }
                }
                Err(e) => {
                    log::warn!("dropping malformed presence from {}: {e}", frame.peer_id);
                    self.stats
                        .malformed_dropped
                        .fetch_add(1, Ordering::Relaxed);
                }
            },
            FrameKind::PeerLeft => {
                self.presence.remove(frame.peer_id);
            }
        }
    }

    async fn housekeeping(session: Weak<Session>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match session.upgrade() {
                Some(session) => {
                    for peer in session.presence.prune_idle() {
                        log::debug!("pruned idle peer {peer} from {}", session.id);
                    }
                }
                None => break,
            }
        }
    }

    /// Tear the session down: tell peers we left, stop the tasks, close
    /// the channel. In-flight sends are abandoned, not errored.
    pub(crate) async fn shutdown(&self) {
        self.send_frame(Envelope::peer_left(self.peer_id, &self.id))
            .await;
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().unwrap().drain(..).collect();
        for task in tasks {
            task.abort();
        }
        self.channel.close().await;
        self.presence.clear();
        log::info!("session closed for {}", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ChannelProvider, MemoryHub};
    use tokio::time::{sleep, timeout};

    async fn open_session(hub: &Arc<MemoryHub>, id: &str) -> Arc<Session> {
        let channel = hub.provider().open(id).await.unwrap();
        Session::open(id, channel, &SessionConfig::default()).await
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        timeout(Duration::from_secs(2), async {
            while !cond() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_fresh_session_is_empty() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;
        assert_eq!(session.content(), "");
        assert_eq!(session.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_edit_updates_content() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        session.insert(0, "hello").await;
        session.insert(5, " world").await;
        assert_eq!(session.content(), "hello world");

        session.remove(5, 6).await;
        assert_eq!(session.content(), "hello");
        assert_eq!(session.stats().deltas_sent, 3);
    }

    #[tokio::test]
    async fn test_apply_incoming_rejects_garbage() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        let result = session.apply_incoming(&[0xFF, 0x01, 0x02]);
        assert!(matches!(result, Err(SessionError::MalformedDelta(_))));
        // Session is unaffected and still editable.
        session.insert(0, "still fine").await;
        assert_eq!(session.content(), "still fine");
    }

    #[tokio::test]
    async fn test_same_delta_twice_is_noop() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        let delta = import::import_content("hello");
        session.apply_incoming(&delta).unwrap();
        let once = session.snapshot();
        session.apply_incoming(&delta).unwrap();
        let twice = session.snapshot();

        assert_eq!(once, twice);
        assert_eq!(session.content(), "hello");
    }

    #[tokio::test]
    async fn test_merge_order_does_not_matter() {
        let hub = MemoryHub::new();
        // Distinct doc ids: no transport cross-talk between the two.
        let ab = open_session(&hub, "doc-ab").await;
        let ba = open_session(&hub, "doc-ba").await;

        let a = import::import_content("left ");
        let b = {
            let doc = Doc::with_client_id(777);
            let text = doc.get_or_insert_text(CONTENT_ROOT);
            let mut txn = doc.transact_mut();
            text.insert(&mut txn, 0, "right");
            txn.encode_update_v1()
        };

        ab.apply_incoming(&a).unwrap();
        ab.apply_incoming(&b).unwrap();
        ba.apply_incoming(&b).unwrap();
        ba.apply_incoming(&a).unwrap();

        assert_eq!(ab.snapshot(), ba.snapshot());
        assert_eq!(ab.content(), ba.content());
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let hub = MemoryHub::new();
        let source = open_session(&hub, "doc-src").await;
        source.insert(0, "carried over").await;

        let fresh = open_session(&hub, "doc-dst").await;
        fresh.apply_incoming(&source.snapshot()).unwrap();
        assert_eq!(fresh.content(), "carried over");
    }

    #[tokio::test]
    async fn test_apply_content_preserves_existing_content() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        // Content that was merged in from a peer earlier.
        session
            .apply_incoming(&import::import_content("abc"))
            .unwrap();
        session.apply_content("xyz").await.unwrap();

        let content = session.content();
        assert!(content.contains("abc"), "existing content lost: {content}");
        assert!(content.contains("xyz"), "imported content lost: {content}");
    }

    #[tokio::test]
    async fn test_deltas_propagate_between_peers() {
        let hub = MemoryHub::new();
        let alice = open_session(&hub, "doc").await;
        let bob = open_session(&hub, "doc").await;

        alice.insert(0, "hi from alice").await;
        wait_until(|| bob.content() == "hi from alice").await;
        assert_eq!(alice.snapshot(), bob.snapshot());
    }

    #[tokio::test]
    async fn test_late_joiner_catches_up() {
        let hub = MemoryHub::new();
        let early = open_session(&hub, "doc").await;
        early.insert(0, "already here").await;

        let late = open_session(&hub, "doc").await;
        wait_until(|| late.content() == "already here").await;
    }

    #[tokio::test]
    async fn test_remote_delta_event_emitted() {
        let hub = MemoryHub::new();
        let alice = open_session(&hub, "doc").await;
        let bob = open_session(&hub, "doc").await;
        let mut events = bob.update_events();

        alice.insert(0, "ping").await;

        let got_delta = timeout(Duration::from_secs(2), async {
            loop {
                match events.next().await {
                    Some(SessionEvent::RemoteDelta { peer_id, .. }) => break peer_id,
                    Some(_) => continue,
                    None => panic!("event stream ended"),
                }
            }
        })
        .await
        .expect("no remote delta event");
        assert_eq!(got_delta, alice.peer_id());
    }

    #[tokio::test]
    async fn test_undo_redo_round_trip() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        session.insert(0, "hello").await;
        assert!(session.undo().await);
        assert_eq!(session.content(), "");
        assert!(session.redo().await);
        assert_eq!(session.content(), "hello");
    }

    #[tokio::test]
    async fn test_undo_ignores_remote_edits() {
        let hub = MemoryHub::new();
        let session = open_session(&hub, "doc").await;

        session
            .apply_incoming(&import::import_content("remote text"))
            .unwrap();
        // Nothing local to undo; the peer's content must survive.
        assert!(!session.undo().await);
        assert_eq!(session.content(), "remote text");
    }

    #[tokio::test]
    async fn test_undo_propagates_to_peers() {
        let hub = MemoryHub::new();
        let alice = open_session(&hub, "doc").await;
        let bob = open_session(&hub, "doc").await;

        alice.insert(0, "draft").await;
        wait_until(|| bob.content() == "draft").await;

        alice.undo().await;
        wait_until(|| bob.content().is_empty()).await;
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_stop_the_loop() {
        let hub = MemoryHub::new();
        let alice = open_session(&hub, "doc").await;
        let bob = open_session(&hub, "doc").await;

        // A peer spraying garbage on the wire.
        let rogue = hub.provider().open("doc").await.unwrap();
        rogue.send(vec![0xDE, 0xAD, 0xBE, 0xEF]).await.unwrap();

        alice.insert(0, "survives").await;
        wait_until(|| bob.content() == "survives").await;
        assert!(bob.stats().malformed_dropped >= 1);
        rogue.close().await;
    }

    #[tokio::test]
    async fn test_shutdown_notifies_peers() {
        let hub = MemoryHub::new();
        let alice = open_session(&hub, "doc").await;
        let bob = open_session(&hub, "doc").await;

        alice
            .set_local_presence(PresenceRecord::new().with_field(PresenceRecord::NAME, "Alice"))
            .await;
        wait_until(|| bob.presence().peer_count() == 1).await;

        alice.shutdown().await;
        wait_until(|| bob.presence().peer_count() == 0).await;
    }
}
