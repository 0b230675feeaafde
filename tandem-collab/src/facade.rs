//! The per-attachment collaboration handle.
//!
//! An editing surface never touches a session directly: it attaches a
//! [`Collab`], installs the extension descriptors verbatim, and uses the
//! handle's operations as its only contact with the shared document.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::events::EventStream;
use crate::presence::{CursorDecoration, PresenceEvent, PresenceRecord};
use crate::registry::{AttachError, SessionRegistry};
use crate::session::{Session, SessionError, SessionEvent, SessionStats};

/// History commands an editing surface can bind to key gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryCommand {
    Undo,
    Redo,
}

/// One key gesture bound to a history command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBinding {
    /// Chord in the surface's notation, e.g. `"Mod-z"`.
    pub chord: String,
    pub command: HistoryCommand,
}

impl KeyBinding {
    pub fn new(chord: &str, command: HistoryCommand) -> Self {
        Self {
            chord: chord.to_string(),
            command,
        }
    }
}

/// The history keymap installed with the extension set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keymap(pub Vec<KeyBinding>);

impl Default for Keymap {
    /// Undo, redo and the conventional redo alternate.
    fn default() -> Self {
        Self(vec![
            KeyBinding::new("Mod-z", HistoryCommand::Undo),
            KeyBinding::new("Mod-y", HistoryCommand::Redo),
            KeyBinding::new("Mod-Shift-z", HistoryCommand::Redo),
        ])
    }
}

/// Extension descriptors the editing surface installs verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorExtension {
    /// Bind the surface's content to the shared document.
    Sync,
    /// Render peer cursors from the presence stream.
    RemoteCursors,
    /// Local-only undo/redo bound to key gestures.
    History { keymap: Keymap },
}

/// A single attachment to a shared document.
///
/// Created by [`Collab::attach`]; its owner must call [`Collab::detach`]
/// when the surface stops collaborating. Dropping without detaching logs
/// a warning and detaches late on the runtime.
pub struct Collab {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
    doc_id: String,
    detached: AtomicBool,
}

impl Collab {
    /// Attach to the shared document named by `doc_id`, joining the live
    /// session or creating it.
    pub async fn attach(registry: Arc<SessionRegistry>, doc_id: &str) -> Result<Self, AttachError> {
        let session = registry.attach(doc_id).await?;
        Ok(Self {
            registry,
            session,
            doc_id: doc_id.to_string(),
            detached: AtomicBool::new(false),
        })
    }

    /// Release this attachment. The session itself is torn down only
    /// when the last attachment goes.
    pub async fn detach(self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            self.registry.detach(&self.doc_id).await;
        }
    }

    /// Document identifier this attachment is bound to.
    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    /// The local participant id on the wire.
    pub fn peer_id(&self) -> Uuid {
        self.session.peer_id()
    }

    // ── the session contact surface ────────────────────────────────

    /// Merge a peer or externally sourced update delta.
    pub fn apply_incoming(&self, update: &[u8]) -> Result<(), SessionError> {
        self.session.apply_incoming(update)
    }

    /// Encode the full document state as one update delta.
    pub fn snapshot(&self) -> Vec<u8> {
        self.session.snapshot()
    }

    /// Replace and broadcast the local participant's presence.
    pub async fn set_local_presence(&self, record: PresenceRecord) {
        self.session.set_local_presence(record).await;
    }

    /// Merge a one-shot content snapshot without clobbering concurrent
    /// edits.
    pub async fn apply_content(&self, raw: &str) -> Result<(), SessionError> {
        self.session.apply_content(raw).await
    }

    // ── editing ────────────────────────────────────────────────────

    /// Insert text at a character offset and broadcast the delta.
    pub async fn insert(&self, index: u32, chunk: &str) {
        self.session.insert(index, chunk).await;
    }

    /// Remove a character range and broadcast the delta.
    pub async fn remove(&self, index: u32, len: u32) {
        self.session.remove(index, len).await;
    }

    /// Current text content.
    pub fn content(&self) -> String {
        self.session.content()
    }

    /// Undo the local participant's latest edit. Peer edits are never
    /// rewritten.
    pub async fn undo(&self) -> bool {
        self.session.undo().await
    }

    /// Reapply the local participant's latest undone edit.
    pub async fn redo(&self) -> bool {
        self.session.redo().await
    }

    // ── observation ────────────────────────────────────────────────

    /// Stream of merged peer deltas and connectivity changes.
    pub fn update_events(&self) -> EventStream<SessionEvent> {
        self.session.update_events()
    }

    /// Stream of peer presence updates and removals.
    pub fn presence_events(&self) -> EventStream<PresenceEvent> {
        self.session.presence_events()
    }

    /// Render-ready peer cursors.
    pub fn cursor_decorations(&self) -> Vec<CursorDecoration> {
        self.session.presence().cursor_decorations()
    }

    /// Session counters.
    pub fn stats(&self) -> SessionStats {
        self.session.stats()
    }

    // ── extension set ──────────────────────────────────────────────

    /// The extension set with the conventional history keymap.
    pub fn extensions(&self) -> Vec<EditorExtension> {
        self.extensions_with(Keymap::default())
    }

    /// The extension set with surface-supplied key gestures.
    pub fn extensions_with(&self, keymap: Keymap) -> Vec<EditorExtension> {
        vec![
            EditorExtension::Sync,
            EditorExtension::RemoteCursors,
            EditorExtension::History { keymap },
        ]
    }
}

impl Drop for Collab {
    fn drop(&mut self) {
        if self.detached.swap(true, Ordering::SeqCst) {
            return;
        }
        log::warn!(
            "attachment for {} dropped without detach, detaching late",
            self.doc_id
        );
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let registry = self.registry.clone();
            let doc_id = self.doc_id.clone();
            handle.spawn(async move {
                registry.detach(&doc_id).await;
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryHub;

    #[tokio::test]
    async fn test_attach_and_detach() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));

        let collab = Collab::attach(registry.clone(), "doc").await.unwrap();
        assert_eq!(collab.doc_id(), "doc");
        assert_eq!(registry.session_count().await, 1);

        collab.detach().await;
        assert_eq!(registry.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_two_attachments_share_a_session() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));

        let a = Collab::attach(registry.clone(), "doc").await.unwrap();
        let b = Collab::attach(registry.clone(), "doc").await.unwrap();

        a.insert(0, "shared").await;
        assert_eq!(b.content(), "shared");
        assert_eq!(a.peer_id(), b.peer_id());
        assert_eq!(hub.channels_opened(), 1);

        a.detach().await;
        b.detach().await;
    }

    #[tokio::test]
    async fn test_default_extension_set() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));
        let collab = Collab::attach(registry, "doc").await.unwrap();

        let extensions = collab.extensions();
        assert_eq!(extensions.len(), 3);
        assert_eq!(extensions[0], EditorExtension::Sync);
        assert_eq!(extensions[1], EditorExtension::RemoteCursors);
        match &extensions[2] {
            EditorExtension::History { keymap } => {
                let chords: Vec<&str> = keymap.0.iter().map(|b| b.chord.as_str()).collect();
                assert_eq!(chords, vec!["Mod-z", "Mod-y", "Mod-Shift-z"]);
                assert_eq!(keymap.0[0].command, HistoryCommand::Undo);
                assert_eq!(keymap.0[2].command, HistoryCommand::Redo);
            }
            other => panic!("expected History extension, got {other:?}"),
        }

        collab.detach().await;
    }

    #[tokio::test]
    async fn test_custom_keymap() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));
        let collab = Collab::attach(registry, "doc").await.unwrap();

        let keymap = Keymap(vec![KeyBinding::new("C-/", HistoryCommand::Undo)]);
        let extensions = collab.extensions_with(keymap.clone());
        assert!(extensions.contains(&EditorExtension::History { keymap }));

        collab.detach().await;
    }

    #[tokio::test]
    async fn test_drop_without_detach_detaches_late() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));

        {
            let _collab = Collab::attach(registry.clone(), "doc").await.unwrap();
        }
        // The deferred detach runs on the runtime.
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while registry.session_count().await != 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("leaked attachment never detached");
    }

    #[tokio::test]
    async fn test_detach_is_idempotent_under_drop() {
        let hub = MemoryHub::new();
        let registry = Arc::new(SessionRegistry::new(hub.provider()));

        let a = Collab::attach(registry.clone(), "doc").await.unwrap();
        let b = Collab::attach(registry.clone(), "doc").await.unwrap();
        a.detach().await;
        drop(b);

        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while registry.session_count().await != 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("session not released");
        assert_eq!(hub.channels_closed(), 1);
    }
}
