//! # tandem-collab - shared-document session layer
//!
//! Lets many independent editing surfaces share one logical document and
//! converge without a central arbiter. One live session per document
//! identifier, opaque update deltas that merge in any order, ephemeral
//! presence that never touches durable state.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   attach/detach   ┌──────────────────┐
//! │ Collab       │ ◄───────────────► │ SessionRegistry  │
//! │ (per surface)│                   │ (construct-once) │
//! └──────┬───────┘                   └────────┬─────────┘
//!        │                                    │ owns
//!        ▼                                    ▼
//! ┌──────────────┐    update deltas   ┌──────────────┐
//! │ Session      │ ◄────────────────► │ peer channel │
//! │ (shared doc) │    presence frames │ (transport)  │
//! └──────────────┘                    └──────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - binary frame codec (bincode envelope, opaque deltas)
//! - [`transport`] - peer-channel traits, WebSocket and in-process impls
//! - [`session`] - the shared document: merge, snapshot, edit, undo
//! - [`registry`] - identifier → session mapping with refcounted teardown
//! - [`presence`] - ephemeral participant state and cursor decorations
//! - [`import`] - one-shot content snapshots bridged into deltas
//! - [`facade`] - the per-attachment handle and editor extension set
//!
//! ## Guarantees
//!
//! | Property | How |
//! |----------|-----|
//! | One session per id | get-or-insert under the registry write lock |
//! | Order-free merge | deltas commute and re-apply as no-ops (engine) |
//! | Presence never persists | own frame kind, never enters the doc |
//! | Import can't clobber | snapshot becomes a delta, merges normally |

pub mod events;
pub mod facade;
pub mod import;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use events::EventStream;
pub use facade::{Collab, EditorExtension, HistoryCommand, KeyBinding, Keymap};
pub use import::{import_content, materialize};
pub use presence::{
    CursorDecoration, FieldValue, PresenceChannel, PresenceEvent, PresenceRecord,
};
pub use protocol::{CodecError, Envelope, FrameKind};
pub use registry::{AttachError, SessionRegistry};
pub use session::{
    ConnectionState, Session, SessionConfig, SessionError, SessionEvent, SessionStats,
};
pub use transport::{
    ChannelProvider, DocumentChannel, MemoryHub, TransportError, WebSocketProvider,
};
