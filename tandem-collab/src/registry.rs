//! Maps document identifiers to live sessions.
//!
//! The registry is an explicitly owned, injectable object, never a
//! module-level global, so every test can run its own isolated instance.
//! It guarantees construct-once semantics per identifier and tears a
//! session down only when its last attachment detaches.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::{Session, SessionConfig};
use crate::transport::{ChannelProvider, TransportError};

/// Attach failures. Only the very first attach for an identifier can
/// fail, and only because the transport could not open a peer channel.
#[derive(Debug, Clone)]
pub enum AttachError {
    Transport(TransportError),
}

impl std::fmt::Display for AttachError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "attach failed: {e}"),
        }
    }
}

impl std::error::Error for AttachError {}

impl From<TransportError> for AttachError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

struct SessionEntry {
    session: Arc<Session>,
    attachments: usize,
}

/// Owner of every live session in this process.
pub struct SessionRegistry {
    provider: Arc<dyn ChannelProvider>,
    config: SessionConfig,
    sessions: RwLock<HashMap<String, SessionEntry>>,
}

impl SessionRegistry {
    pub fn new(provider: Arc<dyn ChannelProvider>) -> Self {
        Self::with_config(provider, SessionConfig::default())
    }

    pub fn with_config(provider: Arc<dyn ChannelProvider>, config: SessionConfig) -> Self {
        Self {
            provider,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Return the live session for `id`, creating it on first attach.
    ///
    /// Construct-once: creation happens under the map's write lock, so
    /// concurrent attachers for the same identifier all receive the same
    /// instance and exactly one peer channel is ever opened per live
    /// session.
    pub async fn attach(&self, id: &str) -> Result<Arc<Session>, AttachError> {
        let mut sessions = self.sessions.write().await;
        if let Some(entry) = sessions.get_mut(id) {
            entry.attachments += 1;
            return Ok(entry.session.clone());
        }

        let channel = self.provider.open(id).await?;
        let session = Session::open(id, channel, &self.config).await;
        sessions.insert(
            id.to_string(),
            SessionEntry {
                session: session.clone(),
                attachments: 1,
            },
        );
        Ok(session)
    }

    /// Drop one attachment. The last detach unlinks the entry and shuts
    /// the session down; detaching an unknown identifier is a no-op.
    ///
    /// Decrement and unlink happen under one write-lock section, so a
    /// racing attach either lands on the still-live session or, after
    /// the unlink, constructs a fresh one; it can never resurrect a
    /// session that is being torn down.
    pub async fn detach(&self, id: &str) {
        let doomed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get_mut(id) {
                None => None,
                Some(entry) => {
                    entry.attachments -= 1;
                    if entry.attachments == 0 {
                        sessions.remove(id).map(|entry| entry.session)
                    } else {
                        None
                    }
                }
            }
        };
        if let Some(session) = doomed {
            session.shutdown().await;
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Attachments currently referencing `id` (0 if not live).
    pub async fn attachments(&self, id: &str) -> usize {
        self.sessions
            .read()
            .await
            .get(id)
            .map_or(0, |entry| entry.attachments)
    }
}
