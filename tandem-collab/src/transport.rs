//! Transport boundary: a peer channel per document.
//!
//! The session layer only ever talks to the two capability traits below,
//! so any transport that can broadcast frames to the peers of a document
//! is substitutable. Two implementations ship here:
//!
//! - [`WebSocketProvider`]: connects to a relay over tokio-tungstenite,
//!   one socket per document.
//! - [`MemoryHub`]: in-process fan-out for local sessions and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

/// Transport errors. These surface as connectivity status, never as merge
/// failures; shared state stays valid and editable while disconnected.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// The peer channel could not be established or has dropped.
    Unavailable(String),
    /// The channel was closed locally.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(e) => write!(f, "transport unavailable: {e}"),
            Self::Closed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// A live peer channel for one document.
#[async_trait]
pub trait DocumentChannel: Send + Sync {
    /// Broadcast an encoded frame to the document's peers.
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Take the receiver of incoming peer frames. Can only be taken once.
    fn take_incoming(&self) -> Option<mpsc::Receiver<Vec<u8>>>;

    /// Close the channel. In-flight sends are abandoned without error.
    async fn close(&self);
}

/// Opens peer channels by document identifier.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    async fn open(&self, doc_id: &str) -> Result<Box<dyn DocumentChannel>, TransportError>;
}

/// Frames buffered per channel direction before backpressure drops.
const CHANNEL_CAPACITY: usize = 256;

// ───────────────────────────────────────────────────────────────────
// WebSocket transport
// ───────────────────────────────────────────────────────────────────

/// Connects one WebSocket per document to a relay at `{base_url}/{doc_id}`.
pub struct WebSocketProvider {
    base_url: String,
}

impl WebSocketProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ChannelProvider for WebSocketProvider {
    async fn open(&self, doc_id: &str) -> Result<Box<dyn DocumentChannel>, TransportError> {
        let url = format!("{}/{}", self.base_url, doc_id);
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::Unavailable(e.to_string()))?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(CHANNEL_CAPACITY);

        // Writer task: forward the outgoing queue to the socket.
        let writer = tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if ws_writer.send(Message::Binary(data.into())).await.is_err() {
                    break;
                }
            }
        });

        // Reader task: forward binary frames to the session.
        let reader = tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        if in_tx.send(bytes).await.is_err() {
                            break;
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }
        });

        log::debug!("websocket channel open for {doc_id}");
        Ok(Box::new(WebSocketChannel {
            out_tx,
            incoming: Mutex::new(Some(in_rx)),
            tasks: vec![writer, reader],
            closed: AtomicBool::new(false),
        }))
    }
}

struct WebSocketChannel {
    out_tx: mpsc::Sender<Vec<u8>>,
    incoming: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    tasks: Vec<JoinHandle<()>>,
    closed: AtomicBool,
}

#[async_trait]
impl DocumentChannel for WebSocketChannel {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.out_tx
            .send(frame)
            .await
            .map_err(|_| TransportError::Unavailable("socket writer gone".into()))
    }

    fn take_incoming(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.incoming.lock().unwrap().take()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ───────────────────────────────────────────────────────────────────
// In-process transport
// ───────────────────────────────────────────────────────────────────

/// In-process peer hub: every channel opened for the same document id sees
/// every other channel's frames, including its own (the session filters
/// echoes by peer id).
///
/// Counts channel open/close cycles so tests can assert the registry's
/// resource lifecycle.
pub struct MemoryHub {
    docs: Mutex<HashMap<String, broadcast::Sender<Arc<Vec<u8>>>>>,
    capacity: usize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MemoryHub {
    pub fn new() -> Arc<Self> {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            docs: Mutex::new(HashMap::new()),
            capacity,
            opened: AtomicUsize::new(0),
            closed: AtomicUsize::new(0),
        })
    }

    /// A provider handle suitable for `SessionRegistry::new`.
    pub fn provider(self: &Arc<Self>) -> Arc<dyn ChannelProvider> {
        Arc::new(MemoryProvider(self.clone()))
    }

    /// Channels opened over the hub's lifetime.
    pub fn channels_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Channels closed over the hub's lifetime.
    pub fn channels_closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn sender_for(&self, doc_id: &str) -> broadcast::Sender<Arc<Vec<u8>>> {
        let mut docs = self.docs.lock().unwrap();
        docs.entry(doc_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }

    /// Drop the fan-out entry for a document nobody is connected to.
    fn release(&self, doc_id: &str) {
        let mut docs = self.docs.lock().unwrap();
        if let Some(sender) = docs.get(doc_id) {
            if sender.receiver_count() == 0 {
                docs.remove(doc_id);
            }
        }
    }
}

struct MemoryProvider(Arc<MemoryHub>);

#[async_trait]
impl ChannelProvider for MemoryProvider {
    async fn open(&self, doc_id: &str) -> Result<Box<dyn DocumentChannel>, TransportError> {
        let hub = self.0.clone();
        let tx = hub.sender_for(doc_id);
        let mut fanout_rx = tx.subscribe();
        let (in_tx, in_rx) = mpsc::channel::<Vec<u8>>(hub.capacity);

        // Pump task: fan-out queue into this channel's incoming queue.
        let pump = tokio::spawn(async move {
            loop {
                match fanout_rx.recv().await {
                    Ok(frame) => {
                        if in_tx.send(frame.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::warn!("memory channel lagged, dropped {n} frames");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        hub.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryChannel {
            hub,
            doc_id: doc_id.to_string(),
            tx,
            incoming: Mutex::new(Some(in_rx)),
            pump,
            closed: AtomicBool::new(false),
        }))
    }
}

struct MemoryChannel {
    hub: Arc<MemoryHub>,
    doc_id: String,
    tx: broadcast::Sender<Arc<Vec<u8>>>,
    incoming: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    pump: JoinHandle<()>,
    closed: AtomicBool,
}

#[async_trait]
impl DocumentChannel for MemoryChannel {
    async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        // No receivers means no peers; that is not an error.
        let _ = self.tx.send(Arc::new(frame));
        Ok(())
    }

    fn take_incoming(&self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.incoming.lock().unwrap().take()
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.pump.abort();
        self.hub.closed.fetch_add(1, Ordering::SeqCst);
        // Give the aborted pump a chance to drop its receiver before the
        // idle check.
        tokio::task::yield_now().await;
        self.hub.release(&self.doc_id);
    }
}
