//! Side channel to the relay peer.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use super::message::{RelayChunk, RelayMessage};
use crate::error::RelayError;

/// Callback receiving reply chunks from the peer.
pub type ChunkSink = Arc<dyn Fn(RelayChunk) + Send + Sync>;

/// A message-size-limited channel to the relay peer.
///
/// At most one chunk listener is installed at a time.
pub trait RelayTransport: Send + Sync + 'static {
    /// Hand a request to the peer.
    fn send(&self, message: RelayMessage) -> std::result::Result<(), RelayError>;

    /// Install the chunk listener, replacing any previous one.
    fn subscribe(&self, sink: ChunkSink);

    /// Remove the chunk listener.
    fn unsubscribe(&self);
}

/// In-process transport on tokio channels.
///
/// Requests go to a [`RelayPeer`] through an unbounded mpsc channel; the
/// peer pushes chunks back with [`RelayPeer::deliver`].
pub struct ChannelRelayTransport {
    outgoing: mpsc::UnboundedSender<RelayMessage>,
    sink: Arc<Mutex<Option<ChunkSink>>>,
}

/// The peer end of a [`ChannelRelayTransport`].
pub struct RelayPeer {
    incoming: mpsc::UnboundedReceiver<RelayMessage>,
    sink: Arc<Mutex<Option<ChunkSink>>>,
}

impl ChannelRelayTransport {
    /// Create a connected transport/peer pair.
    pub fn pair() -> (Self, RelayPeer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Arc::new(Mutex::new(None));
        (
            Self {
                outgoing: tx,
                sink: Arc::clone(&sink),
            },
            RelayPeer { incoming: rx, sink },
        )
    }
}

fn current_sink(slot: &Mutex<Option<ChunkSink>>) -> Option<ChunkSink> {
    match slot.lock() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn set_sink(slot: &Mutex<Option<ChunkSink>>, sink: Option<ChunkSink>) {
    match slot.lock() {
        Ok(mut guard) => *guard = sink,
        Err(poisoned) => *poisoned.into_inner() = sink,
    }
}

impl RelayTransport for ChannelRelayTransport {
    fn send(&self, message: RelayMessage) -> std::result::Result<(), RelayError> {
        self.outgoing
            .send(message)
            .map_err(|_| RelayError::Send("relay peer has gone away".to_string()))
    }

    fn subscribe(&self, sink: ChunkSink) {
        set_sink(&self.sink, Some(sink));
    }

    fn unsubscribe(&self) {
        set_sink(&self.sink, None);
    }
}

impl RelayPeer {
    /// Wait for the next request. `None` once the transport is dropped.
    pub async fn recv(&mut self) -> Option<RelayMessage> {
        self.incoming.recv().await
    }

    /// Take a request if one is queued.
    pub fn try_recv(&mut self) -> Option<RelayMessage> {
        self.incoming.try_recv().ok()
    }

    /// Push a reply chunk to the listener.
    ///
    /// Returns `false` if no listener is installed.
    pub fn deliver(&self, chunk: RelayChunk) -> bool {
        // Call outside the lock; the listener takes its own.
        match current_sink(&self.sink) {
            Some(sink) => {
                sink(chunk);
                true
            }
            None => false,
        }
    }

    /// Whether a listener is installed.
    pub fn is_subscribed(&self) -> bool {
        current_sink(&self.sink).is_some()
    }
}
