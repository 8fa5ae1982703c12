//! Request/reply correlation over the relay transport.
//!
//! Each outstanding request owns one entry in the pending map: the sender
//! the caller is waiting on and, once the first chunk arrives, an
//! accumulator sized to the reply. Chunk handling and completion run under
//! the same lock, so the last chunk of a reply is seen by exactly one
//! delivery.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::accumulator::ChunkAccumulator;
use super::message::{RelayChunk, RelayMessage};
use super::transport::{ChunkSink, RelayTransport};
use crate::error::RelayError;
use crate::protocol::MAX_MESSAGE_SIZE;
use crate::schema::CommandCatalog;

/// Shortest allowed relay request timeout.
pub const MIN_RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest allowed relay request timeout.
pub const MAX_RELAY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on the number of chunks one reply may announce.
pub const DEFAULT_MAX_RELAY_CHUNKS: usize = 4096;

/// Relay bridge timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayConfig {
    request_timeout: Duration,
    catalog_timeout: Duration,
    max_chunks: usize,
    max_reply_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            request_timeout: MIN_RELAY_TIMEOUT,
            catalog_timeout: Duration::from_secs(10),
            max_chunks: DEFAULT_MAX_RELAY_CHUNKS,
            max_reply_size: MAX_MESSAGE_SIZE as usize,
        }
    }
}

impl RelayConfig {
    /// Set the command timeout, clamped to 10..=30 seconds.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.clamp(MIN_RELAY_TIMEOUT, MAX_RELAY_TIMEOUT);
        self
    }

    /// Set the catalog query timeout.
    pub fn with_catalog_timeout(mut self, timeout: Duration) -> Self {
        self.catalog_timeout = timeout;
        self
    }

    /// Set the largest chunk count a reply may announce.
    ///
    /// Default: 4096
    pub fn with_max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = max.max(1);
        self
    }

    /// Set the largest reassembled reply, in bytes.
    ///
    /// Default: 1 MiB, the frame limit the reply is answered through.
    pub fn with_max_reply_size(mut self, max: usize) -> Self {
        self.max_reply_size = max;
        self
    }

    /// Timeout for relayed commands.
    #[inline]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Timeout for catalog queries.
    #[inline]
    pub fn catalog_timeout(&self) -> Duration {
        self.catalog_timeout
    }

    /// Largest chunk count a reply may announce.
    #[inline]
    pub fn max_chunks(&self) -> usize {
        self.max_chunks
    }

    /// Largest reassembled reply, in bytes.
    #[inline]
    pub fn max_reply_size(&self) -> usize {
        self.max_reply_size
    }
}

type Reply = std::result::Result<String, RelayError>;

struct PendingRelay {
    reply: oneshot::Sender<Reply>,
    chunks: Option<ChunkAccumulator>,
}

#[derive(Default)]
struct BridgeState {
    pending: HashMap<Uuid, PendingRelay>,
    subscribed: bool,
    disposed: bool,
}

impl BridgeState {
    /// Drop the entry and resolve its caller with an invalid-reply error.
    fn reject(&mut self, id: &Uuid, reason: String) {
        if let Some(entry) = self.pending.remove(id) {
            let _ = entry.reply.send(Err(RelayError::InvalidReply(reason)));
        }
    }
}

struct Shared {
    state: Mutex<BridgeState>,
    config: RelayConfig,
}

impl Shared {
    fn new(config: RelayConfig) -> Self {
        Self {
            state: Mutex::new(BridgeState::default()),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn handle_chunk(&self, chunk: RelayChunk) {
        let id = chunk.request_id;
        let mut state = self.lock();

        let Some(entry) = state.pending.get_mut(&id) else {
            tracing::debug!(request_id = %id, chunk_index = chunk.chunk_index, "Dropping chunk for unknown request");
            return;
        };

        // The count sizes the accumulator, so it is bounded before use.
        let total = chunk.total_chunks as usize;
        let max_chunks = self.config.max_chunks;
        if total == 0 || total > max_chunks {
            tracing::warn!(request_id = %id, total, max_chunks, "Relay reply announced an invalid chunk count");
            state.reject(
                &id,
                format!("reply announced {} chunks (allowed 1..={})", total, max_chunks),
            );
            return;
        }

        let acc = entry
            .chunks
            .get_or_insert_with(|| ChunkAccumulator::new(total));
        if acc.total() != total {
            tracing::warn!(
                request_id = %id,
                expected = acc.total(),
                got = total,
                "Dropping chunk with inconsistent total"
            );
            return;
        }
        if !acc.add(chunk.chunk_index as usize, chunk.data) {
            tracing::warn!(request_id = %id, chunk_index = chunk.chunk_index, "Dropping duplicate or out-of-range chunk");
            return;
        }
        let max_reply_size = self.config.max_reply_size;
        if acc.byte_len() > max_reply_size {
            tracing::warn!(request_id = %id, size = acc.byte_len(), max_reply_size, "Relay reply too large");
            state.reject(&id, format!("reply exceeds {} bytes", max_reply_size));
            return;
        }
        tracing::debug!(
            request_id = %id,
            chunk_index = chunk.chunk_index,
            received = acc.received(),
            total,
            "Relay chunk received"
        );
        if !acc.is_complete() {
            return;
        }

        if let Some(entry) = state.pending.remove(&id) {
            let reply = entry
                .chunks
                .and_then(ChunkAccumulator::assemble)
                .ok_or_else(|| RelayError::InvalidReply("incomplete reply".to_string()));
            // The caller may have stopped waiting; nothing to do then.
            let _ = entry.reply.send(reply);
        }
    }
}

/// Removes the pending entry however the wait ends.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.lock().pending.remove(&self.id);
    }
}

/// Forwards commands to the relay peer and reassembles chunked replies.
///
/// Lifecycle: created, used, disposed. The chunk listener is installed on
/// first use and removed by [`dispose`](Self::dispose) or on drop.
pub struct RelayBridge {
    transport: Arc<dyn RelayTransport>,
    config: RelayConfig,
    shared: Arc<Shared>,
}

impl RelayBridge {
    /// Create a bridge with default timeouts.
    pub fn new(transport: Arc<dyn RelayTransport>) -> Self {
        Self::with_config(transport, RelayConfig::default())
    }

    /// Create a bridge with custom timeouts.
    pub fn with_config(transport: Arc<dyn RelayTransport>, config: RelayConfig) -> Self {
        Self {
            transport,
            config,
            shared: Arc::new(Shared::new(config)),
        }
    }

    /// Timeouts in use.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Forward a command and wait for its reply JSON.
    pub async fn send_command(
        &self,
        command: &str,
        data: Option<String>,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, RelayError> {
        let id = Uuid::new_v4();
        let message = RelayMessage::command(id, command, data);
        tracing::debug!(request_id = %id, command, "Relaying command");
        self.request(message, self.config.request_timeout, cancel)
            .await
    }

    /// Ask the peer for its command catalog.
    pub async fn query_catalog(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<CommandCatalog, RelayError> {
        let message = RelayMessage::catalog_query(Uuid::new_v4());
        let raw = self
            .request(message, self.config.catalog_timeout, cancel)
            .await?;
        serde_json::from_str(&raw).map_err(|e| RelayError::InvalidReply(e.to_string()))
    }

    async fn request(
        &self,
        message: RelayMessage,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> std::result::Result<String, RelayError> {
        let id = message.request_id;
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.shared.lock();
            if state.disposed {
                return Err(RelayError::Disposed);
            }
            if !state.subscribed {
                state.subscribed = true;
                let shared = Arc::downgrade(&self.shared);
                let sink: ChunkSink = Arc::new(move |chunk| {
                    if let Some(shared) = shared.upgrade() {
                        shared.handle_chunk(chunk);
                    }
                });
                self.transport.subscribe(sink);
                tracing::debug!("Relay chunk listener installed");
            }
            state.pending.insert(
                id,
                PendingRelay {
                    reply: tx,
                    chunks: None,
                },
            );
        }
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        self.transport.send(message)?;

        tokio::select! {
            reply = rx => match reply {
                Ok(reply) => reply,
                Err(_) => Err(RelayError::Disposed),
            },
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = %id, "Relay request cancelled");
                Err(RelayError::Cancelled)
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(request_id = %id, ?timeout, "Relay request timed out");
                Err(RelayError::TimedOut(timeout))
            }
        }
    }

    /// Remove the listener and fail every pending request.
    ///
    /// Idempotent. Later requests fail with [`RelayError::Disposed`].
    pub fn dispose(&self) {
        let drained: Vec<PendingRelay> = {
            let mut state = self.shared.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            if state.subscribed {
                state.subscribed = false;
                self.transport.unsubscribe();
            }
            state.pending.drain().map(|(_, entry)| entry).collect()
        };

        if !drained.is_empty() {
            tracing::info!(pending = drained.len(), "Relay bridge disposed with pending requests");
        }
        for entry in drained {
            let _ = entry.reply.send(Err(RelayError::Disposed));
        }
    }

    /// Whether [`dispose`](Self::dispose) has run.
    pub fn is_disposed(&self) -> bool {
        self.shared.lock().disposed
    }

    /// Number of requests awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.shared.lock().pending.len()
    }

    /// Number of pending requests with a partial reply.
    pub fn partial_count(&self) -> usize {
        self.shared
            .lock()
            .pending
            .values()
            .filter(|p| p.chunks.is_some())
            .count()
    }
}

impl Drop for RelayBridge {
    fn drop(&mut self) {
        self.dispose();
    }
}
