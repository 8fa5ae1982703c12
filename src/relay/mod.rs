//! Relay module - forwarding commands to a second runtime peer.
//!
//! The peer is reachable only over a side channel with a small message
//! limit, so its replies arrive in numbered chunks that are reassembled
//! here before the waiting caller is woken.
//!
//! # Example
//!
//! ```ignore
//! use cmdwire::relay::{ChannelRelayTransport, RelayBridge, RelayedCommand};
//!
//! let (transport, peer) = ChannelRelayTransport::pair();
//! let bridge = Arc::new(RelayBridge::new(Arc::new(transport)));
//! registry.register("Peer", RelayedCommand::new("Peer.Build", bridge))?;
//! ```

mod accumulator;
mod bridge;
mod handler;
mod message;
mod transport;

pub use accumulator::ChunkAccumulator;
pub use bridge::{
    RelayBridge, RelayConfig, DEFAULT_MAX_RELAY_CHUNKS, MAX_RELAY_TIMEOUT, MIN_RELAY_TIMEOUT,
};
pub use handler::RelayedCommand;
pub use message::{split_into_chunks, RelayChunk, RelayMessage};
pub use transport::{ChannelRelayTransport, ChunkSink, RelayPeer, RelayTransport};
