//! # cmdwire
//!
//! Socket command bridge between a thin CLI client and a long-running host
//! process, such as an editor that exposes automation commands.
//!
//! ## Architecture
//!
//! - **Wire** (Unix socket / named pipe per project): 6-byte handshake,
//!   then 4-byte length-prefixed JSON envelopes, one request and one
//!   response per exchange
//! - **Host**: a registry of typed command handlers grouped in modules and
//!   a dispatcher whose table is rebuilt whole when a module is toggled
//! - **Client**: compiles CLI arguments into request JSON using the host's
//!   catalog and retries transport faults
//! - **Relay**: forwards commands to a second runtime over a
//!   size-limited side channel and reassembles chunked replies
//!
//! ## Example
//!
//! ```ignore
//! use cmdwire::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .command("Scene", OpenScene)
//!         .build()?;
//!
//!     server.run(&cmdwire::transport::endpoint_for_project(".".as_ref())).await?;
//!     Ok(())
//! }
//! ```

pub mod args;
pub mod codec;
pub mod error;
pub mod handler;
pub mod project;
pub mod protocol;
pub mod relay;
pub mod retry;
pub mod schema;
pub mod transport;

mod client;
mod server;

pub use client::{exchange, BridgeClient, ClientConfig};
pub use error::{BridgeError, RelayError, Result};
pub use handler::{CommandContext, CommandError, CommandHandler, Dispatcher, ModuleSettings};
pub use protocol::{OutputFormat, RequestEnvelope, ResponseEnvelope};
pub use server::{Server, ServerBuilder, ServerConfig, DEFAULT_MAX_CONCURRENT_CONNECTIONS};
