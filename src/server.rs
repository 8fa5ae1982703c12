//! Host side: server builder and connection loop.
//!
//! The [`ServerBuilder`] collects command handlers and limits. The
//! [`Server`] manages the lifecycle:
//! 1. Bind the project endpoint
//! 2. Accept connections, up to the concurrency limit
//! 3. Per connection: exchange handshakes, then read request frames and
//!    answer each one in order
//!
//! # Example
//!
//! ```ignore
//! use cmdwire::{transport::endpoint_for_project, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .command("Scene", OpenScene)
//!         .command("Scene", SaveScene)
//!         .build()?;
//!
//!     server.run(&endpoint_for_project(Path::new("."))).await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{BridgeError, Result};
use crate::handler::{
    CommandHandler, CommandRegistry, Dispatcher, ModuleSettings, DEFAULT_REQUEST_TIMEOUT,
};
use crate::protocol::{
    read_handshake, write_frame_with_limit, write_handshake, FrameReader, RequestEnvelope,
    ResponseEnvelope, MAX_MESSAGE_SIZE,
};
use crate::transport::PipeListener;

/// Default maximum concurrent connections.
pub const DEFAULT_MAX_CONCURRENT_CONNECTIONS: usize = 64;

/// Host limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Connections beyond this are closed right after accept.
    pub max_concurrent_connections: usize,
    /// Deadline for one dispatch.
    pub request_timeout: Duration,
    /// Largest frame body accepted or sent.
    pub max_message_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_connections: DEFAULT_MAX_CONCURRENT_CONNECTIONS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_message_size: MAX_MESSAGE_SIZE,
        }
    }
}

/// Builder for configuring and creating a [`Server`].
pub struct ServerBuilder {
    registry: CommandRegistry,
    settings: ModuleSettings,
    config: ServerConfig,
    error: Option<BridgeError>,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            registry: CommandRegistry::new(),
            settings: ModuleSettings::default(),
            config: ServerConfig::default(),
            error: None,
        }
    }

    /// Register a command under a module.
    ///
    /// A duplicate name is reported by [`build`](Self::build).
    pub fn command<H: CommandHandler>(mut self, module: &str, handler: H) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.registry.register(module, handler) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Start with these modules disabled.
    pub fn module_settings(mut self, settings: ModuleSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Set the maximum number of concurrent connections.
    ///
    /// Default: 64
    pub fn max_concurrent_connections(mut self, limit: usize) -> Self {
        self.config.max_concurrent_connections = limit;
        self
    }

    /// Set the per-request deadline.
    ///
    /// Default: 60 seconds
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set the frame size limit.
    ///
    /// Default: 1 MiB
    pub fn max_message_size(mut self, max: u32) -> Self {
        self.config.max_message_size = max;
        self
    }

    /// Build the dispatch table.
    pub fn build(self) -> Result<Server> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let dispatcher =
            Dispatcher::with_timeout(self.registry, self.settings, self.config.request_timeout)?;
        Ok(Server {
            dispatcher,
            config: self.config,
            shutdown: CancellationToken::new(),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A command host.
pub struct Server {
    dispatcher: Arc<Dispatcher>,
    config: ServerConfig,
    shutdown: CancellationToken,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// The dispatcher, e.g. to persist module settings.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Limits in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Token that stops the accept loop and cancels in-flight requests.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop serving.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Bind `endpoint` and serve until shutdown.
    pub async fn run(&self, endpoint: &str) -> Result<()> {
        let listener = PipeListener::bind(endpoint).await?;
        tracing::info!(endpoint, "Host listening");
        self.serve(listener).await
    }

    /// Accept connections from `listener` until shutdown.
    pub async fn serve(&self, listener: PipeListener) -> Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_connections));

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(stream) => {
                        let permit = match semaphore.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                tracing::warn!(
                                    limit = self.config.max_concurrent_connections,
                                    "Connection limit reached, refusing connection"
                                );
                                continue;
                            }
                        };

                        let dispatcher = Arc::clone(&self.dispatcher);
                        let config = self.config.clone();
                        let cancel = self.shutdown.child_token();
                        tokio::spawn(async move {
                            let _permit = permit;
                            tracing::debug!("Connection accepted");
                            log_connection_end(
                                handle_connection(stream, dispatcher, &config, cancel).await,
                            );
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Accept error");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                    }
                },
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    /// Serve one already-connected stream to completion.
    pub async fn serve_connection<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        handle_connection(
            stream,
            Arc::clone(&self.dispatcher),
            &self.config,
            self.shutdown.child_token(),
        )
        .await
    }
}

fn log_connection_end(result: Result<()>) {
    match result {
        Ok(()) | Err(BridgeError::ConnectionClosed) => tracing::debug!("Connection closed"),
        Err(e) if e.is_protocol_fault() => tracing::warn!(error = %e, "Closing connection"),
        Err(e) => tracing::error!(error = %e, "Connection error"),
    }
}

/// Handshake, then answer request frames in order until EOF.
///
/// Every request gets a cancellation token derived from `cancel`. If the
/// client goes away while a request is running, that token fires and the
/// response is dropped.
async fn handle_connection<S>(
    stream: S,
    dispatcher: Arc<Dispatcher>,
    config: &ServerConfig,
    cancel: CancellationToken,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let max = config.max_message_size;
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = FrameReader::with_max_message_size(read_half, max);

    let handshake = read_handshake(reader.get_mut()).await?;
    write_handshake(&mut write_half).await?;

    let warning = handshake.version_warning();
    if let Some(w) = &warning {
        tracing::warn!(client_version = handshake.version, "{}", w);
    }

    loop {
        let frame = tokio::select! {
            next = reader.next_frame() => match next? {
                Some(frame) => frame,
                None => return Ok(()),
            },
            _ = cancel.cancelled() => return Ok(()),
        };

        let request = match RequestEnvelope::decode(&frame) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "Malformed request envelope");
                let response = ResponseEnvelope::failure(format!("Invalid request: {}", e))
                    .with_version_warning(warning.clone());
                write_frame_with_limit(&mut write_half, &response.encode()?, max).await?;
                continue;
            }
        };

        let command = request.command.clone();
        let request_cancel = cancel.child_token();
        let dispatch = dispatcher.dispatch(request, request_cancel.clone());
        tokio::pin!(dispatch);

        // Keep reading while the handler runs so a vanished client cancels it.
        let mut read_error = None;
        let response = loop {
            tokio::select! {
                response = &mut dispatch => break response,
                more = reader.fill(), if !reader.is_eof() && read_error.is_none() => match more {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::debug!(command = %command, "Client disconnected mid-request");
                        request_cancel.cancel();
                    }
                    Err(e) => {
                        request_cancel.cancel();
                        read_error = Some(e);
                    }
                },
            }
        };

        if let Some(e) = read_error {
            return Err(e);
        }
        if reader.is_eof() && request_cancel.is_cancelled() {
            return Ok(());
        }

        let response = response.with_version_warning(warning.clone());
        let mut body = response.encode()?;
        if body.len() > max as usize {
            tracing::warn!(command = %command, size = body.len(), max, "Response exceeds frame limit");
            body = ResponseEnvelope::failure(format!(
                "Response from '{}' exceeds the {} byte frame limit",
                command, max
            ))
            .with_version_warning(warning.clone())
            .encode()?;
        }
        write_frame_with_limit(&mut write_half, &body, max).await?;
    }
}
