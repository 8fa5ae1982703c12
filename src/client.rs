//! Client side: one request per connection, with retry.
//!
//! Each attempt connects, exchanges handshakes, sends one request and reads
//! one response. Transport failures are folded into failure envelopes so
//! the retry classifier can decide on them; protocol faults are returned as
//! errors and never retried.
//!
//! # Example
//!
//! ```ignore
//! use cmdwire::{BridgeClient, RequestEnvelope};
//!
//! let client = BridgeClient::for_project(Path::new("/work/game"));
//! let response = client.send(&RequestEnvelope::new("ping")).await?;
//! ```

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{BridgeError, Result};
use crate::handler::LIST_COMMAND;
use crate::protocol::{
    read_handshake, write_frame, write_handshake, FrameReader, RequestEnvelope, ResponseEnvelope,
    PROTOCOL_VERSION,
};
use crate::retry::{communication_error, RetryPolicy, CONNECTION_CLOSED_MESSAGE};
use crate::schema::CommandCatalog;
use crate::transport::{connect, endpoint_for_project};

/// Client timeouts and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// How long to wait for the host to accept.
    pub connect_timeout: Duration,
    /// How long to wait for the response once the request is sent.
    pub response_timeout: Duration,
    /// Retry policy for transient failures.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            response_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// Sends requests to the host listening on one endpoint.
#[derive(Debug, Clone)]
pub struct BridgeClient {
    endpoint: String,
    config: ClientConfig,
}

impl BridgeClient {
    /// Client for an explicit endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: ClientConfig::default(),
        }
    }

    /// Client for the host serving the project at `root`.
    pub fn for_project(root: &Path) -> Self {
        Self::new(endpoint_for_project(root))
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Endpoint in use.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Configuration in use.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request, retrying transient failures.
    ///
    /// Returns the last response when retries run out. `Err` only for
    /// protocol faults and local encoding errors.
    pub async fn send(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let mut attempt = 1;
        loop {
            let response = self.send_once(request).await?;
            if response.success || !self.config.retry.should_retry(attempt, &response.message) {
                return Ok(response);
            }
            tracing::debug!(
                command = %request.command,
                attempt,
                message = %response.message,
                "Transient failure, retrying"
            );
            tokio::time::sleep(self.config.retry.delay).await;
            attempt += 1;
        }
    }

    /// One attempt: connect, handshake, request, response.
    pub async fn send_once(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        let stream =
            match tokio::time::timeout(self.config.connect_timeout, connect(&self.endpoint)).await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => return Ok(ResponseEnvelope::failure(communication_error(e))),
                Err(_) => {
                    return Ok(ResponseEnvelope::failure(communication_error(format!(
                        "no host accepted on {} within {:?}",
                        self.endpoint, self.config.connect_timeout
                    ))))
                }
            };

        match tokio::time::timeout(self.config.response_timeout, exchange(stream, request)).await
        {
            Ok(result) => fold_transport_error(result),
            Err(_) => Ok(ResponseEnvelope::failure(format!(
                "Timed out waiting for a response to '{}' after {:?}",
                request.command, self.config.response_timeout
            ))),
        }
    }

    /// Fetch the host's command catalog.
    pub async fn catalog(&self) -> Result<CommandCatalog> {
        let response = self.send(&RequestEnvelope::new(LIST_COMMAND)).await?;
        if !response.success {
            return Err(BridgeError::Protocol(format!(
                "catalog request failed: {}",
                response.message
            )));
        }
        Ok(serde_json::from_str(&response.data)?)
    }
}

/// Turn transport errors into failure envelopes; keep protocol faults.
fn fold_transport_error(result: Result<ResponseEnvelope>) -> Result<ResponseEnvelope> {
    match result {
        Ok(response) => Ok(response),
        Err(BridgeError::ConnectionClosed) => {
            Ok(ResponseEnvelope::failure(CONNECTION_CLOSED_MESSAGE))
        }
        Err(BridgeError::Io(e)) => Ok(ResponseEnvelope::failure(communication_error(e))),
        Err(e) => Err(e),
    }
}

/// Handshake and one request/response over a connected stream.
pub async fn exchange<S>(mut stream: S, request: &RequestEnvelope) -> Result<ResponseEnvelope>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    write_handshake(&mut stream).await?;
    let handshake = read_handshake(&mut stream).await?;
    if handshake.is_version_mismatch() {
        tracing::warn!(
            host_version = handshake.version,
            client_version = PROTOCOL_VERSION,
            "Protocol version mismatch with host"
        );
    }

    write_frame(&mut stream, &request.encode()?).await?;

    let mut reader = FrameReader::new(&mut stream);
    let frame = reader
        .next_frame()
        .await?
        .ok_or(BridgeError::ConnectionClosed)?;

    ResponseEnvelope::decode(&frame)
        .map_err(|e| BridgeError::Protocol(format!("malformed response envelope: {}", e)))
}
