//! Error types for cmdwire.

use std::time::Duration;

use thiserror::Error;

/// Main error type for all cmdwire operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// I/O error during socket/pipe operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Peer sent a handshake whose magic bytes don't match ours.
    #[error("Invalid handshake: magic bytes {magic:02x?}")]
    InvalidHandshake {
        /// The four bytes actually received.
        magic: [u8; 4],
    },

    /// A frame header announced a body larger than the limit.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge {
        /// Announced body size.
        size: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Protocol error (truncated frame, bad envelope, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed unexpectedly.
    #[error("Connection closed")]
    ConnectionClosed,

    /// No handler for the given command name.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Two handlers registered under the same name.
    #[error("Command '{name}' from module '{module}' is already registered by module '{existing_module}'")]
    DuplicateCommand {
        /// Command name.
        name: String,
        /// Module that registered it first.
        existing_module: String,
        /// Module that tried to register it again.
        module: String,
    },

    /// Enable/disable named a module with no registered commands.
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    /// The module cannot be disabled.
    #[error("Module '{0}' is built in and cannot be disabled")]
    ProtectedModule(String),

    /// Relay bridge failure.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// An operation did not complete within its deadline.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl BridgeError {
    /// Whether this error must tear the connection down.
    ///
    /// Protocol faults are never retried and never folded into a response
    /// envelope.
    pub fn is_protocol_fault(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidHandshake { .. }
                | BridgeError::FrameTooLarge { .. }
                | BridgeError::Protocol(_)
        )
    }
}

/// Failures of a relayed request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// The caller's cancellation signal fired before the peer replied.
    #[error("Relay request was cancelled before the peer replied")]
    Cancelled,

    /// The peer did not reply in time.
    #[error("Relay peer did not reply within {0:?}")]
    TimedOut(Duration),

    /// The bridge was disposed while the request was outstanding.
    #[error("Relay bridge has been disposed")]
    Disposed,

    /// The side channel refused the outgoing message.
    #[error("Relay send failed: {0}")]
    Send(String),

    /// The reassembled reply could not be interpreted.
    #[error("Invalid relay reply: {0}")]
    InvalidReply(String),
}

/// Result type alias using BridgeError.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_fault_classification() {
        assert!(BridgeError::InvalidHandshake { magic: [0; 4] }.is_protocol_fault());
        assert!(BridgeError::FrameTooLarge { size: 2, max: 1 }.is_protocol_fault());
        assert!(BridgeError::Protocol("bad".into()).is_protocol_fault());

        assert!(!BridgeError::ConnectionClosed.is_protocol_fault());
        assert!(!BridgeError::UnknownCommand("Foo".into()).is_protocol_fault());
        assert!(!BridgeError::Relay(RelayError::Cancelled).is_protocol_fault());
    }

    #[test]
    fn test_relay_messages_are_distinct_from_transport_failures() {
        let timed_out = RelayError::TimedOut(Duration::from_secs(10)).to_string();
        assert!(timed_out.contains("did not reply"));
        assert!(!timed_out.to_lowercase().contains("connection"));
    }
}
