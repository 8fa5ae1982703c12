//! Handshake and frame header encoding.
//!
//! Every connection starts with a 6-byte handshake sent by each side:
//! ```text
//! ┌───────────────┬──────────┐
//! │ Magic         │ Version  │
//! │ 4 bytes "CWB1"│ u16 LE   │
//! └───────────────┴──────────┘
//! ```
//!
//! After the handshake, every message is a frame:
//! ```text
//! ┌──────────┬─────────────────────┐
//! │ Length   │ Body (UTF-8 JSON)   │
//! │ u32 LE   │ Length bytes        │
//! └──────────┴─────────────────────┘
//! ```

use crate::error::{BridgeError, Result};

/// Magic bytes identifying a cmdwire peer.
pub const MAGIC: [u8; 4] = *b"CWB1";

/// Protocol version carried in the handshake.
pub const PROTOCOL_VERSION: u16 = 1;

/// Handshake size in bytes (magic + version).
pub const HANDSHAKE_SIZE: usize = 6;

/// Frame header size in bytes.
pub const HEADER_SIZE: usize = 4;

/// Maximum size of one encoded message (1 MiB).
pub const MAX_MESSAGE_SIZE: u32 = 1024 * 1024;

/// Decoded connection handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Magic bytes as received.
    pub magic: [u8; 4],
    /// Peer protocol version.
    pub version: u16,
}

impl Handshake {
    /// Our own handshake.
    pub fn current() -> Self {
        Self {
            magic: MAGIC,
            version: PROTOCOL_VERSION,
        }
    }

    /// Encode to the 6 wire bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use cmdwire::protocol::Handshake;
    ///
    /// let bytes = Handshake::current().encode();
    /// assert_eq!(&bytes[..4], b"CWB1");
    /// assert_eq!(bytes.len(), 6);
    /// ```
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut buf = [0u8; HANDSHAKE_SIZE];
        buf[0..4].copy_from_slice(&self.magic);
        buf[4..6].copy_from_slice(&self.version.to_le_bytes());
        buf
    }

    /// Decode from bytes without validating.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HANDSHAKE_SIZE {
            return None;
        }
        Some(Self {
            magic: [buf[0], buf[1], buf[2], buf[3]],
            version: u16::from_le_bytes([buf[4], buf[5]]),
        })
    }

    /// Check the magic bytes. The version never causes a rejection.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(BridgeError::InvalidHandshake { magic: self.magic });
        }
        Ok(())
    }

    /// Whether the peer speaks a different protocol version.
    #[inline]
    pub fn is_version_mismatch(&self) -> bool {
        self.version != PROTOCOL_VERSION
    }

    /// Warning attached to responses when versions differ.
    pub fn version_warning(&self) -> Option<String> {
        self.is_version_mismatch().then(|| {
            format!(
                "Protocol version mismatch: client speaks v{}, server speaks v{}. Update the older side.",
                self.version, PROTOCOL_VERSION
            )
        })
    }
}

/// Build our 6-byte handshake.
#[inline]
pub fn build_handshake() -> [u8; HANDSHAKE_SIZE] {
    Handshake::current().encode()
}

/// Check only the magic bytes of a received handshake.
///
/// Returns `false` for short buffers.
pub fn validate_handshake(buf: &[u8]) -> bool {
    Handshake::decode(buf).is_some_and(|h| h.validate().is_ok())
}

/// Encode a frame header for a body of `len` bytes.
#[inline]
pub fn encode_header(len: u32) -> [u8; HEADER_SIZE] {
    len.to_le_bytes()
}

/// Decode a frame header.
///
/// Returns `None` if buffer is too short.
#[inline]
pub fn decode_header(buf: &[u8]) -> Option<u32> {
    if buf.len() < HEADER_SIZE {
        return None;
    }
    Some(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}

/// Reject a body size over `max`.
pub fn validate_size(size: u32, max: u32) -> Result<()> {
    if size > max {
        return Err(BridgeError::FrameTooLarge { size, max });
    }
    Ok(())
}
