//! Frame struct and frame building.
//!
//! A frame is one length-prefixed message body. Uses `bytes::Bytes` for
//! zero-copy body sharing.
//!
//! # Example
//!
//! ```
//! use cmdwire::protocol::{build_frame, Frame, HEADER_SIZE};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(Bytes::from_static(b"{}"));
//! assert_eq!(frame.len(), 2);
//!
//! let bytes = build_frame(b"{}").unwrap();
//! assert_eq!(bytes.len(), HEADER_SIZE + 2);
//! ```

use bytes::Bytes;

use super::wire_format::{encode_header, validate_size, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::error::{BridgeError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Body bytes (zero-copy via `bytes::Bytes`).
    pub body: Bytes,
}

impl Frame {
    /// Create a new frame from body bytes.
    pub fn new(body: Bytes) -> Self {
        Self { body }
    }

    /// Get a reference to the body bytes.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body length.
    #[inline]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Build a complete frame (header + body) as a single byte vector.
///
/// Fails with `FrameTooLarge` if the body exceeds 1 MiB.
pub fn build_frame(body: &[u8]) -> Result<Vec<u8>> {
    build_frame_with_limit(body, MAX_MESSAGE_SIZE)
}

/// Build a frame against a custom size limit.
pub fn build_frame_with_limit(body: &[u8], max: u32) -> Result<Vec<u8>> {
    let len = u32::try_from(body.len()).map_err(|_| BridgeError::FrameTooLarge {
        size: u32::MAX,
        max,
    })?;
    validate_size(len, max)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
    buf.extend_from_slice(&encode_header(len));
    buf.extend_from_slice(body);
    Ok(buf)
}
