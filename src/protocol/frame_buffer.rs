//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 4 bytes
//! - `WaitingForBody`: Header parsed, need N more body bytes
//!
//! The announced size is checked against the limit as soon as the header
//! is complete, so an oversized frame is rejected before any of its body
//! is buffered.

use bytes::{Bytes, BytesMut};

use super::wire_format::{decode_header, validate_size, HEADER_SIZE, MAX_MESSAGE_SIZE};
use super::Frame;
use crate::error::Result;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for complete header (need 4 bytes).
    WaitingForHeader,
    /// Header parsed, waiting for body bytes.
    WaitingForBody { remaining: u32 },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
    /// Maximum allowed body size.
    max_message_size: u32,
}

impl FrameBuffer {
    /// Create a new frame buffer with the 1 MiB limit.
    pub fn new() -> Self {
        Self::with_max_message_size(MAX_MESSAGE_SIZE)
    }

    /// Create a new frame buffer with a custom limit.
    pub fn with_max_message_size(max_message_size: u32) -> Self {
        Self {
            buffer: BytesMut::with_capacity(16 * 1024),
            state: State::WaitingForHeader,
            max_message_size,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    ///
    /// # Errors
    ///
    /// Returns `FrameTooLarge` if a header announces a body over the limit.
    /// The buffer is unusable afterwards; the connection must be dropped.
    pub fn push(&mut self, data: &[u8]) -> Result<Vec<Frame>> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one()? {
            frames.push(frame);
        }
        Ok(frames)
    }

    fn try_extract_one(&mut self) -> Result<Option<Frame>> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let Some(len) = decode_header(&self.buffer) else {
                        return Ok(None);
                    };
                    validate_size(len, self.max_message_size)?;

                    let _ = self.buffer.split_to(HEADER_SIZE);
                    if len == 0 {
                        return Ok(Some(Frame::new(Bytes::new())));
                    }
                    self.state = State::WaitingForBody { remaining: len };
                }

                State::WaitingForBody { remaining } => {
                    let remaining = remaining as usize;
                    if self.buffer.len() < remaining {
                        return Ok(None);
                    }

                    let body = self.buffer.split_to(remaining).freeze();
                    self.state = State::WaitingForHeader;
                    return Ok(Some(Frame::new(body)));
                }
            }
        }
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether a frame is partially received.
    pub fn has_partial_frame(&self) -> bool {
        matches!(self.state, State::WaitingForBody { .. }) || !self.buffer.is_empty()
    }

    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::protocol::encode_header;

    fn make_frame_bytes(body: &[u8]) -> Vec<u8> {
        let mut bytes = encode_header(body.len() as u32).to_vec();
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(b"hello")).unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"hello");
        assert!(buffer.is_empty());
        assert!(!buffer.has_partial_frame());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();
        let mut combined = make_frame_bytes(b"first");
        combined.extend(make_frame_bytes(b"second"));
        combined.extend(make_frame_bytes(b""));

        let frames = buffer.push(&combined).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].body(), b"first");
        assert_eq!(frames[1].body(), b"second");
        assert!(frames[2].is_empty());
    }

    #[test]
    fn test_fragmented_header_and_body() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(b"a longer body that arrives in pieces");

        assert!(buffer.push(&bytes[..2]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        assert!(buffer.push(&bytes[2..10]).unwrap().is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");
        assert!(buffer.has_partial_frame());

        let frames = buffer.push(&bytes[10..]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].body(), b"a longer body that arrives in pieces");
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let mut all = Vec::new();
        for byte in make_frame_bytes(b"hi") {
            all.extend(buffer.push(&[byte]).unwrap());
        }
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].body(), b"hi");
    }

    #[test]
    fn test_oversized_header_rejected_before_body() {
        let mut buffer = FrameBuffer::new();
        let header = encode_header(MAX_MESSAGE_SIZE + 1);

        let err = buffer.push(&header).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::FrameTooLarge {
                size,
                max: MAX_MESSAGE_SIZE
            } if size == MAX_MESSAGE_SIZE + 1
        ));
    }

    #[test]
    fn test_custom_limit() {
        let mut buffer = FrameBuffer::with_max_message_size(4);
        assert!(buffer.push(&make_frame_bytes(b"1234")).is_ok());
        assert!(buffer.push(&make_frame_bytes(b"12345")).is_err());
    }
}
