//! Async helpers for reading and writing handshakes and frames.

use std::collections::VecDeque;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::wire_format::{build_handshake, Handshake, HANDSHAKE_SIZE, MAX_MESSAGE_SIZE};
use super::{build_frame_with_limit, Frame, FrameBuffer};
use crate::error::{BridgeError, Result};

/// Send our handshake.
pub async fn write_handshake<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_all(&build_handshake()).await?;
    writer.flush().await?;
    Ok(())
}

/// Read the peer's handshake and validate its magic bytes.
///
/// Nothing past the 6 handshake bytes is read, so a foreign peer is
/// refused before any payload is parsed.
pub async fn read_handshake<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Handshake> {
    let mut buf = [0u8; HANDSHAKE_SIZE];
    match reader.read_exact(&mut buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(BridgeError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }

    let handshake = Handshake::decode(&buf).ok_or(BridgeError::ConnectionClosed)?;
    handshake.validate()?;
    Ok(handshake)
}

/// Write one frame and flush.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, body: &[u8]) -> Result<()> {
    write_frame_with_limit(writer, body, MAX_MESSAGE_SIZE).await
}

/// Write one frame against a custom size limit.
pub async fn write_frame_with_limit<W: AsyncWrite + Unpin>(
    writer: &mut W,
    body: &[u8],
    max: u32,
) -> Result<()> {
    let bytes = build_frame_with_limit(body, max)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Frame-at-a-time reader over an async byte stream.
///
/// Both [`fill`](Self::fill) and [`next_frame`](Self::next_frame) are
/// cancel-safe: the only await point is the underlying read.
pub struct FrameReader<R> {
    reader: R,
    buffer: FrameBuffer,
    ready: VecDeque<Frame>,
    scratch: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with the default 1 MiB limit.
    pub fn new(reader: R) -> Self {
        Self::with_max_message_size(reader, MAX_MESSAGE_SIZE)
    }

    /// Wrap a reader with a custom limit.
    pub fn with_max_message_size(reader: R, max: u32) -> Self {
        Self {
            reader,
            buffer: FrameBuffer::with_max_message_size(max),
            ready: VecDeque::new(),
            scratch: vec![0u8; 16 * 1024],
            eof: false,
        }
    }

    /// Access the underlying reader (e.g. to read the handshake first).
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    /// Perform one read and buffer any complete frames.
    ///
    /// Returns `false` once the stream has reached EOF.
    pub async fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let n = self.reader.read(&mut self.scratch).await?;
        if n == 0 {
            self.eof = true;
            return Ok(false);
        }
        let frames = self.buffer.push(&self.scratch[..n])?;
        self.ready.extend(frames);
        Ok(true)
    }

    /// Next complete frame.
    ///
    /// Returns `Ok(None)` on a clean EOF between frames and
    /// `ConnectionClosed` if the stream ends mid-frame.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.ready.pop_front() {
                return Ok(Some(frame));
            }
            if !self.fill().await? {
                if self.buffer.has_partial_frame() {
                    return Err(BridgeError::ConnectionClosed);
                }
                return Ok(None);
            }
        }
    }

    /// Whether EOF has been observed.
    pub fn is_eof(&self) -> bool {
        self.eof
    }
}
