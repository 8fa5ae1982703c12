//! Protocol module - handshake, framing, and envelopes.
//!
//! This module implements the wire protocol between client and host:
//! - 6-byte handshake (magic + little-endian version)
//! - 4-byte little-endian length prefix per message, 1 MiB cap
//! - Frame buffer for accumulating partial reads
//! - JSON request/response envelopes

mod envelope;
mod frame;
mod frame_buffer;
mod io;
mod wire_format;

pub use envelope::{OutputFormat, RequestEnvelope, ResponseEnvelope, SERVER_VERSION};
pub use frame::{build_frame, build_frame_with_limit, Frame};
pub use frame_buffer::FrameBuffer;
pub use io::{
    read_handshake, write_frame, write_frame_with_limit, write_handshake, FrameReader,
};
pub use wire_format::{
    build_handshake, decode_header, encode_header, validate_handshake, validate_size, Handshake,
    HANDSHAKE_SIZE, HEADER_SIZE, MAGIC, MAX_MESSAGE_SIZE, PROTOCOL_VERSION,
};
