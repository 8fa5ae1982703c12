//! Messages exchanged with the relay peer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outgoing request to the relay peer.
///
/// A message without `command` is a catalog query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    /// Correlation id echoed in every reply chunk.
    pub request_id: Uuid,
    /// Command to run on the peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Request JSON for the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl RelayMessage {
    /// A command request.
    pub fn command(request_id: Uuid, command: impl Into<String>, data: Option<String>) -> Self {
        Self {
            request_id,
            command: Some(command.into()),
            data,
        }
    }

    /// A catalog query.
    pub fn catalog_query(request_id: Uuid) -> Self {
        Self {
            request_id,
            command: None,
            data: None,
        }
    }

    /// Whether this is a catalog query.
    pub fn is_catalog_query(&self) -> bool {
        self.command.is_none()
    }
}

/// One piece of a reply from the relay peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayChunk {
    /// Request this chunk answers.
    pub request_id: Uuid,
    /// Position in byte order, starting at 0.
    pub chunk_index: u32,
    /// Number of chunks in the reply.
    pub total_chunks: u32,
    /// Chunk text.
    pub data: String,
}

/// Split a reply into chunks of at most `max_chunk_len` bytes.
///
/// Chunks are numbered in byte order and never split a UTF-8 character. A
/// character wider than `max_chunk_len` gets a chunk of its own. An empty
/// payload yields a single empty chunk.
pub fn split_into_chunks(request_id: Uuid, payload: &str, max_chunk_len: usize) -> Vec<RelayChunk> {
    let max = max_chunk_len.max(1);
    let mut pieces = Vec::new();
    let mut rest = payload;

    while !rest.is_empty() {
        let mut end = rest.len().min(max);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
        }
        let (head, tail) = rest.split_at(end);
        pieces.push(head);
        rest = tail;
    }
    if pieces.is_empty() {
        pieces.push("");
    }

    let total = pieces.len() as u32;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, data)| RelayChunk {
            request_id,
            chunk_index: i as u32,
            total_chunks: total,
            data: data.to_string(),
        })
        .collect()
}
