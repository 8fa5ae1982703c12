//! Reassembly of chunked relay replies.

/// Collects the chunks of one reply until every index has arrived.
///
/// Each index is written at most once; a duplicate is dropped rather than
/// overwriting the first copy. Indices outside `0..total` are ignored.
#[derive(Debug, Clone)]
pub struct ChunkAccumulator {
    slots: Vec<Option<String>>,
    received: usize,
    bytes: usize,
}

impl ChunkAccumulator {
    /// Create an accumulator expecting `total` chunks.
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
            received: 0,
            bytes: 0,
        }
    }

    /// Number of chunks the reply is split into.
    #[inline]
    pub fn total(&self) -> usize {
        self.slots.len()
    }

    /// Number of distinct chunks received so far.
    #[inline]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Combined length of the chunks received so far.
    #[inline]
    pub fn byte_len(&self) -> usize {
        self.bytes
    }

    /// Record a chunk. Returns `false` if it was a duplicate or out of range.
    pub fn add(&mut self, index: usize, data: String) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                self.bytes += data.len();
                *slot = Some(data);
                self.received += 1;
                true
            }
            _ => false,
        }
    }

    /// Whether every chunk has arrived.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.received == self.slots.len()
    }

    /// Concatenate the chunks in index order.
    ///
    /// Returns `None` while the reply is incomplete.
    pub fn assemble(self) -> Option<String> {
        if !self.is_complete() {
            return None;
        }
        let mut out = String::with_capacity(self.bytes);
        for chunk in self.slots.into_iter().flatten() {
            out.push_str(&chunk);
        }
        Some(out)
    }
}
