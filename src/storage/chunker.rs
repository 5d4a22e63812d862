//! Block-size accumulator that feeds the multipart writer.
//!
//! Incoming bytes are buffered and drained as parts of exactly the
//! configured block size; whatever is left when the stream ends is
//! taken as an undersized final part.

pub(crate) struct PartBuffer {
    block_size: usize,
    buf: Vec<u8>,
}

impl PartBuffer {
    pub(crate) fn new(block_size: usize) -> Self {
        Self {
            // A zero block size would never flush; clamp to one byte.
            block_size: block_size.max(1),
            buf: Vec::new(),
        }
    }

    /// Append bytes to the accumulator.
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Copy of the leading full block, if one is buffered. The block
    /// stays in place until [`pop_block`](Self::pop_block) discards it,
    /// so a caller whose upload fails keeps the bytes it never shipped.
    pub(crate) fn first_block(&self) -> Option<Vec<u8>> {
        (self.buf.len() >= self.block_size).then(|| self.buf[..self.block_size].to_vec())
    }

    /// Discard the leading full block once the caller has shipped it.
    pub(crate) fn pop_block(&mut self) {
        if self.buf.len() >= self.block_size {
            self.buf.drain(..self.block_size);
        }
    }

    /// Take whatever is buffered. Only valid as the final part.
    pub(crate) fn take_remainder(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
