//! Growable byte region with a fill level and a consume cursor.
//!
//! Both the compressed file buffers and the decompressed data buffer share
//! this shape: bytes in `[cursor, cap)` are unconsumed, bytes above `cap`
//! are free capacity. Refilling a buffer first relocates the unconsumed
//! residual to offset 0 so that appended bytes stay contiguous.

/// A byte buffer with explicit fill level (`cap`) and read cursor.
///
/// Invariant: `cursor <= cap <= buf.len()`.
#[derive(Default)]
pub(crate) struct ByteBuffer {
    buf: Vec<u8>,
    cap: usize,
    cursor: usize,
}

impl ByteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill level: one past the last valid byte.
    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Read cursor: offset of the next unconsumed byte.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of unconsumed bytes, `cap - cursor`.
    pub fn remaining(&self) -> usize {
        self.cap - self.cursor
    }

    pub fn is_drained(&self) -> bool {
        self.cursor >= self.cap
    }

    /// Advance the cursor past `n` consumed bytes.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.cursor + n <= self.cap);
        self.cursor += n;
    }

    /// Mark `n` freshly written bytes past the fill level as valid.
    pub fn advance_cap(&mut self, n: usize) {
        debug_assert!(self.cap + n <= self.buf.len());
        self.cap += n;
    }

    /// The unconsumed region `[cursor, cap)`.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buf[self.cursor..self.cap]
    }

    /// The filled region `[0, cap)`.
    pub fn filled(&self) -> &[u8] {
        &self.buf[..self.cap]
    }

    /// Writable space beyond the fill level, after growing the backing
    /// vector to hold `total` bytes overall.
    pub fn spare_mut(&mut self, total: usize) -> &mut [u8] {
        self.ensure_len(total);
        &mut self.buf[self.cap..total]
    }

    /// Mutable view of a region that was reserved with [`Self::spare_mut`]
    /// and is about to be committed via [`Self::advance_cap`].
    pub fn region_mut(&mut self, start: usize, end: usize) -> &mut [u8] {
        self.ensure_len(end);
        &mut self.buf[start..end]
    }

    /// Move the unconsumed residual to offset 0 and reset the cursor.
    ///
    /// This is the single relocation primitive shared by the file and data
    /// buffers; everything upstream of the cursor is discarded.
    pub fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        if self.cursor < self.cap {
            self.buf.copy_within(self.cursor..self.cap, 0);
            self.cap -= self.cursor;
        } else {
            self.cap = 0;
        }
        self.cursor = 0;
    }

    fn ensure_len(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }
}
