/// The 2·W sliding window.
///
/// Bytes `0..strstart + lookahead` are history plus pending input; the match
/// engine may read up to `MAX_MATCH` bytes past the lookahead, so the buffer
/// is kept fully zero-initialized and those reads see zeros instead of
/// uninitialized memory.
#[derive(Debug)]
pub(crate) struct Window {
    buf: Vec<u8>,
    w_size: usize,
}

impl Window {
    pub fn new(window_bits: usize) -> Self {
        let w_size = 1 << window_bits;
        Self {
            buf: vec![0; 2 * w_size],
            w_size,
        }
    }

    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    #[inline(always)]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Move the upper half over the lower half, freeing the upper half for
    /// new input. All window indices held elsewhere must be rebased by
    /// `w_size` afterwards.
    pub fn slide(&mut self) {
        self.buf.copy_within(self.w_size.., 0);
    }
}
