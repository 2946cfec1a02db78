/// Output staging buffer.
///
/// Compressed bytes are appended here by the bit sink and the stored-block
/// writer, and drained to the caller's output by `flush_pending`. The
/// capacity is fixed at construction (4 times the symbol-buffer size), which
/// the block assembler relies on: a full block plus its flush markers always
/// fits when emission starts with an empty buffer.
pub(crate) struct Pending {
    buf: Vec<u8>,
    /// next pending byte to output to the stream
    out: usize,
    /// number of bytes in the pending buffer
    pending: usize,
}

impl Pending {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            out: 0,
            pending: 0,
        }
    }

    pub fn reset_keep(&mut self) {
        // keep the allocation as it is
        self.out = 0;
        self.pending = 0;
    }

    pub fn pending(&self) -> &[u8] {
        &self.buf[self.out..][..self.pending]
    }

    /// Number of bytes that can be added until the buffer is full
    pub fn remaining(&self) -> usize {
        self.buf.len() - (self.out + self.pending)
    }

    /// Total number of bytes the buffer can hold
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Mark a number of pending bytes as no longer pending
    #[inline(always)]
    pub fn advance(&mut self, number_of_bytes: usize) {
        debug_assert!(self.pending >= number_of_bytes);

        self.out += number_of_bytes;
        self.pending -= number_of_bytes;

        if self.pending == 0 {
            self.out = 0;
        }
    }

    #[inline(always)]
    pub fn extend(&mut self, bytes: &[u8]) {
        assert!(
            self.remaining() >= bytes.len(),
            "pending buffer overflow: {} bytes into {} remaining",
            bytes.len(),
            self.remaining()
        );

        self.buf[self.out + self.pending..][..bytes.len()].copy_from_slice(bytes);
        self.pending += bytes.len();
    }
}
