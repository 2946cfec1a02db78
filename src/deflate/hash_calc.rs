use crate::deflate::{State, STD_MIN_MATCH};

/// The 3-byte rolling hash and hash-chain insertion.
///
/// `ins_h` always covers `window[pos..pos + 3]` for the position about to be
/// inserted; pushing one more byte through `update_hash` rolls it forward by
/// one position. The table sizes depend on `mem_level`, so shift and mask
/// live in the state rather than in constants.
impl State {
    #[inline(always)]
    pub(crate) fn update_hash(&self, h: usize, byte: u8) -> usize {
        ((h << self.hash_shift) ^ byte as usize) & self.hash_mask
    }

    /// Seed `ins_h` with the first two bytes at `pos`; the third byte enters
    /// through `insert_string`.
    #[inline]
    pub(crate) fn init_hash(&mut self, pos: usize) {
        let b0 = self.window.bytes()[pos];
        let b1 = self.window.bytes()[pos + 1];
        self.ins_h = self.update_hash(b0 as usize, b1);
    }

    /// Insert the string starting at `pos` into the hash table and return the
    /// previous head of its chain (0 when the chain was empty).
    #[inline(always)]
    pub(crate) fn insert_string(&mut self, pos: usize) -> u16 {
        let byte = self.window.bytes()[pos + STD_MIN_MATCH - 1];
        self.ins_h = self.update_hash(self.ins_h, byte);

        let head = self.head[self.ins_h];
        self.prev[pos & self.w_mask] = head;
        self.head[self.ins_h] = pos as u16;

        head
    }
}
