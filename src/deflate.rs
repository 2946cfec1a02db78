//! The DEFLATE compression engine.
//!
//! A [`DeflateStream`] owns the sliding window, the hash chains, the
//! per-block symbol buffer and the staged output. Each [`DeflateStream::deflate`]
//! call advances as far as the provided input and output slices allow and
//! leaves every intermediate value in the session, so the stream can be
//! driven with chunks of any size.

use crate::{
    adler32::adler32, trace, Flush, ReturnCode, StreamResult, ADLER32_INITIAL_VALUE,
    DEFAULT_COMPRESSION, MAX_WBITS, MIN_WBITS,
};

use self::{
    pending::Pending,
    sym_buf::SymBuf,
    trees_tbl::{
        BASE_DIST, BASE_LENGTH, BL_ORDER, DIST_CODE, EXTRA_BLBITS, EXTRA_DBITS, EXTRA_LBITS,
        LENGTH_CODE, STATIC_DTREE, STATIC_LTREE,
    },
    window::Window,
};

mod algorithm;
mod hash_calc;
mod longest_match;
mod pending;
mod slide_hash;
mod sym_buf;
mod trees_tbl;
mod window;

/// Maximum value for mem_level
const MAX_MEM_LEVEL: i32 = 9;
const DEF_MEM_LEVEL: i32 = 8;

/// number of length codes, not counting the special END_BLOCK code
pub(crate) const LENGTH_CODES: usize = 29;

/// number of literal bytes 0..255
const LITERALS: usize = 256;

/// number of Literal or Length codes, including the END_BLOCK code
pub(crate) const L_CODES: usize = LITERALS + 1 + LENGTH_CODES;

/// number of distance codes
pub(crate) const D_CODES: usize = 30;

/// number of codes used to transfer the bit lengths
pub(crate) const BL_CODES: usize = 19;

/// maximum heap size
const HEAP_SIZE: usize = 2 * L_CODES + 1;

/// all codes must not exceed MAX_BITS bits
pub(crate) const MAX_BITS: usize = 15;

/// Bit length codes must not exceed MAX_BL_BITS bits
const MAX_BL_BITS: usize = 7;

/// end of block literal code
const END_BLOCK: usize = 256;

/// The minimum match length mandated by the deflate standard
pub(crate) const STD_MIN_MATCH: usize = 3;
/// The maximum match length mandated by the deflate standard
pub(crate) const STD_MAX_MATCH: usize = 258;

pub(crate) const MIN_LOOKAHEAD: usize = STD_MAX_MATCH + STD_MIN_MATCH + 1;

/// Maximum stored block length in deflate format (not including header).
pub(crate) const MAX_STORED: usize = 65535;

/// Matches of length 3 at distances beyond this are emitted as literals by
/// the lazy evaluator; such matches cost more bits than they save.
pub(crate) const TOO_FAR: usize = 4096;

/// Size of the 16-bit output accumulator, in bits
const BIT_BUF_SIZE: u8 = 16;

/// The deflate compression method, the only one defined by RFC 1950
const Z_DEFLATED: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "__internal-fuzz", derive(arbitrary::Arbitrary))]
pub struct DeflateConfig {
    pub level: i32,
    pub window_bits: i32,
    pub mem_level: i32,
    pub strategy: Strategy,
}

impl DeflateConfig {
    pub fn new(level: i32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_COMPRESSION,
            window_bits: MAX_WBITS,
            mem_level: DEF_MEM_LEVEL,
            strategy: Strategy::Default,
        }
    }
}

#[cfg(any(test, feature = "__internal-test"))]
impl quickcheck::Arbitrary for DeflateConfig {
    fn arbitrary(g: &mut quickcheck::Gen) -> Self {
        let levels: Vec<i32> = (0..=9).collect();
        let mem_levels: Vec<i32> = (1..=9).collect();
        let window_bits: Vec<i32> = (-15..=-9).chain(9..=15).collect();

        Self {
            level: *g.choose(&levels).unwrap(),
            window_bits: *g.choose(&window_bits).unwrap(),
            mem_level: *g.choose(&mem_levels).unwrap(),
            strategy: *g
                .choose(&[Strategy::Default, Strategy::Filtered, Strategy::HuffmanOnly])
                .unwrap(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "__internal-fuzz", derive(arbitrary::Arbitrary))]
pub enum Strategy {
    #[default]
    Default = 0,
    /// Favor Huffman coding: suppress short matches, which in filtered data
    /// (e.g. PNG-style deltas) are mostly noise.
    Filtered = 1,
    /// Huffman coding only, no match search at all.
    HuffmanOnly = 2,
}

impl TryFrom<i32> for Strategy {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Strategy::Default),
            1 => Ok(Strategy::Filtered),
            2 => Ok(Strategy::HuffmanOnly),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Binary = 0,
    Text = 1,
    Unknown = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Init,
    Busy,
    Finish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockState {
    /// block not completed, need more input or more output
    NeedMore = 0,
    /// block flush performed
    BlockDone = 1,
    /// finish started, need only more output at next deflate
    FinishStarted = 2,
    /// finish done, accept no more input or output
    FinishDone = 3,
}

pub(crate) enum BlockType {
    StoredBlock = 0,
    StaticTrees = 1,
    DynamicTrees = 2,
}

/// One (freq, code) / (dad, len) cell of a tree under construction. The
/// first field is a frequency while counting and a code once built; the
/// second is the parent during construction and the code length afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CtData {
    fc: u16,
    dl: u16,
}

impl CtData {
    pub(crate) const fn new(fc: u16, dl: u16) -> Self {
        Self { fc, dl }
    }

    #[inline(always)]
    pub(crate) const fn freq(self) -> u16 {
        self.fc
    }

    #[inline(always)]
    pub(crate) const fn code(self) -> u16 {
        self.fc
    }

    #[inline(always)]
    pub(crate) const fn dad(self) -> u16 {
        self.dl
    }

    #[inline(always)]
    pub(crate) const fn len(self) -> u16 {
        self.dl
    }

    pub(crate) fn freq_mut(&mut self) -> &mut u16 {
        &mut self.fc
    }

    pub(crate) fn code_mut(&mut self) -> &mut u16 {
        &mut self.fc
    }

    pub(crate) fn dad_mut(&mut self) -> &mut u16 {
        &mut self.dl
    }

    pub(crate) fn len_mut(&mut self) -> &mut u16 {
        &mut self.dl
    }
}

pub(crate) struct StaticTreeDesc {
    /// static tree, or empty when the alphabet has none
    static_tree: &'static [CtData],
    /// extra bits per code
    extra_bits: &'static [u8],
    /// first code with extra bits
    extra_base: usize,
    /// number of elements in the alphabet
    elems: usize,
    /// longest permitted code
    max_length: u16,
}

impl StaticTreeDesc {
    const EMPTY: Self = Self {
        static_tree: &[],
        extra_bits: &[],
        extra_base: 0,
        elems: 0,
        max_length: 0,
    };

    const L: Self = Self {
        static_tree: &STATIC_LTREE,
        extra_bits: &EXTRA_LBITS,
        extra_base: LITERALS + 1,
        elems: L_CODES,
        max_length: MAX_BITS as u16,
    };

    const D: Self = Self {
        static_tree: &STATIC_DTREE,
        extra_bits: &EXTRA_DBITS,
        extra_base: 0,
        elems: D_CODES,
        max_length: MAX_BITS as u16,
    };

    const BL: Self = Self {
        static_tree: &[],
        extra_bits: &EXTRA_BLBITS,
        extra_base: 0,
        elems: BL_CODES,
        max_length: MAX_BL_BITS as u16,
    };
}

struct TreeDesc<const N: usize> {
    dyn_tree: [CtData; N],
    max_code: usize,
    stat_desc: &'static StaticTreeDesc,
}

impl<const N: usize> TreeDesc<N> {
    const EMPTY: Self = Self {
        dyn_tree: [CtData::new(0, 0); N],
        max_code: 0,
        stat_desc: &StaticTreeDesc::EMPTY,
    };
}

/// Heap used to build the Huffman trees.
///
/// The sons of heap[n] are heap[2*n] and heap[2*n+1]; heap[0] is not used.
/// The same array is shared by all three trees.
struct Heap {
    heap: [u32; HEAP_SIZE],

    /// number of elements in the heap
    heap_len: usize,

    /// sorted region grows down from the end as nodes leave the heap
    heap_max: usize,

    depth: [u8; HEAP_SIZE],
}

impl Heap {
    /// Index within the heap array of the least frequent node
    const SMALLEST: usize = 1;

    fn new() -> Self {
        Self {
            heap: [0; HEAP_SIZE],
            heap_len: 0,
            heap_max: 0,
            depth: [0; HEAP_SIZE],
        }
    }

    /// Fill the heap with all symbols of nonzero frequency; returns the
    /// largest such symbol, or -1 if there is none.
    fn initialize(&mut self, tree: &mut [CtData]) -> isize {
        let mut max_code = -1;

        self.heap_len = 0;
        self.heap_max = HEAP_SIZE;

        for (n, node) in tree.iter_mut().enumerate() {
            if node.freq() > 0 {
                self.heap_len += 1;
                self.heap[self.heap_len] = n as u32;
                max_code = n as isize;
                self.depth[n] = 0;
            } else {
                *node.len_mut() = 0;
            }
        }

        max_code
    }

    /// Frequency first, subtree depth as the tie breaker.
    fn smaller(tree: &[CtData], n: u32, m: u32, depth: &[u8]) -> bool {
        let (n, m) = (n as usize, m as usize);

        match Ord::cmp(&tree[n].freq(), &tree[m].freq()) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => depth[n] <= depth[m],
            std::cmp::Ordering::Greater => false,
        }
    }

    /// Restore the heap property with node k possibly out of place.
    fn pqdownheap(&mut self, tree: &[CtData], mut k: usize) {
        let v = self.heap[k];
        let mut j = k << 1; /* left son of k */

        while j <= self.heap_len {
            /* Set j to the smallest of the two sons: */
            if j < self.heap_len && Self::smaller(tree, self.heap[j + 1], self.heap[j], &self.depth)
            {
                j += 1;
            }

            /* Exit if v is smaller than both sons */
            if Self::smaller(tree, v, self.heap[j], &self.depth) {
                break;
            }

            /* Exchange v with the smallest son */
            self.heap[k] = self.heap[j];
            k = j;

            /* And continue down the tree, setting j to the left son of k */
            j <<= 1;
        }

        self.heap[k] = v;
    }

    /// Remove the smallest element and restore the heap.
    fn pqremove(&mut self, tree: &[CtData]) -> u32 {
        let top = self.heap[Self::SMALLEST];
        self.heap[Self::SMALLEST] = self.heap[self.heap_len];
        self.heap_len -= 1;

        self.pqdownheap(tree, Self::SMALLEST);

        top
    }

    /// Repeatedly combine the two least frequent nodes until one remains,
    /// recording parents and subtree depths. `node` is the index of the
    /// first internal node to allocate.
    fn build(&mut self, tree: &mut [CtData], mut node: usize) {
        loop {
            let n = self.pqremove(tree) as usize; /* n = node of least frequency */
            let m = self.heap[Self::SMALLEST] as usize; /* m = node of next least frequency */

            /* keep the nodes sorted by frequency */
            self.heap_max -= 1;
            self.heap[self.heap_max] = n as u32;
            self.heap_max -= 1;
            self.heap[self.heap_max] = m as u32;

            /* Create a new node father of n and m */
            *tree[node].freq_mut() = tree[n].freq() + tree[m].freq();
            self.depth[node] = Ord::max(self.depth[n], self.depth[m]) + 1;

            *tree[n].dad_mut() = node as u16;
            *tree[m].dad_mut() = node as u16;

            /* and insert the new node in the heap */
            self.heap[Self::SMALLEST] = node as u32;
            node += 1;

            self.pqdownheap(tree, Self::SMALLEST);

            if self.heap_len < 2 {
                break;
            }
        }

        self.heap_max -= 1;
        self.heap[self.heap_max] = self.heap[Self::SMALLEST];
    }
}

pub(crate) struct State {
    status: Status,

    /// output still pending
    pub(crate) pending: Pending,

    /// symbols of the current block
    pub(crate) sym_buf: SymBuf,

    /// value of flush param for previous deflate call
    last_flush: i32,

    bi_buf: u16,
    bi_valid: u8,

    /// bit length of the END_BLOCK code of the last emitted block
    last_eob_len: usize,

    /// 1 for the zlib wrapper, 0 for raw deflate; negated once the trailer
    /// has been written
    pub(crate) wrap: i8,

    pub(crate) strategy: Strategy,
    pub(crate) level: i8,

    /// Use a faster search when the previous match is longer than this
    pub(crate) good_match: usize,

    /// Stop searching when current match exceeds this
    pub(crate) nice_match: usize,

    /// To speed up deflation, hash chains are never searched beyond this
    /// length. A higher limit improves compression ratio but degrades speed.
    pub(crate) max_chain_length: usize,

    /// For levels <= 3: do not insert the interior of matches longer than
    /// this into the hash table. For levels >= 4: only look for a better
    /// match when the current one is strictly shorter than this.
    pub(crate) max_lazy_match: usize,

    l_desc: TreeDesc<HEAP_SIZE>,             /* literal and length tree */
    d_desc: TreeDesc<{ 2 * D_CODES + 1 }>,   /* distance tree */
    bl_desc: TreeDesc<{ 2 * BL_CODES + 1 }>, /* Huffman tree for bit lengths */

    bl_count: [u16; MAX_BITS + 1],

    heap: Heap,

    /// bit length of current block with optimal trees
    opt_len: usize,
    /// bit length of current block with static trees
    static_len: usize,

    /// number of string matches in current block
    pub(crate) matches: usize,

    pub(crate) window: Window,

    pub(crate) w_size: usize, /* LZ77 window size (32K by default) */
    pub(crate) w_bits: usize, /* log2(w_size) */
    pub(crate) w_mask: usize, /* w_size - 1 */

    /// actual size of the window buffer: 2 * w_size
    pub(crate) window_size: usize,

    pub(crate) prev: Vec<u16>,
    pub(crate) head: Vec<u16>,

    pub(crate) hash_mask: usize,
    pub(crate) hash_shift: usize,

    /// hash of the string about to be inserted
    pub(crate) ins_h: usize,

    pub(crate) strstart: usize,  /* start of string to insert */
    pub(crate) lookahead: usize, /* number of valid bytes ahead in window */

    /// Window position at the beginning of the current output block. Gets
    /// negative when the window is moved backwards; stored blocks are then
    /// impossible until the next flush.
    pub(crate) block_start: isize,

    pub(crate) match_start: usize,  /* start of matching string */
    pub(crate) match_length: usize, /* length of best match */
    pub(crate) prev_match: usize,   /* previous match */
    pub(crate) prev_length: usize,
    pub(crate) match_available: bool, /* set if previous match exists */

    pub(crate) total_in: u64,
    pub(crate) total_out: u64,
    pub(crate) adler: u32,
    pub(crate) data_type: DataType,
    pub(crate) msg: Option<&'static str>,
}

impl State {
    pub(crate) fn new(config: &DeflateConfig) -> Result<Self, ReturnCode> {
        let DeflateConfig {
            mut level,
            mut window_bits,
            mem_level,
            strategy,
        } = *config;

        if level == DEFAULT_COMPRESSION {
            level = 6;
        }

        let wrap = if window_bits < 0 {
            if window_bits < -MAX_WBITS {
                return Err(ReturnCode::StreamError);
            }
            window_bits = -window_bits;
            0
        } else {
            1
        };

        if !(1..=MAX_MEM_LEVEL).contains(&mem_level)
            || !(MIN_WBITS..=MAX_WBITS).contains(&window_bits)
            || !(0..=9).contains(&level)
        {
            return Err(ReturnCode::StreamError);
        }

        let w_bits = window_bits as usize;
        let w_size = 1usize << w_bits;

        let hash_bits = mem_level as usize + 7;
        let hash_size = 1usize << hash_bits;

        let lit_bufsize = 1usize << (mem_level + 6);

        let mut state = Self {
            status: Status::Init,

            pending: Pending::new(4 * lit_bufsize),
            sym_buf: SymBuf::new(lit_bufsize),

            last_flush: -2,

            bi_buf: 0,
            bi_valid: 0,
            last_eob_len: 8,

            wrap,

            strategy,
            level: level as i8,

            good_match: 0,
            nice_match: 0,
            max_chain_length: 0,
            max_lazy_match: 0,

            l_desc: TreeDesc::EMPTY,
            d_desc: TreeDesc::EMPTY,
            bl_desc: TreeDesc::EMPTY,

            bl_count: [0; MAX_BITS + 1],

            heap: Heap::new(),

            opt_len: 0,
            static_len: 0,
            matches: 0,

            window: Window::new(w_bits),
            w_size,
            w_bits,
            w_mask: w_size - 1,
            window_size: 2 * w_size,

            prev: vec![0; w_size],
            head: vec![0; hash_size],

            hash_mask: hash_size - 1,
            hash_shift: (hash_bits + STD_MIN_MATCH - 1) / STD_MIN_MATCH,

            ins_h: 0,
            strstart: 0,
            lookahead: 0,
            block_start: 0,
            match_start: 0,
            match_length: 0,
            prev_match: 0,
            prev_length: 0,
            match_available: false,

            total_in: 0,
            total_out: 0,
            adler: ADLER32_INITIAL_VALUE,
            data_type: DataType::Unknown,
            msg: None,
        };

        state.reset();

        Ok(state)
    }

    fn reset(&mut self) {
        self.total_in = 0;
        self.total_out = 0;
        self.msg = None;
        self.data_type = DataType::Unknown;

        self.pending.reset_keep();

        // can be made negative by deflate(.., Finish)
        self.wrap = self.wrap.abs();

        self.status = Status::Init;
        self.adler = ADLER32_INITIAL_VALUE;
        self.last_flush = -2;

        self.tr_init();
        self.lm_init();
    }

    fn lm_init(&mut self) {
        self.head.fill(0);

        self.set_level(self.level);

        self.strstart = 0;
        self.block_start = 0;
        self.lookahead = 0;
        self.ins_h = 0;
        self.match_start = 0;
        self.match_length = 0;
        self.prev_match = 0;
        self.prev_length = 0;
        self.match_available = false;
    }

    fn set_level(&mut self, level: i8) {
        let config = &algorithm::CONFIGURATION_TABLE[level as usize];

        self.good_match = config.good_length as usize;
        self.max_lazy_match = config.max_lazy as usize;
        self.nice_match = config.nice_length as usize;
        self.max_chain_length = config.max_chain as usize;

        self.level = level;
    }

    pub(crate) fn max_dist(&self) -> usize {
        self.w_size - MIN_LOOKAHEAD
    }

    pub(crate) fn max_insert_length(&self) -> usize {
        self.max_lazy_match
    }

    // --- block assembly ------------------------------------------------

    /// Record a literal; returns true when the block should be flushed.
    pub(crate) fn tally_lit(&mut self, unmatched: u8) -> bool {
        self.sym_buf.push_lit(unmatched);

        *self.l_desc.dyn_tree[unmatched as usize].freq_mut() += 1;

        self.block_full()
    }

    /// Record a (distance, length) pair; returns true when the block should
    /// be flushed.
    pub(crate) fn tally_dist(&mut self, dist: usize, len: usize) -> bool {
        debug_assert!(len <= STD_MAX_MATCH - STD_MIN_MATCH, "bad match length");

        self.sym_buf.push_dist(dist as u16, len as u8);
        self.matches += 1;

        let dist = dist - 1;
        debug_assert!(
            dist < self.max_dist() && (Self::d_code(dist) as usize) < D_CODES,
            "bad match distance"
        );

        let index = LENGTH_CODE[len] as usize + LITERALS + 1;
        *self.l_desc.dyn_tree[index].freq_mut() += 1;
        *self.d_desc.dyn_tree[Self::d_code(dist) as usize].freq_mut() += 1;

        self.block_full()
    }

    fn block_full(&self) -> bool {
        let last_lit = self.sym_buf.sym_count();

        // Periodically guess whether it is profitable to stop the current
        // block here: mostly literals, yet already compressing 2:1, means
        // the statistics are skewed enough that fresh trees should pay off.
        if self.level > 2 && last_lit & 0x1fff == 0 {
            let mut out_length = last_lit * 8;
            let in_length = (self.strstart as isize - self.block_start) as usize;

            for (dcode, node) in self.d_desc.dyn_tree[..D_CODES].iter().enumerate() {
                out_length += node.freq() as usize * (5 + EXTRA_DBITS[dcode] as usize);
            }
            out_length >>= 3;

            trace!(
                "\nlast_lit {}, in {}, out ~{}",
                last_lit,
                in_length,
                out_length
            );

            if self.matches < last_lit / 2 && out_length < in_length / 2 {
                return true;
            }
        }

        self.sym_buf.should_flush_block()
    }

    const fn d_code(dist: usize) -> u8 {
        if dist < 256 {
            DIST_CODE[dist]
        } else {
            DIST_CODE[256 + (dist >> 7)]
        }
    }

    /// The frequency heuristic of the original: a block counts as binary
    /// when the control codes (0..=6) and upper half outweigh a quarter of
    /// the printable ASCII range.
    fn detect_data_type(&self) -> DataType {
        let tree = &self.l_desc.dyn_tree;

        let bin_freq: usize = tree[0..7]
            .iter()
            .chain(&tree[128..LITERALS])
            .map(|node| node.freq() as usize)
            .sum();
        let ascii_freq: usize = tree[7..128].iter().map(|node| node.freq() as usize).sum();

        if bin_freq > ascii_freq >> 2 {
            DataType::Binary
        } else {
            DataType::Text
        }
    }

    // --- bit sink ------------------------------------------------------

    /// Append `len` bits (LSB first) to the output. `len` must be at most
    /// 16 and `val` must fit in `len` bits.
    fn send_bits(&mut self, val: u32, len: u8) {
        debug_assert!((1..=BIT_BUF_SIZE).contains(&len));
        debug_assert!(val >> len == 0, "value does not fit in bit count");

        if self.bi_valid > BIT_BUF_SIZE - len {
            let combined = self.bi_buf as u32 | (val << self.bi_valid);
            self.pending.extend(&(combined as u16).to_le_bytes());
            self.bi_buf = (combined >> BIT_BUF_SIZE) as u16;
            self.bi_valid = self.bi_valid + len - BIT_BUF_SIZE;
        } else {
            self.bi_buf |= (val << self.bi_valid) as u16;
            self.bi_valid += len;
        }
    }

    fn send_code(&mut self, code: usize, tree: &[CtData]) {
        let node = tree[code];
        self.send_bits(node.code() as u32, node.len() as u8);
    }

    /// Write out complete bytes, leaving at most 7 bits in the accumulator.
    fn bi_flush(&mut self) {
        if self.bi_valid == 16 {
            self.pending.extend(&self.bi_buf.to_le_bytes());
            self.bi_buf = 0;
            self.bi_valid = 0;
        } else if self.bi_valid >= 8 {
            self.pending.extend(&[self.bi_buf as u8]);
            self.bi_buf >>= 8;
            self.bi_valid -= 8;
        }
    }

    /// Write out all remaining bits, padding with zeros to a byte boundary.
    fn bi_windup(&mut self) {
        if self.bi_valid > 8 {
            self.pending.extend(&self.bi_buf.to_le_bytes());
        } else if self.bi_valid > 0 {
            self.pending.extend(&[self.bi_buf as u8]);
        }
        self.bi_buf = 0;
        self.bi_valid = 0;
    }

    // --- block emission ------------------------------------------------

    fn emit_block_header(&mut self, block_type: BlockType, is_last: bool) {
        self.send_bits((block_type as u32) << 1 | is_last as u32, 3);
    }

    fn emit_lit(&mut self, ltree: &[CtData], c: u8) {
        self.send_code(c as usize, ltree);

        trace!(
            "'{}' ",
            match char::from_u32(c as u32) {
                Some(c) if c.is_ascii_graphic() => c,
                _ => ' ',
            }
        );
    }

    fn emit_dist(&mut self, ltree: &[CtData], dtree: &[CtData], lc: u8, dist: u16) {
        /* Send the length code; lc is the match length - STD_MIN_MATCH */
        let mut lc = lc as usize;
        let code = LENGTH_CODE[lc] as usize;
        self.send_code(code + LITERALS + 1, ltree);

        let extra = EXTRA_LBITS[code];
        if extra != 0 {
            lc -= BASE_LENGTH[code] as usize;
            self.send_bits(lc as u32, extra);
        }

        /* Send the distance code; dist is the full match distance */
        let mut dist = dist as usize - 1;
        let code = Self::d_code(dist) as usize;
        debug_assert!(code < D_CODES, "bad d_code");
        self.send_code(code, dtree);

        let extra = EXTRA_DBITS[code];
        if extra != 0 {
            dist -= BASE_DIST[code] as usize;
            self.send_bits(dist as u32, extra);
        }
    }

    fn emit_end_block(&mut self, ltree: &[CtData]) {
        self.send_code(END_BLOCK, ltree);
        self.last_eob_len = ltree[END_BLOCK].len() as usize;
    }

    /// Re-encode the tallied symbols of the block through the given trees.
    fn compress_block(&mut self, ltree: &[CtData], dtree: &[CtData]) {
        for sx in 0..self.sym_buf.sym_count() {
            let (dist, lc) = self.sym_buf.get(sx);

            if dist == 0 {
                self.emit_lit(ltree, lc);
            } else {
                self.emit_dist(ltree, dtree, lc, dist);
            }
        }

        self.emit_end_block(ltree);
    }

    /// Emit a stored (uncompressed) block covering the given window range.
    pub(crate) fn tr_stored_block(&mut self, range: std::ops::Range<usize>, is_last: bool) {
        self.emit_block_header(BlockType::StoredBlock, is_last);
        self.bi_windup();
        self.last_eob_len = 8;

        let stored_len = range.len() as u16;
        self.pending.extend(&stored_len.to_le_bytes());
        self.pending.extend(&(!stored_len).to_le_bytes());

        if stored_len > 0 {
            self.pending.extend(&self.window.bytes()[range]);
        }
    }

    /// Emit an empty static block and flush whole bytes, so that enough
    /// bits reach the output for the decompressor to make progress without
    /// abandoning the current code tables.
    pub(crate) fn tr_align(&mut self) {
        /* the END_BLOCK code is sent raw here: the test below needs
         * last_eob_len to still hold the previous block's value
         */
        self.emit_block_header(BlockType::StaticTrees, false);
        self.send_code(END_BLOCK, &STATIC_LTREE);
        self.bi_flush();

        // Of the 10 bits of the empty block, 10 - bi_valid have been sent.
        // If fewer than 9 bits of the previous END_BLOCK's worth of output
        // made it out, one empty block is not enough for the decompressor
        // to see the previous data; send a second one.
        if 1 + self.last_eob_len + 10 - (self.bi_valid as usize) < 9 {
            self.emit_block_header(BlockType::StaticTrees, false);
            self.send_code(END_BLOCK, &STATIC_LTREE);
            self.bi_flush();
        }

        self.last_eob_len = 7;
    }

    fn tr_init(&mut self) {
        self.l_desc.stat_desc = &StaticTreeDesc::L;
        self.d_desc.stat_desc = &StaticTreeDesc::D;
        self.bl_desc.stat_desc = &StaticTreeDesc::BL;

        self.bi_buf = 0;
        self.bi_valid = 0;
        self.last_eob_len = 8;

        self.init_block();
    }

    /// Reset the tree frequencies and symbol buffer for a new block.
    fn init_block(&mut self) {
        for node in &mut self.l_desc.dyn_tree[..L_CODES] {
            *node.freq_mut() = 0;
        }
        for node in &mut self.d_desc.dyn_tree[..D_CODES] {
            *node.freq_mut() = 0;
        }
        for node in &mut self.bl_desc.dyn_tree[..BL_CODES] {
            *node.freq_mut() = 0;
        }

        *self.l_desc.dyn_tree[END_BLOCK].freq_mut() = 1;
        self.opt_len = 0;
        self.static_len = 0;
        self.sym_buf.clear();
        self.matches = 0;
    }

    // --- zlib wrapper --------------------------------------------------

    fn header(&self) -> u16 {
        // preset dictionary flag
        const PRESET_DICT: u16 = 0x20;

        let dict = match self.strstart {
            0 => 0,
            _ => PRESET_DICT,
        };

        let h = (Z_DEFLATED + ((self.w_bits as u16 - 8) << 4)) << 8 | (self.level_flags() << 6) | dict;

        h + 31 - (h % 31)
    }

    fn level_flags(&self) -> u16 {
        if self.strategy >= Strategy::HuffmanOnly || self.level < 2 {
            0
        } else if self.level < 6 {
            1
        } else if self.level == 6 {
            2
        } else {
            3
        }
    }
}

/// The caller's input and output ranges for one `deflate` call.
pub(crate) struct Io<'a> {
    next_in: &'a [u8],
    next_out: &'a mut [u8],
    bytes_consumed: usize,
    bytes_written: usize,
}

impl<'a> Io<'a> {
    fn new(input: &'a [u8], output: &'a mut [u8]) -> Self {
        Self {
            next_in: input,
            next_out: output,
            bytes_consumed: 0,
            bytes_written: 0,
        }
    }

    fn empty() -> Self {
        Self::new(&[], &mut [])
    }

    #[inline]
    pub(crate) fn avail_in(&self) -> usize {
        self.next_in.len()
    }

    #[inline]
    pub(crate) fn avail_out(&self) -> usize {
        self.next_out.len()
    }

    /// Copy up to `dst.len()` input bytes into `dst`; returns the count.
    fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = Ord::min(self.next_in.len(), dst.len());

        dst[..n].copy_from_slice(&self.next_in[..n]);
        self.next_in = &self.next_in[n..];
        self.bytes_consumed += n;

        n
    }

    /// Copy as much of `src` to the output as fits; returns the count.
    fn write(&mut self, src: &[u8]) -> usize {
        let n = Ord::min(self.next_out.len(), src.len());

        let out = std::mem::take(&mut self.next_out);
        let (dst, rest) = out.split_at_mut(n);
        dst.copy_from_slice(&src[..n]);
        self.next_out = rest;
        self.bytes_written += n;

        n
    }
}

// --- tree construction -------------------------------------------------

fn build_tree<const N: usize>(state: &mut State, desc: &mut TreeDesc<N>) {
    let tree = &mut desc.dyn_tree;
    let stree = desc.stat_desc.static_tree;
    let elements = desc.stat_desc.elems;

    let mut max_code = state.heap.initialize(&mut tree[..elements]);

    // The pkzip format requires that at least one distance code exists,
    // and that at least one bit should be sent even if there is only one
    // possible code; force at least two codes of nonzero frequency.
    while state.heap.heap_len < 2 {
        state.heap.heap_len += 1;
        let node = if max_code < 2 {
            max_code += 1;
            max_code as usize
        } else {
            0
        };

        state.heap.heap[state.heap.heap_len] = node as u32;
        *tree[node].freq_mut() = 1;
        state.heap.depth[node] = 0;
        /* the cost of the dummy leaf is canceled out in gen_bitlen; the
         * intermediate value may dip below zero
         */
        state.opt_len = state.opt_len.wrapping_sub(1);
        if !stree.is_empty() {
            state.static_len = state.static_len.wrapping_sub(stree[node].len() as usize);
        }
        /* node is 0 or 1 so it does not have extra bits */
    }

    debug_assert!(max_code >= 0);
    desc.max_code = max_code as usize;

    // The elements heap[heap_len/2+1 .. heap_len] are leaves of the tree,
    // establish sub-heaps of increasing lengths:
    let mut n = state.heap.heap_len / 2;
    while n >= 1 {
        state.heap.pqdownheap(tree, n);
        n -= 1;
    }

    state.heap.build(tree, elements);

    // At this point the fields freq and dad are set; generate bit lengths,
    // then the codes.
    gen_bitlen(state, desc);
    gen_codes(&mut desc.dyn_tree, desc.max_code, &state.bl_count);
}

/// Compute optimal code lengths from the constructed tree, redistributing
/// leaves when a length exceeds the alphabet maximum, and account the block
/// cost in `opt_len`/`static_len`.
fn gen_bitlen<const N: usize>(state: &mut State, desc: &mut TreeDesc<N>) {
    let heap = &mut state.heap;

    let tree = &mut desc.dyn_tree;
    let max_code = desc.max_code;
    let stree = desc.stat_desc.static_tree;
    let extra = desc.stat_desc.extra_bits;
    let base = desc.stat_desc.extra_base;
    let max_length = desc.stat_desc.max_length;

    state.bl_count.fill(0);

    /* In a first pass, compute the optimal bit lengths (which may
     * overflow in the case of the bit length tree).
     */
    *tree[heap.heap[heap.heap_max] as usize].len_mut() = 0; /* root of the heap */

    /* number of elements with bit length too large */
    let mut overflow: i32 = 0;

    for h in heap.heap_max + 1..HEAP_SIZE {
        let n = heap.heap[h] as usize;
        let mut bits = tree[tree[n].dad() as usize].len() + 1;

        if bits > max_length {
            bits = max_length;
            overflow += 1;
        }

        /* We overwrite tree[n].dad which is no longer needed */
        *tree[n].len_mut() = bits;

        if n > max_code {
            continue; /* not a leaf node */
        }

        state.bl_count[bits as usize] += 1;
        let mut xbits = 0;
        if n >= base {
            xbits = extra[n - base] as usize;
        }

        let f = tree[n].freq() as usize;
        state.opt_len = state.opt_len.wrapping_add(f * (bits as usize + xbits));

        if !stree.is_empty() {
            state.static_len = state
                .static_len
                .wrapping_add(f * (stree[n].len() as usize + xbits));
        }
    }

    if overflow == 0 {
        return;
    }

    trace!("\nbit length overflow\n");

    /* Find the first bit length which could increase: */
    loop {
        let mut bits = max_length as usize - 1;
        while state.bl_count[bits] == 0 {
            bits -= 1;
        }
        state.bl_count[bits] -= 1; /* move one leaf down the tree */
        state.bl_count[bits + 1] += 2; /* move one overflow item as its brother */
        state.bl_count[max_length as usize] -= 1;
        /* The brother of the overflow item also moves one step up,
         * but this does not affect bl_count[max_length]
         */
        overflow -= 2;

        if overflow <= 0 {
            break;
        }
    }

    /* Now recompute all bit lengths, scanning in increasing frequency.
     * (It is simpler to reconstruct all lengths instead of fixing only
     * the wrong ones.)
     */
    let mut h = HEAP_SIZE;
    for bits in (1..=max_length).rev() {
        let mut n = state.bl_count[bits as usize];
        while n != 0 {
            h -= 1;
            let m = heap.heap[h] as usize;
            if m > max_code {
                continue;
            }

            if tree[m].len() != bits {
                state.opt_len = state
                    .opt_len
                    .wrapping_add(bits as usize * tree[m].freq() as usize)
                    .wrapping_sub(tree[m].len() as usize * tree[m].freq() as usize);
                *tree[m].len_mut() = bits;
            }

            n -= 1;
        }
    }
}

/// Generate the canonical codes for a tree whose lengths are set.
fn gen_codes(tree: &mut [CtData], max_code: usize, bl_count: &[u16]) {
    let mut next_code = [0u16; MAX_BITS + 1]; /* next code value for each bit length */
    let mut code = 0u16; /* running code value */

    /* The distribution counts are first used to generate the code values
     * without bit reversal.
     */
    for bits in 1..=MAX_BITS {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    /* Check that the bit counts in bl_count are consistent. The last code
     * must be all ones.
     */
    debug_assert_eq!(
        code as u32 + bl_count[MAX_BITS] as u32 - 1,
        (1 << MAX_BITS) - 1,
        "inconsistent bit counts"
    );

    for n in 0..=max_code {
        let len = tree[n].len();
        if len == 0 {
            continue;
        }

        debug_assert!((1..=15).contains(&len), "code length must be 1-15");

        *tree[n].code_mut() = next_code[len as usize].reverse_bits() >> (16 - len);
        next_code[len as usize] += 1;
    }
}

// --- code length transmission ------------------------------------------

/// repeat previous bit length 3-6 times (2 bits of repeat count)
const REP_3_6: usize = 16;

/// repeat a zero length 3-10 times (3 bits of repeat count)
const REPZ_3_10: usize = 17;

/// repeat a zero length 11-138 times (7 bits of repeat count)
const REPZ_11_138: usize = 18;

/// Tally the run-length encoding of a code length sequence into the bit
/// length tree frequencies.
fn scan_tree(bl_desc: &mut TreeDesc<{ 2 * BL_CODES + 1 }>, tree: &mut [CtData], max_code: usize) {
    let mut prevlen = -1isize; /* last emitted length */
    let mut nextlen = tree[0].len(); /* length of next code */
    let mut count = 0; /* repeat count of the current code */
    let mut max_count = 7; /* max repeat count */
    let mut min_count = 4; /* min repeat count */

    if nextlen == 0 {
        max_count = 138;
        min_count = 3;
    }

    *tree[max_code + 1].len_mut() = 0xffff; /* guard */

    let bl_tree = &mut bl_desc.dyn_tree;

    for n in 0..=max_code {
        let curlen = nextlen as isize; /* length of current code */
        nextlen = tree[n + 1].len();
        count += 1;

        if count < max_count && curlen == nextlen as isize {
            continue;
        } else if count < min_count {
            *bl_tree[curlen as usize].freq_mut() += count;
        } else if curlen != 0 {
            if curlen != prevlen {
                *bl_tree[curlen as usize].freq_mut() += 1;
            }
            *bl_tree[REP_3_6].freq_mut() += 1;
        } else if count <= 10 {
            *bl_tree[REPZ_3_10].freq_mut() += 1;
        } else {
            *bl_tree[REPZ_11_138].freq_mut() += 1;
        }

        count = 0;
        prevlen = curlen;

        if nextlen == 0 {
            max_count = 138;
            min_count = 3;
        } else if curlen == nextlen as isize {
            max_count = 6;
            min_count = 3;
        } else {
            max_count = 7;
            min_count = 4;
        }
    }
}

/// Emit a code length sequence through the bit length tree, using the same
/// run segmentation as `scan_tree`.
fn send_tree(state: &mut State, tree: &[CtData], max_code: usize) {
    let mut prevlen = -1isize; /* last emitted length */
    let mut nextlen = tree[0].len(); /* length of next code */
    let mut count = 0u32; /* repeat count of the current code */
    let mut max_count = 7; /* max repeat count */
    let mut min_count = 4; /* min repeat count */

    /* guard at max_code + 1 was already set by scan_tree */
    if nextlen == 0 {
        max_count = 138;
        min_count = 3;
    }

    let mut bl_desc = TreeDesc::EMPTY;
    std::mem::swap(&mut bl_desc, &mut state.bl_desc);
    let bl_tree = &bl_desc.dyn_tree;

    for n in 0..=max_code {
        let curlen = nextlen; /* length of current code */
        nextlen = tree[n + 1].len();
        count += 1;

        if count < max_count && curlen == nextlen {
            continue;
        } else if count < min_count {
            loop {
                state.send_code(curlen as usize, bl_tree);
                count -= 1;
                if count == 0 {
                    break;
                }
            }
        } else if curlen != 0 {
            if curlen as isize != prevlen {
                state.send_code(curlen as usize, bl_tree);
                count -= 1;
            }
            debug_assert!((3..=6).contains(&count), "inconsistent repeat count");
            state.send_code(REP_3_6, bl_tree);
            state.send_bits(count - 3, 2);
        } else if count <= 10 {
            state.send_code(REPZ_3_10, bl_tree);
            state.send_bits(count - 3, 3);
        } else {
            state.send_code(REPZ_11_138, bl_tree);
            state.send_bits(count - 11, 7);
        }

        count = 0;
        prevlen = curlen as isize;

        if nextlen == 0 {
            max_count = 138;
            min_count = 3;
        } else if curlen == nextlen {
            max_count = 6;
            min_count = 3;
        } else {
            max_count = 7;
            min_count = 4;
        }
    }

    std::mem::swap(&mut bl_desc, &mut state.bl_desc);
}

/// Construct the bit length tree and return the index in BL_ORDER of the
/// last code length that has to be sent.
fn build_bl_tree(state: &mut State) -> usize {
    /* Determine the bit length frequencies for literal and distance trees */
    {
        let mut tmp = TreeDesc::EMPTY;
        std::mem::swap(&mut tmp, &mut state.l_desc);
        scan_tree(&mut state.bl_desc, &mut tmp.dyn_tree, tmp.max_code);
        std::mem::swap(&mut tmp, &mut state.l_desc);
    }
    {
        let mut tmp = TreeDesc::EMPTY;
        std::mem::swap(&mut tmp, &mut state.d_desc);
        scan_tree(&mut state.bl_desc, &mut tmp.dyn_tree, tmp.max_code);
        std::mem::swap(&mut tmp, &mut state.d_desc);
    }

    /* Build the bit length tree: */
    {
        let mut tmp = TreeDesc::EMPTY;
        std::mem::swap(&mut tmp, &mut state.bl_desc);
        build_tree(state, &mut tmp);
        std::mem::swap(&mut tmp, &mut state.bl_desc);
    }

    /* opt_len now includes the length of the tree representations, except
     * the lengths of the bit lengths codes and the 5+5+4 bits for the counts.
     */

    /* Determine the number of bit length codes to send. The pkzip format
     * requires that at least 4 bit length codes be sent.
     */
    let mut max_blindex = BL_CODES - 1;
    while max_blindex >= 3 {
        let index = BL_ORDER[max_blindex] as usize;
        if state.bl_desc.dyn_tree[index].len() != 0 {
            break;
        }

        max_blindex -= 1;
    }

    /* Update opt_len to include the bit length tree and counts */
    state.opt_len = state.opt_len.wrapping_add(3 * (max_blindex + 1) + 5 + 5 + 4);
    trace!(
        "\ndyn trees: dyn {}, stat {}",
        state.opt_len,
        state.static_len
    );

    max_blindex
}

fn send_all_trees(state: &mut State, lcodes: usize, dcodes: usize, blcodes: usize) {
    debug_assert!(
        lcodes >= 257 && dcodes >= 1 && blcodes >= 4,
        "not enough codes"
    );
    debug_assert!(
        lcodes <= L_CODES && dcodes <= D_CODES && blcodes <= BL_CODES,
        "too many codes"
    );

    state.send_bits(lcodes as u32 - 257, 5);
    state.send_bits(dcodes as u32 - 1, 5);
    state.send_bits(blcodes as u32 - 4, 4);

    for rank in 0..blcodes {
        trace!("\nbl code {:>2} ", BL_ORDER[rank]);
        let len = state.bl_desc.dyn_tree[BL_ORDER[rank] as usize].len();
        state.send_bits(len as u32, 3);
    }

    let mut tmp1 = TreeDesc::EMPTY;
    let mut tmp2 = TreeDesc::EMPTY;
    std::mem::swap(&mut tmp1, &mut state.l_desc);
    std::mem::swap(&mut tmp2, &mut state.d_desc);

    send_tree(state, &tmp1.dyn_tree, lcodes - 1); /* literal tree */
    send_tree(state, &tmp2.dyn_tree, dcodes - 1); /* distance tree */

    std::mem::swap(&mut tmp1, &mut state.l_desc);
    std::mem::swap(&mut tmp2, &mut state.d_desc);
}

/// Close the current block, choosing the cheapest of a stored, static, or
/// dynamic encoding.
fn tr_flush_block(state: &mut State, window_offset: Option<usize>, stored_len: usize, last: bool) {
    let mut opt_lenb;
    let static_lenb;
    let mut max_blindex = 0;

    if state.level > 0 {
        /* Check if the input is ASCII or binary */
        if state.data_type == DataType::Unknown {
            state.data_type = state.detect_data_type();
        }

        /* Construct the literal and distance trees */
        {
            let mut tmp = TreeDesc::EMPTY;
            std::mem::swap(&mut tmp, &mut state.l_desc);
            build_tree(state, &mut tmp);
            std::mem::swap(&mut tmp, &mut state.l_desc);
        }
        {
            let mut tmp = TreeDesc::EMPTY;
            std::mem::swap(&mut tmp, &mut state.d_desc);
            build_tree(state, &mut tmp);
            std::mem::swap(&mut tmp, &mut state.d_desc);
        }

        /* Build the bit length tree for the above two trees, and get the
         * index in BL_ORDER of the last bit length code to send.
         */
        max_blindex = build_bl_tree(state);

        /* Determine the best encoding. Compute the block lengths in bytes. */
        opt_lenb = (state.opt_len + 3 + 7) >> 3;
        static_lenb = (state.static_len + 3 + 7) >> 3;

        trace!(
            "\nopt {}({}) stat {}({}) stored {} lit {} ",
            opt_lenb,
            state.opt_len,
            static_lenb,
            state.static_len,
            stored_len,
            state.sym_buf.sym_count()
        );

        if static_lenb <= opt_lenb {
            opt_lenb = static_lenb;
        }
    } else {
        debug_assert!(window_offset.is_some(), "lost buf");
        opt_lenb = stored_len + 5;
        static_lenb = opt_lenb; /* force a stored block */
    }

    if let Some(offset) = window_offset.filter(|_| stored_len + 4 <= opt_lenb) {
        /* The test of window_offset is only necessary after a window slide:
         * the bytes of the block are then no longer available.
         * 4: two words for the stored-block lengths.
         */
        state.tr_stored_block(offset..offset + stored_len, last);
    } else if static_lenb == opt_lenb {
        state.emit_block_header(BlockType::StaticTrees, last);
        state.compress_block(&STATIC_LTREE, &STATIC_DTREE);
    } else {
        state.emit_block_header(BlockType::DynamicTrees, last);
        send_all_trees(
            state,
            state.l_desc.max_code + 1,
            state.d_desc.max_code + 1,
            max_blindex + 1,
        );
        {
            let mut tmp1 = TreeDesc::EMPTY;
            let mut tmp2 = TreeDesc::EMPTY;
            std::mem::swap(&mut tmp1, &mut state.l_desc);
            std::mem::swap(&mut tmp2, &mut state.d_desc);
            state.compress_block(&tmp1.dyn_tree, &tmp2.dyn_tree);
            std::mem::swap(&mut tmp1, &mut state.l_desc);
            std::mem::swap(&mut tmp2, &mut state.d_desc);
        }
    }

    state.init_block();
    if last {
        state.bi_windup();
    }
}

/// Flush the current block and as much pending output as the caller's
/// buffer accepts.
pub(crate) fn flush_block_only(state: &mut State, io: &mut Io, is_last: bool) {
    let window_offset = (state.block_start >= 0).then_some(state.block_start as usize);
    let stored_len = (state.strstart as isize - state.block_start) as usize;

    tr_flush_block(state, window_offset, stored_len, is_last);

    state.block_start = state.strstart as isize;
    flush_pending(state, io);
}

// --- window filling ----------------------------------------------------

/// Copy input into the window at `offset`, folding the checksum in as the
/// bytes arrive.
fn read_buf(state: &mut State, io: &mut Io, offset: usize, size: usize) -> usize {
    let n = io.read(&mut state.window.bytes_mut()[offset..offset + size]);

    if n == 0 {
        return 0;
    }

    if state.wrap == 1 {
        state.adler = adler32(state.adler, &state.window.bytes()[offset..offset + n]);
    }

    state.total_in += n as u64;

    n
}

/// Fill the window when the lookahead becomes insufficient, sliding it when
/// the upper half is exhausted.
pub(crate) fn fill_window(state: &mut State, io: &mut Io) {
    debug_assert!(state.lookahead < MIN_LOOKAHEAD);

    let wsize = state.w_size;

    loop {
        let mut more = state.window_size - state.lookahead - state.strstart;

        /* If the window is almost full and there is insufficient lookahead,
         * move the upper half to the lower one to make room in the upper half.
         */
        if state.strstart >= wsize + state.max_dist() {
            state.window.slide();

            if state.match_start >= wsize {
                state.match_start -= wsize;
            } else {
                /* the pending match slid out of the window */
                state.match_start = 0;
                state.prev_length = 0;
            }
            state.strstart -= wsize; /* we now have strstart >= max_dist */
            state.block_start -= wsize as isize;

            self::slide_hash::slide_hash(state);

            more += wsize;
        }

        if io.avail_in() == 0 {
            break;
        }

        /* strstart <= wsize + max_dist - 1 and lookahead <= MIN_LOOKAHEAD - 1,
         * so in the worst case more >= 2.
         */
        debug_assert!(more >= 2, "more < 2");

        let n = read_buf(state, io, state.strstart + state.lookahead, more);
        state.lookahead += n;

        /* Initialize the hash value now that we have some input: */
        if state.lookahead >= STD_MIN_MATCH {
            state.init_hash(state.strstart);
        }
        /* If the whole input has less than STD_MIN_MATCH bytes, ins_h is
         * garbage, but this is not important since only literal bytes will
         * be emitted.
         */

        if state.lookahead >= MIN_LOOKAHEAD || io.avail_in() == 0 {
            break;
        }
    }

    debug_assert!(
        state.strstart <= state.window_size - MIN_LOOKAHEAD,
        "not enough room for search"
    );
}

/// Drain staged output (completed bytes of the bit accumulator included)
/// into the caller's buffer.
pub(crate) fn flush_pending(state: &mut State, io: &mut Io) {
    state.bi_flush();

    let n = io.write(state.pending.pending());
    if n == 0 {
        return;
    }

    trace!("\n[FLUSH {} bytes]", n);

    state.pending.advance(n);
    state.total_out += n as u64;
}

// --- the streaming session ---------------------------------------------

/// A DEFLATE compression session.
pub struct DeflateStream {
    state: State,
}

impl DeflateStream {
    /// Create a session. Fails with [`ReturnCode::StreamError`] when the
    /// configuration is out of range.
    pub fn new(config: DeflateConfig) -> Result<Self, ReturnCode> {
        Ok(Self {
            state: State::new(&config)?,
        })
    }

    /// Compress as much of `input` to `output` as fits, honoring `flush`.
    ///
    /// The stream consumes input from the front of `input` and writes from
    /// the front of `output`; the counts are in the returned
    /// [`StreamResult`]. A [`Flush::Finish`] stream is complete once the
    /// return code is [`ReturnCode::StreamEnd`].
    pub fn deflate(&mut self, input: &[u8], output: &mut [u8], flush: Flush) -> StreamResult {
        let mut io = Io::new(input, output);
        let return_code = deflate(&mut self.state, &mut io, flush);

        StreamResult {
            return_code,
            bytes_consumed: io.bytes_consumed,
            bytes_written: io.bytes_written,
        }
    }

    /// Prime the window with a preset dictionary. Valid only before the
    /// first [`Self::deflate`] call.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> ReturnCode {
        if self.state.status != Status::Init || self.state.lookahead != 0 {
            return self.err(ReturnCode::StreamError);
        }

        let state = &mut self.state;

        /* the zlib header transmits the Adler-32 of the whole dictionary */
        if state.wrap == 1 {
            state.adler = adler32(state.adler, dictionary);
        }

        if dictionary.len() < STD_MIN_MATCH {
            return ReturnCode::Ok;
        }

        /* only the tail that fits ahead of the match search matters */
        let max = state.w_size - MIN_LOOKAHEAD;
        let dict = match dictionary.len() > max {
            true => &dictionary[dictionary.len() - max..],
            false => dictionary,
        };

        let len = dict.len();
        state.window.bytes_mut()[..len].copy_from_slice(dict);
        state.strstart = len;
        state.block_start = len as isize;

        state.init_hash(0);
        for n in 0..=len - STD_MIN_MATCH {
            state.insert_string(n);
        }

        ReturnCode::Ok
    }

    /// Change the compression level and strategy mid-stream. When the
    /// change affects the block-shape routine and data has already been
    /// compressed, the current block is flushed (a partial-flush boundary)
    /// into the staging buffer first.
    pub fn params(&mut self, level: i32, strategy: Strategy) -> ReturnCode {
        let level = if level == DEFAULT_COMPRESSION { 6 } else { level };

        if !(0..=9).contains(&level) {
            return self.err(ReturnCode::StreamError);
        }

        let old_func = algorithm::CONFIGURATION_TABLE[self.state.level as usize].func;
        let new_func = algorithm::CONFIGURATION_TABLE[level as usize].func;

        if old_func != new_func && self.state.total_in != 0 {
            // the staged block boundary needs room; the caller must drain
            // pending output before re-tuning
            if !self.state.pending.pending().is_empty() {
                return self.err(ReturnCode::BufError);
            }

            let mut io = Io::empty();
            flush_block_only(&mut self.state, &mut io, false);
            self.state.tr_align();
        }

        if self.state.level != level as i8 {
            self.state.set_level(level as i8);
        }
        self.state.strategy = strategy;

        ReturnCode::Ok
    }

    /// Reset the session for a new stream, keeping the configuration and
    /// the allocations.
    pub fn reset(&mut self) -> ReturnCode {
        self.state.reset();
        ReturnCode::Ok
    }

    /// Finish the session. Returns [`ReturnCode::DataError`] when the
    /// stream was abandoned mid-way, [`ReturnCode::Ok`] otherwise.
    pub fn end(self) -> ReturnCode {
        match self.state.status {
            Status::Busy => ReturnCode::DataError,
            _ => ReturnCode::Ok,
        }
    }

    /// An upper bound for the compressed size of `source_len` input bytes
    /// with this session's configuration.
    pub fn bound(&self, source_len: usize) -> usize {
        // zlib wrapper: 2 byte header, 4 byte trailer, and possibly a
        // 4 byte dictionary id
        let wrap_len = match self.state.wrap {
            1 => 6 + if self.state.strstart != 0 { 4 } else { 0 },
            _ => 0,
        };

        compress_bound(source_len) - ZLIB_WRAPLEN + wrap_len
    }

    pub fn total_in(&self) -> u64 {
        self.state.total_in
    }

    pub fn total_out(&self) -> u64 {
        self.state.total_out
    }

    /// The running Adler-32 of the input consumed so far (zlib wrapper
    /// streams only).
    pub fn adler(&self) -> u32 {
        self.state.adler
    }

    /// The heuristic classification of the data seen so far.
    pub fn data_type(&self) -> DataType {
        self.state.data_type
    }

    /// A static description of the last error, for diagnostics.
    pub fn msg(&self) -> Option<&'static str> {
        self.state.msg
    }

    fn err(&mut self, return_code: ReturnCode) -> ReturnCode {
        self.state.msg = return_code.message();
        return_code
    }
}

fn deflate(state: &mut State, io: &mut Io, flush: Flush) -> ReturnCode {
    if state.status == Status::Finish && flush != Flush::Finish {
        state.msg = ReturnCode::StreamError.message();
        return ReturnCode::StreamError;
    }

    if io.avail_out() == 0 {
        state.msg = ReturnCode::BufError.message();
        return ReturnCode::BufError;
    }

    let old_flush = state.last_flush;
    state.last_flush = flush as i32;

    /* Flush as much pending output as possible */
    if !state.pending.pending().is_empty() {
        flush_pending(state, io);
        if io.avail_out() == 0 {
            /* Since avail_out is 0, deflate will be called again with more
             * output space, but possibly with both pending and avail_in
             * equal to zero. There won't be anything to do, but this is not
             * an error situation: make sure we return Ok instead of
             * BufError at the next call.
             */
            state.last_flush = -1;
            return ReturnCode::Ok;
        }
    } else if io.avail_in() == 0 && (flush as i32) <= old_flush && flush != Flush::Finish {
        /* Make sure there is something to do and avoid duplicate
         * consecutive flushes.
         */
        state.msg = ReturnCode::BufError.message();
        return ReturnCode::BufError;
    }

    /* User must not provide more input after the first FINISH: */
    if state.status == Status::Finish && io.avail_in() != 0 {
        state.msg = ReturnCode::StreamError.message();
        return ReturnCode::StreamError;
    }

    /* Write the header */
    if state.status == Status::Init && state.wrap == 0 {
        state.status = Status::Busy;
    }

    if state.status == Status::Init {
        let header = state.header();
        state.pending.extend(&header.to_be_bytes());

        /* Save the adler32 of the preset dictionary: */
        if state.strstart != 0 {
            let dict_id = state.adler;
            state.pending.extend(&dict_id.to_be_bytes());
        }

        state.adler = ADLER32_INITIAL_VALUE;
        state.status = Status::Busy;

        /* Compression must start with an empty pending buffer */
        flush_pending(state, io);
        if !state.pending.pending().is_empty() {
            state.last_flush = -1;
            return ReturnCode::Ok;
        }
    }

    /* Start a new block or continue the current one. */
    if io.avail_in() != 0
        || state.lookahead != 0
        || (flush != Flush::NoFlush && state.status != Status::Finish)
    {
        let bstate = algorithm::run(state, io, flush);

        if matches!(bstate, BlockState::FinishStarted | BlockState::FinishDone) {
            state.status = Status::Finish;
        }

        match bstate {
            BlockState::NeedMore | BlockState::FinishStarted => {
                if io.avail_out() == 0 {
                    state.last_flush = -1; /* avoid BufError at next call */
                }
                /* If flush != NoFlush && avail_out == 0, the next call of
                 * deflate should use the same flush parameter to make sure
                 * that the flush is complete. So we don't have to output an
                 * empty block here, this will be done at next call. This
                 * also ensures that for a very small output buffer, we emit
                 * at most one empty block.
                 */
                return ReturnCode::Ok;
            }
            BlockState::BlockDone => {
                match flush {
                    Flush::PartialFlush => state.tr_align(),
                    Flush::SyncFlush | Flush::FullFlush => {
                        /* The empty stored block, three zero bits plus
                         * 00 00 FF FF, is the resynchronization marker.
                         */
                        state.tr_stored_block(0..0, false);

                        if flush == Flush::FullFlush {
                            state.head.fill(0); /* forget history */
                        }
                    }
                    _ => {}
                }

                flush_pending(state, io);
                if io.avail_out() == 0 {
                    state.last_flush = -1; /* avoid BufError at next call */
                    return ReturnCode::Ok;
                }
            }
            BlockState::FinishDone => { /* do nothing */ }
        }
    }

    if flush != Flush::Finish {
        return ReturnCode::Ok;
    }

    if state.wrap <= 0 {
        /* raw deflate, or the trailer was already written */
        return ReturnCode::StreamEnd;
    }

    /* Write the trailer */
    let adler = state.adler;
    state.pending.extend(&adler.to_be_bytes());

    flush_pending(state, io);

    /* If avail_out was too small, the caller will call again to flush the
     * rest; write the trailer only once.
     */
    state.wrap = -state.wrap;

    if state.pending.pending().is_empty() {
        debug_assert_eq!(state.bi_valid, 0, "bi_buf not flushed");
        return ReturnCode::StreamEnd;
    }
    ReturnCode::Ok
}

// zlib format overhead: 2 byte header, 4 byte checksum
const ZLIB_WRAPLEN: usize = 6;

/// A conservative upper bound on the deflated size of `source_len` bytes,
/// including the zlib wrapper.
pub fn compress_bound(source_len: usize) -> usize {
    source_len
        .wrapping_add((source_len + 7) >> 3)
        .wrapping_add((source_len + 63) >> 6)
        .wrapping_add(5)
        .wrapping_add(ZLIB_WRAPLEN)
}

/// Compress `input` into `output` in one go, returning the written prefix
/// of `output`.
pub fn compress_slice<'a>(
    output: &'a mut [u8],
    input: &[u8],
    config: DeflateConfig,
) -> (&'a mut [u8], ReturnCode) {
    let mut stream = match DeflateStream::new(config) {
        Ok(stream) => stream,
        Err(err) => return (&mut output[..0], err),
    };

    let mut in_pos = 0;
    let mut out_pos = 0;

    let err = loop {
        let result = stream.deflate(&input[in_pos..], &mut output[out_pos..], Flush::Finish);

        in_pos += result.bytes_consumed;
        out_pos += result.bytes_written;

        match result.return_code {
            ReturnCode::Ok if result.bytes_written == 0 && result.bytes_consumed == 0 => {
                /* the output buffer is too small */
                break ReturnCode::BufError;
            }
            ReturnCode::Ok => continue,
            ReturnCode::StreamEnd => break ReturnCode::Ok,
            err => break err,
        }
    };

    stream.end();

    (&mut output[..out_pos], err)
}
