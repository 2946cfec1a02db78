//! The three block-shape routines and the per-level tuning table.
//!
//! Every routine is a resumable loop: it advances `strstart` one literal or
//! match at a time, flushes blocks as they fill, and returns the moment the
//! caller's input or output runs out. All loop-carried values live in the
//! session state, so a later call picks up exactly where this one stopped.

use crate::{
    deflate::{
        fill_window, flush_block_only, longest_match::longest_match, BlockState, Io, State,
        Strategy, MAX_STORED, MIN_LOOKAHEAD, STD_MIN_MATCH, TOO_FAR,
    },
    Flush,
};

pub(crate) fn run(state: &mut State, io: &mut Io, flush: Flush) -> BlockState {
    (CONFIGURATION_TABLE[state.level as usize].func)(state, io, flush)
}

pub(crate) type CompressFunc = fn(&mut State, &mut Io, Flush) -> BlockState;

pub(crate) struct Config {
    pub good_length: u16, /* reduce lazy search above this match length */
    pub max_lazy: u16,    /* do not perform lazy search above this match length */
    pub nice_length: u16, /* quit search above this match length */
    pub max_chain: u16,
    pub func: CompressFunc,
}

impl Config {
    const fn new(
        good_length: u16,
        max_lazy: u16,
        nice_length: u16,
        max_chain: u16,
        func: CompressFunc,
    ) -> Self {
        Self {
            good_length,
            max_lazy,
            nice_length,
            max_chain,
            func,
        }
    }
}

/// Tuning per compression level. The speed/ratio trade-off is entirely in
/// how hard `longest_match` is allowed to work and how eagerly the lazy
/// evaluator defers.
pub(crate) const CONFIGURATION_TABLE: [Config; 10] = [
    Config::new(0, 0, 0, 0, deflate_stored), // 0: store only
    Config::new(4, 4, 8, 4, deflate_fast),   // 1: max speed, no lazy matches
    Config::new(4, 5, 16, 8, deflate_fast),
    Config::new(4, 6, 32, 32, deflate_fast),
    Config::new(4, 4, 16, 16, deflate_slow), // 4: lazy matches from here on
    Config::new(8, 16, 32, 32, deflate_slow),
    Config::new(8, 16, 128, 128, deflate_slow),
    Config::new(8, 32, 128, 256, deflate_slow),
    Config::new(32, 128, 258, 1024, deflate_slow),
    Config::new(32, 258, 258, 4096, deflate_slow), // 9: max compression
];

/// Flush the current block and bail out of the driver when the caller's
/// output filled up.
macro_rules! flush_block {
    ($state:expr, $io:expr, $is_last:expr) => {
        flush_block_only($state, $io, $is_last);

        if $io.avail_out() == 0 {
            return match $is_last {
                true => BlockState::FinishStarted,
                false => BlockState::NeedMore,
            };
        }
    };
}

/// In debug builds, verify that a proposed back-reference really repeats
/// the bytes at `start`.
fn check_match(state: &State, start: usize, match_start: usize, length: usize) {
    debug_assert_eq!(
        state.window.bytes()[match_start..match_start + length],
        state.window.bytes()[start..start + length],
        "invalid match at strstart {start}"
    );
}

/// Copy without compression as much as possible from the input stream,
/// emitting stored blocks of bounded size (level 0).
fn deflate_stored(state: &mut State, io: &mut Io, flush: Flush) -> BlockState {
    /* Stored blocks are limited to 0xffff bytes, and each emitted block must
     * fit in the pending buffer next to its 5 byte header.
     */
    let max_block_size = Ord::min(MAX_STORED, state.pending.capacity() - 5);

    loop {
        /* Fill the window as much as possible: */
        if state.lookahead <= 1 {
            fill_window(state, io);

            if state.lookahead == 0 && flush == Flush::NoFlush {
                return BlockState::NeedMore;
            }
            if state.lookahead == 0 {
                break; /* flush the current block */
            }
        }

        state.strstart += state.lookahead;
        state.lookahead = 0;

        /* Emit a stored block whenever it reaches its maximum size: */
        let max_start = state.block_start as usize + max_block_size;
        if state.strstart >= max_start {
            state.lookahead = state.strstart - max_start;
            state.strstart = max_start;
            flush_block!(state, io, false);
        }

        /* Flush if we may have to slide, otherwise block_start may become
         * negative and the data will be gone:
         */
        if state.strstart - state.block_start as usize >= state.max_dist() {
            flush_block!(state, io, false);
        }
    }

    flush_block!(state, io, flush == Flush::Finish);

    if flush == Flush::Finish {
        return BlockState::FinishDone;
    }

    BlockState::BlockDone
}

/// Compress as much as possible without lazy evaluation: a found match is
/// always emitted, which favors speed over ratio (levels 1..=3).
fn deflate_fast(state: &mut State, io: &mut Io, flush: Flush) -> BlockState {
    loop {
        /* Make sure that we always have enough lookahead, except at the end
         * of the input file. We need STD_MAX_MATCH bytes for the next match,
         * plus STD_MIN_MATCH bytes to insert the string following the next
         * match.
         */
        if state.lookahead < MIN_LOOKAHEAD {
            fill_window(state, io);

            if state.lookahead < MIN_LOOKAHEAD && flush == Flush::NoFlush {
                return BlockState::NeedMore;
            }
            if state.lookahead == 0 {
                break; /* flush the current block */
            }
        }

        /* Insert the string window[strstart .. strstart+2] in the
         * dictionary, and set hash_head to the head of the hash chain:
         */
        let mut hash_head = 0;
        if state.lookahead >= STD_MIN_MATCH {
            hash_head = state.insert_string(state.strstart);
        }

        /* Find the longest match, discarding those <= prev_length.
         * At this point we always have match_length < STD_MIN_MATCH.
         */
        if hash_head != 0
            && state.strstart - hash_head as usize <= state.max_dist()
            && state.strategy != Strategy::HuffmanOnly
        {
            state.match_length = longest_match(state, hash_head);
            /* longest_match sets match_start */
        }

        let bflush; /* set if current block must be flushed */

        if state.match_length >= STD_MIN_MATCH {
            check_match(state, state.strstart, state.match_start, state.match_length);

            bflush = state.tally_dist(
                state.strstart - state.match_start,
                state.match_length - STD_MIN_MATCH,
            );

            state.lookahead -= state.match_length;

            /* Insert new strings in the hash table only if the match length
             * is not too large. This saves time but degrades compression.
             */
            if state.match_length <= state.max_insert_length()
                && state.lookahead >= STD_MIN_MATCH
            {
                state.match_length -= 1; /* string at strstart already in table */
                loop {
                    state.strstart += 1;
                    state.insert_string(state.strstart);
                    /* strstart never exceeds window_size - MAX_MATCH, so
                     * there are always STD_MIN_MATCH bytes ahead.
                     */
                    state.match_length -= 1;
                    if state.match_length == 0 {
                        break;
                    }
                }
                state.strstart += 1;
            } else {
                state.strstart += state.match_length;
                state.match_length = 0;
                state.init_hash(state.strstart);
                /* If lookahead < STD_MIN_MATCH, ins_h is garbage, but it
                 * does not matter since it will be recomputed at next
                 * deflate call.
                 */
            }
        } else {
            /* No match, output a literal byte */
            bflush = state.tally_lit(state.window.bytes()[state.strstart]);
            state.lookahead -= 1;
            state.strstart += 1;
        }

        if bflush {
            flush_block!(state, io, false);
        }
    }

    flush_block!(state, io, flush == Flush::Finish);

    if flush == Flush::Finish {
        return BlockState::FinishDone;
    }

    BlockState::BlockDone
}

/// Same as `deflate_fast`, but with better match discovery: the match at
/// `strstart` is only emitted once the next position has been checked for a
/// longer one (levels 4..=9).
fn deflate_slow(state: &mut State, io: &mut Io, flush: Flush) -> BlockState {
    /* Process the input block. */
    loop {
        /* Make sure that we always have enough lookahead, except at the end
         * of the input file.
         */
        if state.lookahead < MIN_LOOKAHEAD {
            fill_window(state, io);

            if state.lookahead < MIN_LOOKAHEAD && flush == Flush::NoFlush {
                return BlockState::NeedMore;
            }
            if state.lookahead == 0 {
                break; /* flush the current block */
            }
        }

        /* Insert the string window[strstart .. strstart+2] in the
         * dictionary, and set hash_head to the head of the hash chain:
         */
        let mut hash_head = 0;
        if state.lookahead >= STD_MIN_MATCH {
            hash_head = state.insert_string(state.strstart);
        }

        /* Find the longest match, discarding those <= prev_length. */
        state.prev_length = state.match_length;
        state.prev_match = state.match_start;
        state.match_length = STD_MIN_MATCH - 1;

        if hash_head != 0
            && state.prev_length < state.max_lazy_match
            && state.strstart - hash_head as usize <= state.max_dist()
        {
            if state.strategy != Strategy::HuffmanOnly {
                state.match_length = longest_match(state, hash_head);
                /* longest_match sets match_start */
            }

            /* Matches this short only pay off when they are close by; in
             * filtered data they never do.
             */
            if state.match_length <= 5
                && (state.strategy == Strategy::Filtered
                    || (state.match_length == STD_MIN_MATCH
                        && state.strstart - state.match_start > TOO_FAR))
            {
                state.match_length = STD_MIN_MATCH - 1;
            }
        }

        /* If there was a match at the previous step and the current match
         * is not better, output the previous match:
         */
        if state.prev_length >= STD_MIN_MATCH && state.match_length <= state.prev_length {
            let max_insert = state.strstart + state.lookahead - STD_MIN_MATCH;
            /* Do not insert strings in hash table beyond this. */

            check_match(
                state,
                state.strstart - 1,
                state.prev_match,
                state.prev_length,
            );

            let bflush = state.tally_dist(
                state.strstart - 1 - state.prev_match,
                state.prev_length - STD_MIN_MATCH,
            );

            /* Insert in hash table all strings up to the end of the match.
             * strstart-1 and strstart are already inserted. If there is not
             * enough lookahead, the last two strings are not inserted in
             * the hash table.
             */
            state.lookahead -= state.prev_length - 1;
            state.prev_length -= 2;
            loop {
                state.strstart += 1;
                if state.strstart <= max_insert {
                    state.insert_string(state.strstart);
                }
                state.prev_length -= 1;
                if state.prev_length == 0 {
                    break;
                }
            }
            state.match_available = false;
            state.match_length = STD_MIN_MATCH - 1;
            state.strstart += 1;

            if bflush {
                flush_block!(state, io, false);
            }
        } else if state.match_available {
            /* If there was no match at the previous position, output a
             * single literal. If there was a match but the current match
             * is longer, truncate the previous match to a single literal.
             */
            let lc = state.window.bytes()[state.strstart - 1];
            let bflush = state.tally_lit(lc);
            if bflush {
                flush_block_only(state, io, false);
            }
            state.strstart += 1;
            state.lookahead -= 1;
            if io.avail_out() == 0 {
                return BlockState::NeedMore;
            }
        } else {
            /* There is no previous match to compare with, wait for the
             * next step to decide.
             */
            state.match_available = true;
            state.strstart += 1;
            state.lookahead -= 1;
        }
    }

    debug_assert_ne!(flush, Flush::NoFlush, "no flush?");

    if state.match_available {
        let lc = state.window.bytes()[state.strstart - 1];
        state.tally_lit(lc);
        state.match_available = false;
    }

    flush_block!(state, io, flush == Flush::Finish);

    if flush == Flush::Finish {
        return BlockState::FinishDone;
    }

    BlockState::BlockDone
}
