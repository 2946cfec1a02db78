//! A streaming DEFLATE compressor.
//!
//! `zflate` produces RFC 1951 bit streams, optionally framed by the RFC 1950
//! zlib wrapper (2-byte header, big-endian Adler-32 trailer). The caller
//! feeds input and drains output in chunks of any size; the compressor
//! suspends whenever it runs out of either and resumes byte-identically on
//! the next call.
//!
//! ```
//! use zflate::{deflate::{compress_slice, DeflateConfig}, ReturnCode};
//!
//! let input = b"Hello! Hello! Hello! Hello! Hello! Hello!";
//! let mut output = vec![0; 128];
//! let (compressed, err) = compress_slice(&mut output, input, DeflateConfig::new(6));
//! assert_eq!(err, ReturnCode::Ok);
//! assert!(compressed.len() < input.len());
//! ```

#![forbid(unsafe_code)]

mod adler32;
pub mod deflate;

pub use adler32::adler32;

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if cfg!(feature = "trace") {
            eprint!($($arg)*);
        }
    };
}

/// initial adler-32 hash value
pub(crate) const ADLER32_INITIAL_VALUE: u32 = 1;

pub const MIN_WBITS: i32 = 9; // 512b LZ77 window
pub const MAX_WBITS: i32 = 15; // 32kb LZ77 window

/// Pass this as the `level` to let the compressor pick (currently level 6).
pub const DEFAULT_COMPRESSION: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Flush {
    #[default]
    NoFlush = 0,
    PartialFlush = 1,
    SyncFlush = 2,
    FullFlush = 3,
    Finish = 4,
}

impl TryFrom<i32> for Flush {
    type Error = ();

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Flush::NoFlush),
            1 => Ok(Flush::PartialFlush),
            2 => Ok(Flush::SyncFlush),
            3 => Ok(Flush::FullFlush),
            4 => Ok(Flush::Finish),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i32)]
pub enum ReturnCode {
    Ok = 0,
    StreamEnd = 1,
    StreamError = -2,
    DataError = -3,
    BufError = -5,
}

impl ReturnCode {
    pub(crate) const fn message(self) -> Option<&'static str> {
        match self {
            ReturnCode::Ok => None,
            ReturnCode::StreamEnd => Some("stream end"),
            ReturnCode::StreamError => Some("stream error"),
            ReturnCode::DataError => Some("data error"),
            ReturnCode::BufError => Some("buffer error"),
        }
    }
}

/// What a single [`deflate::DeflateStream::deflate`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamResult {
    pub return_code: ReturnCode,
    /// bytes taken from the front of the input slice
    pub bytes_consumed: usize,
    /// bytes placed at the front of the output slice
    pub bytes_written: usize,
}
