//! Error taxonomy shared by every format parser and decompressor.
//!
//! Kinds map directly onto the error taxonomy: a read that crosses the
//! end of the buffer is [`Error::OutOfBounds`], bad magic bytes are
//! [`Error::InvalidSignature`], a broken structural invariant is
//! [`Error::InvalidStructure`], a recognised-but-unimplemented variant is
//! [`Error::Unsupported`], two cross-referenced fields disagreeing is
//! [`Error::Inconsistent`], and a decompressor that cannot continue is
//! [`Error::DecompressionFailure`].

use alloc::string::String;
use core::fmt;
use core::result;

#[derive(Debug)]
pub enum Error {
    /// A read would have crossed the end of the byte source.
    OutOfBounds { offset: usize, len: usize },
    /// Magic bytes did not match any recognised format.
    InvalidSignature(String),
    /// A structural invariant failed (bad size, overlapping tables, etc).
    InvalidStructure(String),
    /// A recognised but unimplemented sub-variant.
    Unsupported(String),
    /// Two cross-referenced fields disagree; a best-effort value was used.
    Inconsistent(String),
    /// A decompressor could not continue.
    DecompressionFailure(String),
    /// Passthrough from [`scroll`]'s own bounds-checked readers.
    Scroll(scroll::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfBounds { offset, len } => {
                write!(f, "read at offset {offset:#x} exceeds buffer length {len:#x}")
            }
            Error::InvalidSignature(msg) => write!(f, "invalid signature: {msg}"),
            Error::InvalidStructure(msg) => write!(f, "invalid structure: {msg}"),
            Error::Unsupported(msg) => write!(f, "unsupported: {msg}"),
            Error::Inconsistent(msg) => write!(f, "inconsistent: {msg}"),
            Error::DecompressionFailure(msg) => write!(f, "decompression failed: {msg}"),
            Error::Scroll(err) => write!(f, "{err}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        // scroll's own error already distinguishes "read past the end" from
        // other failures in its Display impl; we don't pattern-match on its
        // private variant set and instead keep it as a transparent wrapper.
        Error::Scroll(err)
    }
}

pub type Result<T> = result::Result<T, Error>;
