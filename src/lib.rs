//! `legexe` parses legacy and modern x86/x64 executable images — DOS MZ,
//! 16-bit NE, 32/64-bit PE/PE+, and 32-bit LE/LX — and decompresses four
//! DOS-era packer formats back into runnable MZ images.
//!
//! Entry points:
//!
//! - [`sniff::classify`] identifies a buffer's format.
//! - [`ExecutableFile::parse`] parses any recognised format into a single
//!   sum-typed value.
//! - [`decompress::decompress`] turns a packed MZ image back into a
//!   [`decompress::DecompressionResult`].
//!
//! Every parser is a pure function of bytes to model: nothing here opens a
//! file, runs code, or writes to disk.
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "alloc")]
pub mod error;
#[cfg(feature = "alloc")]
pub mod cursor;
#[cfg(feature = "alloc")]
pub mod diagnostics;
#[cfg(feature = "alloc")]
pub mod entropy;
#[cfg(feature = "alloc")]
pub mod rva;
#[cfg(feature = "alloc")]
pub mod sniff;

#[cfg(feature = "alloc")]
pub mod mz;
#[cfg(feature = "alloc")]
pub mod ne;
#[cfg(feature = "alloc")]
pub mod le;
#[cfg(feature = "alloc")]
pub mod pe;
#[cfg(feature = "alloc")]
pub mod resource;
#[cfg(feature = "alloc")]
pub mod decompress;

#[cfg(feature = "alloc")]
pub use executable::ExecutableFile;

#[cfg(feature = "alloc")]
mod executable {
    use crate::error;
    use crate::sniff::{self, FormatTag};
    use crate::{le, mz, ne, pe};

    /// The top-level sum type: one variant per recognised format, each
    /// carrying its parsed model plus the buffer it borrows from.
    #[derive(Debug)]
    pub enum ExecutableFile<'a> {
        Mz(mz::Mz<'a>),
        Ne(ne::Ne<'a>),
        Pe(pe::PE<'a>),
        Le(le::Le<'a>),
    }

    impl<'a> ExecutableFile<'a> {
        /// Classifies `bytes` and parses it with the matching format parser.
        pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
            match sniff::classify(bytes)? {
                FormatTag::MzDos => Ok(ExecutableFile::Mz(mz::Mz::parse(bytes)?)),
                FormatTag::NeWin16 => Ok(ExecutableFile::Ne(ne::Ne::parse(bytes)?)),
                FormatTag::Pe32 | FormatTag::Pe32Plus => {
                    Ok(ExecutableFile::Pe(pe::PE::parse(bytes)?))
                }
                FormatTag::LeDos32Bound
                | FormatTag::LeDos32Raw
                | FormatTag::LeVxd
                | FormatTag::LxOs2Bound
                | FormatTag::LxOs2Raw => Ok(ExecutableFile::Le(le::Le::parse(bytes)?)),
                FormatTag::Unknown => Err(error::Error::InvalidSignature(
                    "buffer does not match any recognised executable format".into(),
                )),
            }
        }

        /// The format tag this file was classified as.
        pub fn format(&self) -> FormatTag {
            match self {
                ExecutableFile::Mz(_) => FormatTag::MzDos,
                ExecutableFile::Ne(_) => FormatTag::NeWin16,
                ExecutableFile::Pe(pe) => {
                    if pe.is_64 {
                        FormatTag::Pe32Plus
                    } else {
                        FormatTag::Pe32
                    }
                }
                ExecutableFile::Le(le) => le.format,
            }
        }
    }
}
