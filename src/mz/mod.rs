//! DOS MZ header parsing, packer signature detection, and entropy-based
//! heuristics (component D).

use alloc::string::String;
use alloc::vec::Vec;
use log::debug;
use scroll::{Pread, Pwrite, SizeWith};

use crate::entropy;
use crate::error::{self, Error};

pub const SIZEOF_MZ_HEADER: usize = 0x40;

/// The classic 16-field DOS header plus `e_lfanew` (spec.md §3).
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct MzHeader {
    pub e_magic: u16,
    pub e_cblp: u16,
    pub e_cp: u16,
    pub e_crlc: u16,
    pub e_cparhdr: u16,
    pub e_minalloc: u16,
    pub e_maxalloc: u16,
    pub e_ss: u16,
    pub e_sp: u16,
    pub e_csum: u16,
    pub e_ip: u16,
    pub e_cs: u16,
    pub e_lfarlc: u16,
    pub e_ovno: u16,
    pub e_res: [u16; 4],
    pub e_oemid: u16,
    pub e_oeminfo: u16,
    pub e_res2: [u16; 10],
    pub e_lfanew: u32,
}

impl MzHeader {
    pub fn parse(bytes: &[u8]) -> error::Result<Self> {
        let header: MzHeader = bytes.pread_with(0, scroll::LE)?;
        if header.e_magic != 0x5a4d && header.e_magic != 0x4d5a {
            return Err(Error::InvalidSignature(alloc::format!(
                "bad MZ magic {:#06x}",
                header.e_magic
            )));
        }
        if header.e_cparhdr < 2 {
            return Err(Error::InvalidStructure(alloc::format!(
                "e_cparhdr {} is below the minimum of 2 paragraphs",
                header.e_cparhdr
            )));
        }
        Ok(header)
    }

    /// Byte offset of the first paragraph after the header: `e_cparhdr*16`.
    pub fn code_offset(&self) -> usize {
        self.e_cparhdr as usize * 16
    }
}

/// A parsed MZ image: header plus a view of the code section that follows.
#[derive(Debug)]
pub struct Mz<'a> {
    pub header: MzHeader,
    bytes: &'a [u8],
}

/// Detected packer family, returned by [`Mz::detect_packer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackerKind {
    Pklite,
    Lzexe,
    Exepack,
    KnowledgeDynamicsLzw,
    Diet,
}

impl<'a> Mz<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        let header = MzHeader::parse(bytes)?;
        debug!("{:#?}", header);
        Ok(Mz { header, bytes })
    }

    /// `source[e_cparhdr*16 ..]` (spec.md §4.D).
    pub fn code_section(&self) -> &'a [u8] {
        let off = self.header.code_offset().min(self.bytes.len());
        &self.bytes[off..]
    }

    /// Scans the first ~1 KiB of the code section for each decompressor's
    /// `detect()` predicate (spec.md §4.D). Returns the first match; a
    /// packer may legitimately match more than one family's loose
    /// pattern, so order reflects prevalence (PKLITE and LZEXE are by far
    /// the most common DOS packers seen in the wild).
    pub fn detect_packer(&self) -> Option<PackerKind> {
        let code = self.code_section();
        let scan = &code[..code.len().min(1024)];
        if crate::decompress::pklite::detect(scan).is_some() {
            return Some(PackerKind::Pklite);
        }
        if crate::decompress::lzexe::detect(scan).is_some() {
            return Some(PackerKind::Lzexe);
        }
        if crate::decompress::exepack::detect(self.bytes, &self.header).is_some() {
            return Some(PackerKind::Exepack);
        }
        if crate::decompress::kdlzw::detect(self.bytes, &self.header).is_some() {
            return Some(PackerKind::KnowledgeDynamicsLzw);
        }
        if crate::decompress::diet::detect(scan).is_some() {
            return Some(PackerKind::Diet);
        }
        None
    }

    /// High-entropy code section (>= 7.0 bits/byte) or any packer
    /// signature matched (spec.md §4.D).
    pub fn is_likely_packed(&self) -> bool {
        let code = self.code_section();
        let sample = &code[..code.len().min(4096)];
        entropy::shannon_entropy(sample) >= entropy::HIGH_ENTROPY || self.detect_packer().is_some()
    }

    pub fn entropy(&self) -> f64 {
        entropy::shannon_entropy(self.code_section())
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

pub(crate) fn find_pattern(haystack: &[u8], needle: &[Option<u8>]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    'outer: for start in 0..=haystack.len() - needle.len() {
        for (i, expected) in needle.iter().enumerate() {
            if let Some(byte) = expected {
                if haystack[start + i] != *byte {
                    continue 'outer;
                }
            }
        }
        return Some(start);
    }
    None
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&alloc::format!("{b:02x}"));
    }
    s
}

#[allow(unused)]
pub(crate) fn relocations_as_vec(rel: &[(u16, u16)]) -> Vec<(u16, u16)> {
    rel.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_mz(cparhdr: u16, code: &[u8]) -> Vec<u8> {
        let mut header = MzHeader {
            e_magic: 0x5a4d,
            e_cparhdr: cparhdr,
            e_lfanew: 0,
            ..Default::default()
        };
        header.e_cp = 1;
        let mut buf = vec![0u8; cparhdr as usize * 16];
        buf.pwrite_with(header, 0, scroll::LE).unwrap();
        buf.extend_from_slice(code);
        buf
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 0x40];
        assert!(MzHeader::parse(&buf).is_err());
    }

    #[test]
    fn code_section_starts_after_header_paragraphs() {
        let buf = minimal_mz(4, &[0xaa, 0xbb, 0xcc]);
        let mz = Mz::parse(&buf).unwrap();
        assert_eq!(mz.code_section(), &[0xaa, 0xbb, 0xcc]);
    }

    #[test]
    fn uniform_code_is_not_packed() {
        let buf = minimal_mz(4, &[0x90; 200]);
        let mz = Mz::parse(&buf).unwrap();
        assert!(!mz.is_likely_packed());
    }
}
