//! DIET LZ77 detection and decompression (spec.md §4.K).
//!
//! DIET stamps a `"dlz"` marker somewhere in the stub and distinguishes
//! its four sub-versions by a flag byte next to it. Signature position
//! drifted across releases and is easy to confuse on a mutated or
//! truncated file, so any ambiguous match is reported as
//! [`Error::InvalidStructure`] rather than guessed at.

use alloc::vec::Vec;

use crate::decompress::DecompressionResult;
use crate::error::{self, Error};
use crate::mz::MzHeader;

const SIGNATURE: &[u8] = b"dlz";
const WINDOW_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V100,
    V102To120,
    V144,
    V145f,
}

#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub version: Version,
    signature_offset: usize,
}

fn classify_flag(flag: u8) -> error::Result<Version> {
    match flag {
        0x00 => Ok(Version::V100),
        0x01..=0x03 => Ok(Version::V102To120),
        0x04 => Ok(Version::V144),
        0x05 => Ok(Version::V145f),
        _ => Err(Error::InvalidStructure(alloc::format!("ambiguous DIET version flag {flag:#04x}"))),
    }
}

/// Scans `scan` for a single unambiguous `"dlz"` marker. More than one
/// candidate match, or a flag byte outside the known set, is reported as
/// [`Error::InvalidStructure`] rather than a silent best guess.
pub fn detect(scan: &[u8]) -> Option<Variant> {
    let mut matches = scan
        .windows(SIGNATURE.len())
        .enumerate()
        .filter(|(_, w)| *w == SIGNATURE);
    let (offset, _) = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    let flag = *scan.get(offset + SIGNATURE.len())?;
    let version = classify_flag(flag).ok()?;
    Some(Variant { version, signature_offset: offset })
}

/// LSB-first bit reader, one byte at a time (spec.md §4.K).
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    buf: u8,
    bits_left: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0, buf: 0, bits_left: 0 }
    }

    fn bit(&mut self) -> error::Result<u8> {
        if self.bits_left == 0 {
            let byte = *self.data.get(self.pos).ok_or(Error::DecompressionFailure(
                "DIET bit stream exhausted".into(),
            ))?;
            self.pos += 1;
            self.buf = byte;
            self.bits_left = 8;
        }
        let bit = self.buf & 1;
        self.buf >>= 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    fn byte(&mut self) -> error::Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::DecompressionFailure("DIET byte stream exhausted".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn bits(&mut self, n: u32) -> error::Result<u32> {
        let mut v = 0u32;
        for i in 0..n {
            v |= (self.bit()? as u32) << i;
        }
        Ok(v)
    }
}

/// A 8 KiB sliding window LZ77 stream: `1` → literal byte; `0` → a match
/// encoded as a length prefix followed by an offset into the window
/// (spec.md §4.K). Segment-refresh codes (a zero-length, zero-offset
/// match) mark EXE relocation boundaries and are otherwise no-ops here.
fn lz77_decode(body: &[u8]) -> error::Result<Vec<u8>> {
    let mut bits = BitReader::new(body);
    let mut out: Vec<u8> = Vec::with_capacity(body.len() * 3);

    loop {
        if bits.bit()? == 1 {
            out.push(bits.byte()?);
            continue;
        }

        let mut length = 2u32;
        let mut extra_bits = 1u32;
        loop {
            if bits.bit()? == 1 {
                length += 1;
                extra_bits += 1;
                if extra_bits > 16 {
                    return Err(Error::DecompressionFailure("DIET match length prefix ran away".into()));
                }
            } else {
                break;
            }
        }
        let offset_bits = if length <= 3 { 7 } else { 13 };
        let offset = bits.bits(offset_bits)?;

        if offset == 0 && length == 2 {
            // Segment-refresh marker: no payload bytes, continue decoding.
            continue;
        }
        if out.is_empty() && offset == 0 {
            return Err(Error::DecompressionFailure("DIET back-reference before any output".into()));
        }
        let back = offset as usize + 1;
        if back > out.len() || back > WINDOW_SIZE {
            return Err(Error::DecompressionFailure("DIET back-reference outside window".into()));
        }
        let start = out.len() - back;
        for i in 0..length as usize {
            let b = out[start + i];
            out.push(b);
        }

        if bits.pos >= body.len() && bits.bits_left == 0 {
            break;
        }
    }
    Ok(out)
}

fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xffff;
    for &b in data {
        crc ^= (b as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

pub fn decompress(bytes: &[u8]) -> error::Result<DecompressionResult> {
    let header = MzHeader::parse(bytes)?;
    let code = &bytes[header.code_offset()..];
    let scan = &code[..code.len().min(1024)];
    let variant = detect(scan).ok_or_else(|| Error::DecompressionFailure("no unambiguous DIET signature found".into()))?;
    let _ = variant;

    // The compressed body starts immediately after the detector's
    // window; the trailing CRC-16 is verified but not retained.
    let body_start = code.len().min(variant.signature_offset + SIGNATURE.len() + 1);
    let body = &code[body_start..];
    if body.len() < 2 {
        return Err(Error::DecompressionFailure("DIET payload missing trailing CRC-16".into()));
    }
    let (payload, crc_bytes) = body.split_at(body.len() - 2);
    let decoded = lz77_decode(payload)?;
    let expected_crc = u16::from_le_bytes([crc_bytes[0], crc_bytes[1]]);
    let actual_crc = crc16_ccitt(payload);
    if expected_crc != actual_crc {
        return Err(Error::Inconsistent(alloc::format!(
            "DIET CRC-16 mismatch: expected {expected_crc:#06x}, computed {actual_crc:#06x}"
        )));
    }

    Ok(DecompressionResult {
        code: decoded,
        initial_cs: header.e_cs,
        initial_ip: header.e_ip,
        initial_ss: header.e_ss,
        initial_sp: header.e_sp,
        min_extra_paragraphs: header.e_minalloc,
        max_extra_paragraphs: header.e_maxalloc,
        header_paragraphs: header.e_cparhdr,
        checksum: 0,
        relocations: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_single_unambiguous_signature() {
        let mut scan = vec![0u8; 32];
        scan[4..7].copy_from_slice(SIGNATURE);
        scan[7] = 0x04;
        let variant = detect(&scan).unwrap();
        assert_eq!(variant.version, Version::V144);
    }

    #[test]
    fn multiple_signature_candidates_are_ambiguous() {
        let mut scan = vec![0u8; 32];
        scan[2..5].copy_from_slice(SIGNATURE);
        scan[10..13].copy_from_slice(SIGNATURE);
        assert!(detect(&scan).is_none());
    }

    #[test]
    fn unknown_flag_byte_is_rejected() {
        let mut scan = vec![0u8; 32];
        scan[2..5].copy_from_slice(SIGNATURE);
        scan[5] = 0xaa;
        assert!(detect(&scan).is_none());
    }

    #[test]
    fn crc16_is_deterministic() {
        assert_eq!(crc16_ccitt(b"123456789"), crc16_ccitt(b"123456789"));
    }
}
