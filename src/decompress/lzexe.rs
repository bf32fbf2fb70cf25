//! LZEXE 0.90/0.91 bit-stream LZSS decompression (spec.md §4.K).

use alloc::vec::Vec;

use crate::decompress::DecompressionResult;
use crate::error::{self, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    V090,
    V091,
}

const V090_SIGNATURE: &[u8] = b"LZ09";
const V091_SIGNATURE: &[u8] = b"LZ91";

/// LZEXE stamps a 4-byte ASCII signature a fixed distance into the stub
/// that immediately follows the MZ header; real unpackers search the
/// first kilobyte for it rather than trusting a single fixed offset,
/// since stub size drifted slightly between distributions.
pub fn detect(scan: &[u8]) -> Option<Variant> {
    for window in scan.windows(4) {
        if window == V091_SIGNATURE {
            return Some(Variant::V091);
        }
        if window == V090_SIGNATURE {
            return Some(Variant::V090);
        }
    }
    None
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    mask: u16,
    buf: u16,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0, mask: 0, buf: 0 }
    }

    fn bit(&mut self) -> error::Result<u8> {
        if self.mask == 0 {
            if self.pos + 2 > self.data.len() {
                return Err(Error::DecompressionFailure("LZEXE bit stream exhausted".into()));
            }
            self.buf = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
            self.pos += 2;
            self.mask = 0x8000;
        }
        let bit = if self.buf & self.mask != 0 { 1 } else { 0 };
        self.mask >>= 1;
        Ok(bit)
    }

    fn byte(&mut self) -> error::Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::DecompressionFailure("LZEXE byte stream exhausted".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn bits(&mut self, n: u32) -> error::Result<u32> {
        let mut value = 0u32;
        for _ in 0..n {
            value = (value << 1) | self.bit()? as u32;
        }
        Ok(value)
    }
}

/// `1 => literal byte; 0 => read another bit: 1 => 13-bit offset / 3-bit
/// length (minus fixed constants), 0 => 11-bit offset / 2-bit length`
/// (spec.md §4.K). A zero-length match terminates the stream.
///
/// Returns the decoded bytes plus how much of `compressed` the bit reader
/// consumed, so the caller can locate the encoded relocation run that
/// immediately follows the terminator word.
fn lzss_decode(compressed: &[u8]) -> error::Result<(Vec<u8>, usize)> {
    let mut bits = BitReader::new(compressed);
    let mut out: Vec<u8> = Vec::with_capacity(compressed.len() * 3);
    loop {
        if bits.bit()? == 1 {
            out.push(bits.byte()?);
            continue;
        }
        let (offset, length) = if bits.bit()? == 1 {
            let raw = bits.bits(13)?;
            let extra_len = bits.bits(3)?;
            let length = if extra_len == 7 {
                bits.byte()? as u32 + 7 + 2
            } else {
                extra_len + 2
            };
            (raw, length)
        } else {
            let raw = bits.bits(11)?;
            let extra_len = bits.bits(2)?;
            (raw, extra_len + 2)
        };

        if offset == 0 && length == 2 {
            break;
        }
        let back = (offset + 1) as usize;
        if back > out.len() {
            return Err(Error::DecompressionFailure("LZEXE back-reference precedes output start".into()));
        }
        let start = out.len() - back;
        for i in 0..length as usize {
            let byte = out[start + i];
            out.push(byte);
        }
    }
    Ok((out, bits.pos))
}

/// Relocations are stored as an encoded run of u16 deltas with
/// segment-advance markers: a zero word advances the current segment by
/// `0x1000`, any other word is an offset delta within the segment
/// (spec.md §4.K).
fn read_relocations(tail: &[u8]) -> Vec<(u16, u16)> {
    let mut relocs = Vec::new();
    let mut segment = 0u16;
    let mut offset = 0u16;
    let mut pos = 0;
    while pos + 2 <= tail.len() {
        let word = u16::from_le_bytes([tail[pos], tail[pos + 1]]);
        pos += 2;
        if word == 0 {
            segment = segment.wrapping_add(0x1000);
            continue;
        }
        if word == 0xffff {
            break;
        }
        offset = offset.wrapping_add(word);
        relocs.push((segment, offset));
    }
    relocs
}

pub fn decompress(bytes: &[u8]) -> error::Result<DecompressionResult> {
    let header = crate::mz::MzHeader::parse(bytes)?;
    let code = &bytes[header.code_offset()..];
    let scan = &code[..code.len().min(1024)];
    detect(scan).ok_or_else(|| Error::DecompressionFailure("no LZEXE signature found".into()))?;

    // LZEXE rewrites the outer e_cs:e_ip pair to point at the small
    // relocating stub's own entry routine rather than the original
    // program's; the compressed payload begins immediately after that
    // stub, whose length therefore varies by file and version rather
    // than sitting at a fixed offset.
    let stub_offset = (header.e_cs as usize)
        .checked_mul(16)
        .and_then(|base| base.checked_add(header.e_ip as usize))
        .ok_or_else(|| Error::DecompressionFailure("LZEXE stub offset overflow".into()))?;
    if stub_offset >= code.len() {
        return Err(Error::DecompressionFailure("LZEXE stub offset beyond code section".into()));
    }
    let payload = &code[stub_offset..];
    let (decoded, consumed) = lzss_decode(payload)?;
    let tail = &payload[consumed..];

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
        relocations: read_relocations(tail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mz::MzHeader;
    use scroll::Pwrite;

    #[test]
    fn decompress_reads_relocations_from_the_real_tail() {
        let mut header = MzHeader {
            e_magic: 0x5a4d,
            e_cparhdr: 4,
            ..Default::default()
        };
        header.e_cs = 0;
        header.e_ip = 0;

        let mut code = Vec::new();
        code.extend_from_slice(&0x0000u16.to_le_bytes()); // lzss terminator match
        code.extend_from_slice(&0x0010u16.to_le_bytes()); // relocation offset delta
        code.extend_from_slice(&0xffffu16.to_le_bytes()); // relocation terminator
        code.extend_from_slice(V091_SIGNATURE);

        let mut buf = vec![0u8; header.e_cparhdr as usize * 16];
        buf.pwrite_with(header, 0, scroll::LE).unwrap();
        buf.extend_from_slice(&code);

        let result = decompress(&buf).unwrap();
        assert_eq!(result.relocations, vec![(0u16, 0x10u16)]);
        assert!(result.code.is_empty());
    }

    #[test]
    fn detects_v091_signature_anywhere_in_scan_window() {
        let mut scan = vec![0u8; 64];
        scan[40..44].copy_from_slice(V091_SIGNATURE);
        assert_eq!(detect(&scan), Some(Variant::V091));
    }

    #[test]
    fn relocation_run_advances_segment_on_zero_word() {
        let mut tail = Vec::new();
        tail.extend_from_slice(&0u16.to_le_bytes()); // segment advance
        tail.extend_from_slice(&0x10u16.to_le_bytes()); // offset delta
        tail.extend_from_slice(&0xffffu16.to_le_bytes()); // terminator
        let relocs = read_relocations(&tail);
        assert_eq!(relocs, vec![(0x1000, 0x10)]);
    }

    #[test]
    fn zero_offset_zero_length_match_terminates_immediately() {
        // flag=0 (match), flag=0 (short form), 11-bit offset=0, 2-bit
        // length=0 packed MSB-first into one all-zero 16-bit word.
        let compressed = 0x0000u16.to_le_bytes();
        let (decoded, consumed) = lzss_decode(&compressed).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(consumed, 2);
    }
}
