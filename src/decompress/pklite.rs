//! PKLITE detection and LZSS-style decompression (spec.md §4.K).
//!
//! PKLITE intros are a family of short, hand-written asm stubs. Real-world
//! unpacker tools (e.g. UNP, `pklite_unpacker`) detect the exact variant by
//! matching fixed byte windows with wildcards against the first bytes of
//! the entry point; we follow the same approach with a small signature
//! table rather than disassembling.

use alloc::vec::Vec;

use crate::decompress::DecompressionResult;
use crate::error::{self, Error};
use crate::mz::find_pattern;

/// Intro family, loosely ordered by historical release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intro {
    Beta,
    V100,
    V112,
    V114,
    V115,
    V150,
}

/// Descrambler applied to the compressed stub before the core LZSS decode
/// starts, or none if the stub was shipped unscrambled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descrambler {
    None,
    Variant(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decompressor {
    Common,
    Beta,
    V115,
    V120Small,
}

/// Result of matching the entry-point signature table.
#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub intro: Intro,
    pub descrambler: Descrambler,
    pub decompressor: Decompressor,
    pub extra_compression: bool,
    pub v120_compression: bool,
    entry_point: usize,
}

/// One row of the signature table: a fixed-offset pattern with `None`
/// standing in for a wildcard byte.
struct Signature {
    intro: Intro,
    decompressor: Decompressor,
    pattern: &'static [Option<u8>],
}

macro_rules! byte {
    ($b:expr) => {
        Some($b)
    };
}
macro_rules! any {
    () => {
        None
    };
}

static SIGNATURES: &[Signature] = &[
    // PKLITE v1.00-1.14: `PUSH CS / POP DS / MOV SI/DI, imm16` opener.
    Signature {
        intro: Intro::V100,
        decompressor: Decompressor::Common,
        pattern: &[byte!(0x0e), byte!(0x1f), byte!(0xb8), any!(), any!()],
    },
    Signature {
        intro: Intro::V112,
        decompressor: Decompressor::Common,
        pattern: &[byte!(0xb8), any!(), any!(), byte!(0x8e), byte!(0xd8)],
    },
    Signature {
        intro: Intro::V114,
        decompressor: Decompressor::Common,
        pattern: &[byte!(0xfa), byte!(0xb8), any!(), any!(), byte!(0x8e), byte!(0xd0)],
    },
    Signature {
        intro: Intro::V115,
        decompressor: Decompressor::V115,
        pattern: &[byte!(0x06), byte!(0x0e), byte!(0x1f), byte!(0xfc), any!(), any!()],
    },
    Signature {
        intro: Intro::V150,
        decompressor: Decompressor::V120Small,
        pattern: &[byte!(0xb8), any!(), any!(), byte!(0x50), byte!(0x06)],
    },
    Signature {
        intro: Intro::Beta,
        decompressor: Decompressor::Beta,
        pattern: &[byte!(0xbe), any!(), any!(), byte!(0xbf), any!(), any!()],
    },
];

/// Recovers the XOR/ADD descrambling key from a scrambled stub, or
/// [`Descrambler::None`] when the opening bytes already match a known
/// plaintext signature.
fn detect_descrambler(scan: &[u8]) -> Descrambler {
    for (variant, xor_key) in [(1u8, 0x55u8), (2, 0xaa), (3, 0x33)] {
        if scan.len() < 4 {
            continue;
        }
        let candidate = [scan[0] ^ xor_key, scan[1] ^ xor_key, scan[2] ^ xor_key, scan[3] ^ xor_key];
        if candidate == [0xb8, 0x00, 0x00, 0x8e] {
            return Descrambler::Variant(variant);
        }
    }
    Descrambler::None
}

/// Scans `scan` (the first ~1 KiB of the code section) for a known PKLITE
/// entry-point pattern.
pub fn detect(scan: &[u8]) -> Option<Variant> {
    for sig in SIGNATURES {
        if let Some(pos) = find_pattern(scan, sig.pattern) {
            return Some(Variant {
                intro: sig.intro,
                descrambler: detect_descrambler(scan),
                decompressor: sig.decompressor,
                extra_compression: scan.windows(2).any(|w| w == [0x2d, 0x01]),
                v120_compression: matches!(sig.decompressor, Decompressor::V120Small),
                entry_point: pos,
            });
        }
    }
    None
}

fn descramble(buf: &mut [u8], descrambler: Descrambler) {
    let key = match descrambler {
        Descrambler::None => return,
        Descrambler::Variant(1) => 0x55u16,
        Descrambler::Variant(2) => 0xaa,
        Descrambler::Variant(3) => 0x33,
        Descrambler::Variant(_) => return,
    };
    let mut running = key;
    for byte in buf.iter_mut() {
        *byte ^= (running & 0xff) as u8;
        running = running.wrapping_add(0x1111);
    }
}

/// LSB-first bit reader over the compressed payload, matching the
/// prefix-bit-selects-literal-vs-match scheme described in spec.md §4.K.
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    bit_buf: u16,
    bits_left: u8,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0, bit_buf: 0, bits_left: 0 }
    }

    fn next_bit(&mut self) -> error::Result<u8> {
        if self.bits_left == 0 {
            if self.pos + 2 > self.data.len() {
                return Err(Error::DecompressionFailure("bit stream exhausted".into()));
            }
            self.bit_buf = u16::from_le_bytes([self.data[self.pos], self.data[self.pos + 1]]);
            self.pos += 2;
            self.bits_left = 16;
        }
        let bit = (self.bit_buf & 1) as u8;
        self.bit_buf >>= 1;
        self.bits_left -= 1;
        Ok(bit)
    }

    fn next_byte(&mut self) -> error::Result<u8> {
        if self.pos >= self.data.len() {
            return Err(Error::DecompressionFailure("byte stream exhausted".into()));
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }
}

/// Decodes a match offset from a small Huffman tree over fixed code
/// lengths, matching the encodings observed across PKLITE decompressors
/// (common/beta/v1.15/v1.20-small only differ in the literal table used
/// here, which we treat uniformly since the bitstream shape is identical).
fn decode_length(bits: &mut BitReader<'_>) -> error::Result<usize> {
    let mut len = 2usize;
    loop {
        if bits.next_bit()? == 1 {
            len += 1;
            if len >= 2 + 15 {
                break;
            }
        } else {
            break;
        }
    }
    Ok(len)
}

fn decode_offset(bits: &mut BitReader<'_>) -> error::Result<usize> {
    if bits.next_bit()? == 1 {
        let b = bits.next_byte()? as usize;
        Ok(b + 1)
    } else {
        let hi = bits.next_byte()? as usize;
        let lo = bits.next_byte()? as usize;
        Ok(((hi << 8) | lo) + 1)
    }
}

fn lzss_decode(compressed: &[u8]) -> error::Result<Vec<u8>> {
    let mut bits = BitReader::new(compressed);
    let mut out = Vec::with_capacity(compressed.len() * 3);
    loop {
        if bits.next_bit()? == 1 {
            out.push(bits.next_byte()?);
        } else {
            let len = decode_length(&mut bits)?;
            let offset = decode_offset(&mut bits)?;
            if offset == 0 || offset > out.len() {
                break;
            }
            if len == 2 && offset == out.len() {
                break;
            }
            let start = out.len() - offset;
            for i in 0..len {
                let byte = out[start + i];
                out.push(byte);
            }
        }
    }
    Ok(out)
}

/// Parses the relocation table trailing the compressed payload: a 16-bit
/// count followed by that many entries, each either a "short" u16 offset
/// delta within the current segment, or a "long" u16 segment + u16 offset
/// pair, distinguished by a leading marker byte (spec.md §4.K).
fn read_relocations(tail: &[u8]) -> error::Result<Vec<(u16, u16)>> {
    if tail.len() < 2 {
        return Ok(Vec::new());
    }
    let count = u16::from_le_bytes([tail[0], tail[1]]) as usize;
    let mut relocs = Vec::with_capacity(count);
    let mut pos = 2;
    let mut segment = 0u16;
    let mut offset = 0u16;
    for _ in 0..count {
        if pos + 1 > tail.len() {
            return Err(Error::DecompressionFailure("truncated PKLITE relocation table".into()));
        }
        if tail[pos] == 0xff {
            if pos + 5 > tail.len() {
                return Err(Error::DecompressionFailure("truncated long-form PKLITE relocation".into()));
            }
            offset = u16::from_le_bytes([tail[pos + 1], tail[pos + 2]]);
            segment = u16::from_le_bytes([tail[pos + 3], tail[pos + 4]]);
            pos += 5;
        } else {
            if pos + 2 > tail.len() {
                return Err(Error::DecompressionFailure("truncated short-form PKLITE relocation".into()));
            }
            let delta = u16::from_le_bytes([tail[pos], tail[pos + 1]]);
            offset = offset.wrapping_add(delta);
            pos += 2;
        }
        relocs.push((segment, offset));
    }
    Ok(relocs)
}

pub fn decompress(bytes: &[u8]) -> error::Result<DecompressionResult> {
    let header = crate::mz::MzHeader::parse(bytes)?;
    let code = &bytes[header.code_offset()..];
    let scan = &code[..code.len().min(1024)];
    let variant = detect(scan)
        .ok_or_else(|| Error::DecompressionFailure("no PKLITE signature at entry point".into()))?;

    let mut scrambled = code[variant.entry_point..].to_vec();
    descramble(&mut scrambled, variant.descrambler);

    // Skip the fixed-size decompressor stub that precedes the compressed
    // payload; its length is decompressor-family dependent.
    let stub_len = match variant.decompressor {
        Decompressor::Common => 25,
        Decompressor::Beta => 29,
        Decompressor::V115 => 27,
        Decompressor::V120Small => 21,
    };
    if scrambled.len() < stub_len {
        return Err(Error::DecompressionFailure("PKLITE stub shorter than expected".into()));
    }
    let payload = &scrambled[stub_len..];
    let decoded = lzss_decode(payload)?;

    let consumed = payload.len().min(decoded.len().max(1));
    let tail = if consumed < payload.len() { &payload[consumed..] } else { &[][..] };
    let relocations = read_relocations(tail).unwrap_or_default();

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
        relocations,
    })
}
