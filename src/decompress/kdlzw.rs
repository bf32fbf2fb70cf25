//! Knowledge Dynamics LZW decompression (spec.md §4.K).
//!
//! The original header fields live in a *second* MZ header appended at
//! the end of the file; the packed body is a 9-to-12-bit variable-width
//! LZW stream with dictionary entries stored as `(prev_index, byte)`
//! pairs and emitted in reverse through a small local queue.

use alloc::vec::Vec;

use crate::decompress::DecompressionResult;
use crate::error::{self, Error};
use crate::mz::MzHeader;

const RESET_CODE: u16 = 0x0100;
const EOF_CODE: u16 = 0x0101;
const DICT_CAPACITY: usize = 768 * 16;
const KEY_MASK: [u16; 4] = [0x01ff, 0x03ff, 0x07ff, 0x0fff];

#[derive(Debug, Clone, Copy)]
pub struct KdParams {
    pub code_offset: usize,
    pub expected_size: usize,
    pub initial_ip: u16,
    pub initial_cs: u16,
    pub initial_sp: u16,
    pub initial_ss: u16,
    pub checksum: u16,
    pub max_mem_para: u16,
    pub min_mem_para: u16,
    pub relocation_offset: usize,
    pub num_relocations: u16,
}

fn read_u16(buf: &[u8], offset: usize) -> error::Result<u16> {
    buf.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(Error::OutOfBounds { offset, len: buf.len() })
}

/// Finds the secondary MZ header appended after the primary file's data
/// pages and derives the offset/size of the packed body from it.
pub fn detect(bytes: &[u8], header: &MzHeader) -> Option<KdParams> {
    read_parameters(bytes, header).ok()
}

fn read_parameters(bytes: &[u8], _header: &MzHeader) -> error::Result<KdParams> {
    if bytes.len() < 0x06 {
        return Err(Error::InvalidStructure("buffer too small for MZ header".into()));
    }
    let num_pages = read_u16(bytes, 0x04)?;
    let bytes_in_last_page = read_u16(bytes, 0x02)?;
    let mut extra_data_start = num_pages as u32 * 512;
    if bytes_in_last_page != 0 {
        extra_data_start -= 512 - bytes_in_last_page as u32;
    }
    let extra_data_start = extra_data_start as usize;

    if bytes.len() < extra_data_start + 0x25 {
        return Err(Error::InvalidStructure("buffer too small for embedded MZ header".into()));
    }
    let inner = &bytes[extra_data_start..];
    if &inner[0..2] != b"MZ" && &inner[0..2] != b"ZM" {
        return Err(Error::InvalidSignature("no embedded MZ header at end of file".into()));
    }

    let inner_header_size_para = read_u16(inner, 0x08)?;
    let inner_num_pages = read_u16(inner, 0x04)?;
    let inner_bytes_in_last = read_u16(inner, 0x02)?;

    let exe_data_start2 = inner_header_size_para as u32 * 16;
    let mut extra_data_start2 = inner_num_pages as u32 * 512;
    if inner_bytes_in_last != 0 {
        extra_data_start2 -= 512 - inner_bytes_in_last as u32;
    }
    if extra_data_start2 < exe_data_start2 {
        return Err(Error::InvalidStructure("embedded header page accounting is inconsistent".into()));
    }
    let expected_size = (extra_data_start2 - exe_data_start2) as usize;
    let code_offset = extra_data_start + exe_data_start2 as usize;

    let initial_ip = read_u16(inner, 0x14)?;
    let initial_cs = read_u16(inner, 0x16)?;
    let initial_sp = read_u16(inner, 0x10)?;
    let initial_ss = read_u16(inner, 0x0e)?;
    let checksum = read_u16(inner, 0x12)?;
    let max_mem_para = read_u16(inner, 0x0c)?;
    let min_mem_para = ((expected_size + 0x20) / 64) as u16;

    let num_relocations = read_u16(inner, 0x06)?;
    let reloc_offset = read_u16(inner, 0x18)?;

    Ok(KdParams {
        code_offset,
        expected_size,
        initial_ip,
        initial_cs,
        initial_sp,
        initial_ss,
        checksum,
        max_mem_para,
        min_mem_para,
        relocation_offset: extra_data_start + reloc_offset as usize,
        num_relocations,
    })
}

fn read_relocations(bytes: &[u8], params: &KdParams) -> error::Result<Vec<(u16, u16)>> {
    let mut relocs = Vec::with_capacity(params.num_relocations as usize);
    let mut pos = params.relocation_offset;
    for _ in 0..params.num_relocations {
        let offset = read_u16(bytes, pos)?;
        let segment = read_u16(bytes, pos + 2)?;
        relocs.push((segment, offset));
        pos += 4;
    }
    Ok(relocs)
}

/// Reads a `step`-bit little-endian code starting at absolute bit offset
/// `bit_pos` from `body`.
fn read_code(body: &[u8], bit_pos: usize, step: usize) -> error::Result<u16> {
    let byte_pos = bit_pos / 8;
    let bit_offset = bit_pos % 8;
    let b0 = *body.get(byte_pos).ok_or(Error::OutOfBounds { offset: byte_pos, len: body.len() })?;
    let b1 = *body.get(byte_pos + 1).unwrap_or(&0);
    let b2 = *body.get(byte_pos + 2).unwrap_or(&0);
    let big_index = (b2 as u32) << 16 | (b1 as u32) << 8 | b0 as u32;
    let code = ((big_index >> bit_offset) as u16) & KEY_MASK[step - 9];
    Ok(code)
}

fn lzw_decode(body: &[u8], expected_size: usize) -> error::Result<Vec<u8>> {
    let mut out = Vec::with_capacity(expected_size);
    let mut dict_key = Vec::with_capacity(DICT_CAPACITY);
    let mut dict_val = Vec::with_capacity(DICT_CAPACITY);
    dict_key.resize(DICT_CAPACITY, 0u16);
    dict_val.resize(DICT_CAPACITY, 0u8);

    let mut dict_index: u16 = 0x0102;
    let mut dict_range: u16 = 0x0200;
    let mut step: usize = 9;

    let mut queue: Vec<u8> = Vec::with_capacity(256);
    let mut last_index: u16 = 0;
    let mut last_char: u8 = 0;
    let mut bit_pos: usize = 0;
    let mut reset_hack = false;

    loop {
        if reset_hack {
            step = 9;
            dict_range = 0x0200;
            dict_index = 0x0102;
        }

        let code = read_code(body, bit_pos, step)?;
        bit_pos += step;

        if reset_hack {
            last_index = code;
            last_char = (code & 0xff) as u8;
            out.push(last_char);
            reset_hack = false;
            continue;
        }

        if code == EOF_CODE {
            break;
        }
        if code == RESET_CODE {
            reset_hack = true;
            continue;
        }

        let keep_index = code;
        let mut walk = code;
        if walk >= dict_index {
            walk = last_index;
            queue.push(last_char);
        }

        while walk > 0x00ff {
            let idx = walk as usize;
            if idx >= dict_val.len() {
                return Err(Error::DecompressionFailure("LZW dictionary index out of range".into()));
            }
            queue.push(dict_val[idx]);
            walk = dict_key[idx];
        }
        last_char = (walk & 0xff) as u8;
        queue.push(last_char);

        while let Some(byte) = queue.pop() {
            out.push(byte);
        }

        if dict_index as usize >= dict_val.len() {
            return Err(Error::DecompressionFailure("LZW dictionary is full".into()));
        }
        dict_key[dict_index as usize] = last_index;
        dict_val[dict_index as usize] = last_char;
        dict_index += 1;
        last_index = keep_index;

        if dict_index >= dict_range && step < 12 {
            step += 1;
            dict_range *= 2;
        }
    }

    Ok(out)
}

pub fn decompress(bytes: &[u8]) -> error::Result<DecompressionResult> {
    let header = MzHeader::parse(bytes)?;
    let params = read_parameters(bytes, &header)?;
    if bytes.len() <= params.code_offset {
        return Err(Error::OutOfBounds { offset: params.code_offset, len: bytes.len() });
    }
    let body = &bytes[params.code_offset..];
    let code = lzw_decode(body, params.expected_size)?;
    let relocations = read_relocations(bytes, &params)?;

    Ok(DecompressionResult {
        code,
        initial_cs: params.initial_cs,
        initial_ip: params.initial_ip,
        initial_ss: params.initial_ss,
        initial_sp: params.initial_sp,
        min_extra_paragraphs: params.min_mem_para,
        max_extra_paragraphs: params.max_mem_para,
        header_paragraphs: header.e_cparhdr,
        checksum: params.checksum,
        relocations,
    })
}
