//! String table (RT_STRING) decoder (component J, spec.md §4.J).
//!
//! Each RT_STRING resource holds a *block* of 16 strings: the resource's
//! numeric ID `n` maps to string IDs `((n - 1) * 16) .. (n * 16)`. Every
//! entry is a length-prefixed (`u16` char count) UTF-16LE string, with a
//! zero-length entry meaning "no string at this slot".

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

/// Decodes one 16-string block, pairing each decoded (non-empty) string
/// with its absolute string ID (`block_id` is the RT_STRING resource's
/// numeric name, 1-based).
pub fn parse_block(data: &[u8], block_id: u16) -> error::Result<Vec<(u16, String)>> {
    let base_id = block_id.saturating_sub(1).wrapping_mul(16);
    let mut strings = Vec::new();
    let mut offset = 0usize;
    for slot in 0..16u16 {
        if offset + 2 > data.len() {
            break;
        }
        let len: u16 = data.pread_with(offset, scroll::LE)?;
        offset += 2;
        let byte_len = len as usize * 2;
        if offset + byte_len > data.len() {
            return Err(error::Error::OutOfBounds { offset, len: byte_len });
        }
        if len > 0 {
            let units: Vec<u16> = data[offset..offset + byte_len]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            strings.push((base_id + slot, String::from_utf16_lossy(&units)));
        }
        offset += byte_len;
    }
    Ok(strings)
}
