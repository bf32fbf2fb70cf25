//! NE resource table: a flat list of per-type blocks terminated by a
//! zero type-id, with length-prefixed (not NUL-terminated) type and
//! resource names appended after the table (spec.md §4.E, §4.I).

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error::{self, Error};

const TYPE_BLOCK_HEADER_LEN: usize = 8; // type_id: u16, count: u16, reserved: u32
const RESOURCE_ENTRY_LEN: usize = 12;
const ID_FLAG: u16 = 0x8000;

/// Either a predefined numeric resource type (`RT_*`) or an offset to a
/// length-prefixed name within the resource table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NeTypeOrName {
    Id(u16),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct NeResourceEntry {
    pub resource_type: NeTypeOrName,
    pub name: NeTypeOrName,
    pub offset: u32,
    pub length: u32,
    pub flags: u16,
}

/// Reads a length-prefixed (single byte count) string at `offset`.
fn read_pascal_string(bytes: &[u8], offset: usize) -> error::Result<String> {
    let len = *bytes.get(offset).ok_or(Error::OutOfBounds { offset, len: bytes.len() })? as usize;
    let start = offset + 1;
    let end = start + len;
    if end > bytes.len() {
        return Err(Error::OutOfBounds { offset: start, len: bytes.len() });
    }
    Ok(String::from_utf8_lossy(&bytes[start..end]).into_owned())
}

fn read_type_or_name(bytes: &[u8], table_offset: usize, raw: u16) -> error::Result<NeTypeOrName> {
    if raw & ID_FLAG != 0 {
        Ok(NeTypeOrName::Id(raw & !ID_FLAG))
    } else {
        Ok(NeTypeOrName::Name(read_pascal_string(bytes, table_offset + raw as usize)?))
    }
}

/// Parses the resource table at `ne_offset + resource_table_offset`: a
/// 16-bit alignment shift, then type blocks until a zero type-id
/// terminator (spec.md §4.E).
pub fn parse_resource_table(
    bytes: &[u8],
    ne_offset: usize,
    resource_table_offset: u16,
) -> error::Result<(u16, Vec<NeResourceEntry>)> {
    let table_offset = ne_offset + resource_table_offset as usize;
    if table_offset + 2 > bytes.len() {
        return Err(Error::OutOfBounds { offset: table_offset, len: bytes.len() });
    }
    let alignment_shift: u16 = bytes.pread_with(table_offset, scroll::LE)?;

    let mut entries = Vec::new();
    let mut pos = table_offset + 2;
    loop {
        if pos + TYPE_BLOCK_HEADER_LEN > bytes.len() {
            return Err(Error::OutOfBounds { offset: pos, len: bytes.len() });
        }
        let type_id_raw: u16 = bytes.pread_with(pos, scroll::LE)?;
        if type_id_raw == 0 {
            break;
        }
        let count: u16 = bytes.pread_with(pos + 2, scroll::LE)?;
        let resource_type = read_type_or_name(bytes, table_offset, type_id_raw)?;
        pos += TYPE_BLOCK_HEADER_LEN;

        for _ in 0..count {
            if pos + RESOURCE_ENTRY_LEN > bytes.len() {
                return Err(Error::OutOfBounds { offset: pos, len: bytes.len() });
            }
            let offset_units: u16 = bytes.pread_with(pos, scroll::LE)?;
            let length_units: u16 = bytes.pread_with(pos + 2, scroll::LE)?;
            let flags: u16 = bytes.pread_with(pos + 4, scroll::LE)?;
            let id_raw: u16 = bytes.pread_with(pos + 6, scroll::LE)?;
            let name = read_type_or_name(bytes, table_offset, id_raw)?;
            let length_in_units = if length_units == 0 { 65536 } else { length_units as u32 };

            entries.push(NeResourceEntry {
                resource_type: resource_type.clone(),
                name,
                offset: (offset_units as u32) << alignment_shift,
                length: length_in_units << alignment_shift,
                flags,
            });
            pos += RESOURCE_ENTRY_LEN;
        }
    }

    Ok((alignment_shift, entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&4u16.to_le_bytes()); // alignment_shift
        // Type block: type_id = 0x8001 (RT_CURSOR-ish numeric), count = 1
        buf.extend_from_slice(&(0x8001u16).to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved
        // one NAMEINFO: offset=2 units, length=3 units, flags=0, id=0x8005
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&3u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&(0x8005u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        // terminator
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf
    }

    #[test]
    fn parses_single_type_block_until_terminator() {
        let buf = sample_table();
        let (shift, entries) = parse_resource_table(&buf, 0, 0).unwrap();
        assert_eq!(shift, 4);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].resource_type, NeTypeOrName::Id(1));
        assert_eq!(entries[0].name, NeTypeOrName::Id(5));
        assert_eq!(entries[0].offset, 2 << 4);
        assert_eq!(entries[0].length, 3 << 4);
    }
}
