//! Message table (RT_MESSAGETABLE) decoder (component J, spec.md §4.J).
//!
//! `MESSAGE_RESOURCE_DATA`: a `u32` block count, then that many
//! `{low_id, high_id, offset_to_entries}` blocks (12 bytes each). Each
//! block's entries are `{length: u16, flags: u16, text}` records packed
//! back-to-back, one per message id in `[low_id, high_id]`; `flags & 1`
//! (`MESSAGE_RESOURCE_UNICODE`) selects UTF-16LE vs. ANSI text.

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

const MESSAGE_RESOURCE_UNICODE: u16 = 0x0001;

#[derive(Debug, Clone)]
pub struct MessageEntry {
    pub message_id: u32,
    pub is_unicode: bool,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MessageBlock {
    pub low_id: u32,
    pub high_id: u32,
    pub messages: Vec<MessageEntry>,
}

#[derive(Debug, Clone, Default)]
pub struct MessageTable {
    pub blocks: Vec<MessageBlock>,
}

impl MessageTable {
    pub fn find(&self, message_id: u32) -> Option<&MessageEntry> {
        self.blocks
            .iter()
            .filter(|b| message_id >= b.low_id && message_id <= b.high_id)
            .flat_map(|b| &b.messages)
            .find(|m| m.message_id == message_id)
    }
}

/// Parses an RT_MESSAGETABLE resource (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<MessageTable> {
    let block_count: u32 = data.pread_with(0, scroll::LE)?;
    let mut blocks = Vec::with_capacity(block_count as usize);
    for i in 0..block_count as usize {
        let header_offset = 4 + i * 12;
        let low_id: u32 = data.pread_with(header_offset, scroll::LE)?;
        let high_id: u32 = data.pread_with(header_offset + 4, scroll::LE)?;
        let entries_offset: u32 = data.pread_with(header_offset + 8, scroll::LE)?;

        let mut messages = Vec::new();
        let mut offset = entries_offset as usize;
        let mut id = low_id;
        while id <= high_id && offset + 4 <= data.len() {
            let length: u16 = data.pread_with(offset, scroll::LE)?;
            let flags: u16 = data.pread_with(offset + 2, scroll::LE)?;
            if length < 4 {
                break;
            }
            let text_start = offset + 4;
            let text_end = (offset + length as usize).min(data.len());
            let is_unicode = flags & MESSAGE_RESOURCE_UNICODE != 0;
            let text = if is_unicode {
                let units: Vec<u16> = data[text_start..text_end]
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .take_while(|&u| u != 0)
                    .collect();
                String::from_utf16_lossy(&units)
            } else {
                let raw = &data[text_start..text_end];
                let nul = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                String::from_utf8_lossy(&raw[..nul]).into_owned()
            };
            messages.push(MessageEntry { message_id: id, is_unicode, text });
            offset += length as usize;
            id += 1;
        }
        blocks.push(MessageBlock { low_id, high_id, messages });
    }
    Ok(MessageTable { blocks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn single_block_two_messages() {
        let mut data = vec![0u8; 256];
        data.pwrite_with(1u32, 0, scroll::LE).unwrap(); // block_count
        data.pwrite_with(100u32, 4, scroll::LE).unwrap(); // low_id
        data.pwrite_with(101u32, 8, scroll::LE).unwrap(); // high_id
        data.pwrite_with(32u32, 12, scroll::LE).unwrap(); // entries offset

        // message 100: ANSI "Hi\0" length-padded to 8
        data.pwrite_with(8u16, 32, scroll::LE).unwrap();
        data.pwrite_with(0u16, 34, scroll::LE).unwrap(); // ANSI
        data[36..39].copy_from_slice(b"Hi\0");

        // message 101: unicode "Ok"
        data.pwrite_with(10u16, 40, scroll::LE).unwrap();
        data.pwrite_with(MESSAGE_RESOURCE_UNICODE, 42, scroll::LE).unwrap();
        let units: Vec<u16> = "Ok\0".encode_utf16().collect();
        for (i, u) in units.iter().enumerate() {
            data.pwrite_with(*u, 44 + i * 2, scroll::LE).unwrap();
        }

        let table = parse(&data).unwrap();
        assert_eq!(table.blocks.len(), 1);
        assert_eq!(table.find(100).unwrap().text, "Hi");
        assert_eq!(table.find(101).unwrap().text, "Ok");
    }
}
