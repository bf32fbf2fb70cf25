//! Accelerator table (RT_ACCELERATOR) decoder (component J, spec.md §4.J).
//!
//! Each entry is 8 bytes: `{flags: u16, key: u16, command_id: u16, pad: u16}`.
//! The `END` flag bit (0x80) marks the last entry in the table.

use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

pub const ACCEL_VIRTKEY: u16 = 0x0001;
pub const ACCEL_NOINVERT: u16 = 0x0002;
pub const ACCEL_SHIFT: u16 = 0x0004;
pub const ACCEL_CONTROL: u16 = 0x0008;
pub const ACCEL_ALT: u16 = 0x0010;
pub const ACCEL_END: u16 = 0x0080;

const SIZEOF_ACCEL_ENTRY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratorEntry {
    pub flags: u16,
    pub key: u16,
    pub command_id: u16,
}

impl AcceleratorEntry {
    pub fn is_virtkey(&self) -> bool {
        self.flags & ACCEL_VIRTKEY != 0
    }

    pub fn requires_shift(&self) -> bool {
        self.flags & ACCEL_SHIFT != 0
    }

    pub fn requires_control(&self) -> bool {
        self.flags & ACCEL_CONTROL != 0
    }

    pub fn requires_alt(&self) -> bool {
        self.flags & ACCEL_ALT != 0
    }
}

/// Walks 8-byte accelerator entries until one with the `END` flag bit
/// set, or the data runs out (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<Vec<AcceleratorEntry>> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    loop {
        if offset + SIZEOF_ACCEL_ENTRY > data.len() {
            break;
        }
        let flags: u16 = data.pread_with(offset, scroll::LE)?;
        let key: u16 = data.pread_with(offset + 2, scroll::LE)?;
        let command_id: u16 = data.pread_with(offset + 4, scroll::LE)?;
        let is_last = flags & ACCEL_END != 0;
        entries.push(AcceleratorEntry { flags, key, command_id });
        offset += SIZEOF_ACCEL_ENTRY;
        if is_last {
            break;
        }
    }
    Ok(entries)
}
