//! LE/LX object table: the LE analogue of a PE section (spec.md §4.G).

use alloc::vec::Vec;
use scroll::{Pread, Pwrite, SizeWith};

use crate::error::{self, Error};
use crate::rva::SectionView;

pub const SIZEOF_OBJECT_ENTRY: usize = 24;

pub const LE_OBJECT_READABLE: u32 = 0x0001;
pub const LE_OBJECT_WRITABLE: u32 = 0x0002;
pub const LE_OBJECT_EXECUTABLE: u32 = 0x0004;
pub const LE_OBJECT_RESOURCE: u32 = 0x0008;
pub const LE_OBJECT_DISCARDABLE: u32 = 0x0010;
pub const LE_OBJECT_SHARED: u32 = 0x0020;
pub const LE_OBJECT_PRELOAD: u32 = 0x0040;
pub const LE_OBJECT_INVALID_PAGES: u32 = 0x0080;
pub const LE_OBJECT_ZEROFILL_PAGES: u32 = 0x0100;
pub const LE_OBJECT_RESIDENT: u32 = 0x0200;
pub const LE_OBJECT_RESIDENT_AND_LONG_LOCKABLE: u32 = 0x0400;
pub const LE_OBJECT_16_16_ALIAS_REQUIRED: u32 = 0x1000;
pub const LE_OBJECT_BIG_DEFAULT_BIT: u32 = 0x2000;
pub const LE_OBJECT_CONFORMING_FOR_CODE: u32 = 0x4000;
pub const LE_OBJECT_IO_PRIVILEGE_LEVEL: u32 = 0x8000;

/// Raw 24-byte object table entry (spec.md §4.G).
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct ObjectEntry {
    pub virtual_size: u32,
    pub base_reloc_address: u32,
    pub flags: u32,
    pub page_table_index: u32,
    pub page_table_entries: u32,
    pub reserved: [u8; 4],
}

impl ObjectEntry {
    pub fn is_readable(&self) -> bool {
        self.flags & LE_OBJECT_READABLE != 0
    }
    pub fn is_writable(&self) -> bool {
        self.flags & LE_OBJECT_WRITABLE != 0
    }
    pub fn is_executable(&self) -> bool {
        self.flags & LE_OBJECT_EXECUTABLE != 0
    }
}

/// `object_table.raw_offset/raw_size` have no single meaning for an LE
/// object the way they do for a PE section (data lives across a run of
/// pages), so `SectionView` here reports the *first* page's file offset
/// and the object's total page-derived byte span; callers that need
/// individual page placement use the object-page table directly.
impl SectionView for ObjectEntry {
    fn virtual_address(&self) -> u32 {
        self.base_reloc_address
    }
    fn virtual_size(&self) -> u32 {
        self.virtual_size
    }
    fn raw_offset(&self) -> u32 {
        0
    }
    fn raw_size(&self) -> u32 {
        self.virtual_size
    }
}

/// `object_count` 24-byte entries at `le_offset + object_table_offset`
/// (spec.md §4.G).
pub fn parse_object_table(
    bytes: &[u8],
    le_offset: usize,
    object_table_offset: u32,
    object_count: u32,
) -> error::Result<Vec<ObjectEntry>> {
    let table_offset = le_offset + object_table_offset as usize;
    let mut objects = Vec::with_capacity(object_count as usize);
    for i in 0..object_count {
        let offset = table_offset + i as usize * SIZEOF_OBJECT_ENTRY;
        if offset + SIZEOF_OBJECT_ENTRY > bytes.len() {
            return Err(Error::OutOfBounds { offset, len: bytes.len() });
        }
        let entry: ObjectEntry = bytes.pread_with(offset, scroll::LE)?;
        objects.push(entry);
    }
    Ok(objects)
}
