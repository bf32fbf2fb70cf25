//! 32-bit Linear Executable (LE/LX) parsing (component G): DOS
//! extenders, Windows VxDs, and OS/2 binaries.

pub mod fixup;
pub mod header;
pub mod import;
pub mod object_table;
pub mod page_table;

use alloc::vec::Vec;
use log::debug;

use crate::error::{self, Error};
use crate::mz::MzHeader;
use crate::sniff::FormatTag;

pub use header::LeHeader;
pub use object_table::ObjectEntry;
pub use page_table::PageEntry;

/// A parsed LE/LX image: header, object table, object-page table, and
/// the table offsets needed to walk fixups and imports lazily
/// (spec.md §4.G).
#[derive(Debug)]
pub struct Le<'a> {
    pub header: LeHeader,
    pub le_offset: usize,
    pub objects: Vec<ObjectEntry>,
    pub pages: Vec<PageEntry>,
    pub format: FormatTag,
    bytes: &'a [u8],
}

impl<'a> Le<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        let le_offset = Self::locate_header(bytes)?;
        let header = LeHeader::parse(bytes, le_offset)?;
        debug!("{:#?}", header);

        let objects = object_table::parse_object_table(
            bytes,
            le_offset,
            header.object_table_offset,
            header.object_table_entries,
        )?;
        let page_count: u32 = objects.iter().map(|o| o.page_table_entries).sum();
        let pages = page_table::parse_page_table(bytes, le_offset, header.object_page_map_offset, page_count)?;
        let format = header.format_tag();

        Ok(Le { header, le_offset, objects, pages, format, bytes })
    }

    /// Finds the LE/LX header either via an MZ stub's `e_lfanew`, or at
    /// offset 0 for a raw (stub-less) buffer (spec.md §4.C's
    /// `LeDos32Raw`/`LxOs2Raw` tags).
    fn locate_header(bytes: &[u8]) -> error::Result<usize> {
        if bytes.len() >= 2 && (&bytes[0..2] == b"LE" || &bytes[0..2] == b"LX") {
            return Ok(0);
        }
        let mz_header = MzHeader::parse(bytes)?;
        let offset = mz_header.e_lfanew as usize;
        if offset == 0 || offset + 2 > bytes.len() {
            return Err(Error::InvalidStructure("e_lfanew does not point at an LE/LX header".into()));
        }
        Ok(offset)
    }

    /// Page size in bytes, constant for every page in the file
    /// (spec.md §3).
    pub fn page_size(&self) -> u32 {
        self.header.memory_page_size
    }

    pub fn fixup_page_table(&self) -> error::Result<Vec<u32>> {
        fixup::parse_fixup_page_table(
            self.bytes,
            self.le_offset,
            self.header.fixup_page_table_offset,
            self.pages.len() as u32,
        )
    }

    /// Fixups for 1-based page index `page` (`1..=pages.len()`), looked
    /// up via the fixup page table's pair of offsets for that page.
    pub fn fixups_for_page(&self, page: usize) -> error::Result<Vec<fixup::FixupRecord>> {
        let fpt = self.fixup_page_table()?;
        let start = *fpt.get(page - 1).ok_or_else(|| Error::InvalidStructure("page index out of range".into()))?;
        let end = *fpt.get(page).ok_or_else(|| Error::InvalidStructure("page index out of range".into()))?;
        let record_table_offset = self.le_offset + self.header.fixup_record_table_offset as usize;
        fixup::read_page_fixups(self.bytes, record_table_offset, start, end)
    }

    pub fn module_names(&self) -> error::Result<Vec<alloc::string::String>> {
        import::parse_module_names(
            self.bytes,
            self.le_offset,
            self.header.imported_modules_name_table_offset,
            self.header.imported_modules_count,
        )
    }

    pub fn procedure_name(&self, name_offset: u32) -> error::Result<alloc::string::String> {
        import::read_procedure_name(self.bytes, self.le_offset, self.header.imported_procedure_name_table_offset, name_offset)
    }

    /// Data page `index` (1-based, per [`PageEntry::page_data_index`]):
    /// `data_pages_offset + (index-1)*page_size`. `data_pages_offset` is
    /// the one absolute (non-header-relative) table offset in the
    /// format (spec.md §4.G).
    pub fn page_data(&self, page: &PageEntry) -> &'a [u8] {
        if page.page_data_index == 0 {
            return &[];
        }
        let start = self.header.data_pages_offset as usize
            + (page.page_data_index as usize - 1) * self.page_size() as usize;
        let end = (start + self.page_size() as usize).min(self.bytes.len());
        if start >= self.bytes.len() || start >= end {
            return &[];
        }
        &self.bytes[start..end]
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    fn minimal_le(signature: u16, target_os: u16) -> Vec<u8> {
        let header = LeHeader {
            signature,
            target_os,
            object_table_entries: 0,
            ..Default::default()
        };
        let mut buf = vec![0u8; header::SIZEOF_LE_HEADER];
        buf.pwrite_with(header, 0, scroll::LE).unwrap();
        buf
    }

    #[test]
    fn parses_raw_lx_header_with_no_stub() {
        let buf = minimal_le(0x584c, 1);
        let le = Le::parse(&buf).unwrap();
        assert_eq!(le.format, FormatTag::LxOs2Bound);
        assert!(le.objects.is_empty());
    }

    #[test]
    fn parses_vxd_via_mz_stub() {
        let mut stub = vec![0u8; 0x40];
        stub[0] = b'M';
        stub[1] = b'Z';
        stub[0x3c..0x40].copy_from_slice(&0x40u32.to_le_bytes());
        stub.extend_from_slice(&minimal_le(0x454c, 2));
        let le = Le::parse(&stub).unwrap();
        assert_eq!(le.format, FormatTag::LeVxd);
    }
}
