//! PE resource directory tree (component I, spec.md §4.I).
//!
//! A three-level recursive tree: type → name/id → language. Each level
//! is an [`ImageResourceDirectory`] header followed by a packed array of
//! [`ResourceEntry`] records, sorted named-then-id by convention (not
//! enforced here). A leaf entry's `offset_to_data_or_directory` points
//! at a [`ResourceDataEntry`] giving the RVA/size/codepage of the raw
//! resource bytes.

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::header::DataDirectory;
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub mod decode;

pub const RT_CURSOR: u16 = 1;
pub const RT_BITMAP: u16 = 2;
pub const RT_ICON: u16 = 3;
pub const RT_MENU: u16 = 4;
pub const RT_DIALOG: u16 = 5;
pub const RT_STRING: u16 = 6;
pub const RT_FONTDIR: u16 = 7;
pub const RT_FONT: u16 = 8;
pub const RT_ACCELERATOR: u16 = 9;
pub const RT_RCDATA: u16 = 10;
pub const RT_MESSAGETABLE: u16 = 11;
pub const RT_GROUP_CURSOR: u16 = 12;
pub const RT_GROUP_ICON: u16 = 14;
pub const RT_VERSION: u16 = 16;
pub const RT_DLGINCLUDE: u16 = 17;
pub const RT_PLUGPLAY: u16 = 19;
pub const RT_VXD: u16 = 20;
pub const RT_ANICURSOR: u16 = 21;
pub const RT_ANIICON: u16 = 22;
pub const RT_HTML: u16 = 23;
pub const RT_MANIFEST: u16 = 24;

const IMAGE_RESOURCE_NAME_IS_STRING: u32 = 0x8000_0000;
const IMAGE_RESOURCE_DATA_IS_DIRECTORY: u32 = 0x8000_0000;
const IMAGE_RESOURCE_MASK: u32 = 0x7fff_ffff;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct ImageResourceDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl ImageResourceDirectory {
    fn count(&self) -> usize {
        self.number_of_named_entries as usize + self.number_of_id_entries as usize
    }
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
struct RawResourceEntry {
    name_or_id: u32,
    offset_to_data_or_directory: u32,
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
struct ResourceDataEntry {
    offset_to_data: u32,
    size: u32,
    code_page: u32,
    reserved: u32,
}

/// A resource entry's name: either a numeric ID or a UTF-16 string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceName {
    Id(u16),
    Name(String),
}

/// One leaf resource: its identity at each of the three tree levels and
/// its raw bytes.
#[derive(Debug, Clone)]
pub struct ResourceLeaf<'a> {
    pub type_id: ResourceName,
    pub name: ResourceName,
    pub language: ResourceName,
    pub code_page: u32,
    pub data: &'a [u8],
}

fn read_name(bytes: &[u8], directory_base: usize, name_or_id: u32) -> error::Result<ResourceName> {
    if name_or_id & IMAGE_RESOURCE_NAME_IS_STRING != 0 {
        let offset = directory_base + (name_or_id & IMAGE_RESOURCE_MASK) as usize;
        let len: u16 = bytes.pread_with(offset, scroll::LE)?;
        let start = offset + 2;
        let end = start + (len as usize) * 2;
        if end > bytes.len() {
            return Err(error::Error::OutOfBounds { offset: start, len: (len as usize) * 2 });
        }
        let units: Vec<u16> = bytes[start..end]
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        Ok(ResourceName::Name(String::from_utf16_lossy(&units)))
    } else {
        Ok(ResourceName::Id((name_or_id & 0xffff) as u16))
    }
}

struct WalkCtx<'a, 'b> {
    bytes: &'a [u8],
    directory_base: usize,
    resolver: &'b RvaResolver<'b, SectionTable>,
    max_depth: u32,
    leaves: Vec<ResourceLeaf<'a>>,
}

fn walk_level(
    ctx: &mut WalkCtx<'_, '_>,
    offset: usize,
    depth: u32,
    type_id: Option<ResourceName>,
    name: Option<ResourceName>,
    diags: &mut DiagnosticCollector,
) -> error::Result<()> {
    if depth > ctx.max_depth {
        diags.record(Severity::Anomaly, Category::Resource, "RES_DEPTH_EXCEEDED", "resource directory nesting exceeded the configured maximum depth");
        return Ok(());
    }
    let dir: ImageResourceDirectory = ctx.bytes.pread_with(offset, scroll::LE)?;
    let entries_offset = offset + core::mem::size_of::<ImageResourceDirectory>();
    for i in 0..dir.count() {
        let entry_offset = entries_offset + i * 8;
        let entry: RawResourceEntry = match ctx.bytes.pread_with(entry_offset, scroll::LE) {
            Ok(e) => e,
            Err(_) => break,
        };
        let this_name = match read_name(ctx.bytes, ctx.directory_base, entry.name_or_id) {
            Ok(n) => n,
            Err(_) => {
                diags.record(Severity::Anomaly, Category::Resource, "RES_BAD_NAME", "resource entry name offset is out of bounds");
                continue;
            }
        };
        let is_directory = entry.offset_to_data_or_directory & IMAGE_RESOURCE_DATA_IS_DIRECTORY != 0;
        let next_offset = ctx.directory_base + (entry.offset_to_data_or_directory & IMAGE_RESOURCE_MASK) as usize;

        if is_directory {
            let (t, n) = match depth {
                0 => (Some(this_name), None),
                1 => (type_id.clone(), Some(this_name)),
                _ => (type_id.clone(), name.clone()),
            };
            walk_level(ctx, next_offset, depth + 1, t, n, diags)?;
        } else {
            let data_entry: ResourceDataEntry = match ctx.bytes.pread_with(next_offset, scroll::LE) {
                Ok(e) => e,
                Err(_) => {
                    diags.record(Severity::Anomaly, Category::Resource, "RES_BAD_DATA_ENTRY", "resource data entry offset is out of bounds");
                    continue;
                }
            };
            let Some(data_offset) = ctx.resolver.rva_to_offset(data_entry.offset_to_data) else {
                diags.record(Severity::Anomaly, Category::Resource, "RES_UNMAPPED_DATA", "resource data RVA does not map into any section");
                continue;
            };
            let start = data_offset as usize;
            let end = start.saturating_add(data_entry.size as usize);
            if end > ctx.bytes.len() {
                diags.record(Severity::Anomaly, Category::Resource, "RES_TRUNCATED_DATA", "resource data extends past the end of the file");
                continue;
            }
            ctx.leaves.push(ResourceLeaf {
                type_id: type_id.clone().unwrap_or(ResourceName::Id(0)),
                name: name.clone().unwrap_or(ResourceName::Id(0)),
                language: this_name,
                code_page: data_entry.code_page,
                data: &ctx.bytes[start..end],
            });
        }
    }
    Ok(())
}

/// Walks the resource directory tree rooted at the `IMAGE_DIRECTORY_ENTRY_RESOURCE`
/// data directory, returning every leaf resource found.
pub fn parse<'a>(
    bytes: &'a [u8],
    sections: &[SectionTable],
    file_alignment: u32,
    dd: DataDirectory,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<ResourceLeaf<'a>>> {
    if dd.virtual_address == 0 || dd.size == 0 {
        return Ok(Vec::new());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(directory_base) = resolver.rva_to_offset(dd.virtual_address).map(|o| o as usize) else {
        diags.record(Severity::Anomaly, Category::Resource, "RES_UNMAPPED_TABLE", "resource directory RVA does not map into any section");
        return Ok(Vec::new());
    };
    let mut ctx = WalkCtx { bytes, directory_base, resolver: &resolver, max_depth: opts.max_resource_depth, leaves: Vec::new() };
    walk_level(&mut ctx, directory_base, 0, None, None, diags)?;
    Ok(ctx.leaves)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    fn one_section() -> Vec<SectionTable> {
        let mut s = SectionTable::default();
        s.virtual_address = 0x1000;
        s.virtual_size = 0x1000;
        s.pointer_to_raw_data = 0x200;
        s.size_of_raw_data = 0x1000;
        vec![s]
    }

    #[test]
    fn empty_directory_yields_no_leaves() {
        let bytes = vec![0u8; 0x100];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let dd = DataDirectory { virtual_address: 0, size: 0 };
        let leaves = parse(&bytes, &sections, 0x200, dd, &ParseOptions::default(), &mut diags).unwrap();
        assert!(leaves.is_empty());
    }

    #[test]
    fn single_id_leaf_three_levels_deep() {
        let mut bytes = vec![0u8; 0x2000];
        let base = 0x200usize; // rva 0x1000

        // level 0: type directory, one id entry (RT_STRING) pointing to level 1 at +0x20
        let top = ImageResourceDirectory { number_of_id_entries: 1, ..Default::default() };
        bytes.pwrite_with(top, base, scroll::LE).unwrap();
        bytes.pwrite_with(RawResourceEntry { name_or_id: RT_STRING as u32, offset_to_data_or_directory: 0x20 | IMAGE_RESOURCE_DATA_IS_DIRECTORY }, base + 16, scroll::LE).unwrap();

        // level 1: name directory at base+0x20, one id entry -> level 2 at +0x40
        let mid = ImageResourceDirectory { number_of_id_entries: 1, ..Default::default() };
        bytes.pwrite_with(mid, base + 0x20, scroll::LE).unwrap();
        bytes.pwrite_with(RawResourceEntry { name_or_id: 7, offset_to_data_or_directory: 0x40 | IMAGE_RESOURCE_DATA_IS_DIRECTORY }, base + 0x20 + 16, scroll::LE).unwrap();

        // level 2: language directory at base+0x40, one id entry -> data entry at +0x60
        let lang = ImageResourceDirectory { number_of_id_entries: 1, ..Default::default() };
        bytes.pwrite_with(lang, base + 0x40, scroll::LE).unwrap();
        bytes.pwrite_with(RawResourceEntry { name_or_id: 0x409, offset_to_data_or_directory: 0x60 }, base + 0x40 + 16, scroll::LE).unwrap();

        // data entry at base+0x60: rva 0x1080 -> file offset base+0x80, size 4
        let data_entry = ResourceDataEntry { offset_to_data: 0x1080, size: 4, code_page: 0, reserved: 0 };
        bytes.pwrite_with(data_entry, base + 0x60, scroll::LE).unwrap();
        bytes[base + 0x80..base + 0x84].copy_from_slice(b"abcd");

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let dd = DataDirectory { virtual_address: 0x1000, size: 0x100 };
        let leaves = parse(&bytes, &sections, 0x200, dd, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].type_id, ResourceName::Id(RT_STRING));
        assert_eq!(leaves[0].name, ResourceName::Id(7));
        assert_eq!(leaves[0].language, ResourceName::Id(0x409));
        assert_eq!(leaves[0].data, b"abcd");
    }
}
