//! Debug directory decoder (component H, spec.md §4.H "Debug").

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::cursor::ByteSource;
use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_DEBUG_DIRECTORY: usize = 28;
pub const IMAGE_DEBUG_TYPE_CODEVIEW: u32 = 2;
const CODEVIEW_PDB70_MAGIC: u32 = 0x5344_5352; // "RSDS"
const CODEVIEW_PDB20_MAGIC: u32 = 0x3031_424e; // "NB10"

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct DebugDirectoryEntry {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub data_type: u32,
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}

#[derive(Debug, Clone)]
pub struct CodeviewPdb70 {
    pub signature: [u8; 16],
    pub age: u32,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct CodeviewPdb20 {
    pub time_date_stamp: u32,
    pub age: u32,
    pub path: String,
}

#[derive(Debug, Clone)]
pub enum CodeviewInfo {
    Pdb70(CodeviewPdb70),
    Pdb20(CodeviewPdb20),
}

#[derive(Debug, Clone, Default)]
pub struct DebugData {
    pub entries: Vec<DebugDirectoryEntry>,
    pub codeview: Option<CodeviewInfo>,
}

fn read_codeview(bytes: &[u8], offset: usize, size_of_data: u32) -> error::Result<Option<CodeviewInfo>> {
    if size_of_data < 4 {
        return Ok(None);
    }
    let magic: u32 = bytes.pread_with(offset, scroll::LE)?;
    let src = ByteSource::new(bytes);
    match magic {
        CODEVIEW_PDB70_MAGIC => {
            if size_of_data < 24 {
                return Ok(None);
            }
            let mut signature = [0u8; 16];
            signature.copy_from_slice(src.slice(offset + 4, 16)?);
            let age: u32 = bytes.pread_with(offset + 20, scroll::LE)?;
            let (path, _) = src.cstr(offset + 24, 4096)?;
            Ok(Some(CodeviewInfo::Pdb70(CodeviewPdb70 {
                signature,
                age,
                path: String::from_utf8_lossy(path).into_owned(),
            })))
        }
        CODEVIEW_PDB20_MAGIC => {
            if size_of_data < 16 {
                return Ok(None);
            }
            let time_date_stamp: u32 = bytes.pread_with(offset + 8, scroll::LE)?;
            let age: u32 = bytes.pread_with(offset + 12, scroll::LE)?;
            let (path, _) = src.cstr(offset + 16, 4096)?;
            Ok(Some(CodeviewInfo::Pdb20(CodeviewPdb20 {
                time_date_stamp,
                age,
                path: String::from_utf8_lossy(path).into_owned(),
            })))
        }
        _ => Ok(None),
    }
}

/// `size / 28` entries; the first CodeView (RSDS/NB10) entry found is
/// decoded into `DebugData::codeview` (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    rva: u32,
    size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<DebugData> {
    if rva == 0 || size == 0 {
        return Ok(DebugData::default());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(table_offset) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Debug, "DBG_UNMAPPED_TABLE", "debug directory RVA does not map into any section");
        return Ok(DebugData::default());
    };

    let count = ((size as usize / SIZEOF_DEBUG_DIRECTORY).min(opts.max_debug_entries)).max(0);
    let mut entries = Vec::with_capacity(count);
    let mut codeview = None;
    for i in 0..count {
        let entry_offset = table_offset as usize + i * SIZEOF_DEBUG_DIRECTORY;
        let entry: DebugDirectoryEntry = match bytes.pread_with(entry_offset, scroll::LE) {
            Ok(e) => e,
            Err(_) => break,
        };
        if entry.data_type == IMAGE_DEBUG_TYPE_CODEVIEW && codeview.is_none() {
            let raw_offset = if opts.resolve_rva {
                entry.pointer_to_raw_data as usize
            } else {
                entry.address_of_raw_data as usize
            };
            match read_codeview(bytes, raw_offset, entry.size_of_data) {
                Ok(info) => codeview = info,
                Err(_) => diags.record(Severity::Anomaly, Category::Debug, "DBG_BAD_CODEVIEW", "CodeView debug record could not be decoded"),
            }
        }
        entries.push(entry);
    }

    Ok(DebugData { entries, codeview })
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
    fn empty_directory_yields_default() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let data = parse(&bytes, &sections, 0x200, 0, 0, &ParseOptions::default(), &mut diags).unwrap();
        assert!(data.entries.is_empty());
        assert!(data.codeview.is_none());
    }

    #[test]
    fn rsds_codeview_decodes() {
        let mut bytes = vec![0u8; 0x2000];
        let entry = DebugDirectoryEntry {
            characteristics: 0,
            time_date_stamp: 0,
            major_version: 0,
            minor_version: 0,
            data_type: IMAGE_DEBUG_TYPE_CODEVIEW,
            size_of_data: 24 + 8,
            address_of_raw_data: 0x1500,
            pointer_to_raw_data: 0x600,
        };
        bytes.pwrite_with(entry, 0x200, scroll::LE).unwrap();
        bytes.pwrite_with(CODEVIEW_PDB70_MAGIC, 0x600, scroll::LE).unwrap();
        bytes[0x604..0x614].copy_from_slice(&[0xAAu8; 16]);
        bytes.pwrite_with(3u32, 0x614, scroll::LE).unwrap(); // age
        bytes[0x618..0x61d].copy_from_slice(b"a.pdb");

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let data = parse(&bytes, &sections, 0x200, 0x1000, SIZEOF_DEBUG_DIRECTORY as u32, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(data.entries.len(), 1);
        match data.codeview {
            Some(CodeviewInfo::Pdb70(pdb)) => {
                assert_eq!(pdb.age, 3);
                assert_eq!(pdb.path, "a.pdb");
            }
            other => panic!("expected Pdb70, got {:?}", other),
        }
    }
}
