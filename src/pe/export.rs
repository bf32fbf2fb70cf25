//! Export directory decoder (component H, spec.md §4.H "Export").

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::cursor::ByteSource;
use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_EXPORT_DIRECTORY_TABLE: usize = 40;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct ExportDirectoryTable {
    pub export_flags: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name_rva: u32,
    pub ordinal_base: u32,
    pub address_table_entries: u32,
    pub number_of_name_pointers: u32,
    pub export_address_table_rva: u32,
    pub name_pointer_rva: u32,
    pub ordinal_table_rva: u32,
}

#[derive(Debug, Clone)]
pub enum ExportTarget {
    Rva(u32),
    /// A forward to `dll.symbol` (spec.md §4.H: an EAT RVA that falls
    /// inside the export directory itself names a forwarder string).
    Forwarder(String),
}

#[derive(Debug, Clone)]
pub struct Export {
    pub name: Option<String>,
    pub ordinal: u32,
    pub target: ExportTarget,
}

#[derive(Debug, Clone)]
pub struct ExportData {
    pub dll_name: Option<String>,
    pub directory: ExportDirectoryTable,
    pub exports: Vec<Export>,
}

/// Parses the export directory, the EAT, and the name/ordinal tables,
/// producing one [`Export`] per EAT slot with names joined in by the
/// parallel name-pointer/ordinal-table traversal (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    rva: u32,
    size: u32,
    diags: &mut DiagnosticCollector,
) -> error::Result<Option<ExportData>> {
    if rva == 0 || size == 0 {
        return Ok(None);
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(dir_offset) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Export, "EXP_UNMAPPED_TABLE", "export directory RVA does not map into any section");
        return Ok(None);
    };
    let directory: ExportDirectoryTable = bytes.pread_with(dir_offset as usize, scroll::LE)?;

    let dll_name = resolver.rva_to_offset(directory.name_rva).and_then(|off| {
        let src = ByteSource::new(bytes);
        src.cstr(off as usize, 256).ok().map(|(s, _)| String::from_utf8_lossy(s).into_owned())
    });

    let eat_start = resolver.rva_to_offset(directory.export_address_table_rva);
    let mut addresses = Vec::with_capacity(directory.address_table_entries as usize);
    if let Some(eat_start) = eat_start {
        for i in 0..directory.address_table_entries as usize {
            let v: u32 = bytes.pread_with(eat_start as usize + i * 4, scroll::LE)?;
            addresses.push(v);
        }
    } else if directory.address_table_entries > 0 {
        diags.record(Severity::Anomaly, Category::Export, "EXP_UNMAPPED_EAT", "export address table RVA does not map into any section");
    }

    let mut names_by_ordinal_index = alloc::collections::BTreeMap::new();
    if let (Some(np_start), Some(ord_start)) = (
        resolver.rva_to_offset(directory.name_pointer_rva),
        resolver.rva_to_offset(directory.ordinal_table_rva),
    ) {
        for i in 0..directory.number_of_name_pointers as usize {
            let name_rva: u32 = bytes.pread_with(np_start as usize + i * 4, scroll::LE)?;
            let ordinal_index: u16 = bytes.pread_with(ord_start as usize + i * 2, scroll::LE)?;
            if let Some(name_off) = resolver.rva_to_offset(name_rva) {
                let src = ByteSource::new(bytes);
                if let Ok((s, _)) = src.cstr(name_off as usize, 256) {
                    names_by_ordinal_index.insert(ordinal_index, String::from_utf8_lossy(s).into_owned());
                }
            }
        }
    } else if directory.number_of_name_pointers > 0 {
        diags.record(Severity::Anomaly, Category::Export, "EXP_UNMAPPED_NAME_TABLE", "export name-pointer/ordinal table RVA does not map into any section");
    }

    let mut exports = Vec::with_capacity(addresses.len());
    for (index, &export_rva) in addresses.iter().enumerate() {
        if export_rva == 0 {
            continue;
        }
        let target = if export_rva >= rva && export_rva < rva + size {
            let forwarder = resolver
                .rva_to_offset(export_rva)
                .and_then(|off| {
                    let src = ByteSource::new(bytes);
                    src.cstr(off as usize, 512).ok()
                })
                .map(|(s, _)| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default();
            ExportTarget::Forwarder(forwarder)
        } else {
            ExportTarget::Rva(export_rva)
        };
        exports.push(Export {
            name: names_by_ordinal_index.get(&(index as u16)).cloned(),
            ordinal: directory.ordinal_base + index as u32,
            target,
        });
    }

    Ok(Some(ExportData { dll_name, directory, exports }))
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
    fn single_named_export_resolves() {
        let mut bytes = vec![0u8; 0x2000];
        let directory = ExportDirectoryTable {
            export_flags: 0,
            time_date_stamp: 0,
            major_version: 0,
            minor_version: 0,
            name_rva: 0x1300,
            ordinal_base: 1,
            address_table_entries: 1,
            number_of_name_pointers: 1,
            export_address_table_rva: 0x1100,
            name_pointer_rva: 0x1200,
            ordinal_table_rva: 0x1280,
        };
        bytes.pwrite_with(directory, 0x200, scroll::LE).unwrap();
        bytes.pwrite_with(0x1500u32, 0x300, scroll::LE).unwrap(); // EAT[0]
        bytes.pwrite_with(0x1400u32, 0x400, scroll::LE).unwrap(); // name pointer[0]
        bytes.pwrite_with(0u16, 0x480, scroll::LE).unwrap(); // ordinal index[0]
        bytes[0x500..0x504].copy_from_slice(b"DLL\0"); // dll name at rva 0x1300 -> offset 0x500
        bytes[0x600..0x604].copy_from_slice(b"FOO\0"); // export name at rva 0x1400 -> offset 0x600

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let data = parse(&bytes, &sections, 0x200, 0x1000, 0x100, &mut diags).unwrap().unwrap();
        assert_eq!(data.exports.len(), 1);
        assert_eq!(data.dll_name.as_deref(), Some("DLL"));
        assert_eq!(data.exports[0].name.as_deref(), Some("FOO"));
        assert_eq!(data.exports[0].ordinal, 1);
        assert!(matches!(data.exports[0].target, ExportTarget::Rva(0x1500)));
    }
}
