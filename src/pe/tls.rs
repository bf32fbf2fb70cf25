//! TLS directory decoder (component H, spec.md §4.H "TLS").

use alloc::vec::Vec;
use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

#[derive(Debug, Clone, Copy)]
pub struct TlsDirectory {
    pub raw_data_start_va: u64,
    pub raw_data_end_va: u64,
    pub address_of_index_va: u64,
    pub address_of_callbacks_va: u64,
    pub size_of_zero_fill: u32,
    pub characteristics: u32,
}

/// Reads the fixed-size directory (field widths depend on `is_64`: VA
/// fields are u32 in PE32, u64 in PE32+) and walks the callback array
/// until a null pointer or the cap (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    image_base: u64,
    is_64: bool,
    rva: u32,
    size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Option<(TlsDirectory, Vec<u64>)>> {
    if rva == 0 || size == 0 {
        return Ok(None);
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(offset) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Tls, "TLS_UNMAPPED_TABLE", "TLS directory RVA does not map into any section");
        return Ok(None);
    };
    let offset = offset as usize;

    let directory = if is_64 {
        TlsDirectory {
            raw_data_start_va: bytes.pread_with(offset, scroll::LE)?,
            raw_data_end_va: bytes.pread_with(offset + 8, scroll::LE)?,
            address_of_index_va: bytes.pread_with(offset + 16, scroll::LE)?,
            address_of_callbacks_va: bytes.pread_with(offset + 24, scroll::LE)?,
            size_of_zero_fill: bytes.pread_with(offset + 32, scroll::LE)?,
            characteristics: bytes.pread_with(offset + 36, scroll::LE)?,
        }
    } else {
        let start: u32 = bytes.pread_with(offset, scroll::LE)?;
        let end: u32 = bytes.pread_with(offset + 4, scroll::LE)?;
        let index: u32 = bytes.pread_with(offset + 8, scroll::LE)?;
        let callbacks: u32 = bytes.pread_with(offset + 12, scroll::LE)?;
        TlsDirectory {
            raw_data_start_va: start as u64,
            raw_data_end_va: end as u64,
            address_of_index_va: index as u64,
            address_of_callbacks_va: callbacks as u64,
            size_of_zero_fill: bytes.pread_with(offset + 16, scroll::LE)?,
            characteristics: bytes.pread_with(offset + 20, scroll::LE)?,
        }
    };

    // size is unused beyond validating the directory is present; the real
    // extent of the struct is fixed by is_64, not by the directory entry.
    let _ = size;

    let mut callbacks = Vec::new();
    if directory.address_of_callbacks_va != 0 {
        if let Some(callback_rva) = RvaResolver::<SectionTable>::va_to_rva(directory.address_of_callbacks_va, image_base) {
            if let Some(mut table_offset) = resolver.rva_to_offset(callback_rva) {
                for _ in 0..opts.max_tls_callbacks {
                    let va: u64 = if is_64 {
                        bytes.pread_with(table_offset as usize, scroll::LE)?
                    } else {
                        bytes.pread_with::<u32>(table_offset as usize, scroll::LE)? as u64
                    };
                    if va == 0 {
                        break;
                    }
                    callbacks.push(va);
                    table_offset += if is_64 { 8 } else { 4 };
                }
            }
        } else {
            diags.record(Severity::Anomaly, Category::Tls, "TLS_CALLBACKS_UNMAPPED", "TLS callback array VA does not map into the image");
        }
    }

    Ok(Some((directory, callbacks)))
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
    fn empty_directory_is_none() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        assert!(parse(&bytes, &sections, 0x200, 0x400000, false, 0, 0, &ParseOptions::default(), &mut diags)
            .unwrap()
            .is_none());
    }

    #[test]
    fn callback_array_stops_at_null() {
        let mut bytes = vec![0u8; 0x3000];
        let image_base: u32 = 0x400000;
        // TLS directory at rva 0x1000 -> offset 0x200
        bytes.pwrite_with(image_base + 0x2000, 0x200, scroll::LE).unwrap(); // start
        bytes.pwrite_with(image_base + 0x2100, 0x204, scroll::LE).unwrap(); // end
        bytes.pwrite_with(image_base + 0x1500, 0x208, scroll::LE).unwrap(); // index
        bytes.pwrite_with(image_base + 0x1400, 0x20c, scroll::LE).unwrap(); // callbacks va -> rva 0x1400 -> offset 0x600
        bytes.pwrite_with(0u32, 0x210, scroll::LE).unwrap();
        bytes.pwrite_with(0u32, 0x214, scroll::LE).unwrap();
        bytes.pwrite_with(image_base + 0x2200, 0x600, scroll::LE).unwrap(); // one callback
        bytes.pwrite_with(0u32, 0x604, scroll::LE).unwrap(); // null terminator

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let (_, callbacks) = parse(&bytes, &sections, 0x200, image_base as u64, false, 0x1000, 24, &ParseOptions::default(), &mut diags)
            .unwrap()
            .unwrap();
        assert_eq!(callbacks, vec![(image_base + 0x2200) as u64]);
    }
}
