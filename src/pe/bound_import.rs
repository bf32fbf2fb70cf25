//! Bound import directory decoder (component H, spec.md §4.H "BoundImport").
//!
//! No corresponding teacher module exists; grounded on the same
//! byte-oriented descriptor-walk idiom as [`crate::pe::import`] and
//! [`crate::pe::delay_import`]. Module-name offsets here are relative to
//! the start of the bound-import directory itself, not RVAs.

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::cursor::ByteSource;
use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::options::ParseOptions;

pub const SIZEOF_BOUND_IMPORT_DESCRIPTOR: usize = 8;
pub const SIZEOF_BOUND_FORWARDER_REF: usize = 8;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct BoundImportDescriptor {
    pub time_date_stamp: u32,
    pub offset_module_name: u16,
    pub number_of_module_forwarder_refs: u16,
}

#[derive(Debug, Clone)]
pub struct BoundForwarderRef {
    pub time_date_stamp: u32,
    pub module_name: String,
}

#[derive(Debug, Clone)]
pub struct BoundImportModule {
    pub time_date_stamp: u32,
    pub module_name: String,
    pub forwarder_refs: Vec<BoundForwarderRef>,
}

/// Walks 8-byte descriptors terminated by `time_date_stamp == 0`,
/// followed (per descriptor, inline in the same stream) by
/// `number_of_module_forwarder_refs` 8-byte forwarder records. Name
/// offsets are relative to the start of this directory (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    rva: u32,
    size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<BoundImportModule>> {
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }
    let directory_start = rva as usize;
    let directory_end = directory_start.saturating_add(size as usize);
    if directory_end > bytes.len() {
        diags.record(Severity::Error, Category::BoundImport, "BIMP_TRUNCATED", "bound import directory exceeds the end of the file");
        return Ok(Vec::new());
    }

    let src = ByteSource::new(bytes);
    let mut modules = Vec::new();
    let mut offset = directory_start;
    for _ in 0..opts.max_bound_import_modules {
        if offset + SIZEOF_BOUND_IMPORT_DESCRIPTOR > directory_end {
            break;
        }
        let descriptor: BoundImportDescriptor = bytes.pread_with(offset, scroll::LE)?;
        if descriptor.time_date_stamp == 0 && descriptor.offset_module_name == 0 && descriptor.number_of_module_forwarder_refs == 0 {
            break;
        }
        offset += SIZEOF_BOUND_IMPORT_DESCRIPTOR;

        let name_offset = directory_start + descriptor.offset_module_name as usize;
        let module_name = match src.cstr(name_offset, 256) {
            Ok((name, _)) => String::from_utf8_lossy(name).into_owned(),
            Err(_) => {
                diags.record(Severity::Anomaly, Category::BoundImport, "BIMP_BAD_NAME_OFFSET", "bound import module name offset is out of bounds");
                String::new()
            }
        };

        let mut forwarder_refs = Vec::with_capacity(descriptor.number_of_module_forwarder_refs as usize);
        for _ in 0..descriptor.number_of_module_forwarder_refs {
            if offset + SIZEOF_BOUND_FORWARDER_REF > directory_end {
                diags.record(Severity::Anomaly, Category::BoundImport, "BIMP_TRUNCATED_FORWARDER", "bound import forwarder ref array truncated");
                break;
            }
            let ref_time_date_stamp: u32 = bytes.pread_with(offset, scroll::LE)?;
            let ref_offset_module_name: u16 = bytes.pread_with(offset + 4, scroll::LE)?;
            // two reserved bytes follow at offset + 6
            offset += SIZEOF_BOUND_FORWARDER_REF;

            let ref_name_offset = directory_start + ref_offset_module_name as usize;
            let ref_module_name = match src.cstr(ref_name_offset, 256) {
                Ok((name, _)) => String::from_utf8_lossy(name).into_owned(),
                Err(_) => {
                    diags.record(Severity::Anomaly, Category::BoundImport, "BIMP_BAD_NAME_OFFSET", "bound import forwarder module name offset is out of bounds");
                    String::new()
                }
            };
            forwarder_refs.push(BoundForwarderRef { time_date_stamp: ref_time_date_stamp, module_name: ref_module_name });
        }

        modules.push(BoundImportModule { time_date_stamp: descriptor.time_date_stamp, module_name, forwarder_refs });
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn empty_directory_yields_no_modules() {
        let bytes = vec![0u8; 0x100];
        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, 0, 0, &ParseOptions::default(), &mut diags).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn single_module_with_forwarder_decodes() {
        let mut bytes = vec![0u8; 0x100];
        // directory starts at offset 0x10
        let descriptor = BoundImportDescriptor { time_date_stamp: 1, offset_module_name: 0x30, number_of_module_forwarder_refs: 1 };
        bytes.pwrite_with(descriptor, 0x10, scroll::LE).unwrap();
        // forwarder ref immediately follows the descriptor at 0x18
        bytes.pwrite_with(2u32, 0x18, scroll::LE).unwrap();
        bytes.pwrite_with(0x38u16, 0x1c, scroll::LE).unwrap();
        // terminator descriptor at 0x20 (all zero, already the default fill)

        bytes[0x40..0x42].copy_from_slice(b"A\0"); // module name at 0x10 + 0x30
        bytes[0x48..0x4a].copy_from_slice(b"B\0"); // forwarder name at 0x10 + 0x38

        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, 0x10, 0x40, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].module_name, "A");
        assert_eq!(modules[0].forwarder_refs.len(), 1);
        assert_eq!(modules[0].forwarder_refs[0].module_name, "B");
        assert_eq!(modules[0].forwarder_refs[0].time_date_stamp, 2);
    }
}
