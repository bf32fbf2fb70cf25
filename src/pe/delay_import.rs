//! Delay-load import directory decoder (component H, spec.md §4.H "DelayImport").

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::cursor::ByteSource;
use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::import::{IMPORT_BY_ORDINAL_32, IMPORT_BY_ORDINAL_64};
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_DELAY_IMPORT_DESCRIPTOR: usize = 32;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct DelayImportDescriptor {
    pub attributes: u32,
    pub name_rva: u32,
    pub handle_rva: u32,
    pub address_table_rva: u32,
    pub name_table_rva: u32,
    pub bound_table_rva: u32,
    pub unload_table_rva: u32,
    pub time_stamp: u32,
}

impl DelayImportDescriptor {
    fn is_null(&self) -> bool {
        *self == DelayImportDescriptor::default()
    }

    fn rva_based(&self) -> bool {
        self.attributes & 0x1 != 0
    }
}

#[derive(Debug, Clone)]
pub enum DelayImportedSymbol {
    Ordinal(u16),
    Named { hint: u16, name: String },
}

#[derive(Debug, Clone)]
pub struct DelayImportedFunction {
    pub symbol: DelayImportedSymbol,
}

#[derive(Debug, Clone)]
pub struct DelayImportModule {
    pub name: String,
    pub functions: Vec<DelayImportedFunction>,
}

/// A descriptor's `name_rva`/table fields are nominally RVAs when
/// `attributes` bit 0 is set, but many linkers emit the older,
/// unflagged layout where they're actual VAs instead; an address that
/// falls in `[image_base, image_base + 2 GiB)` is almost certainly a
/// VA regardless of what the attribute bit claims (spec.md §4.H).
fn looks_like_va(value: u32, image_base: u64) -> bool {
    let value = value as u64;
    value >= image_base && value < image_base.saturating_add(0x8000_0000)
}

fn resolve(resolver: &RvaResolver<SectionTable>, value: u32, image_base: u64, rva_based: bool) -> Option<u64> {
    if rva_based && !looks_like_va(value, image_base) {
        resolver.rva_to_offset(value)
    } else {
        let rva = (value as u64).checked_sub(image_base)? as u32;
        resolver.rva_to_offset(rva)
    }
}

/// Walks 32-byte delay-load descriptors terminated by an all-zero
/// record; per-descriptor, decides RVA vs. VA addressing from the
/// `attributes` bit together with a value-range heuristic, since real
/// binaries disagree with their own attribute bit in practice
/// (spec.md §4.H).
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
) -> error::Result<Vec<DelayImportModule>> {
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(mut offset) = resolver.rva_to_offset(rva).map(|o| o as usize) else {
        diags.record(Severity::Anomaly, Category::DelayImport, "DIMP_UNMAPPED_TABLE", "delay import directory RVA does not map into any section");
        return Ok(Vec::new());
    };

    let mut modules = Vec::new();
    for _ in 0..opts.max_import_dlls {
        let descriptor: DelayImportDescriptor = bytes.pread_with(offset, scroll::LE)?;
        if descriptor.is_null() {
            break;
        }
        offset += SIZEOF_DELAY_IMPORT_DESCRIPTOR;

        let rva_based = descriptor.rva_based();
        if !rva_based && !looks_like_va(descriptor.name_rva, image_base) {
            diags.record(Severity::Anomaly, Category::DelayImport, "DIMP_VA_HEURISTIC", "delay import descriptor's attribute bit disagrees with its address range; treating as VA-based");
        }

        let Some(name_offset) = resolve(&resolver, descriptor.name_rva, image_base, rva_based) else {
            diags.record(Severity::Anomaly, Category::DelayImport, "DIMP_UNMAPPED_NAME", "delay import descriptor name address does not map into any section");
            continue;
        };
        let src = ByteSource::new(bytes);
        let (name_bytes, _) = src.cstr(name_offset as usize, 256)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        let mut functions = Vec::new();
        let thunk_size = if is_64 { 8 } else { 4 };
        let mut table_address = descriptor.name_table_rva;
        for _ in 0..opts.max_import_functions_per_dll {
            let Some(thunk_offset) = resolve(&resolver, table_address, image_base, rva_based) else { break };
            let (by_ordinal, value) = if is_64 {
                let v: u64 = bytes.pread_with(thunk_offset as usize, scroll::LE)?;
                if v == 0 { break; }
                (v & IMPORT_BY_ORDINAL_64 != 0, v)
            } else {
                let v: u32 = bytes.pread_with(thunk_offset as usize, scroll::LE)?;
                if v == 0 { break; }
                (v & IMPORT_BY_ORDINAL_32 != 0, v as u64)
            };
            let symbol = if by_ordinal {
                DelayImportedSymbol::Ordinal((value & 0xffff) as u16)
            } else {
                let mask = if is_64 { 0x7fff_ffff_ffff_ffff } else { 0x7fff_ffff };
                let name_value = (value & mask) as u32;
                let Some(hint_name_offset) = resolve(&resolver, name_value, image_base, rva_based) else { break };
                let hint: u16 = bytes.pread_with(hint_name_offset as usize, scroll::LE)?;
                let src = ByteSource::new(bytes);
                let (name_bytes, _) = src.cstr(hint_name_offset as usize + 2, 256)?;
                DelayImportedSymbol::Named { hint, name: String::from_utf8_lossy(name_bytes).into_owned() }
            };
            functions.push(DelayImportedFunction { symbol });
            table_address += thunk_size;
        }

        modules.push(DelayImportModule { name, functions });
    }
    Ok(modules)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    const IMAGE_BASE: u64 = 0x1_0000_0000;

    fn one_section() -> Vec<SectionTable> {
        let mut s = SectionTable::default();
        s.virtual_address = 0x1000;
        s.virtual_size = 0x1000;
        s.pointer_to_raw_data = 0x200;
        s.size_of_raw_data = 0x1000;
        vec![s]
    }

    #[test]
    fn empty_directory_yields_no_modules() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, &sections, 0x200, IMAGE_BASE, true, 0, 0, &ParseOptions::default(), &mut diags).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn rva_based_ordinal_import_decodes() {
        let mut bytes = vec![0u8; 0x2000];
        let descriptor = DelayImportDescriptor {
            attributes: 0x1,
            name_rva: 0x1200,
            handle_rva: 0,
            address_table_rva: 0x1100,
            name_table_rva: 0x1100,
            bound_table_rva: 0,
            unload_table_rva: 0,
            time_stamp: 0,
        };
        bytes.pwrite_with(descriptor, 0x200, scroll::LE).unwrap();
        bytes.pwrite_with(IMPORT_BY_ORDINAL_64 | 9u64, 0x300, scroll::LE).unwrap();
        bytes[0x400..0x404].copy_from_slice(b"FOO\0");

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, &sections, 0x200, IMAGE_BASE, true, 0x1000, SIZEOF_DELAY_IMPORT_DESCRIPTOR as u32, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "FOO");
        assert!(matches!(modules[0].functions[0].symbol, DelayImportedSymbol::Ordinal(9)));
    }
}
