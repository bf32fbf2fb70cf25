//! Import directory decoder (component H, spec.md §4.H "Import").

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::cursor::ByteSource;
use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error::{self, Error};
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_IMPORT_DESCRIPTOR: usize = 20;
pub(crate) const IMPORT_BY_ORDINAL_32: u32 = 0x8000_0000;
pub(crate) const IMPORT_BY_ORDINAL_64: u64 = 0x8000_0000_0000_0000;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct ImportDescriptor {
    pub import_lookup_table_rva: u32,
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name_rva: u32,
    pub import_address_table_rva: u32,
}

impl ImportDescriptor {
    fn is_null(&self) -> bool {
        *self == ImportDescriptor::default()
    }
}

#[derive(Debug, Clone)]
pub enum ImportedSymbol {
    Ordinal(u16),
    Named { hint: u16, name: String },
}

#[derive(Debug, Clone)]
pub struct ImportedFunction {
    pub symbol: ImportedSymbol,
    /// Byte offset of this entry's slot in the Import Address Table.
    pub iat_rva: u32,
}

#[derive(Debug, Clone)]
pub struct ImportModule {
    pub name: String,
    pub functions: Vec<ImportedFunction>,
}

fn read_thunk(bytes: &[u8], offset: usize, is_64: bool) -> error::Result<Option<(bool, u64)>> {
    if is_64 {
        let v: u64 = bytes.pread_with(offset, scroll::LE)?;
        if v == 0 {
            return Ok(None);
        }
        Ok(Some((v & IMPORT_BY_ORDINAL_64 != 0, v)))
    } else {
        let v: u32 = bytes.pread_with(offset, scroll::LE)?;
        if v == 0 {
            return Ok(None);
        }
        Ok(Some((v & IMPORT_BY_ORDINAL_32 != 0, v as u64)))
    }
}

fn read_hint_name(bytes: &[u8], offset: usize) -> error::Result<(u16, String)> {
    let src = ByteSource::new(bytes);
    let hint = src.u16_le(offset)?;
    let (name, _) = src.cstr(offset + 2, 256)?;
    Ok((hint, String::from_utf8_lossy(name).into_owned()))
}

fn read_thunk_array(
    bytes: &[u8],
    resolver: &RvaResolver<SectionTable>,
    table_rva: u32,
    iat_rva: u32,
    is_64: bool,
    opts: &ParseOptions,
) -> error::Result<Vec<ImportedFunction>> {
    let thunk_size = if is_64 { 8 } else { 4 };
    let mut functions = Vec::new();
    let mut rva = table_rva;
    for _ in 0..opts.max_import_functions_per_dll {
        let Some(offset) = resolver.rva_to_offset(rva) else { break };
        let Some((by_ordinal, value)) = read_thunk(bytes, offset as usize, is_64)? else { break };
        let symbol = if by_ordinal {
            ImportedSymbol::Ordinal((value & 0xffff) as u16)
        } else {
            let mask = if is_64 { 0x7fff_ffff_ffff_ffff } else { 0x7fff_ffff };
            let name_rva = (value & mask) as u32;
            let Some(name_offset) = resolver.rva_to_offset(name_rva) else { break };
            let (hint, name) = read_hint_name(bytes, name_offset as usize)?;
            ImportedSymbol::Named { hint, name }
        };
        functions.push(ImportedFunction { symbol, iat_rva });
        rva += thunk_size;
    }
    Ok(functions)
}

/// Walks the Import Directory Table, preferring the Import Lookup Table
/// and falling back to the Import Address Table when the ILT RVA is
/// absent (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    is_64: bool,
    rva: u32,
    size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<ImportModule>> {
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(mut offset) = resolver.rva_to_offset(rva).map(|o| o as usize) else {
        diags.record(Severity::Anomaly, Category::Import, "IMP_UNMAPPED_TABLE", "import directory RVA does not map into any section");
        return Ok(Vec::new());
    };

    let mut modules = Vec::new();
    for _ in 0..opts.max_import_dlls {
        let descriptor: ImportDescriptor = bytes.pread_with(offset, scroll::LE).map_err(Error::from)?;
        if descriptor.is_null() {
            break;
        }
        offset += SIZEOF_IMPORT_DESCRIPTOR;

        let Some(name_offset) = resolver.rva_to_offset(descriptor.name_rva) else {
            diags.record(Severity::Anomaly, Category::Import, "IMP_UNMAPPED_NAME", "import descriptor name RVA does not map into any section");
            continue;
        };
        let src = ByteSource::new(bytes);
        let (name_bytes, _) = src.cstr(name_offset as usize, 256)?;
        let name = String::from_utf8_lossy(name_bytes).into_owned();

        let table_rva = if descriptor.import_lookup_table_rva != 0 {
            descriptor.import_lookup_table_rva
        } else {
            descriptor.import_address_table_rva
        };
        let functions = read_thunk_array(bytes, &resolver, table_rva, descriptor.import_address_table_rva, is_64, opts)?;
        modules.push(ImportModule { name, functions });
    }
    Ok(modules)
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
    fn empty_directory_yields_no_modules() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, &sections, 0x200, false, 0, 0, &ParseOptions::default(), &mut diags).unwrap();
        assert!(modules.is_empty());
    }

    #[test]
    fn single_ordinal_import_decodes() {
        let mut bytes = vec![0u8; 0x2000];
        // descriptor at file offset 0x200 (rva 0x1000)
        let descriptor = ImportDescriptor {
            import_lookup_table_rva: 0x1100,
            time_date_stamp: 0,
            forwarder_chain: 0,
            name_rva: 0x1200,
            import_address_table_rva: 0x1100,
        };
        bytes.pwrite_with(descriptor, 0x200, scroll::LE).unwrap();
        // thunk at rva 0x1100 -> offset 0x300: ordinal 7 with high bit set
        bytes.pwrite_with(IMPORT_BY_ORDINAL_32 | 7u32, 0x300, scroll::LE).unwrap();
        bytes[0x400..0x404].copy_from_slice(b"FOO\0"); // name at rva 0x1200 -> offset 0x400

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let modules = parse(&bytes, &sections, 0x200, false, 0x1000, SIZEOF_IMPORT_DESCRIPTOR as u32, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "FOO");
        assert_eq!(modules[0].functions.len(), 1);
        assert!(matches!(modules[0].functions[0].symbol, ImportedSymbol::Ordinal(7)));
    }
}
