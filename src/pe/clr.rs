//! CLR (COR20) header decoder (component H, spec.md §4.H "ClrRuntime").

use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_COR20_HEADER: usize = 72;

pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;
pub const COMIMAGE_FLAGS_32BITREQUIRED: u32 = 0x0000_0002;
pub const COMIMAGE_FLAGS_IL_LIBRARY: u32 = 0x0000_0004;
pub const COMIMAGE_FLAGS_STRONGNAMESIGNED: u32 = 0x0000_0008;
pub const COMIMAGE_FLAGS_NATIVE_ENTRYPOINT: u32 = 0x0000_0010;
pub const COMIMAGE_FLAGS_TRACKDEBUGDATA: u32 = 0x0001_0000;
pub const COMIMAGE_FLAGS_32BITPREFERRED: u32 = 0x0002_0000;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct Cor20Header {
    pub cb: u32,
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata_rva: u32,
    pub metadata_size: u32,
    pub flags: u32,
    pub entry_point_token_or_rva: u32,
    pub resources_rva: u32,
    pub resources_size: u32,
    pub strong_name_signature_rva: u32,
    pub strong_name_signature_size: u32,
    pub code_manager_table_rva: u32,
    pub code_manager_table_size: u32,
    pub vtable_fixups_rva: u32,
    pub vtable_fixups_size: u32,
    pub export_address_table_jumps_rva: u32,
    pub export_address_table_jumps_size: u32,
    pub managed_native_header_rva: u32,
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    pub fn is_il_only(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_ILONLY != 0
    }

    pub fn is_32bit_required(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_32BITREQUIRED != 0
    }

    pub fn is_strong_name_signed(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_STRONGNAMESIGNED != 0
    }

    pub fn has_native_entry_point(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_NATIVE_ENTRYPOINT != 0
    }

    pub fn is_32bit_preferred(&self) -> bool {
        self.flags & COMIMAGE_FLAGS_32BITPREFERRED != 0
    }
}

/// Decodes the fixed 72-byte COR20 header (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    rva: u32,
    size: u32,
    diags: &mut DiagnosticCollector,
) -> error::Result<Option<Cor20Header>> {
    if rva == 0 || size == 0 {
        return Ok(None);
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(offset) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Clr, "CLR_UNMAPPED_TABLE", "CLR directory RVA does not map into any section");
        return Ok(None);
    };
    if (size as usize) < SIZEOF_COR20_HEADER {
        diags.record(Severity::Anomaly, Category::Clr, "CLR_TRUNCATED", "CLR directory is smaller than a COR20 header");
        return Ok(None);
    }
    let header: Cor20Header = bytes.pread_with(offset as usize, scroll::LE)?;
    Ok(Some(header))
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
    fn flags_decode() {
        let mut bytes = vec![0u8; 0x2000];
        let mut header = Cor20Header::default();
        header.cb = SIZEOF_COR20_HEADER as u32;
        header.flags = COMIMAGE_FLAGS_ILONLY | COMIMAGE_FLAGS_STRONGNAMESIGNED;
        bytes.pwrite_with(header, 0x200, scroll::LE).unwrap();

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let header = parse(&bytes, &sections, 0x200, 0x1000, SIZEOF_COR20_HEADER as u32, &mut diags).unwrap().unwrap();
        assert!(header.is_il_only());
        assert!(header.is_strong_name_signed());
        assert!(!header.is_32bit_required());
    }

    #[test]
    fn empty_directory_is_none() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        assert!(parse(&bytes, &sections, 0x200, 0, 0, &mut diags).unwrap().is_none());
    }
}
