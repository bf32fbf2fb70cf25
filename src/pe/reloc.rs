//! Base relocation table decoder (component H, spec.md §4.H "BaseReloc").

use alloc::vec::Vec;
use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelocationType {
    Absolute,
    High,
    Low,
    HighLow,
    HighAdj,
    Dir64,
    Unknown(u8),
}

impl From<u8> for RelocationType {
    fn from(v: u8) -> Self {
        match v {
            0 => RelocationType::Absolute,
            1 => RelocationType::High,
            2 => RelocationType::Low,
            3 => RelocationType::HighLow,
            4 => RelocationType::HighAdj,
            10 => RelocationType::Dir64,
            other => RelocationType::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    pub kind: RelocationType,
    /// Absolute RVA: block's `page_rva + (entry & 0xfff)`.
    pub rva: u32,
}

/// Walks `(page_rva, block_size, entries)` blocks until `size` bytes of
/// the directory are consumed; entry count per block is
/// `(block_size - 8) / 2` (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    rva: u32,
    size: u32,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<Relocation>> {
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(start) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Relocation, "RELOC_UNMAPPED_TABLE", "base relocation directory RVA does not map into any section");
        return Ok(Vec::new());
    };

    let mut relocations = Vec::new();
    let mut offset = start as usize;
    let end = start as usize + size as usize;
    while offset + 8 <= end {
        let page_rva: u32 = bytes.pread_with(offset, scroll::LE)?;
        let block_size: u32 = bytes.pread_with(offset + 4, scroll::LE)?;
        if block_size < 8 {
            diags.record(Severity::Error, Category::Relocation, "RELOC_BAD_BLOCK_SIZE", "relocation block size is smaller than its own header");
            break;
        }
        let entry_count = (block_size as usize - 8) / 2;
        for i in 0..entry_count {
            let entry_offset = offset + 8 + i * 2;
            if entry_offset + 2 > end {
                break;
            }
            let entry: u16 = bytes.pread_with(entry_offset, scroll::LE)?;
            let kind = RelocationType::from((entry >> 12) as u8);
            if matches!(kind, RelocationType::Absolute) {
                continue; // padding entry, carries no address
            }
            relocations.push(Relocation { kind, rva: page_rva + (entry & 0x0fff) as u32 });
        }
        offset += block_size as usize;
    }
    Ok(relocations)
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
    fn absolute_padding_entry_is_skipped() {
        let mut bytes = vec![0u8; 0x2000];
        bytes.pwrite_with(0x1000u32, 0x200, scroll::LE).unwrap(); // page_rva
        bytes.pwrite_with(12u32, 0x204, scroll::LE).unwrap(); // block_size: header(8) + 2 entries
        bytes.pwrite_with(0x3010u16, 0x208, scroll::LE).unwrap(); // HIGHLOW at offset 0x10
        bytes.pwrite_with(0x0000u16, 0x20a, scroll::LE).unwrap(); // ABSOLUTE padding

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let relocs = parse(&bytes, &sections, 0x200, 0x1000, 12, &mut diags).unwrap();
        assert_eq!(relocs.len(), 1);
        assert_eq!(relocs[0].kind, RelocationType::HighLow);
        assert_eq!(relocs[0].rva, 0x1010);
    }
}
