//! Exception directory decoder (component H, spec.md §4.H "Exception").
//!
//! Only the x64 `RUNTIME_FUNCTION` table shape is modeled; unwind-code
//! interpretation and the ARM64 variant are out of scope.

use alloc::vec::Vec;
use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::options::ParseOptions;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

pub const SIZEOF_RUNTIME_FUNCTION: usize = 12;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, scroll::Pread)]
pub struct RuntimeFunction {
    pub begin_rva: u32,
    pub end_rva: u32,
    pub unwind_info_rva: u32,
}

impl RuntimeFunction {
    pub fn is_valid(&self) -> bool {
        self.end_rva > self.begin_rva
    }
}

/// Array of 12-byte `RUNTIME_FUNCTION` entries; an entry with
/// `end_rva <= begin_rva` is dropped with an anomaly rather than
/// aborting the whole table (spec.md §4.H).
pub fn parse(
    bytes: &[u8],
    sections: &[SectionTable],
    file_alignment: u32,
    rva: u32,
    size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<RuntimeFunction>> {
    if rva == 0 || size == 0 {
        return Ok(Vec::new());
    }
    let resolver = RvaResolver::new(sections, file_alignment);
    let Some(table_offset) = resolver.rva_to_offset(rva) else {
        diags.record(Severity::Anomaly, Category::Exception, "EXC_UNMAPPED_TABLE", "exception directory RVA does not map into any section");
        return Ok(Vec::new());
    };

    let count = (size as usize / SIZEOF_RUNTIME_FUNCTION).min(opts.max_runtime_functions);
    let mut functions = Vec::with_capacity(count);
    for i in 0..count {
        let offset = table_offset as usize + i * SIZEOF_RUNTIME_FUNCTION;
        let entry: RuntimeFunction = match bytes.pread_with(offset, scroll::LE) {
            Ok(e) => e,
            Err(_) => break,
        };
        if !entry.is_valid() {
            diags.record(Severity::Anomaly, Category::Exception, "EXC_INVALID_RANGE", "runtime function entry has end_rva <= begin_rva");
            continue;
        }
        functions.push(entry);
    }
    Ok(functions)
}
