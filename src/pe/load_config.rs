//! LoadConfig directory decoder (component H, spec.md §4.H "LoadConfig").
//!
//! The directory's own `size` field is a version-discovery mechanism: any
//! field past that many bytes defaults to zero/`None` rather than being
//! misread from a newer or older layout.

use core::mem::offset_of;

use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::section_table::SectionTable;
use crate::rva::RvaResolver;

#[repr(C)]
#[non_exhaustive]
#[derive(Debug, Clone, scroll::Pread, Eq, PartialEq)]
pub struct LoadConfigDirectory64 {
    pub size: u32,
    pub time_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub global_flags_clear: u32,
    pub global_flags_set: u32,
    pub critical_section_default_timeout: u32,
    pub de_commit_free_block_threshold: u64,
    pub de_commit_total_free_threshold: u64,
    pub lock_prefix_table: u64,
    pub maximum_allocation_size: u64,
    pub virtual_memory_threshold: u64,
    pub process_affinity_mask: u64,
    pub process_heap_flags: u32,
    pub csd_version: u16,
    pub dependent_load_flags: u16,
    pub edit_list: u64,
    pub security_cookie: u64,
    pub se_handler_table: u64,
    pub se_handler_count: u64,
    pub guard_cf_check_function_pointer: u64,
    pub guard_cf_dispatch_function_pointer: u64,
    pub guard_cf_function_table: u64,
    pub guard_cf_function_count: u64,
    pub guard_flags: u32,
}

#[repr(C)]
#[non_exhaustive]
#[derive(Debug, Clone, scroll::Pread, Eq, PartialEq)]
pub struct LoadConfigDirectory32 {
    pub size: u32,
    pub time_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub global_flags_clear: u32,
    pub global_flags_set: u32,
    pub critical_section_default_timeout: u32,
    pub de_commit_free_block_threshold: u32,
    pub de_commit_total_free_threshold: u32,
    pub lock_prefix_table: u32,
    pub maximum_allocation_size: u32,
    pub virtual_memory_threshold: u32,
    pub process_heap_flags: u32,
    pub process_affinity_mask: u32,
    pub csd_version: u16,
    pub dependent_load_flags: u16,
    pub edit_list: u32,
    pub security_cookie: u32,
    pub se_handler_table: u32,
    pub se_handler_count: u32,
    pub guard_cf_check_function_pointer: u32,
    pub guard_cf_dispatch_function_pointer: u32,
    pub guard_cf_function_table: u32,
    pub guard_cf_function_count: u32,
    pub guard_flags: u32,
}

pub const IMAGE_GUARD_CF_INSTRUMENTED: u32 = 0x0000_0100;
pub const IMAGE_GUARD_CF_FUNCTION_TABLE_PRESENT: u32 = 0x0000_0400;
pub const IMAGE_GUARD_SECURITY_COOKIE_UNUSED: u32 = 0x0000_0800;
pub const IMAGE_GUARD_PROTECT_DELAYLOAD_IAT: u32 = 0x0000_1000;

macro_rules! have_field {
    ($bytes:expr, $size:expr, $offset:expr, $ty:ty) => {
        ($size as usize >= $offset + ::core::mem::size_of::<$ty>())
            .then(|| $bytes.pread::<$ty>($offset).ok())
            .flatten()
    };
}

/// View over the raw load-config directory bytes; accessors only return
/// a field if the directory's declared `size` covers its offset.
#[derive(Debug, Clone, Copy)]
pub struct LoadConfigData<'a> {
    is_64: bool,
    bytes: &'a [u8],
    size: usize,
}

impl<'a> LoadConfigData<'a> {
    pub fn parse(
        bytes: &'a [u8],
        sections: &[SectionTable],
        file_alignment: u32,
        is_64: bool,
        rva: u32,
        size: u32,
        diags: &mut DiagnosticCollector,
    ) -> error::Result<Option<Self>> {
        if rva == 0 || size == 0 {
            return Ok(None);
        }
        let resolver = RvaResolver::new(sections, file_alignment);
        let Some(offset) = resolver.rva_to_offset(rva) else {
            diags.record(Severity::Anomaly, Category::LoadConfig, "LCFG_UNMAPPED_TABLE", "load config directory RVA does not map into any section");
            return Ok(None);
        };
        let offset = offset as usize;
        if offset + 4 > bytes.len() {
            diags.record(Severity::Error, Category::LoadConfig, "LCFG_TRUNCATED", "load config directory does not fit in the file");
            return Ok(None);
        }
        let declared_size: u32 = bytes.pread_with(offset, scroll::LE)?;
        let available = bytes.len().saturating_sub(offset);
        let slice_len = (declared_size as usize).min(available).min(size as usize);
        Ok(Some(LoadConfigData {
            is_64,
            bytes: &bytes[offset..offset + slice_len],
            size: declared_size as usize,
        }))
    }

    fn read_arch_dependent_u64(&self, offset: usize) -> Option<u64> {
        if self.is_64 {
            have_field!(self.bytes, self.size, offset, u64)
        } else {
            have_field!(self.bytes, self.size, offset, u32).map(|v| v as u64)
        }
    }

    pub fn size(&self) -> u32 {
        self.size as u32
    }

    pub fn guard_flags(&self) -> Option<u32> {
        if self.is_64 {
            have_field!(self.bytes, self.size, offset_of!(LoadConfigDirectory64, guard_flags), u32)
        } else {
            have_field!(self.bytes, self.size, offset_of!(LoadConfigDirectory32, guard_flags), u32)
        }
    }

    pub fn security_cookie(&self) -> Option<u64> {
        if self.is_64 {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory64, security_cookie))
        } else {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory32, security_cookie))
        }
    }

    pub fn se_handler_table(&self) -> Option<u64> {
        if self.is_64 {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory64, se_handler_table))
        } else {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory32, se_handler_table))
        }
    }

    pub fn se_handler_count(&self) -> Option<u64> {
        if self.is_64 {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory64, se_handler_count))
        } else {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory32, se_handler_count))
        }
    }

    pub fn guard_cf_function_table(&self) -> Option<u64> {
        if self.is_64 {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory64, guard_cf_function_table))
        } else {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory32, guard_cf_function_table))
        }
    }

    pub fn guard_cf_function_count(&self) -> Option<u64> {
        if self.is_64 {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory64, guard_cf_function_count))
        } else {
            self.read_arch_dependent_u64(offset_of!(LoadConfigDirectory32, guard_cf_function_count))
        }
    }
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
    fn older_layout_defaults_trailing_fields_to_none() {
        let mut bytes = vec![0u8; 0x2000];
        // Declared size covers only through guard_flags (offset 0x5c for 32-bit) minus 4.
        let truncated_size: u32 = offset_of!(LoadConfigDirectory32, guard_flags) as u32;
        bytes.pwrite_with(truncated_size, 0x200, scroll::LE).unwrap();

        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        let data = LoadConfigData::parse(&bytes, &sections, 0x200, false, 0x1000, truncated_size, &mut diags)
            .unwrap()
            .unwrap();
        assert_eq!(data.size(), truncated_size);
        assert!(data.guard_flags().is_none());
    }

    #[test]
    fn empty_directory_is_none() {
        let bytes = vec![0u8; 0x2000];
        let sections = one_section();
        let mut diags = DiagnosticCollector::new();
        assert!(LoadConfigData::parse(&bytes, &sections, 0x200, false, 0, 0, &mut diags).unwrap().is_none());
    }
}
