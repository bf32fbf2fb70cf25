//! COFF header and the 32/64-bit optional header (component F).
//!
//! The DOS header itself is shared with the plain-MZ and NE/LE parsers
//! ([`crate::mz::MzHeader`]): every one of these formats starts with the
//! same 64-byte stub, so there is exactly one place in the crate that
//! knows its layout.

use alloc::vec::Vec;
use scroll::{Pread, Pwrite, SizeWith};

use crate::error::{self, Error};
use crate::pe::section_table::SectionTable;

pub const SIZEOF_COFF_HEADER: usize = 20;
/// `PE\0\0`, little endian.
pub const PE_MAGIC: u32 = 0x0000_4550;
pub const SIZEOF_PE_MAGIC: usize = 4;

pub const COFF_MACHINE_UNKNOWN: u16 = 0x0;
pub const COFF_MACHINE_X86: u16 = 0x14c;
pub const COFF_MACHINE_X86_64: u16 = 0x8664;
pub const COFF_MACHINE_ARM: u16 = 0x1c0;
pub const COFF_MACHINE_ARM64: u16 = 0xaa64;
pub const COFF_MACHINE_ARMNT: u16 = 0x1c4;
pub const COFF_MACHINE_IA64: u16 = 0x200;
pub const COFF_MACHINE_EBC: u16 = 0xebc;
pub const COFF_MACHINE_RISCV64: u16 = 0x5064;

pub fn machine_to_str(machine: u16) -> &'static str {
    match machine {
        COFF_MACHINE_UNKNOWN => "UNKNOWN",
        COFF_MACHINE_X86 => "X86",
        COFF_MACHINE_X86_64 => "X86_64",
        COFF_MACHINE_ARM => "ARM",
        COFF_MACHINE_ARM64 => "ARM64",
        COFF_MACHINE_ARMNT => "ARM_NT",
        COFF_MACHINE_IA64 => "IA64",
        COFF_MACHINE_EBC => "EBC",
        COFF_MACHINE_RISCV64 => "RISC-V_64",
        _ => "COFF_UNKNOWN",
    }
}

/// `IMAGE_FILE_*` characteristics bits (COFF header).
pub const CHARACTERISTIC_RELOCS_STRIPPED: u16 = 0x0001;
pub const CHARACTERISTIC_EXECUTABLE_IMAGE: u16 = 0x0002;
pub const CHARACTERISTIC_32BIT_MACHINE: u16 = 0x0100;
pub const CHARACTERISTIC_DLL: u16 = 0x2000;

pub fn is_dll(characteristics: u16) -> bool {
    characteristics & CHARACTERISTIC_DLL != 0
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct CoffHeader {
    pub machine: u16,
    pub number_of_sections: u16,
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32,
    pub number_of_symbol_table: u32,
    pub size_of_optional_header: u16,
    pub characteristics: u16,
}

impl CoffHeader {
    pub fn parse(bytes: &[u8], offset: usize) -> error::Result<Self> {
        Ok(bytes.pread_with(offset, scroll::LE)?)
    }
}

pub const MAGIC_32: u16 = 0x10b;
pub const MAGIC_64: u16 = 0x20b;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct StandardFields32 {
    magic: u16,
    major_linker_version: u8,
    minor_linker_version: u8,
    size_of_code: u32,
    size_of_initialized_data: u32,
    size_of_uninitialized_data: u32,
    address_of_entry_point: u32,
    base_of_code: u32,
    base_of_data: u32,
}
const SIZEOF_STANDARD_FIELDS_32: usize = 28;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct StandardFields64 {
    magic: u16,
    major_linker_version: u8,
    minor_linker_version: u8,
    size_of_code: u32,
    size_of_initialized_data: u32,
    size_of_uninitialized_data: u32,
    address_of_entry_point: u32,
    base_of_code: u32,
}
const SIZEOF_STANDARD_FIELDS_64: usize = 24;

/// Unified 32/64-bit standard fields; `base_of_data` is absent in PE32+.
#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct StandardFields {
    pub magic: u16,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u64,
    pub size_of_initialized_data: u64,
    pub size_of_uninitialized_data: u64,
    pub address_of_entry_point: u64,
    pub base_of_code: u64,
    pub base_of_data: u32,
}

impl From<StandardFields32> for StandardFields {
    fn from(f: StandardFields32) -> Self {
        StandardFields {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u64,
            size_of_initialized_data: f.size_of_initialized_data as u64,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u64,
            address_of_entry_point: f.address_of_entry_point as u64,
            base_of_code: f.base_of_code as u64,
            base_of_data: f.base_of_data,
        }
    }
}

impl From<StandardFields64> for StandardFields {
    fn from(f: StandardFields64) -> Self {
        StandardFields {
            magic: f.magic,
            major_linker_version: f.major_linker_version,
            minor_linker_version: f.minor_linker_version,
            size_of_code: f.size_of_code as u64,
            size_of_initialized_data: f.size_of_initialized_data as u64,
            size_of_uninitialized_data: f.size_of_uninitialized_data as u64,
            address_of_entry_point: f.address_of_entry_point as u64,
            base_of_code: f.base_of_code as u64,
            base_of_data: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct WindowsFields32 {
    image_base: u32,
    section_alignment: u32,
    file_alignment: u32,
    major_operating_system_version: u16,
    minor_operating_system_version: u16,
    major_image_version: u16,
    minor_image_version: u16,
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    win32_version_value: u32,
    size_of_image: u32,
    size_of_headers: u32,
    check_sum: u32,
    subsystem: u16,
    dll_characteristics: u16,
    size_of_stack_reserve: u32,
    size_of_stack_commit: u32,
    size_of_heap_reserve: u32,
    size_of_heap_commit: u32,
    loader_flags: u32,
    number_of_rva_and_sizes: u32,
}
const SIZEOF_WINDOWS_FIELDS_32: usize = 68;

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
struct WindowsFields64 {
    image_base: u64,
    section_alignment: u32,
    file_alignment: u32,
    major_operating_system_version: u16,
    minor_operating_system_version: u16,
    major_image_version: u16,
    minor_image_version: u16,
    major_subsystem_version: u16,
    minor_subsystem_version: u16,
    win32_version_value: u32,
    size_of_image: u32,
    size_of_headers: u32,
    check_sum: u32,
    subsystem: u16,
    dll_characteristics: u16,
    size_of_stack_reserve: u64,
    size_of_stack_commit: u64,
    size_of_heap_reserve: u64,
    size_of_heap_commit: u64,
    loader_flags: u32,
    number_of_rva_and_sizes: u32,
}
const SIZEOF_WINDOWS_FIELDS_64: usize = 88;

#[derive(Debug, PartialEq, Copy, Clone, Default)]
pub struct WindowsFields {
    pub image_base: u64,
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub check_sum: u32,
    pub subsystem: u16,
    pub dll_characteristics: u16,
    pub size_of_stack_reserve: u64,
    pub size_of_stack_commit: u64,
    pub size_of_heap_reserve: u64,
    pub size_of_heap_commit: u64,
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
}

impl From<WindowsFields32> for WindowsFields {
    fn from(w: WindowsFields32) -> Self {
        WindowsFields {
            image_base: w.image_base as u64,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve as u64,
            size_of_stack_commit: w.size_of_stack_commit as u64,
            size_of_heap_reserve: w.size_of_heap_reserve as u64,
            size_of_heap_commit: w.size_of_heap_commit as u64,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

impl From<WindowsFields64> for WindowsFields {
    fn from(w: WindowsFields64) -> Self {
        WindowsFields {
            image_base: w.image_base,
            section_alignment: w.section_alignment,
            file_alignment: w.file_alignment,
            major_operating_system_version: w.major_operating_system_version,
            minor_operating_system_version: w.minor_operating_system_version,
            major_image_version: w.major_image_version,
            minor_image_version: w.minor_image_version,
            major_subsystem_version: w.major_subsystem_version,
            minor_subsystem_version: w.minor_subsystem_version,
            win32_version_value: w.win32_version_value,
            size_of_image: w.size_of_image,
            size_of_headers: w.size_of_headers,
            check_sum: w.check_sum,
            subsystem: w.subsystem,
            dll_characteristics: w.dll_characteristics,
            size_of_stack_reserve: w.size_of_stack_reserve,
            size_of_stack_commit: w.size_of_stack_commit,
            size_of_heap_reserve: w.size_of_heap_reserve,
            size_of_heap_commit: w.size_of_heap_commit,
            loader_flags: w.loader_flags,
            number_of_rva_and_sizes: w.number_of_rva_and_sizes,
        }
    }
}

#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct DataDirectory {
    pub virtual_address: u32,
    pub size: u32,
}
pub const SIZEOF_DATA_DIRECTORY: usize = 8;

pub const NUM_DATA_DIRECTORIES: usize = 16;
pub const DIR_EXPORT: usize = 0;
pub const DIR_IMPORT: usize = 1;
pub const DIR_RESOURCE: usize = 2;
pub const DIR_EXCEPTION: usize = 3;
pub const DIR_SECURITY: usize = 4;
pub const DIR_BASERELOC: usize = 5;
pub const DIR_DEBUG: usize = 6;
pub const DIR_ARCHITECTURE: usize = 7;
pub const DIR_GLOBALPTR: usize = 8;
pub const DIR_TLS: usize = 9;
pub const DIR_LOAD_CONFIG: usize = 10;
pub const DIR_BOUND_IMPORT: usize = 11;
pub const DIR_IAT: usize = 12;
pub const DIR_DELAY_IMPORT: usize = 13;
pub const DIR_CLR_RUNTIME: usize = 14;

/// `number_of_rva_and_sizes` is the live count; entries beyond it (and
/// any empty `(0, 0)` entry within it) report as absent (spec.md §4.H).
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDirectories {
    entries: [DataDirectory; NUM_DATA_DIRECTORIES],
}

macro_rules! dir_accessor {
    ($name:ident, $idx:ident) => {
        pub fn $name(&self) -> Option<DataDirectory> {
            self.get($idx)
        }
    };
}

impl DataDirectories {
    pub fn parse(bytes: &[u8], offset: usize, count: usize) -> error::Result<Self> {
        let count = count.min(NUM_DATA_DIRECTORIES);
        let mut entries = [DataDirectory::default(); NUM_DATA_DIRECTORIES];
        for (i, slot) in entries.iter_mut().take(count).enumerate() {
            *slot = bytes.pread_with(offset + i * SIZEOF_DATA_DIRECTORY, scroll::LE)?;
        }
        Ok(DataDirectories { entries })
    }

    pub fn get(&self, index: usize) -> Option<DataDirectory> {
        let d = *self.entries.get(index)?;
        if d.virtual_address == 0 && d.size == 0 {
            None
        } else {
            Some(d)
        }
    }

    dir_accessor!(export_table, DIR_EXPORT);
    dir_accessor!(import_table, DIR_IMPORT);
    dir_accessor!(resource_table, DIR_RESOURCE);
    dir_accessor!(exception_table, DIR_EXCEPTION);
    dir_accessor!(security_table, DIR_SECURITY);
    dir_accessor!(base_relocation_table, DIR_BASERELOC);
    dir_accessor!(debug_table, DIR_DEBUG);
    dir_accessor!(tls_table, DIR_TLS);
    dir_accessor!(load_config_table, DIR_LOAD_CONFIG);
    dir_accessor!(bound_import_table, DIR_BOUND_IMPORT);
    dir_accessor!(delay_import_table, DIR_DELAY_IMPORT);
    dir_accessor!(clr_runtime_header, DIR_CLR_RUNTIME);
}

#[derive(Debug, PartialEq, Copy, Clone)]
pub struct OptionalHeader {
    pub standard_fields: StandardFields,
    pub windows_fields: WindowsFields,
    pub data_directories: DataDirectories,
}

impl OptionalHeader {
    pub fn is_64(&self) -> bool {
        self.standard_fields.magic == MAGIC_64
    }

    /// Parses the optional header starting at `offset`, returning it and
    /// the number of bytes consumed (never more than
    /// `size_of_optional_header` reported by the COFF header).
    pub fn parse(bytes: &[u8], offset: usize) -> error::Result<(Self, usize)> {
        let magic: u16 = bytes.pread_with(offset, scroll::LE)?;
        let (standard_fields, windows_fields, mut pos): (StandardFields, WindowsFields, usize) = match magic {
            MAGIC_32 => {
                let sf: StandardFields32 = bytes.pread_with(offset, scroll::LE)?;
                let wf: WindowsFields32 = bytes.pread_with(offset + SIZEOF_STANDARD_FIELDS_32, scroll::LE)?;
                (sf.into(), wf.into(), offset + SIZEOF_STANDARD_FIELDS_32 + SIZEOF_WINDOWS_FIELDS_32)
            }
            MAGIC_64 => {
                let sf: StandardFields64 = bytes.pread_with(offset, scroll::LE)?;
                let wf: WindowsFields64 = bytes.pread_with(offset + SIZEOF_STANDARD_FIELDS_64, scroll::LE)?;
                (sf.into(), wf.into(), offset + SIZEOF_STANDARD_FIELDS_64 + SIZEOF_WINDOWS_FIELDS_64)
            }
            other => {
                return Err(Error::InvalidStructure(alloc::format!(
                    "optional header magic {other:#06x} is neither PE32 nor PE32+"
                )))
            }
        };
        let data_directories = DataDirectories::parse(bytes, pos, windows_fields.number_of_rva_and_sizes as usize)?;
        pos += windows_fields.number_of_rva_and_sizes.min(NUM_DATA_DIRECTORIES as u32) as usize * SIZEOF_DATA_DIRECTORY;
        Ok((OptionalHeader { standard_fields, windows_fields, data_directories }, pos - offset))
    }
}

/// Reads the COFF section table immediately following the optional header.
pub fn parse_sections(bytes: &[u8], offset: usize, count: usize) -> error::Result<Vec<SectionTable>> {
    let mut sections = Vec::with_capacity(count);
    let mut pos = offset;
    for _ in 0..count {
        let section = SectionTable::parse(bytes, pos)?;
        pos += crate::pe::section_table::SIZEOF_SECTION_TABLE;
        sections.push(section);
    }
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizeof_standard_fields_matches_layout() {
        assert_eq!(core::mem::size_of::<StandardFields32>(), SIZEOF_STANDARD_FIELDS_32);
        assert_eq!(core::mem::size_of::<StandardFields64>(), SIZEOF_STANDARD_FIELDS_64);
    }

    #[test]
    fn sizeof_windows_fields_matches_layout() {
        assert_eq!(core::mem::size_of::<WindowsFields32>(), SIZEOF_WINDOWS_FIELDS_32);
        assert_eq!(core::mem::size_of::<WindowsFields64>(), SIZEOF_WINDOWS_FIELDS_64);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let buf = vec![0xffu8, 0xff];
        assert!(OptionalHeader::parse(&buf, 0).is_err());
    }
}
