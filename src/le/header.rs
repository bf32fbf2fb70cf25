//! LE/LX header (component G, spec.md §4.G), grounded on the IBM OS/2 LX
//! spec and Open Watcom's `exeflat.h` VxD extension fields.

use scroll::{Pread, Pwrite, SizeWith};

use crate::error::{self, Error};
use crate::sniff::FormatTag;

pub const SIZEOF_LE_HEADER: usize = 0xc4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Unknown,
    Os2,
    Windows,
    Dos4,
    Windows386,
}

impl From<u16> for TargetOs {
    fn from(v: u16) -> Self {
        match v {
            1 => TargetOs::Os2,
            2 => TargetOs::Windows,
            3 => TargetOs::Dos4,
            4 => TargetOs::Windows386,
            _ => TargetOs::Unknown,
        }
    }
}

/// The full LE/LX header. All table offsets are relative to the header's
/// own start *except* `data_pages_offset`, which is an absolute file
/// offset (spec.md §3).
#[repr(C)]
#[derive(Debug, PartialEq, Copy, Clone, Default, Pread, Pwrite, SizeWith)]
pub struct LeHeader {
    pub signature: u16,
    pub byte_order: u8,
    pub word_order: u8,
    pub format_level: u32,
    pub cpu_type: u16,
    pub target_os: u16,
    pub module_version: u32,
    pub module_type_flags: u32,
    pub number_of_memory_pages: u32,
    pub initial_object_cs: u32,
    pub initial_eip: u32,
    pub initial_object_ss: u32,
    pub initial_esp: u32,
    pub memory_page_size: u32,
    pub bytes_on_last_page: u32,
    pub fixup_section_size: u32,
    pub fixup_section_checksum: u32,
    pub loader_section_size: u32,
    pub loader_section_checksum: u32,
    pub object_table_offset: u32,
    pub object_table_entries: u32,
    pub object_page_map_offset: u32,
    pub object_iterate_data_map_offset: u32,
    pub resource_table_offset: u32,
    pub resource_table_entries: u32,
    pub resident_names_table_offset: u32,
    pub entry_table_offset: u32,
    pub module_directives_table_offset: u32,
    pub module_directives_table_entries: u32,
    pub fixup_page_table_offset: u32,
    pub fixup_record_table_offset: u32,
    pub imported_modules_name_table_offset: u32,
    pub imported_modules_count: u32,
    pub imported_procedure_name_table_offset: u32,
    pub per_page_checksum_table_offset: u32,
    pub data_pages_offset: u32,
    pub preload_pages_count: u32,
    pub nonresident_names_table_offset: u32,
    pub nonresident_names_table_length: u32,
    pub nonresident_names_table_checksum: u32,
    pub automatic_data_object: u32,
    pub debug_info_offset: u32,
    pub debug_info_length: u32,
    pub preload_instance_pages_count: u32,
    pub demand_instance_pages_count: u32,
    pub heap_size: u32,
    pub stack_size: u32,
    pub reserved: [u8; 8],
    pub vxd_version_info_resource_offset: u32,
    pub vxd_version_info_resource_length: u32,
    pub vxd_device_id: u16,
    pub vxd_ddk_version: u16,
}

impl LeHeader {
    pub fn parse(bytes: &[u8], offset: usize) -> error::Result<Self> {
        let header: LeHeader = bytes.pread_with(offset, scroll::LE)?;
        if header.signature != 0x454c && header.signature != 0x584c {
            return Err(Error::InvalidSignature(alloc::format!(
                "bad LE/LX signature {:#06x}",
                header.signature
            )));
        }
        Ok(header)
    }

    pub fn is_lx(&self) -> bool {
        self.signature == 0x584c
    }

    pub fn target_os(&self) -> TargetOs {
        TargetOs::from(self.target_os)
    }

    /// Matches the format tag the sniffer would have already produced for
    /// this buffer's signature pair (spec.md §4.C).
    pub fn format_tag(&self) -> FormatTag {
        match (self.is_lx(), self.target_os()) {
            (true, _) => FormatTag::LxOs2Bound,
            (false, TargetOs::Windows) => FormatTag::LeVxd,
            (false, _) => FormatTag::LeDos32Bound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(signature: u16, target_os: u16) -> Vec<u8> {
        let header = LeHeader { signature, target_os, ..Default::default() };
        let mut buf = vec![0u8; SIZEOF_LE_HEADER];
        buf.pwrite_with(header, 0, scroll::LE).unwrap();
        buf
    }

    #[test]
    fn rejects_bad_signature() {
        let buf = vec![0u8; SIZEOF_LE_HEADER];
        assert!(LeHeader::parse(&buf, 0).is_err());
    }

    #[test]
    fn lx_signature_is_recognised() {
        let buf = sample(0x584c, 1);
        let header = LeHeader::parse(&buf, 0).unwrap();
        assert!(header.is_lx());
        assert_eq!(header.format_tag(), FormatTag::LxOs2Bound);
    }

    #[test]
    fn le_vxd_target_os_dispatch() {
        let buf = sample(0x454c, 2);
        let header = LeHeader::parse(&buf, 0).unwrap();
        assert_eq!(header.format_tag(), FormatTag::LeVxd);
    }
}
