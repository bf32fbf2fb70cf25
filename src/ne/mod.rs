//! 16-bit New Executable parsing (component E).

pub mod header;
pub mod resource;
pub mod segment;

use alloc::vec::Vec;
use log::debug;
use scroll::Pread;

use crate::error::{self, Error};
use crate::mz::MzHeader;

pub use header::{NeHeader, TargetOs};
pub use resource::NeResourceEntry;
pub use segment::{SegmentEntry, SegmentKind};

/// A parsed NE image: the MZ stub header, the NE header, segment table,
/// and lazily-parsed resource table (spec.md §4.E).
#[derive(Debug)]
pub struct Ne<'a> {
    pub mz_header: MzHeader,
    pub header: NeHeader,
    pub ne_offset: usize,
    pub segments: Vec<SegmentEntry>,
    bytes: &'a [u8],
}

impl<'a> Ne<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        let mz_header = MzHeader::parse(bytes)?;
        let ne_offset = mz_header.e_lfanew as usize;
        if ne_offset == 0 || ne_offset + header::SIZEOF_NE_HEADER > bytes.len() {
            return Err(Error::InvalidStructure("e_lfanew does not point at a valid NE header".into()));
        }
        let header = NeHeader::parse(bytes, ne_offset)?;
        debug!("{:#?}", header);

        let segments = segment::parse_segments(
            bytes,
            ne_offset,
            header.segment_table_offset,
            header.segment_count,
            header.alignment_shift(),
        )?;

        Ok(Ne { mz_header, header, ne_offset, segments, bytes })
    }

    /// The MZ stub's code section, preserved verbatim ahead of the NE
    /// header (not the NE payload itself).
    pub fn code_section(&self) -> &'a [u8] {
        let off = self.mz_header.code_offset().min(self.bytes.len());
        &self.bytes[off..]
    }

    pub fn entry_segment(&self) -> Option<&SegmentEntry> {
        self.segments.iter().find(|s| s.index == self.header.entry_cs)
    }

    pub fn segment_by_index(&self, index: u16) -> Option<&SegmentEntry> {
        if index == 0 {
            return None;
        }
        self.segments.get(index as usize - 1)
    }

    pub fn segment_data(&self, segment: &SegmentEntry) -> &'a [u8] {
        segment::segment_data(self.bytes, segment)
    }

    /// Parses the resource table on demand rather than eagerly at
    /// construction (spec.md §4.E: "Resource table: parsed lazily").
    pub fn resources(&self) -> error::Result<(u16, Vec<NeResourceEntry>)> {
        resource::parse_resource_table(self.bytes, self.ne_offset, self.header.resource_table_offset)
    }

    /// Reads the length-prefixed module name from the resident-name
    /// table (the first entry in that table is always the module's own
    /// name, per the NE format).
    pub fn module_name(&self) -> error::Result<alloc::string::String> {
        let offset = self.ne_offset + self.header.resident_name_table_offset as usize;
        let len = *self.bytes.get(offset).ok_or(Error::OutOfBounds { offset, len: self.bytes.len() })? as usize;
        let start = offset + 1;
        let end = start + len;
        if end > self.bytes.len() {
            return Err(Error::OutOfBounds { offset: start, len: self.bytes.len() });
        }
        Ok(alloc::string::String::from_utf8_lossy(&self.bytes[start..end]).into_owned())
    }

    /// Module reference table: `module_ref_count` u16 offsets into the
    /// imported-names table, each resolved to a length-prefixed string.
    pub fn module_references(&self) -> error::Result<Vec<alloc::string::String>> {
        let table_offset = self.ne_offset + self.header.module_ref_table_offset as usize;
        let mut names = Vec::with_capacity(self.header.module_ref_count as usize);
        for i in 0..self.header.module_ref_count {
            let entry_offset = table_offset + i as usize * 2;
            let name_offset: u16 = self.bytes.pread_with(entry_offset, scroll::LE)?;
            let abs = self.ne_offset + self.header.import_name_table_offset as usize + name_offset as usize;
            let len = *self.bytes.get(abs).ok_or(Error::OutOfBounds { offset: abs, len: self.bytes.len() })? as usize;
            let start = abs + 1;
            let end = start + len;
            if end > self.bytes.len() {
                return Err(Error::OutOfBounds { offset: start, len: self.bytes.len() });
            }
            names.push(alloc::string::String::from_utf8_lossy(&self.bytes[start..end]).into_owned());
        }
        Ok(names)
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    fn minimal_ne() -> Vec<u8> {
        let ne_offset = 0x40usize;
        let mut buf = vec![0u8; ne_offset];
        buf[0] = b'M';
        buf[1] = b'Z';
        buf[0x3c..0x40].copy_from_slice(&(ne_offset as u32).to_le_bytes());

        let mut header = NeHeader { signature: 0x454e, ..Default::default() };
        header.segment_count = 0;
        header.resident_name_table_offset = header::SIZEOF_NE_HEADER as u16;
        let mut ne_bytes = vec![0u8; header::SIZEOF_NE_HEADER + 8];
        ne_bytes.pwrite_with(header, 0, scroll::LE).unwrap();
        // resident name table: length-prefixed module name "T" then a
        // zero terminator entry.
        let name_offset = header::SIZEOF_NE_HEADER;
        ne_bytes[name_offset] = 1;
        ne_bytes[name_offset + 1] = b'T';

        buf.extend_from_slice(&ne_bytes);
        buf
    }

    #[test]
    fn parses_header_and_module_name() {
        let buf = minimal_ne();
        let ne = Ne::parse(&buf).unwrap();
        assert_eq!(ne.header.signature, 0x454e);
        assert_eq!(ne.module_name().unwrap(), "T");
    }

    #[test]
    fn rejects_zero_lfanew() {
        let mut buf = vec![0u8; 0x40];
        buf[0] = b'M';
        buf[1] = b'Z';
        assert!(Ne::parse(&buf).is_err());
    }
}
