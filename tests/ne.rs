//! Integration test: a minimal 16-bit NE image built byte-by-byte,
//! exercising classification, header parsing, and the resource table.

use legexe::ne::header::NeHeader;
use legexe::ExecutableFile;
use scroll::Pwrite;

const NE_HEADER_LEN: usize = 64;

#[test]
fn ne_image_classifies_and_exposes_one_string_resource() {
    let ne_offset = 0x40usize;
    let mut buf = vec![0u8; ne_offset];
    buf[0] = b'M';
    buf[1] = b'Z';
    buf[0x3c..0x40].copy_from_slice(&(ne_offset as u32).to_le_bytes());

    let resource_table_offset = NE_HEADER_LEN as u16;
    let resident_name_table_offset = resource_table_offset + 2 + 8 + 12 + 2; // header + one type block + one entry + terminator

    let header = NeHeader {
        signature: 0x454e, // "NE"
        resource_table_offset,
        resident_name_table_offset,
        ..Default::default()
    };

    let mut ne_bytes = vec![0u8; resident_name_table_offset as usize + 2];
    ne_bytes.pwrite_with(header, 0, scroll::LE).unwrap();

    // Resource table: alignment_shift=0, one RT_STRING(6) block with one
    // named entry "GREETING" pointing at file offset 0 (itself, to keep
    // this self-contained), terminated by a zero type id.
    let table_offset = resource_table_offset as usize;
    ne_bytes.pwrite_with(0u16, table_offset, scroll::LE).unwrap(); // alignment_shift
    ne_bytes.pwrite_with(0x8006u16, table_offset + 2, scroll::LE).unwrap(); // type_id = RT_STRING | ID_FLAG
    ne_bytes.pwrite_with(1u16, table_offset + 4, scroll::LE).unwrap(); // count
    ne_bytes.pwrite_with(0u32, table_offset + 6, scroll::LE).unwrap(); // reserved
    let entry_offset = table_offset + 10;
    ne_bytes.pwrite_with(0u16, entry_offset, scroll::LE).unwrap(); // offset (units)
    ne_bytes.pwrite_with(1u16, entry_offset + 2, scroll::LE).unwrap(); // length (units)
    ne_bytes.pwrite_with(0u16, entry_offset + 4, scroll::LE).unwrap(); // flags
    ne_bytes.pwrite_with(0x8007u16, entry_offset + 6, scroll::LE).unwrap(); // id = 7 | ID_FLAG
    ne_bytes.pwrite_with(0u32, entry_offset + 8, scroll::LE).unwrap(); // reserved x2
    ne_bytes.pwrite_with(0u16, entry_offset + 12, scroll::LE).unwrap(); // terminator type_id

    // Resident name table starts right after: module name "T".
    let name_offset = resident_name_table_offset as usize;
    ne_bytes[name_offset] = 1;
    ne_bytes[name_offset + 1] = b'T';

    buf.extend_from_slice(&ne_bytes);

    let file = ExecutableFile::parse(&buf).expect("minimal NE image should parse");
    let ExecutableFile::Ne(ne) = file else { panic!("expected NE classification") };
    assert_eq!(ne.module_name().unwrap(), "T");

    let (alignment_shift, entries) = ne.resources().expect("resource table should parse");
    assert_eq!(alignment_shift, 0);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].length, 1);
}
