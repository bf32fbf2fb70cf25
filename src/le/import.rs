//! LE/LX import module name table: length-prefixed ASCII strings, one
//! per imported module, indexed 1-based by fixup target ordinals
//! (spec.md §4.G).

use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{self, Error};

fn read_pascal_string(bytes: &[u8], offset: usize) -> error::Result<(String, usize)> {
    let len = *bytes.get(offset).ok_or(Error::OutOfBounds { offset, len: bytes.len() })? as usize;
    let start = offset + 1;
    let end = start + len;
    if end > bytes.len() {
        return Err(Error::OutOfBounds { offset: start, len: bytes.len() });
    }
    Ok((String::from_utf8_lossy(&bytes[start..end]).into_owned(), end))
}

/// Walks the module-name table sequentially for `module_count` entries;
/// there is no fixed stride since each name is length-prefixed.
pub fn parse_module_names(bytes: &[u8], le_offset: usize, table_offset: u32, module_count: u32) -> error::Result<Vec<String>> {
    let mut pos = le_offset + table_offset as usize;
    let mut names = Vec::with_capacity(module_count as usize);
    for _ in 0..module_count {
        let (name, next) = read_pascal_string(bytes, pos)?;
        names.push(name);
        pos = next;
    }
    Ok(names)
}

/// The procedure-name table shares the same length-prefixed-string
/// layout, keyed instead by byte offset from fixup targets rather than
/// sequential index.
pub fn read_procedure_name(bytes: &[u8], le_offset: usize, table_offset: u32, name_offset: u32) -> error::Result<String> {
    let pos = le_offset + table_offset as usize + name_offset as usize;
    let (name, _) = read_pascal_string(bytes, pos)?;
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sequential_module_names() {
        let mut buf = Vec::new();
        buf.push(3);
        buf.extend_from_slice(b"FOO");
        buf.push(4);
        buf.extend_from_slice(b"BARR");
        let names = parse_module_names(&buf, 0, 0, 2).unwrap();
        assert_eq!(names, vec!["FOO", "BARR"]);
    }
}
