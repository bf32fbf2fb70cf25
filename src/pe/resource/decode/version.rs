//! Version info (RT_VERSION) decoder (component J, spec.md §4.J).
//!
//! `VS_VERSIONINFO` is a DWORD-aligned `{length, value_length, type, key,
//! padding, value, children}` tree; this walks down to `StringFileInfo`
//! → `StringTable` → `String` and flattens every key/value pair found.

use alloc::collections::BTreeMap;
use alloc::string::String;
use scroll::Pread;

use crate::error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedFileInfo {
    pub signature: u32,
    pub struct_version: u32,
    pub file_version_major: u16,
    pub file_version_minor: u16,
    pub file_version_patch: u16,
    pub file_version_build: u16,
    pub product_version_major: u16,
    pub product_version_minor: u16,
    pub product_version_patch: u16,
    pub product_version_build: u16,
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date: u64,
}

const VS_FF_DEBUG: u32 = 0x0000_0001;
const VS_FF_PRERELEASE: u32 = 0x0000_0002;
const VS_FF_PATCHED: u32 = 0x0000_0004;

impl FixedFileInfo {
    pub fn is_debug(&self) -> bool {
        self.file_flags & VS_FF_DEBUG != 0
    }

    pub fn is_prerelease(&self) -> bool {
        self.file_flags & VS_FF_PRERELEASE != 0
    }

    pub fn is_patched(&self) -> bool {
        self.file_flags & VS_FF_PATCHED != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct VersionInfo {
    pub fixed_info: FixedFileInfo,
    pub strings: BTreeMap<String, String>,
}

impl VersionInfo {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.strings.get(key).map(|s| s.as_str())
    }
}

fn align_dword(offset: usize) -> usize {
    (offset + 3) & !3
}

fn read_utf16_cstr(data: &[u8], mut offset: usize, end: usize) -> (String, usize) {
    let mut units = alloc::vec::Vec::new();
    while offset + 2 <= end {
        let unit: u16 = match data.pread_with(offset, scroll::LE) {
            Ok(v) => v,
            Err(_) => break,
        };
        offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    (String::from_utf16_lossy(&units), offset)
}

fn parse_string_file_info(data: &[u8], start: usize, section_end: usize, strings: &mut BTreeMap<String, String>) {
    if start + 6 > data.len() {
        return;
    }
    let mut offset = start + 6;
    let (_key, after_key) = read_utf16_cstr(data, offset, section_end);
    offset = align_dword(after_key);

    while offset + 6 < section_end {
        let table_len: u16 = match data.pread_with(offset, scroll::LE) { Ok(v) => v, Err(_) => break };
        if table_len == 0 {
            break;
        }
        let table_end = (offset + table_len as usize).min(section_end);
        let mut p = offset + 6;
        let (_lang, after_lang) = read_utf16_cstr(data, p, table_end);
        p = align_dword(after_lang);

        while p + 6 < table_end {
            let string_len: u16 = match data.pread_with(p, scroll::LE) { Ok(v) => v, Err(_) => break };
            if string_len == 0 {
                break;
            }
            let value_len: u16 = data.pread_with(p + 2, scroll::LE).unwrap_or(0);
            let string_end = (p + string_len as usize).min(table_end);
            let mut q = p + 6;
            let (key, after_key) = read_utf16_cstr(data, q, string_end);
            q = align_dword(after_key);
            let value = if value_len > 0 && q < string_end {
                read_utf16_cstr(data, q, string_end).0
            } else {
                String::new()
            };
            strings.insert(key, value);
            p = align_dword(string_end);
        }
        offset = align_dword(table_end);
    }
}

/// Parses a `VS_VERSIONINFO` resource: fixed file info plus every
/// `StringFileInfo`/`StringTable`/`String` key-value pair (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<VersionInfo> {
    if data.len() < 58 {
        return Err(error::Error::OutOfBounds { offset: 0, len: 58 });
    }
    let vs_info_len: u16 = data.pread_with(0, scroll::LE)?;
    let mut offset = 6usize;
    let (_key, after_key) = read_utf16_cstr(data, offset, data.len());
    offset = align_dword(after_key);

    if offset + 52 > data.len() {
        return Err(error::Error::OutOfBounds { offset, len: 52 });
    }
    let ms_file: u32 = data.pread_with(offset + 8, scroll::LE)?;
    let ls_file: u32 = data.pread_with(offset + 12, scroll::LE)?;
    let ms_product: u32 = data.pread_with(offset + 16, scroll::LE)?;
    let ls_product: u32 = data.pread_with(offset + 20, scroll::LE)?;
    let fixed_info = FixedFileInfo {
        signature: data.pread_with(offset, scroll::LE)?,
        struct_version: data.pread_with(offset + 4, scroll::LE)?,
        file_version_major: (ms_file >> 16) as u16,
        file_version_minor: (ms_file & 0xffff) as u16,
        file_version_patch: (ls_file >> 16) as u16,
        file_version_build: (ls_file & 0xffff) as u16,
        product_version_major: (ms_product >> 16) as u16,
        product_version_minor: (ms_product & 0xffff) as u16,
        product_version_patch: (ls_product >> 16) as u16,
        product_version_build: (ls_product & 0xffff) as u16,
        file_flags_mask: data.pread_with(offset + 24, scroll::LE)?,
        file_flags: data.pread_with(offset + 28, scroll::LE)?,
        file_os: data.pread_with(offset + 32, scroll::LE)?,
        file_type: data.pread_with(offset + 36, scroll::LE)?,
        file_subtype: data.pread_with(offset + 40, scroll::LE)?,
        file_date: ((data.pread_with::<u32>(offset + 44, scroll::LE)? as u64) << 32)
            | data.pread_with::<u32>(offset + 48, scroll::LE)? as u64,
    };
    offset = align_dword(offset + 52);

    let vs_info_end = (vs_info_len as usize).min(data.len());
    let mut strings = BTreeMap::new();
    while offset + 6 < vs_info_end {
        let child_len: u16 = match data.pread_with(offset, scroll::LE) { Ok(v) => v, Err(_) => break };
        if child_len == 0 {
            break;
        }
        let child_end = (offset + child_len as usize).min(vs_info_end);
        let (child_key, _) = read_utf16_cstr(data, offset + 6, child_end);
        if child_key == "StringFileInfo" {
            parse_string_file_info(data, offset, child_end, &mut strings);
        }
        offset = align_dword(child_end);
    }

    Ok(VersionInfo { fixed_info, strings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn flat_string_table_decodes() {
        // VS_VERSIONINFO header + "VS_VERSION_INFO\0" key + padding + 52-byte fixed info
        let mut data = alloc::vec::Vec::new();
        data.extend_from_slice(&0u16.to_le_bytes()); // length placeholder, fixed below
        data.extend_from_slice(&52u16.to_le_bytes()); // value_length
        data.extend_from_slice(&0u16.to_le_bytes()); // type
        for ch in "VS_VERSION_INFO".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes()); // NUL
        while data.len() % 4 != 0 {
            data.push(0);
        }
        data.extend_from_slice(&0xFEEF04BDu32.to_le_bytes());
        data.extend_from_slice(&[0u8; 48]); // rest of fixed info, zeroed

        // StringFileInfo child
        let string_file_info_start = data.len();
        data.extend_from_slice(&0u16.to_le_bytes()); // length placeholder
        data.extend_from_slice(&0u16.to_le_bytes()); // value_length
        data.extend_from_slice(&1u16.to_le_bytes()); // type = text
        for ch in "StringFileInfo".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
        while (data.len() - string_file_info_start) % 4 != 0 {
            data.push(0);
        }

        // StringTable child "040904b0"
        let table_start = data.len();
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        for ch in "040904b0".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
        while (data.len() - table_start) % 4 != 0 {
            data.push(0);
        }

        // String "CompanyName" = "Acme"
        let string_start = data.len();
        data.extend_from_slice(&0u16.to_le_bytes());
        data.extend_from_slice(&5u16.to_le_bytes()); // value_length (chars incl NUL)
        data.extend_from_slice(&1u16.to_le_bytes());
        for ch in "CompanyName".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
        while (data.len() - string_start) % 4 != 0 {
            data.push(0);
        }
        for ch in "Acme".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        data.extend_from_slice(&0u16.to_le_bytes());
        let string_end = data.len();
        (&mut data[string_start..string_start + 2]).pwrite_with((string_end - string_start) as u16, 0, scroll::LE).unwrap();

        let table_end = data.len();
        (&mut data[table_start..table_start + 2]).pwrite_with((table_end - table_start) as u16, 0, scroll::LE).unwrap();

        let sfi_end = data.len();
        (&mut data[string_file_info_start..string_file_info_start + 2]).pwrite_with((sfi_end - string_file_info_start) as u16, 0, scroll::LE).unwrap();

        let total_len = data.len();
        (&mut data[0..2]).pwrite_with(total_len as u16, 0, scroll::LE).unwrap();

        let info = parse(&data).unwrap();
        assert_eq!(info.get("CompanyName"), Some("Acme"));
        assert_eq!(info.fixed_info.signature, 0xFEEF04BD);
    }
}
