//! Windows 2.x/3.x raster font (RT_FONT, `.FNT`) decoder (component J,
//! spec.md §4.J).
//!
//! Fixed `FONTHDR` (117 bytes for version 0x0200, 118 for 0x0300) followed
//! by a glyph table (one extra sentinel entry past `last_char`) then the
//! bitmap data and a NUL-terminated face name at the header's `dfFace`
//! offset (absolute within the resource). Only raster fonts are decoded;
//! vector stroke-font glyphs are out of scope.

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

pub const FONT_VERSION_2X: u16 = 0x0200;
pub const FONT_VERSION_3X: u16 = 0x0300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontFamily {
    DontCare,
    Roman,
    Swiss,
    Modern,
    Script,
    Decorative,
    Unknown(u8),
}

impl FontFamily {
    fn from_pitch_and_family(byte: u8) -> Self {
        match byte & 0xf0 {
            0x00 => FontFamily::DontCare,
            0x10 => FontFamily::Roman,
            0x20 => FontFamily::Swiss,
            0x30 => FontFamily::Modern,
            0x40 => FontFamily::Script,
            0x50 => FontFamily::Decorative,
            other => FontFamily::Unknown(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphEntry {
    pub width: u16,
    pub bitmap_offset: u32,
}

#[derive(Debug, Clone)]
pub struct FontData {
    pub version: u16,
    pub size: u32,
    pub is_vector: bool,
    pub points: u16,
    pub vertical_res: u16,
    pub horizontal_res: u16,
    pub ascent: u16,
    pub internal_leading: u16,
    pub external_leading: u16,
    pub italic: bool,
    pub underline: bool,
    pub strikeout: bool,
    pub weight: u16,
    pub charset: u8,
    pub pixel_width: u16,
    pub pixel_height: u16,
    pub avg_width: u16,
    pub max_width: u16,
    pub width_bytes: u16,
    pub first_char: u8,
    pub last_char: u8,
    pub default_char: u8,
    pub break_char: u8,
    pub is_fixed_pitch: bool,
    pub family: FontFamily,
    pub face_name: String,
    pub glyphs: Vec<GlyphEntry>,
    bitmap_data: Vec<u8>,
}

impl FontData {
    pub fn character_count(&self) -> usize {
        self.last_char as usize - self.first_char as usize + 1
    }

    /// Column-major bitmap bytes for character `c`, sliced from the
    /// adjacent glyph's offset (or `width_bytes * pixel_height` for the
    /// last real glyph, using the trailing sentinel entry).
    pub fn bitmap_for(&self, c: u8) -> &[u8] {
        if c < self.first_char || c > self.last_char {
            return &[];
        }
        let idx = (c - self.first_char) as usize;
        let Some(entry) = self.glyphs.get(idx) else { return &[] };
        let Some(next) = self.glyphs.get(idx + 1) else { return &[] };
        let start = entry.bitmap_offset as usize;
        let end = next.bitmap_offset as usize;
        if start >= end || end > self.bitmap_data.len() + start.min(self.bitmap_data.len()) {
            return &[];
        }
        let base = self.glyphs.first().map(|g| g.bitmap_offset).unwrap_or(0) as usize;
        self.bitmap_data.get(start.saturating_sub(base)..end.saturating_sub(base)).unwrap_or(&[])
    }
}

fn read_cstr_ascii(data: &[u8], offset: usize) -> String {
    let tail = &data[offset.min(data.len())..];
    let nul = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    String::from_utf8_lossy(&tail[..nul]).into_owned()
}

/// Parses an RT_FONT resource (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<FontData> {
    let version: u16 = data.pread_with(0, scroll::LE)?;
    let size: u32 = data.pread_with(2, scroll::LE)?;
    let font_type: u16 = data.pread_with(66, scroll::LE)?;
    let points: u16 = data.pread_with(68, scroll::LE)?;
    let vertical_res: u16 = data.pread_with(70, scroll::LE)?;
    let horizontal_res: u16 = data.pread_with(72, scroll::LE)?;
    let ascent: u16 = data.pread_with(74, scroll::LE)?;
    let internal_leading: u16 = data.pread_with(76, scroll::LE)?;
    let external_leading: u16 = data.pread_with(78, scroll::LE)?;
    let italic: u8 = data.pread_with(80, scroll::LE)?;
    let underline: u8 = data.pread_with(81, scroll::LE)?;
    let strikeout: u8 = data.pread_with(82, scroll::LE)?;
    let weight: u16 = data.pread_with(83, scroll::LE)?;
    let charset: u8 = data.pread_with(85, scroll::LE)?;
    let pixel_width: u16 = data.pread_with(86, scroll::LE)?;
    let pixel_height: u16 = data.pread_with(88, scroll::LE)?;
    let pitch_and_family: u8 = data.pread_with(90, scroll::LE)?;
    let avg_width: u16 = data.pread_with(91, scroll::LE)?;
    let max_width: u16 = data.pread_with(93, scroll::LE)?;
    let first_char: u8 = data.pread_with(95, scroll::LE)?;
    let last_char: u8 = data.pread_with(96, scroll::LE)?;
    let default_char: u8 = data.pread_with(97, scroll::LE)?;
    let break_char: u8 = data.pread_with(98, scroll::LE)?;
    let width_bytes: u16 = data.pread_with(99, scroll::LE)?;
    let face_offset: u32 = data.pread_with(105, scroll::LE)?;
    let bits_offset: u32 = data.pread_with(113, scroll::LE)?;

    let header_len = if version >= FONT_VERSION_3X { 118usize } else { 117 };
    let is_vector = font_type & 0x0001 != 0;

    let glyph_count = (last_char as usize - first_char as usize) + 2;
    let mut glyphs = Vec::with_capacity(glyph_count);
    let mut offset = header_len;
    for _ in 0..glyph_count {
        let width: u16 = data.pread_with(offset, scroll::LE)?;
        let bitmap_offset = if version >= FONT_VERSION_3X {
            let v: u32 = data.pread_with(offset + 2, scroll::LE)?;
            offset += 6;
            v
        } else {
            let v: u16 = data.pread_with(offset + 2, scroll::LE)?;
            offset += 4;
            v as u32
        };
        glyphs.push(GlyphEntry { width, bitmap_offset });
    }

    let bitmap_data = data.get(bits_offset as usize..).unwrap_or(&[]).to_vec();
    let face_name = read_cstr_ascii(data, face_offset as usize);

    Ok(FontData {
        version,
        size,
        is_vector,
        points,
        vertical_res,
        horizontal_res,
        ascent,
        internal_leading,
        external_leading,
        italic: italic != 0,
        underline: underline != 0,
        strikeout: strikeout != 0,
        weight,
        charset,
        pixel_width,
        pixel_height,
        avg_width,
        max_width,
        width_bytes,
        first_char,
        last_char,
        default_char,
        break_char,
        is_fixed_pitch: pitch_and_family & 0x01 == 0,
        family: FontFamily::from_pitch_and_family(pitch_and_family),
        face_name,
        glyphs,
        bitmap_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn minimal_2x_header_decodes_metrics_and_face_name() {
        let mut data = vec![0u8; 256];
        data.pwrite_with(FONT_VERSION_2X, 0, scroll::LE).unwrap();
        data.pwrite_with(9u16, 68, scroll::LE).unwrap(); // points
        data.pwrite_with(48u16, 70, scroll::LE).unwrap(); // vertical_res
        data.pwrite_with(160u16, 72, scroll::LE).unwrap(); // horizontal_res
        data.pwrite_with(7u16, 74, scroll::LE).unwrap(); // ascent
        data.pwrite_with(400u16, 83, scroll::LE).unwrap(); // weight
        data.pwrite_with(16u16, 86, scroll::LE).unwrap(); // pixel_width
        data.pwrite_with(8u16, 88, scroll::LE).unwrap(); // pixel_height
        data.pwrite_with(0x30u8, 90, scroll::LE).unwrap(); // MODERN, fixed pitch
        data.pwrite_with(1u8, 95, scroll::LE).unwrap(); // first_char
        data.pwrite_with(3u8, 96, scroll::LE).unwrap(); // last_char -> 3 real + 1 sentinel = 4 entries
        data.pwrite_with(200u32, 105, scroll::LE).unwrap(); // face offset
        data.pwrite_with(117u32 + 4 * 4, 113, scroll::LE).unwrap(); // bits offset

        // glyph table: 4 entries (3 chars + sentinel), 4 bytes each starting at 117
        let bits_base = 117 + 4 * 4;
        for i in 0..4u32 {
            data.pwrite_with(16u16, 117 + i as usize * 4, scroll::LE).unwrap();
            data.pwrite_with((bits_base as u32 + i * 16) as u16, 117 + i as usize * 4 + 2, scroll::LE).unwrap();
        }
        data[200..200 + 8].copy_from_slice(b"Terminal");

        let font = parse(&data).unwrap();
        assert_eq!(font.version, FONT_VERSION_2X);
        assert_eq!(font.points, 9);
        assert_eq!(font.ascent, 7);
        assert_eq!(font.weight, 400);
        assert_eq!(font.pixel_width, 16);
        assert_eq!(font.pixel_height, 8);
        assert_eq!(font.first_char, 1);
        assert_eq!(font.last_char, 3);
        assert_eq!(font.face_name, "Terminal");
        assert_eq!(font.family, FontFamily::Modern);
        assert!(font.is_fixed_pitch);
        assert_eq!(font.character_count(), 3);
    }
}
