//! Icon/cursor group (`GRPICONDIR`/`GRPCURSORDIR`) and icon image (RT_ICON)
//! decoders (component J, spec.md §4.J), plus the `.ico`/`.cur` re-wrap
//! helper named directly by the supplemented feature list.

use alloc::vec::Vec;
use scroll::{Pread, Pwrite};

use crate::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconDirectoryEntry {
    pub width: u8,
    pub height: u8,
    pub color_count: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub size_in_bytes: u32,
    pub resource_id: u16,
}

impl IconDirectoryEntry {
    pub fn actual_width(&self) -> u16 {
        if self.width == 0 { 256 } else { self.width as u16 }
    }

    pub fn actual_height(&self) -> u16 {
        if self.height == 0 { 256 } else { self.height as u16 }
    }
}

#[derive(Debug, Clone)]
pub struct IconGroup {
    pub is_cursor: bool,
    pub entries: Vec<IconDirectoryEntry>,
}

/// Parses a `GRP{ICON,CURSOR}DIR`: 6-byte header (reserved, type, count)
/// followed by `count` 14-byte entries (spec.md §4.J).
pub fn parse_group(data: &[u8]) -> error::Result<IconGroup> {
    let resource_type: u16 = data.pread_with(2, scroll::LE)?;
    let count: u16 = data.pread_with(4, scroll::LE)?;
    let mut entries = Vec::with_capacity(count as usize);
    let mut offset = 6usize;
    for _ in 0..count {
        let width: u8 = data.pread_with(offset, scroll::LE)?;
        let height: u8 = data.pread_with(offset + 1, scroll::LE)?;
        let color_count: u8 = data.pread_with(offset + 2, scroll::LE)?;
        let planes: u16 = data.pread_with(offset + 4, scroll::LE)?;
        let bit_count: u16 = data.pread_with(offset + 6, scroll::LE)?;
        let size_in_bytes: u32 = data.pread_with(offset + 8, scroll::LE)?;
        let resource_id: u16 = data.pread_with(offset + 12, scroll::LE)?;
        entries.push(IconDirectoryEntry { width, height, color_count, planes, bit_count, size_in_bytes, resource_id });
        offset += 14;
    }
    Ok(IconGroup { is_cursor: resource_type == 1, entries })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, scroll::Pread)]
pub struct DibHeader {
    pub size: u32,
    pub width: i32,
    pub height: i32,
    pub planes: u16,
    pub bit_count: u16,
    pub compression: u32,
    pub size_image: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub clr_used: u32,
    pub clr_important: u32,
}

impl DibHeader {
    /// Icon height is doubled to stack the XOR and AND masks; this
    /// returns the height of a single mask.
    pub fn xor_height(&self) -> u32 {
        (self.height / 2) as u32
    }

    pub fn color_table_colors(&self) -> u32 {
        if self.bit_count > 8 {
            return 0;
        }
        if self.clr_used != 0 { self.clr_used } else { 1u32 << self.bit_count }
    }
}

#[derive(Debug, Clone)]
pub struct IconImage {
    pub header: DibHeader,
    pub color_table: Vec<u8>,
    pub xor_mask: Vec<u8>,
    pub and_mask: Vec<u8>,
}

fn row_size(width: u32, bpp: u32) -> usize {
    (((width * bpp + 31) / 32) * 4) as usize
}

/// Parses an RT_ICON resource: `BITMAPINFOHEADER` + optional palette +
/// XOR bitmap + AND (mask) bitmap (spec.md §4.J).
pub fn parse_image(data: &[u8]) -> error::Result<IconImage> {
    let header: DibHeader = data.pread_with(0, scroll::LE)?;
    let width = header.width.unsigned_abs();
    let xor_height = header.xor_height();

    let color_table_len = header.color_table_colors() as usize * 4;
    let color_table_start = 40usize;
    let color_table_end = color_table_start + color_table_len;
    let color_table = data.get(color_table_start..color_table_end).ok_or(error::Error::OutOfBounds { offset: color_table_start, len: color_table_len })?.to_vec();

    let xor_row = row_size(width, header.bit_count as u32);
    let and_row = row_size(width, 1);
    let xor_len = xor_row * xor_height as usize;
    let and_len = and_row * xor_height as usize;

    let xor_start = color_table_end;
    let xor_end = xor_start + xor_len;
    let xor_mask = data.get(xor_start..xor_end).ok_or(error::Error::OutOfBounds { offset: xor_start, len: xor_len })?.to_vec();

    let and_start = xor_end;
    let and_end = and_start + and_len;
    let and_mask = data.get(and_start..and_end).ok_or(error::Error::OutOfBounds { offset: and_start, len: and_len })?.to_vec();

    Ok(IconImage { header, color_table, xor_mask, and_mask })
}

const SIZEOF_ICONDIR: usize = 6;
const SIZEOF_ICONDIRENTRY: usize = 16;
const SIZEOF_BITMAPFILEHEADER: usize = 14;

/// Re-wraps a single decoded icon image as a standalone `.ICO`/`.CUR`
/// file: `ICONDIR` + one `ICONDIRENTRY` + the DIB data (header, color
/// table, XOR mask, AND mask) with its `BITMAPFILEHEADER`-prefix offset
/// pointing past the ICONDIR/ICONDIRENTRY pair (spec.md §4 supplemented
/// features: no standalone-file writer elsewhere in this crate).
pub fn to_ico_bytes(image: &IconImage, resource_type: u16) -> error::Result<Vec<u8>> {
    let mut dib = Vec::new();
    dib.pwrite_with(image.header, 0, scroll::LE)?;
    dib.extend_from_slice(&image.color_table);
    dib.extend_from_slice(&image.xor_mask);
    dib.extend_from_slice(&image.and_mask);

    let data_offset = (SIZEOF_ICONDIR + SIZEOF_ICONDIRENTRY) as u32;
    let width = if image.header.width == 0 || image.header.width > 255 { 0u8 } else { image.header.width as u8 };
    let height = {
        let h = image.header.xor_height();
        if h == 0 || h > 255 { 0u8 } else { h as u8 }
    };

    let mut out = Vec::with_capacity(SIZEOF_ICONDIR + SIZEOF_ICONDIRENTRY + dib.len());
    out.pwrite_with(0u16, 0, scroll::LE)?; // reserved
    out.pwrite_with(resource_type, 2, scroll::LE)?;
    out.pwrite_with(1u16, 4, scroll::LE)?; // count

    let entry_offset = SIZEOF_ICONDIR;
    out.pwrite_with(width, entry_offset, scroll::LE)?;
    out.pwrite_with(height, entry_offset + 1, scroll::LE)?;
    out.pwrite_with(0u8, entry_offset + 2, scroll::LE)?; // color_count
    out.pwrite_with(0u8, entry_offset + 3, scroll::LE)?; // reserved
    out.pwrite_with(1u16, entry_offset + 4, scroll::LE)?; // planes
    out.pwrite_with(image.header.bit_count, entry_offset + 6, scroll::LE)?;
    out.pwrite_with(dib.len() as u32, entry_offset + 8, scroll::LE)?;
    out.pwrite_with(data_offset, entry_offset + 12, scroll::LE)?;

    out.extend_from_slice(&dib);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn group_entries_decode_and_handle_zero_as_256() {
        let mut data = vec![0u8; 6 + 14];
        data.pwrite_with(2u16, 2, scroll::LE).unwrap(); // type = icon
        data.pwrite_with(1u16, 4, scroll::LE).unwrap(); // count
        data.pwrite_with(0u8, 6, scroll::LE).unwrap(); // width 0 -> 256
        data.pwrite_with(32u8, 7, scroll::LE).unwrap(); // height
        data.pwrite_with(1u16, 6 + 6, scroll::LE).unwrap(); // planes
        data.pwrite_with(4u16, 6 + 8, scroll::LE).unwrap(); // resource_id
        let group = parse_group(&data).unwrap();
        assert!(!group.is_cursor);
        assert_eq!(group.entries.len(), 1);
        assert_eq!(group.entries[0].actual_width(), 256);
        assert_eq!(group.entries[0].actual_height(), 32);
        assert_eq!(group.entries[0].resource_id, 4);
    }

    #[test]
    fn image_masks_have_expected_lengths() {
        let width = 16u32;
        let xor_height = 16u32;
        let header = DibHeader {
            size: 40, width: width as i32, height: (xor_height * 2) as i32,
            planes: 1, bit_count: 32, compression: 0, size_image: 0,
            x_pels_per_meter: 0, y_pels_per_meter: 0, clr_used: 0, clr_important: 0,
        };
        let xor_row = row_size(width, 32);
        let and_row = row_size(width, 1);
        let mut data = vec![0u8; 40 + xor_row * xor_height as usize + and_row * xor_height as usize];
        data.pwrite_with(header, 0, scroll::LE).unwrap();
        let image = parse_image(&data).unwrap();
        assert_eq!(image.xor_mask.len(), xor_row * xor_height as usize);
        assert_eq!(image.and_mask.len(), and_row * xor_height as usize);

        let ico = to_ico_bytes(&image, 2).unwrap();
        assert_eq!(&ico[0..4], &[0, 0, 2, 0]);
    }
}
