//! Bitmap (RT_BITMAP) decoder (component J, spec.md §4.J).
//!
//! RT_BITMAP resources store a `BITMAPINFOHEADER` followed directly by
//! the palette and pixel data — no `BITMAPFILEHEADER` prefix.

use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, scroll::Pread)]
pub struct BitmapInfo {
    pub header_size: u32,
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

impl BitmapInfo {
    pub fn palette_colors(&self) -> u32 {
        if self.clr_used > 0 {
            self.clr_used
        } else if self.bit_count <= 8 {
            1u32 << self.bit_count
        } else {
            0
        }
    }

    pub fn is_top_down(&self) -> bool {
        self.height < 0
    }

    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }
}

#[derive(Debug, Clone)]
pub struct BitmapData {
    pub info: BitmapInfo,
    pub palette: Vec<u8>,
    pub pixel_data: Vec<u8>,
}

/// Parses an RT_BITMAP resource: `BITMAPINFOHEADER` + palette + pixels,
/// with no `BITMAPFILEHEADER` prefix (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<BitmapData> {
    let info: BitmapInfo = data.pread_with(0, scroll::LE)?;
    let palette_len = info.palette_colors() as usize * 4;
    let palette_start = 40usize;
    let palette_end = palette_start + palette_len;
    let palette = data.get(palette_start..palette_end).ok_or(error::Error::OutOfBounds { offset: palette_start, len: palette_len })?.to_vec();
    let pixel_data = data.get(palette_end..).unwrap_or(&[]).to_vec();
    Ok(BitmapData { info, palette, pixel_data })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn palette_size_follows_clr_used_fallback() {
        let info = BitmapInfo { header_size: 40, width: 8, height: -8, planes: 1, bit_count: 4, compression: 0, size_image: 0, x_pels_per_meter: 0, y_pels_per_meter: 0, clr_used: 0, clr_important: 0 };
        assert_eq!(info.palette_colors(), 16);
        assert!(info.is_top_down());
        assert_eq!(info.abs_height(), 8);
    }

    #[test]
    fn palette_and_pixels_split_at_header_plus_palette() {
        let mut data = vec![0u8; 40 + 4 * 2 + 10];
        let info = BitmapInfo { header_size: 40, width: 4, height: 4, planes: 1, bit_count: 1, compression: 0, size_image: 0, x_pels_per_meter: 0, y_pels_per_meter: 0, clr_used: 2, clr_important: 0 };
        data.pwrite_with(info, 0, scroll::LE).unwrap();
        let decoded = parse(&data).unwrap();
        assert_eq!(decoded.palette.len(), 8);
        assert_eq!(decoded.pixel_data.len(), 10);
    }
}
