//! Dialog template (RT_DIALOG) decoder (component J, spec.md §4.J).
//!
//! Standard `DLGTEMPLATE`: a fixed header (style/x/y/width/height) then
//! menu, class, and caption `name_or_ord16` fields, an optional font
//! block when `DS_SETFONT` is set, then `num_controls` `DLGITEMTEMPLATE`
//! records. Every variable-length field is DWORD-aligned from the
//! following one (offset-driven, not length-driven, per spec.md §9).

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

pub const DS_SETFONT: u32 = 0x0040;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameOrId {
    Id(u16),
    Name(String),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlClass {
    Predefined(u8),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct DialogControl {
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
    pub id: u16,
    pub style: u32,
    pub class: ControlClass,
    pub text: NameOrId,
    pub extra_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct DialogTemplate {
    pub style: u32,
    pub x: i16,
    pub y: i16,
    pub width: i16,
    pub height: i16,
    pub menu: NameOrId,
    pub class: NameOrId,
    pub caption: String,
    pub point_size: Option<u16>,
    pub face_name: Option<String>,
    pub controls: Vec<DialogControl>,
}

fn align_dword(offset: usize) -> usize {
    (offset + 3) & !3
}

fn read_cstr(data: &[u8], mut offset: usize) -> error::Result<(String, usize)> {
    let mut units = Vec::new();
    loop {
        let unit: u16 = data.pread_with(offset, scroll::LE)?;
        offset += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    Ok((String::from_utf16_lossy(&units), offset))
}

/// A `name_or_ord16` field: `0x0000` ⇒ none, `0xFFFF` + `u16` ⇒ ordinal,
/// otherwise a NUL-terminated UTF-16 string.
fn read_name_or_id(data: &[u8], offset: usize) -> error::Result<(NameOrId, usize)> {
    let marker: u16 = data.pread_with(offset, scroll::LE)?;
    match marker {
        0x0000 => Ok((NameOrId::None, offset + 2)),
        0xffff => {
            let id: u16 = data.pread_with(offset + 2, scroll::LE)?;
            Ok((NameOrId::Id(id), offset + 4))
        }
        _ => {
            let (s, after) = read_cstr(data, offset)?;
            Ok((NameOrId::Name(s), after))
        }
    }
}

fn read_control_class(data: &[u8], offset: usize) -> error::Result<(ControlClass, usize)> {
    let marker: u16 = data.pread_with(offset, scroll::LE)?;
    if marker == 0xffff {
        let ord: u16 = data.pread_with(offset + 2, scroll::LE)?;
        Ok((ControlClass::Predefined((ord & 0xff) as u8), offset + 4))
    } else {
        let (s, after) = read_cstr(data, offset)?;
        Ok((ControlClass::Name(s), after))
    }
}

/// Parses an RT_DIALOG resource (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<DialogTemplate> {
    let style: u32 = data.pread_with(0, scroll::LE)?;
    let _dlg_item_count: u16 = data.pread_with(4, scroll::LE)?;
    let x: i16 = data.pread_with(6, scroll::LE)?;
    let y: i16 = data.pread_with(8, scroll::LE)?;
    let width: i16 = data.pread_with(10, scroll::LE)?;
    let height: i16 = data.pread_with(12, scroll::LE)?;

    let mut offset = 14usize;
    let (menu, after_menu) = read_name_or_id(data, offset)?;
    offset = after_menu;
    let (class, after_class) = read_name_or_id(data, offset)?;
    offset = after_class;
    let (caption, after_caption) = read_cstr(data, offset)?;
    offset = after_caption;

    let (point_size, face_name) = if style & DS_SETFONT != 0 {
        let point_size: u16 = data.pread_with(offset, scroll::LE)?;
        offset += 2;
        let (face, after_face) = read_cstr(data, offset)?;
        offset = after_face;
        (Some(point_size), Some(face))
    } else {
        (None, None)
    };

    offset = align_dword(offset);
    let header_count: u16 = data.pread_with(4, scroll::LE)?;
    let mut controls = Vec::with_capacity(header_count as usize);
    for _ in 0..header_count {
        offset = align_dword(offset);
        if offset + 18 > data.len() {
            break;
        }
        let cx: i16 = data.pread_with(offset, scroll::LE)?;
        let cy: i16 = data.pread_with(offset + 2, scroll::LE)?;
        let cw: i16 = data.pread_with(offset + 4, scroll::LE)?;
        let ch: i16 = data.pread_with(offset + 6, scroll::LE)?;
        let cid: u16 = data.pread_with(offset + 8, scroll::LE)?;
        let cstyle: u32 = data.pread_with(offset + 10, scroll::LE)?;
        offset += 14;

        let (class, after_class) = read_control_class(data, offset)?;
        offset = after_class;
        let (text, after_text) = read_name_or_id(data, offset)?;
        offset = after_text;

        let extra_len: u16 = data.pread_with(offset, scroll::LE)?;
        offset += 2;
        let extra_data = data.get(offset..offset + extra_len as usize).unwrap_or(&[]).to_vec();
        offset += extra_len as usize;

        controls.push(DialogControl { x: cx, y: cy, width: cw, height: ch, id: cid, style: cstyle, class, text, extra_data });
    }

    Ok(DialogTemplate { style, x, y, width, height, menu, class, caption, point_size, face_name, controls })
}

#[cfg(test)]
mod tests {
    use super::*;
    use scroll::Pwrite;

    #[test]
    fn minimal_template_no_font_no_controls() {
        let mut data = vec![0u8; 32];
        data.pwrite_with(0u32, 0, scroll::LE).unwrap(); // style, DS_SETFONT unset
        data.pwrite_with(0u16, 4, scroll::LE).unwrap(); // num controls
        data.pwrite_with(10i16, 6, scroll::LE).unwrap();
        data.pwrite_with(20i16, 8, scroll::LE).unwrap();
        data.pwrite_with(100i16, 10, scroll::LE).unwrap();
        data.pwrite_with(80i16, 12, scroll::LE).unwrap();
        // menu: none
        data.pwrite_with(0u16, 14, scroll::LE).unwrap();
        // class: none
        data.pwrite_with(0u16, 16, scroll::LE).unwrap();
        // caption: empty
        data.pwrite_with(0u16, 18, scroll::LE).unwrap();

        let dlg = parse(&data).unwrap();
        assert_eq!(dlg.x, 10);
        assert_eq!(dlg.width, 100);
        assert_eq!(dlg.menu, NameOrId::None);
        assert!(dlg.point_size.is_none());
        assert!(dlg.controls.is_empty());
    }
}
