//! Menu (RT_MENU) decoder (component J, spec.md §4.J).
//!
//! `version` u16 + `header_size` u16 (both conventionally zero) followed
//! by a recursive item tree. Each item: `flags: u16`, `[id: u16]` (only
//! when not a popup), then a NUL-terminated name (UTF-16LE here — PE
//! resources are always UTF-16). `POPUP` (0x10) introduces a submenu in
//! place of an id field; `END` (0x80) marks the last sibling at a level.
//! A separator is an item with `flags == 0`, `id == 0`, empty text.

use alloc::string::String;
use alloc::vec::Vec;
use scroll::Pread;

use crate::error;

pub const MF_POPUP: u16 = 0x0010;
pub const MF_END: u16 = 0x0080;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuItem {
    Separator,
    Action { flags: u16, id: u16, text: String },
    Popup { flags: u16, text: String, children: Vec<MenuItem> },
}

fn read_utf16_cstr(data: &[u8], mut offset: usize) -> error::Result<(String, usize)> {
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

fn parse_items(data: &[u8], mut offset: usize) -> error::Result<(Vec<MenuItem>, usize)> {
    let mut items = Vec::new();
    loop {
        let flags: u16 = data.pread_with(offset, scroll::LE)?;
        offset += 2;
        let is_popup = flags & MF_POPUP != 0;
        let is_last = flags & MF_END != 0;

        let id = if is_popup {
            0
        } else {
            let id: u16 = data.pread_with(offset, scroll::LE)?;
            offset += 2;
            id
        };

        let (text, after_text) = read_utf16_cstr(data, offset)?;
        offset = after_text;

        let item = if is_popup {
            let (children, after_children) = parse_items(data, offset)?;
            offset = after_children;
            MenuItem::Popup { flags, text, children }
        } else if flags == 0 && id == 0 && text.is_empty() {
            MenuItem::Separator
        } else {
            MenuItem::Action { flags, id, text }
        };
        items.push(item);

        if is_last {
            break;
        }
    }
    Ok((items, offset))
}

/// Parses an RT_MENU resource: the 4-byte header (ignored) then the
/// recursive item tree (spec.md §4.J).
pub fn parse(data: &[u8]) -> error::Result<Vec<MenuItem>> {
    let (items, _) = parse_items(data, 4)?;
    Ok(items)
}
