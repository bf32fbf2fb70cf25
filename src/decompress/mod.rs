//! DOS packer decompression (component K).
//!
//! Four decoders — PKLITE, LZEXE, EXEPACK, and Knowledge Dynamics LZW —
//! each reconstruct the original MZ header fields and relocation table
//! from state stored after (or inside) the packed payload, alongside a
//! DIET LZ77 detector/decoder. Every decompressor's `decompress()` must
//! extract header fields, decompress the body, decode relocations, and
//! fail loudly on structural errors rather than emit partial garbage
//! (spec.md §4.K).

pub mod diet;
pub mod exepack;
pub mod kdlzw;
pub mod lzexe;
pub mod pklite;

use alloc::vec::Vec;

use crate::error::{self, Error};
use crate::mz::{Mz, PackerKind};

/// Original MZ header fields plus decompressed code and relocations
/// (spec.md §3, "Decompression result").
#[derive(Debug, Clone, Default)]
pub struct DecompressionResult {
    pub code: Vec<u8>,
    pub initial_cs: u16,
    pub initial_ip: u16,
    pub initial_ss: u16,
    pub initial_sp: u16,
    pub min_extra_paragraphs: u16,
    pub max_extra_paragraphs: u16,
    pub header_paragraphs: u16,
    pub checksum: u16,
    /// (segment, offset) pairs, in on-disk order.
    pub relocations: Vec<(u16, u16)>,
}

impl DecompressionResult {
    /// Rebuilds the conventional 28-byte MZ header plus relocation table
    /// plus decompressed code into a single runnable image (spec.md §6,
    /// "File formats produced").
    pub fn build_mz(&self) -> Vec<u8> {
        let reloc_count = self.relocations.len() as u16;
        // Two paragraphs for the fixed header fields plus the relocation
        // table, rounded up to a full paragraph, matches how real
        // unpacker tools lay the header out.
        let reloc_bytes = self.relocations.len() * 4;
        let header_paragraphs = ((0x1c + reloc_bytes + 15) / 16).max(self.header_paragraphs as usize) as u16;
        let header_bytes = header_paragraphs as usize * 16;
        let total_len = header_bytes + self.code.len();
        let num_pages = ((total_len + 511) / 512) as u16;
        let bytes_in_last_page = (total_len % 512) as u16;

        let mut out = vec![0u8; header_bytes];
        out[0] = b'M';
        out[1] = b'Z';
        out[2..4].copy_from_slice(&bytes_in_last_page.to_le_bytes());
        out[4..6].copy_from_slice(&num_pages.to_le_bytes());
        out[6..8].copy_from_slice(&reloc_count.to_le_bytes());
        out[8..10].copy_from_slice(&header_paragraphs.to_le_bytes());
        out[10..12].copy_from_slice(&0u16.to_le_bytes()); // min_extra_paragraphs placeholder below
        out[0x0a..0x0c].copy_from_slice(&self.min_extra_paragraphs.to_le_bytes());
        out[0x0c..0x0e].copy_from_slice(&self.max_extra_paragraphs.to_le_bytes());
        out[0x0e..0x10].copy_from_slice(&self.initial_ss.to_le_bytes());
        out[0x10..0x12].copy_from_slice(&self.initial_sp.to_le_bytes());
        out[0x12..0x14].copy_from_slice(&self.checksum.to_le_bytes());
        out[0x14..0x16].copy_from_slice(&self.initial_ip.to_le_bytes());
        out[0x16..0x18].copy_from_slice(&self.initial_cs.to_le_bytes());
        out[0x18..0x1a].copy_from_slice(&0x1cu16.to_le_bytes()); // e_lfarlc
        out[0x1a..0x1c].copy_from_slice(&0u16.to_le_bytes()); // e_ovno

        let mut pos = 0x1c;
        for &(segment, offset) in &self.relocations {
            out[pos..pos + 2].copy_from_slice(&offset.to_le_bytes());
            out[pos + 2..pos + 4].copy_from_slice(&segment.to_le_bytes());
            pos += 4;
        }

        out.extend_from_slice(&self.code);
        out
    }
}

/// Dispatches to the matching decompressor based on [`Mz::detect_packer`].
/// Returns [`Error::Unsupported`] when nothing matches — decompressing an
/// already-decompressed MZ is exactly this case (spec.md §8, "Decompressing
/// an already-decompressed MZ changes nothing").
pub fn decompress(mz: &Mz<'_>) -> error::Result<DecompressionResult> {
    match mz.detect_packer() {
        Some(PackerKind::Pklite) => pklite::decompress(mz.as_bytes()),
        Some(PackerKind::Lzexe) => lzexe::decompress(mz.as_bytes()),
        Some(PackerKind::Exepack) => exepack::decompress(mz.as_bytes()),
        Some(PackerKind::KnowledgeDynamicsLzw) => kdlzw::decompress(mz.as_bytes()),
        Some(PackerKind::Diet) => diet::decompress(mz.as_bytes()),
        None => Err(Error::Unsupported("no known packer signature detected".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_mz_roundtrips_header_fields() {
        let result = DecompressionResult {
            code: vec![0x90; 16],
            initial_cs: 0x10,
            initial_ip: 0x20,
            initial_ss: 0x30,
            initial_sp: 0x40,
            min_extra_paragraphs: 1,
            max_extra_paragraphs: 2,
            header_paragraphs: 2,
            checksum: 0,
            relocations: vec![(0, 0x10), (0, 0x20)],
        };
        let image = result.build_mz();
        let mz = crate::mz::Mz::parse(&image).unwrap();
        assert_eq!(mz.header.e_cs, 0x10);
        assert_eq!(mz.header.e_ip, 0x20);
        assert_eq!(mz.header.e_ss, 0x30);
        assert_eq!(mz.header.e_sp, 0x40);
        assert_eq!(mz.code_section(), &[0x90; 16][..]);
    }
}
