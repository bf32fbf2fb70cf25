//! Security (attribute certificate) directory decoder (component H,
//! spec.md §4.H "Security").
//!
//! This directory's "RVA" is actually a file offset, not an RVA — it
//! is read straight from the data directory without RVA resolution.

use alloc::vec::Vec;
use scroll::Pread;

use crate::diagnostics::{Category, DiagnosticCollector, Severity};
use crate::error;
use crate::pe::options::ParseOptions;

pub const SIZEOF_WIN_CERTIFICATE_HEADER: usize = 8;
pub const WIN_CERT_TYPE_X509: u16 = 0x0001;
pub const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;
pub const WIN_CERT_TYPE_RESERVED_1: u16 = 0x0003;
pub const WIN_CERT_TYPE_TS_STACK_SIGNED: u16 = 0x0004;
/// Safety cap matching the original implementation's bound on
/// attribute certificates per directory.
const MAX_CERTIFICATES: usize = 10;
/// DER encoding of the PKCS#7 `signedData` content-type OID
/// (1.2.840.113549.1.7.2), tag included.
const PKCS7_SIGNED_DATA_OID: [u8; 11] = [0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x07, 0x02];
const ASN1_SEQUENCE_TAG: u8 = 0x30;

#[derive(Debug, Clone)]
pub struct AttributeCertificate<'a> {
    pub length: u32,
    pub revision: u16,
    pub certificate_type: u16,
    pub data: &'a [u8],
}

impl<'a> AttributeCertificate<'a> {
    /// Recognizes the DER `SEQUENCE` tag together with the PKCS#7
    /// SignedData OID near the start of the blob; this is not a full
    /// ASN.1 parse, just enough to identify the content type
    /// (spec.md §4.H / SPEC_FULL.md §4: no verification, no deeper
    /// SignedData walk).
    pub fn is_pkcs7_signed_data(&self) -> bool {
        self.certificate_type == WIN_CERT_TYPE_PKCS_SIGNED_DATA
            && self.data.first() == Some(&ASN1_SEQUENCE_TAG)
            && self
                .data
                .windows(PKCS7_SIGNED_DATA_OID.len())
                .any(|w| w == PKCS7_SIGNED_DATA_OID)
    }
}

fn align8(offset: usize) -> usize {
    (offset + 7) & !7
}

/// Walks the `WIN_CERTIFICATE` array at file offset `directory_offset`
/// (the "security RVA" field is a raw file offset per spec.md §4.H);
/// each entry is `{length, revision, type, data[length-8]}`, padded to
/// the next 8-byte boundary.
pub fn parse<'a>(
    bytes: &'a [u8],
    directory_offset: u32,
    directory_size: u32,
    opts: &ParseOptions,
    diags: &mut DiagnosticCollector,
) -> error::Result<Vec<AttributeCertificate<'a>>> {
    if directory_offset == 0 || directory_size == 0 {
        return Ok(Vec::new());
    }
    if !opts.parse_attribute_certificates {
        return Ok(Vec::new());
    }

    let start = directory_offset as usize;
    let end = start.saturating_add(directory_size as usize);
    if end > bytes.len() {
        diags.record(Severity::Error, Category::Security, "SEC_TRUNCATED", "attribute certificate table exceeds the end of the file");
        return Ok(Vec::new());
    }

    let mut certificates = Vec::new();
    let mut offset = start;
    while offset + SIZEOF_WIN_CERTIFICATE_HEADER <= end && certificates.len() < MAX_CERTIFICATES {
        let length: u32 = bytes.pread_with(offset, scroll::LE)?;
        let revision: u16 = bytes.pread_with(offset + 4, scroll::LE)?;
        let certificate_type: u16 = bytes.pread_with(offset + 6, scroll::LE)?;
        let length = length as usize;
        if length < SIZEOF_WIN_CERTIFICATE_HEADER || offset + length > end {
            diags.record(Severity::Anomaly, Category::Security, "SEC_BAD_ENTRY_LENGTH", "attribute certificate entry length is inconsistent with the directory bounds");
            break;
        }
        let data = &bytes[offset + SIZEOF_WIN_CERTIFICATE_HEADER..offset + length];
        certificates.push(AttributeCertificate { length: length as u32, revision, certificate_type, data });
        offset = align8(offset + length);
    }
    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_directory_yields_no_certificates() {
        let bytes = vec![0u8; 0x100];
        let mut diags = DiagnosticCollector::new();
        let certs = parse(&bytes, 0, 0, &ParseOptions::default(), &mut diags).unwrap();
        assert!(certs.is_empty());
    }

    #[test]
    fn single_pkcs7_certificate_decodes_and_aligns() {
        let mut bytes = vec![0u8; 0x100];
        // length=20 (8 header + 1 tag byte + 11 OID bytes), type=PKCS_SIGNED_DATA
        bytes[0..4].copy_from_slice(&20u32.to_le_bytes());
        bytes[4..6].copy_from_slice(&0x0200u16.to_le_bytes());
        bytes[6..8].copy_from_slice(&WIN_CERT_TYPE_PKCS_SIGNED_DATA.to_le_bytes());
        bytes[8..9].copy_from_slice(&[ASN1_SEQUENCE_TAG]);
        bytes[9..20].copy_from_slice(&PKCS7_SIGNED_DATA_OID);

        let mut diags = DiagnosticCollector::new();
        let certs = parse(&bytes, 0, 24, &ParseOptions::default(), &mut diags).unwrap();
        assert_eq!(certs.len(), 1);
        assert!(certs[0].is_pkcs7_signed_data());
    }
}
