//! PE32 and PE32+ parser and data-directory decoders (components F, H).

use alloc::vec::Vec;
use log::debug;

use crate::diagnostics::DiagnosticCollector;
use crate::entropy::Overlay;
use crate::error;
use crate::mz::MzHeader;

pub mod header;
pub mod section_table;
pub mod options;

pub mod import;
pub mod export;
pub mod reloc;
pub mod tls;
pub mod debug;
pub mod load_config;
pub mod exception;
pub mod delay_import;
pub mod bound_import;
pub mod security;
pub mod clr;

pub mod resource;

use header::{CoffHeader, OptionalHeader, SIZEOF_COFF_HEADER, SIZEOF_PE_MAGIC};
use options::ParseOptions;
use section_table::SectionTable;

/// An analyzed PE32/PE32+ binary: the header, sections, every decoded
/// data directory, and the diagnostics accumulated along the way
/// (spec.md §4.F, §4.H).
#[derive(Debug)]
pub struct PE<'a> {
    pub dos_header: MzHeader,
    pub coff_header: CoffHeader,
    pub optional_header: Option<OptionalHeader>,
    pub sections: Vec<SectionTable>,
    pub is_64: bool,
    pub is_lib: bool,
    pub entry: u64,
    pub image_base: u64,

    pub imports: Vec<import::ImportModule>,
    pub export_data: Option<export::ExportData>,
    pub relocations: Vec<reloc::Relocation>,
    pub tls_data: Option<(tls::TlsDirectory, Vec<u64>)>,
    pub debug_data: debug::DebugData,
    pub load_config: Option<load_config::LoadConfigData<'a>>,
    pub exception_functions: Vec<exception::RuntimeFunction>,
    pub delay_imports: Vec<delay_import::DelayImportModule>,
    pub bound_imports: Vec<bound_import::BoundImportModule>,
    pub certificates: Vec<security::AttributeCertificate<'a>>,
    pub clr_header: Option<clr::Cor20Header>,
    pub resources: Vec<resource::ResourceLeaf<'a>>,

    pub overlay: Option<Overlay<'a>>,
    pub diagnostics: DiagnosticCollector,
}

impl<'a> PE<'a> {
    pub fn parse(bytes: &'a [u8]) -> error::Result<Self> {
        Self::parse_with_opts(bytes, &ParseOptions::default())
    }

    pub fn parse_with_opts(bytes: &'a [u8], opts: &ParseOptions) -> error::Result<Self> {
        let dos_header = MzHeader::parse(bytes)?;
        let pe_header_offset = dos_header.e_lfanew as usize;
        let signature: u32 = {
            use scroll::Pread;
            bytes.pread_with(pe_header_offset, scroll::LE)?
        };
        if signature != header::PE_MAGIC {
            return Err(error::Error::InvalidSignature(alloc::format!("bad PE signature {signature:#010x}")));
        }
        let coff_header = CoffHeader::parse(bytes, pe_header_offset + SIZEOF_PE_MAGIC)?;
        debug!("{:#?}", coff_header);

        let optional_header_offset = pe_header_offset + SIZEOF_PE_MAGIC + SIZEOF_COFF_HEADER;
        let optional_header = if coff_header.size_of_optional_header > 0 {
            Some(OptionalHeader::parse(bytes, optional_header_offset)?.0)
        } else {
            None
        };

        let sections_offset = optional_header_offset + coff_header.size_of_optional_header as usize;
        let sections = header::parse_sections(bytes, sections_offset, coff_header.number_of_sections as usize)?;

        let is_lib = header::is_dll(coff_header.characteristics);
        let mut diagnostics = DiagnosticCollector::new();

        let mut is_64 = false;
        let mut entry = 0u64;
        let mut image_base = 0u64;
        let mut imports = Vec::new();
        let mut export_data = None;
        let mut relocations = Vec::new();
        let mut tls_data = None;
        let mut debug_data = debug::DebugData::default();
        let mut load_config = None;
        let mut exception_functions = Vec::new();
        let mut delay_imports = Vec::new();
        let mut bound_imports = Vec::new();
        let mut certificates = Vec::new();
        let mut clr_header = None;
        let mut resources = Vec::new();
        let mut end_of_image = sections_offset + sections.len() * section_table::SIZEOF_SECTION_TABLE;

        if let Some(opt) = &optional_header {
            is_64 = opt.is_64();
            entry = opt.standard_fields.address_of_entry_point;
            image_base = opt.windows_fields.image_base;
            let file_alignment = opt.windows_fields.file_alignment;
            let dirs = &opt.data_directories;

            if let Some(dd) = dirs.import_table() {
                imports = import::parse(bytes, &sections, file_alignment, is_64, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.export_table() {
                export_data = export::parse(bytes, &sections, file_alignment, dd.virtual_address, dd.size, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.base_relocation_table() {
                relocations = reloc::parse(bytes, &sections, file_alignment, dd.virtual_address, dd.size, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.tls_table() {
                tls_data = tls::parse(bytes, &sections, file_alignment, image_base, is_64, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.debug_table() {
                debug_data = debug::parse(bytes, &sections, file_alignment, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.load_config_table() {
                load_config = load_config::LoadConfigData::parse(bytes, &sections, file_alignment, is_64, dd.virtual_address, dd.size, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.exception_table() {
                exception_functions = exception::parse(bytes, &sections, file_alignment, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.delay_import_table() {
                delay_imports = delay_import::parse(bytes, &sections, file_alignment, image_base, is_64, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.bound_import_table() {
                bound_imports = bound_import::parse(bytes, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.security_table() {
                // The security directory's "RVA" is a raw file offset (spec.md §4.H).
                certificates = security::parse(bytes, dd.virtual_address, dd.size, opts, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.clr_runtime_header() {
                clr_header = clr::parse(bytes, &sections, file_alignment, dd.virtual_address, dd.size, &mut diagnostics)?;
            }
            if let Some(dd) = dirs.resource_table() {
                resources = resource::parse(bytes, &sections, file_alignment, dd, opts, &mut diagnostics)?;
            }

            for section in &sections {
                let section_end = section.pointer_to_raw_data as usize + section.size_of_raw_data as usize;
                end_of_image = end_of_image.max(section_end);
            }
        }

        let overlay = Overlay::detect(bytes, end_of_image);

        Ok(PE {
            dos_header,
            coff_header,
            optional_header,
            sections,
            is_64,
            is_lib,
            entry,
            image_base,
            imports,
            export_data,
            relocations,
            tls_data,
            debug_data,
            load_config,
            exception_functions,
            delay_imports,
            bound_imports,
            certificates,
            clr_header,
            resources,
            overlay,
            diagnostics,
        })
    }
}
