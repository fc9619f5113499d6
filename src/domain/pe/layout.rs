//! PE/COFF header layout: the offsets the Authenticode digest and the
//! certificate table code need, plus the section table.

use goblin::pe::header::Header;
use goblin::pe::section_table::SectionTable;

use crate::domain::constants::{
    DATA_DIRECTORY_ENTRY_LEN, IMAGE_DIRECTORY_ENTRY_SECURITY, OPTIONAL_HEADER_CHECKSUM_OFFSET,
    PE32PLUS_DATA_DIRECTORIES_OFFSET, PE32PLUS_MAGIC, PE32_DATA_DIRECTORIES_OFFSET, PE32_MAGIC,
    PE_SIGNATURE_AND_COFF_LEN,
};
use crate::infra::error::{PesignError, PesignResult};

/// A section header entry, reduced to what hashing needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSpan {
    pub name: String,
    pub pointer_to_raw_data: usize,
    pub size_of_raw_data: usize,
}

impl SectionSpan {
    /// Long names (`/NNN`) are resolved through the COFF string table.
    fn from_table(table: &SectionTable) -> PesignResult<Self> {
        Ok(Self {
            name: table.name()?.to_string(),
            pointer_to_raw_data: table.pointer_to_raw_data as usize,
            size_of_raw_data: table.size_of_raw_data as usize,
        })
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.pointer_to_raw_data + self.size_of_raw_data
    }
}

/// Header offsets of a parsed PE image.
#[derive(Debug, Clone)]
pub struct PeLayout {
    pub checksum_offset: usize,
    pub cert_dir_offset: usize,
    pub size_of_headers: usize,
    pub sections: Vec<SectionSpan>,
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> PesignResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| PesignError::PeParsing(format!("truncated image at offset {offset:#x}")))
}

impl PeLayout {
    pub fn parse(data: &[u8]) -> PesignResult<Self> {
        let header = Header::parse(data)?;
        let optional = header
            .optional_header
            .ok_or_else(|| PesignError::PeParsing("image has no optional header".into()))?;

        let magic = optional.standard_fields.magic;
        let pe32plus = match magic {
            PE32PLUS_MAGIC => true,
            PE32_MAGIC => false,
            other => {
                return Err(PesignError::PeParsing(format!(
                    "unsupported optional header magic {other:#x}"
                )))
            }
        };
        if (optional.windows_fields.number_of_rva_and_sizes as usize)
            <= IMAGE_DIRECTORY_ENTRY_SECURITY
        {
            return Err(PesignError::PeParsing(
                "image has no certificate table directory".into(),
            ));
        }

        let pe_offset = header.dos_header.pe_pointer as usize;
        let optional_offset = pe_offset + PE_SIGNATURE_AND_COFF_LEN;
        let data_dirs = optional_offset
            + if pe32plus {
                PE32PLUS_DATA_DIRECTORIES_OFFSET
            } else {
                PE32_DATA_DIRECTORIES_OFFSET
            };
        let cert_dir_offset = data_dirs + IMAGE_DIRECTORY_ENTRY_SECURITY * DATA_DIRECTORY_ENTRY_LEN;
        let checksum_offset = optional_offset + OPTIONAL_HEADER_CHECKSUM_OFFSET;
        let size_of_headers = optional.windows_fields.size_of_headers as usize;

        if size_of_headers > data.len() || cert_dir_offset + DATA_DIRECTORY_ENTRY_LEN > size_of_headers
        {
            return Err(PesignError::PeParsing(format!(
                "SizeOfHeaders {size_of_headers:#x} is inconsistent with the image"
            )));
        }

        let mut section_table =
            optional_offset + usize::from(header.coff_header.size_of_optional_header);
        let sections = header
            .coff_header
            .sections(data, &mut section_table)?
            .iter()
            .map(SectionSpan::from_table)
            .collect::<PesignResult<Vec<_>>>()?;

        log::debug!(
            "PE layout: pe32+={pe32plus} checksum={checksum_offset:#x} certdir={cert_dir_offset:#x} \
             headers={size_of_headers:#x} sections={:?}",
            sections.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        Ok(Self {
            checksum_offset,
            cert_dir_offset,
            size_of_headers,
            sections,
        })
    }

    /// Sections with raw data, ordered by file position.
    #[must_use]
    pub fn sections_by_file_offset(&self) -> Vec<&SectionSpan> {
        let mut sections: Vec<&SectionSpan> = self
            .sections
            .iter()
            .filter(|s| s.size_of_raw_data > 0)
            .collect();
        sections.sort_by_key(|s| s.pointer_to_raw_data);
        sections
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pe::test_support::{
        pe32, with_long_section_name, CERT_DIR_OFFSET, TEXT_OFFSET, TEXT_SIZE,
    };

    #[test]
    fn pe32_offsets() {
        let layout = PeLayout::parse(&pe32(&[])).unwrap();
        assert_eq!(layout.checksum_offset, 0x40 + 24 + 64);
        assert_eq!(layout.cert_dir_offset, CERT_DIR_OFFSET);
        assert_eq!(layout.size_of_headers, TEXT_OFFSET);
        assert_eq!(
            layout.sections,
            vec![SectionSpan {
                name: ".text".into(),
                pointer_to_raw_data: TEXT_OFFSET,
                size_of_raw_data: TEXT_SIZE,
            }]
        );
    }

    #[test]
    fn rejects_non_pe_input() {
        assert!(PeLayout::parse(b"not an image at all").is_err());
        let mut data = pe32(&[]);
        data[0x40] = b'X';
        assert!(PeLayout::parse(&data).is_err());
    }

    #[test]
    fn rejects_images_without_security_directory() {
        let mut data = pe32(&[]);
        data[0x40 + 24 + 92..0x40 + 24 + 96].copy_from_slice(&4u32.to_le_bytes());
        assert!(PeLayout::parse(&data).is_err());
    }

    #[test]
    fn long_section_names_come_from_the_string_table() {
        let layout = PeLayout::parse(&with_long_section_name(pe32(&[]), ".vendor_cert")).unwrap();
        assert_eq!(layout.sections[0].name, ".vendor_cert");
        assert_eq!(layout.sections[0].pointer_to_raw_data, TEXT_OFFSET);
    }

    #[test]
    fn read_u32_is_bounds_checked() {
        let data = [1u8, 2, 3, 4, 5];
        assert_eq!(read_u32(&data, 1).unwrap(), 0x0504_0302);
        assert!(read_u32(&data, 2).is_err());
    }
}
