//! Authenticode image digest.
//!
//! Hashes the headers (minus the checksum field and the certificate table
//! directory entry), every section in file order, and any trailing data up
//! to the certificate table.

use crate::domain::constants::{
    align_to_cert_table, DATA_DIRECTORY_ENTRY_LEN, VENDOR_CERT_SECTION,
};
use crate::domain::crypto::{DigestAlgorithm, DigestBytes};
use crate::domain::pe::PeImage;
use crate::infra::error::{PesignError, PesignResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DigestOptions {
    /// Hash zero padding up to the alignment the certificate table will use.
    pub padding: bool,
    /// Leave the `.vendor_cert` section out of the digest.
    pub omit_vendor_cert: bool,
}

pub struct AuthenticodeDigester {
    algorithm: DigestAlgorithm,
    options: DigestOptions,
}

impl AuthenticodeDigester {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm, options: DigestOptions) -> Self {
        Self { algorithm, options }
    }

    pub fn digest(&self, image: &PeImage) -> PesignResult<DigestBytes> {
        let data = image.as_bytes();
        let layout = image.layout();
        let mut hasher = self.algorithm.hasher();

        let checksum = layout.checksum_offset;
        let cert_dir = layout.cert_dir_offset;
        let headers_end = layout.size_of_headers;
        hasher.update(&data[..checksum]);
        hasher.update(&data[checksum + 4..cert_dir]);
        hasher.update(&data[cert_dir + DATA_DIRECTORY_ENTRY_LEN..headers_end]);

        let mut hashed_end = headers_end;
        for section in layout.sections_by_file_offset() {
            let range = data
                .get(section.pointer_to_raw_data..section.end())
                .ok_or_else(|| {
                    PesignError::PeParsing(format!(
                        "section {} extends past the end of the file",
                        section.name
                    ))
                })?;
            if self.options.omit_vendor_cert && section.name == VENDOR_CERT_SECTION {
                log::debug!("omitting {} from digest", section.name);
            } else {
                hasher.update(range);
            }
            hashed_end = hashed_end.max(section.end());
        }

        let dir = image.certificate_directory()?;
        let data_end = if dir.is_empty() {
            data.len()
        } else {
            dir.offset as usize
        };
        if hashed_end < data_end {
            hasher.update(&data[hashed_end..data_end]);
        }
        if !dir.is_empty() && dir.end() < data.len() {
            hasher.update(&data[dir.end()..]);
        }

        if self.options.padding {
            let pad = align_to_cert_table(data_end) - data_end;
            if pad > 0 {
                log::debug!("hashing {pad} bytes of alignment padding");
                hasher.update(&vec![0u8; pad]);
            }
        }

        let digest = DigestBytes::new(self.algorithm, hasher.finalize().into_vec())
            .map_err(|e| PesignError::InternalConsistency(e.to_string()))?;
        log::debug!("image digest: {digest:?}");
        Ok(digest)
    }
}
