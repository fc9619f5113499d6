//! In-memory PE image with certificate table management.

use crate::domain::constants::{align_to_cert_table, DATA_DIRECTORY_ENTRY_LEN};
use crate::domain::pe::checksum::update_pe_checksum;
use crate::domain::pe::layout::{read_u32, PeLayout};
use crate::infra::error::{PesignError, PesignResult};

/// Security data directory entry. `offset` is a file offset, not an RVA.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CertificateDirectory {
    pub offset: u32,
    pub size: u32,
}

impl CertificateDirectory {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset == 0 || self.size == 0
    }

    #[must_use]
    pub fn end(&self) -> usize {
        self.offset as usize + self.size as usize
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; DATA_DIRECTORY_ENTRY_LEN] {
        let mut bytes = [0u8; DATA_DIRECTORY_ENTRY_LEN];
        bytes[..4].copy_from_slice(&self.offset.to_le_bytes());
        bytes[4..].copy_from_slice(&self.size.to_le_bytes());
        bytes
    }
}

/// A PE image held in memory.
///
/// The certificate directory `size` is the reserved capacity of the table;
/// the serialized signature list may be shorter until the image is finalized.
pub struct PeImage {
    bytes: Vec<u8>,
    layout: PeLayout,
}

impl std::fmt::Debug for PeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeImage")
            .field("len", &self.bytes.len())
            .field("layout", &self.layout)
            .finish()
    }
}

impl PeImage {
    pub fn parse(bytes: Vec<u8>) -> PesignResult<Self> {
        let layout = PeLayout::parse(&bytes)?;
        let image = Self { bytes, layout };
        let dir = image.certificate_directory()?;
        if !dir.is_empty() && dir.end() > image.bytes.len() {
            return Err(PesignError::PeParsing(format!(
                "certificate table ({:#x}+{:#x}) points outside the file",
                dir.offset, dir.size
            )));
        }
        Ok(image)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn layout(&self) -> &PeLayout {
        &self.layout
    }

    pub fn certificate_directory(&self) -> PesignResult<CertificateDirectory> {
        let at = self.layout.cert_dir_offset;
        Ok(CertificateDirectory {
            offset: read_u32(&self.bytes, at)?,
            size: read_u32(&self.bytes, at + 4)?,
        })
    }

    fn set_certificate_directory(&mut self, dir: CertificateDirectory) {
        let at = self.layout.cert_dir_offset;
        self.bytes[at..at + DATA_DIRECTORY_ENTRY_LEN].copy_from_slice(&dir.to_bytes());
    }

    /// Bytes of the certificate table, if the image has one.
    pub fn certificate_table(&self) -> PesignResult<Option<&[u8]>> {
        let dir = self.certificate_directory()?;
        if dir.is_empty() {
            return Ok(None);
        }
        self.bytes
            .get(dir.offset as usize..dir.end())
            .map(Some)
            .ok_or_else(|| PesignError::PeParsing("certificate table points outside the file".into()))
    }

    /// Capacity currently reserved for the certificate table.
    pub fn reserved_certificate_space(&self) -> PesignResult<usize> {
        let dir = self.certificate_directory()?;
        Ok(if dir.is_empty() { 0 } else { dir.size as usize })
    }

    /// Drop the certificate table so the image reads as unsigned.
    pub fn clear_certificate_table(&mut self) -> PesignResult<()> {
        let dir = self.certificate_directory()?;
        if dir.is_empty() {
            return Ok(());
        }
        self.set_certificate_directory(CertificateDirectory::default());
        if dir.end() == self.bytes.len() {
            self.bytes.truncate(dir.offset as usize);
        } else {
            log::warn!(
                "certificate table not at EOF (pos={:#x}, len={:#x}, filelen={:#x}): clearing directory entry without truncating",
                dir.offset,
                dir.size,
                self.bytes.len()
            );
        }
        update_pe_checksum(&mut self.bytes, self.layout.checksum_offset)
    }

    /// Make sure the image ends in an (possibly empty) certificate table at
    /// an aligned offset, creating one if none exists.
    fn tail_certificate_directory(&mut self) -> PesignResult<CertificateDirectory> {
        let dir = self.certificate_directory()?;
        if dir.is_empty() {
            let start = align_to_cert_table(self.bytes.len());
            self.bytes.resize(start, 0);
            return Ok(CertificateDirectory {
                offset: to_u32(start)?,
                size: 0,
            });
        }
        if dir.end() != self.bytes.len() {
            return Err(PesignError::PeParsing(
                "certificate table is not at the end of the image".into(),
            ));
        }
        Ok(dir)
    }

    /// Grow the reserved certificate table by `amount` zero bytes.
    pub fn grow_certificate_table(&mut self, amount: usize) -> PesignResult<()> {
        if amount == 0 {
            return Ok(());
        }
        let mut dir = self.tail_certificate_directory()?;
        let new_size = dir.size as usize + amount;
        self.bytes.resize(dir.offset as usize + new_size, 0);
        dir.size = to_u32(new_size)?;
        self.set_certificate_directory(dir);
        log::debug!(
            "certificate table at {:#x} grown by {amount} to {new_size} bytes",
            dir.offset
        );
        Ok(())
    }

    /// Write `table` into the reserved space, zero-filling the rest.
    /// The reservation is never grown here.
    pub fn write_certificate_table(&mut self, table: &[u8]) -> PesignResult<()> {
        let dir = self.certificate_directory()?;
        let reserved = if dir.is_empty() { 0 } else { dir.size as usize };
        if table.len() > reserved {
            return Err(PesignError::InternalConsistency(format!(
                "signature list needs {} bytes but only {reserved} are reserved",
                table.len()
            )));
        }
        if reserved == 0 {
            return Ok(());
        }
        let region = &mut self.bytes[dir.offset as usize..dir.end()];
        region[..table.len()].copy_from_slice(table);
        region[table.len()..].fill(0);
        Ok(())
    }

    /// Replace the certificate table with exactly `table`, resizing the image.
    /// An empty table removes the directory entry.
    pub fn replace_certificate_table(&mut self, table: &[u8]) -> PesignResult<()> {
        let current = self.certificate_directory()?;
        if table.is_empty() {
            if !current.is_empty() {
                self.clear_certificate_table()?;
            }
            return Ok(());
        }
        let mut dir = self.tail_certificate_directory()?;
        self.bytes.truncate(dir.offset as usize);
        self.bytes.extend_from_slice(table);
        dir.size = to_u32(table.len())?;
        self.set_certificate_directory(dir);
        Ok(())
    }

    pub fn update_checksum(&mut self) -> PesignResult<()> {
        update_pe_checksum(&mut self.bytes, self.layout.checksum_offset)
    }

    /// Stored `CheckSum` header value.
    pub fn stored_checksum(&self) -> PesignResult<u32> {
        read_u32(&self.bytes, self.layout.checksum_offset)
    }
}

fn to_u32(value: usize) -> PesignResult<u32> {
    u32::try_from(value)
        .map_err(|_| PesignError::PeParsing(format!("offset {value:#x} exceeds 32 bits")))
}
