//! Operations on an image's signature list: parse, import, insert, remove,
//! export, list and finalize.

use crate::domain::pe::PeImage;
use crate::domain::pkcs7::{Signature, SignatureList, SignatureSummary, SignedAttributes};
use crate::infra::armor;
use crate::infra::error::{PesignError, PesignResult};
use crate::services::cms::RawSignatureParts;

/// Encoding of exported signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Der,
    Ascii,
}

impl ExportMode {
    #[must_use]
    pub fn from_ascii_flag(ascii: bool) -> Self {
        if ascii {
            ExportMode::Ascii
        } else {
            ExportMode::Der
        }
    }
}

pub struct SignatureStore;

impl SignatureStore {
    /// Signatures currently embedded in `image`.
    pub fn parse_existing(image: &PeImage) -> PesignResult<SignatureList> {
        match image.certificate_table()? {
            Some(table) => SignatureList::from_table(table),
            None => Ok(SignatureList::new()),
        }
    }

    /// Decode a signature file, accepting DER or ASCII armor.
    pub fn parse_signature(bytes: &[u8]) -> PesignResult<Signature> {
        match armor::decode(bytes)? {
            Some(der) => Signature::from_der(&der),
            None => Signature::from_der(bytes),
        }
    }

    /// Validate a raw signature value and its signed attributes.
    pub fn import_raw(signature: Vec<u8>, signed_attributes: &[u8]) -> PesignResult<RawSignatureParts> {
        let signature = match armor::decode(&signature)? {
            Some(der) => der,
            None => signature,
        };
        if signature.is_empty() {
            return Err(PesignError::MalformedSignature("raw signature is empty".into()));
        }
        let signed_attributes = match armor::decode(signed_attributes)? {
            Some(der) => SignedAttributes::from_der(&der)?,
            None => SignedAttributes::from_der(signed_attributes)?,
        };
        Ok(RawSignatureParts {
            signature,
            signed_attributes,
        })
    }

    /// Insert `signature` at `index` and write the list into the reserved table.
    pub fn insert(
        list: &mut SignatureList,
        image: &mut PeImage,
        index: i64,
        signature: Signature,
    ) -> PesignResult<()> {
        let count = list.len();
        let position = usize::try_from(index)
            .ok()
            .filter(|i| *i <= count)
            .ok_or(PesignError::SignatureIndexOutOfRange {
                index,
                last: count as i64,
            })?;
        let mut updated = list.clone();
        updated.insert(position, signature);
        image.write_certificate_table(&updated.encode()?)?;
        *list = updated;
        log::info!("inserted signature at index {position} ({} total)", list.len());
        Ok(())
    }

    /// Remove the signature at `index` and rebuild the table without it.
    pub fn remove(list: &mut SignatureList, image: &mut PeImage, index: i64) -> PesignResult<Signature> {
        let count = list.len();
        let position = usize::try_from(index)
            .ok()
            .filter(|i| *i < count)
            .ok_or(PesignError::SignatureIndexOutOfRange {
                index,
                last: count as i64 - 1,
            })?;
        let removed = list.remove(position);
        image.replace_certificate_table(&list.encode()?)?;
        log::info!("removed signature {position} ({} remaining)", list.len());
        Ok(removed)
    }

    /// Encoded bytes of the signature at `index`.
    ///
    /// Negative indices select the first signature.
    pub fn export(list: &SignatureList, index: i64, mode: ExportMode) -> PesignResult<Vec<u8>> {
        let position = usize::try_from(index.max(0)).unwrap_or(0);
        let signature = list
            .get(position)
            .ok_or(PesignError::NoSuchSignature(index))?;
        Ok(Self::encode_signature(signature, mode))
    }

    #[must_use]
    pub fn encode_signature(signature: &Signature, mode: ExportMode) -> Vec<u8> {
        match mode {
            ExportMode::Der => signature.as_der().to_vec(),
            ExportMode::Ascii => armor::encode(armor::PKCS7_LABEL, signature.as_der()).into_bytes(),
        }
    }

    /// Summaries of every signature in order.
    pub fn list(list: &SignatureList) -> impl Iterator<Item = (usize, SignatureSummary)> + '_ {
        list.iter().map(Signature::summary).enumerate()
    }

    /// Write the final certificate table, sized exactly to the list, and
    /// refresh the image checksum.
    pub fn finalize(list: &SignatureList, image: &mut PeImage) -> PesignResult<()> {
        image.replace_certificate_table(&list.encode()?)?;
        image.update_checksum()
    }
}
