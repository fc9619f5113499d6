//! Certificate table capacity planning.
//!
//! The table is grown before the final signature exists, so its size is
//! estimated from a draft with the same encoded length.

use crate::domain::pe::PeImage;
use crate::domain::pkcs7::{Signature, SignatureList};
use crate::infra::error::{PesignError, PesignResult};
use crate::services::cms::{CmsEngine, RawSignatureParts};

pub struct SignatureSpaceAllocator;

impl SignatureSpaceAllocator {
    /// Extra bytes the table needs to hold the existing list plus the
    /// signature `engine` will produce.
    pub fn size_needed(
        engine: &CmsEngine<'_>,
        list: &SignatureList,
        image: &PeImage,
        raw: Option<&RawSignatureParts>,
    ) -> PesignResult<usize> {
        let draft = engine.draft(raw)?;
        log::debug!("draft signature is {} bytes", draft.len());
        Self::extend_amount(list, image, &draft)
    }

    /// Extra bytes the table needs to also hold `signature`.
    pub fn extend_amount(
        list: &SignatureList,
        image: &PeImage,
        signature: &Signature,
    ) -> PesignResult<usize> {
        let required = list.table_size_with(signature);
        let reserved = image.reserved_certificate_space()?;
        Ok(required.saturating_sub(reserved))
    }

    pub fn allocate(image: &mut PeImage, amount: usize) -> PesignResult<()> {
        image.grow_certificate_table(amount)
    }

    /// Fail unless the reserved table can hold the list plus `signature`.
    pub fn check_signature_space(
        list: &SignatureList,
        image: &PeImage,
        signature: &Signature,
    ) -> PesignResult<()> {
        let required = list.table_size_with(signature);
        let reserved = image.reserved_certificate_space()?;
        if required > reserved {
            return Err(PesignError::InternalConsistency(format!(
                "certificate table holds {reserved} bytes but {required} are needed"
            )));
        }
        Ok(())
    }
}
