//! Authenticode PKCS#7 assembly.
//!
//! A signature is a `ContentInfo` wrapping `SignedData` whose content is an
//! `SpcIndirectDataContent` carrying the image digest. The signer signs the
//! DER SET of signed attributes; the attributes bind the SPC content through
//! their `messageDigest`.

use std::time::SystemTime;

use ::der::asn1::UtcTime;
use ::der::Encode;
use openssl::pkey::Id;
use openssl::sign::Signer;

use crate::domain::constants::{
    ASN1_BIT_STRING_TAG, ASN1_CONTEXT_0_TAG, ASN1_INTEGER_TAG, ASN1_NULL, ASN1_OCTET_STRING_TAG,
    ASN1_SEQUENCE_TAG, ASN1_SET_TAG, ECDSA_WITH_SHA256_OID, ECDSA_WITH_SHA384_OID,
    ECDSA_WITH_SHA512_OID, PKCS7_SIGNED_DATA_OID, PKCS9_CONTENT_TYPE_OID,
    PKCS9_MESSAGE_DIGEST_OID, PKCS9_SIGNING_TIME_OID, RSA_ENCRYPTION_OID, SPC_INDIRECT_DATA_OID,
    SPC_INDIVIDUAL_SP_KEY_PURPOSE_OID, SPC_OBSOLETE_BMP, SPC_PE_IMAGE_DATA_OID,
    SPC_SP_OPUS_INFO_OID, SPC_STATEMENT_TYPE_OID,
};
use crate::domain::crypto::{DigestAlgorithm, DigestBytes};
use crate::domain::pkcs7::{der, Signature, SignedAttribute, SignedAttributes};
use crate::infra::error::{PesignError, PesignResult};
use crate::services::cert_store::SigningIdentity;

/// Externally produced signature value plus the attributes it was computed over.
#[derive(Debug, Clone)]
pub struct RawSignatureParts {
    pub signature: Vec<u8>,
    pub signed_attributes: SignedAttributes,
}

/// Build the DER `SpcIndirectDataContent` for an image digest.
#[must_use]
pub fn spc_indirect_data(digest: &DigestBytes) -> Vec<u8> {
    // SpcLink ::= [2] file SpcString ::= [0] IMPLICIT BMPString
    let file = der::tlv(
        ASN1_CONTEXT_0_TAG,
        &der::tlv(0xa2, &der::tlv(0x80, SPC_OBSOLETE_BMP)),
    );
    let pe_image_data = der::tlv_concat(
        ASN1_SEQUENCE_TAG,
        &[&der::tlv(ASN1_BIT_STRING_TAG, &[0x07, 0x80]), &file],
    );
    let data = der::tlv_concat(
        ASN1_SEQUENCE_TAG,
        &[&der::oid(SPC_PE_IMAGE_DATA_OID), &pe_image_data],
    );
    let digest_info = der::tlv_concat(
        ASN1_SEQUENCE_TAG,
        &[
            &digest_algorithm_identifier(digest.algorithm()),
            &der::tlv(ASN1_OCTET_STRING_TAG, digest.as_slice()),
        ],
    );
    der::tlv_concat(ASN1_SEQUENCE_TAG, &[&data, &digest_info])
}

fn digest_algorithm_identifier(algorithm: DigestAlgorithm) -> Vec<u8> {
    der::tlv_concat(ASN1_SEQUENCE_TAG, &[&der::oid(algorithm.oid()), ASN1_NULL])
}

/// `messageDigest` attribute over the SPC content octets (outer header excluded).
fn message_digest_attribute(
    spc_content: &[u8],
    algorithm: DigestAlgorithm,
) -> PesignResult<SignedAttribute> {
    let inner = der::read_tlv(spc_content)?.contents;
    Ok(SignedAttribute::new(
        PKCS9_MESSAGE_DIGEST_OID,
        &der::tlv(ASN1_OCTET_STRING_TAG, &algorithm.hash(inner)),
    ))
}

/// Signed attributes for `spc_content`, stamped with `signing_time`.
pub fn signed_attributes(
    spc_content: &[u8],
    algorithm: DigestAlgorithm,
    signing_time: SystemTime,
) -> PesignResult<SignedAttributes> {
    let time = UtcTime::from_system_time(signing_time)?.to_der()?;
    let statement_type = der::tlv(
        ASN1_SEQUENCE_TAG,
        &der::oid(SPC_INDIVIDUAL_SP_KEY_PURPOSE_OID),
    );
    Ok(SignedAttributes::from_attributes(vec![
        SignedAttribute::new(PKCS9_CONTENT_TYPE_OID, &der::oid(SPC_INDIRECT_DATA_OID)),
        SignedAttribute::new(PKCS9_SIGNING_TIME_OID, &time),
        message_digest_attribute(spc_content, algorithm)?,
        SignedAttribute::new(SPC_STATEMENT_TYPE_OID, &statement_type),
        SignedAttribute::new(SPC_SP_OPUS_INFO_OID, &der::tlv(ASN1_SEQUENCE_TAG, &[])),
    ]))
}

/// Signed-attributes blob handed to an external signer for `digest`.
pub fn signed_attributes_for_digest(digest: &DigestBytes) -> PesignResult<SignedAttributes> {
    let spc = spc_indirect_data(digest);
    signed_attributes(&spc, digest.algorithm(), SystemTime::now())
}

/// Produces Authenticode signatures for one certificate.
pub struct CmsEngine<'a> {
    algorithm: DigestAlgorithm,
    identity: &'a SigningIdentity,
}

impl<'a> CmsEngine<'a> {
    #[must_use]
    pub fn new(algorithm: DigestAlgorithm, identity: &'a SigningIdentity) -> Self {
        Self {
            algorithm,
            identity,
        }
    }

    /// Sign `digest` with the identity's private key.
    pub fn generate(&self, digest: &DigestBytes) -> PesignResult<Signature> {
        self.check_algorithm(digest)?;
        let key = self.identity.signing_key()?;
        let spc = spc_indirect_data(digest);
        let attrs = signed_attributes(&spc, self.algorithm, SystemTime::now())?;

        let mut signer = Signer::new(self.algorithm.message_digest(), key)?;
        signer.update(attrs.set_der())?;
        let value = signer.sign_to_vec()?;
        log::info!(
            "generated {}-byte {} signature with {}",
            value.len(),
            self.algorithm,
            self.identity.nickname
        );
        self.assemble(&spc, &attrs, &value)
    }

    /// Wrap an externally computed signature value.
    ///
    /// The attributes must carry the `messageDigest` of this image's SPC content.
    pub fn wrap_raw(&self, digest: &DigestBytes, parts: &RawSignatureParts) -> PesignResult<Signature> {
        self.check_algorithm(digest)?;
        let spc = spc_indirect_data(digest);
        let expected = message_digest_attribute(&spc, self.algorithm)?;
        if !parts.signed_attributes.contains(&expected) {
            return Err(PesignError::MalformedSignature(
                "signed attributes do not match the digest of this image".into(),
            ));
        }
        self.assemble(&spc, &parts.signed_attributes, &parts.signature)
    }

    /// A signature of the same encoded size as the one that will be produced,
    /// built over a zero digest with a placeholder value.
    pub fn draft(&self, raw: Option<&RawSignatureParts>) -> PesignResult<Signature> {
        let digest = DigestBytes::zeroed(self.algorithm);
        let spc = spc_indirect_data(&digest);
        match raw {
            Some(parts) => self.assemble(&spc, &parts.signed_attributes, &parts.signature),
            None => {
                let attrs = signed_attributes(&spc, self.algorithm, SystemTime::now())?;
                let placeholder = vec![0u8; self.identity.signing_key()?.size()];
                self.assemble(&spc, &attrs, &placeholder)
            }
        }
    }

    fn check_algorithm(&self, digest: &DigestBytes) -> PesignResult<()> {
        if digest.algorithm() != self.algorithm {
            return Err(PesignError::InternalConsistency(format!(
                "digest computed with {} but signing with {}",
                digest.algorithm(),
                self.algorithm
            )));
        }
        Ok(())
    }

    fn signature_algorithm_identifier(&self) -> PesignResult<Vec<u8>> {
        let key = self.identity.certificate.public_key()?;
        match key.id() {
            Id::RSA => Ok(der::tlv_concat(
                ASN1_SEQUENCE_TAG,
                &[&der::oid(RSA_ENCRYPTION_OID), ASN1_NULL],
            )),
            Id::EC => {
                let oid = match self.algorithm {
                    DigestAlgorithm::Sha256 => ECDSA_WITH_SHA256_OID,
                    DigestAlgorithm::Sha384 => ECDSA_WITH_SHA384_OID,
                    DigestAlgorithm::Sha512 => ECDSA_WITH_SHA512_OID,
                };
                Ok(der::tlv(ASN1_SEQUENCE_TAG, &der::oid(oid)))
            }
            other => Err(PesignError::Certificate(format!(
                "unsupported public key type {other:?}"
            ))),
        }
    }

    fn issuer_and_serial(&self) -> PesignResult<Vec<u8>> {
        let cert = &self.identity.certificate;
        let issuer = cert.issuer_name().to_der()?;
        let mut serial = cert.serial_number().to_bn()?.to_vec();
        if serial.first().map_or(true, |b| b & 0x80 != 0) {
            serial.insert(0, 0);
        }
        Ok(der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[&issuer, &der::tlv(ASN1_INTEGER_TAG, &serial)],
        ))
    }

    fn assemble(
        &self,
        spc_content: &[u8],
        attrs: &SignedAttributes,
        value: &[u8],
    ) -> PesignResult<Signature> {
        let algorithm_id = digest_algorithm_identifier(self.algorithm);
        let version = der::tlv(ASN1_INTEGER_TAG, &[0x01]);

        let signer_info = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &version,
                &self.issuer_and_serial()?,
                &algorithm_id,
                &attrs.implicit_der(),
                &self.signature_algorithm_identifier()?,
                &der::tlv(ASN1_OCTET_STRING_TAG, value),
            ],
        );
        let content_info = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &der::oid(SPC_INDIRECT_DATA_OID),
                &der::tlv(ASN1_CONTEXT_0_TAG, spc_content),
            ],
        );
        let certificates = der::tlv(ASN1_CONTEXT_0_TAG, &self.identity.certificate.to_der()?);
        let signed_data = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &version,
                &der::tlv(ASN1_SET_TAG, &algorithm_id),
                &content_info,
                &certificates,
                &der::tlv(ASN1_SET_TAG, &signer_info),
            ],
        );
        let der_bytes = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &der::oid(PKCS7_SIGNED_DATA_OID),
                &der::tlv(ASN1_CONTEXT_0_TAG, &signed_data),
            ],
        );
        Signature::from_der(&der_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openssl::asn1::Asn1Time;
    use openssl::ec::{EcGroup, EcKey};
    use openssl::hash::MessageDigest;
    use openssl::nid::Nid;
    use openssl::pkey::PKey;
    use openssl::x509::{X509NameBuilder, X509};

    fn identity() -> SigningIdentity {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "CMS Test").unwrap();
        let name = name.build();
        let mut builder = X509::builder().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&key).unwrap();
        builder.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        builder.set_not_after(&Asn1Time::days_from_now(30).unwrap()).unwrap();
        builder.sign(&key, MessageDigest::sha256()).unwrap();
        SigningIdentity {
            nickname: "cms-test".into(),
            certificate: builder.build(),
            private_key: Some(key),
        }
    }

    fn digest() -> DigestBytes {
        DigestBytes::new(DigestAlgorithm::Sha256, vec![0x3c; 32]).unwrap()
    }

    #[test]
    fn spc_content_embeds_digest() {
        let spc = spc_indirect_data(&digest());
        assert_eq!(spc[0], ASN1_SEQUENCE_TAG);
        assert!(spc.windows(32).any(|w| w == [0x3c; 32]));
        assert!(spc.windows(SPC_OBSOLETE_BMP.len()).any(|w| w == SPC_OBSOLETE_BMP));
    }

    #[test]
    fn signed_attributes_bind_spc_content() {
        let spc = spc_indirect_data(&digest());
        let attrs = signed_attributes(&spc, DigestAlgorithm::Sha256, SystemTime::now()).unwrap();
        let expected = message_digest_attribute(&spc, DigestAlgorithm::Sha256).unwrap();
        assert!(attrs.contains(&expected));
        assert_eq!(attrs.set_der()[0], ASN1_SET_TAG);
    }

    #[test]
    fn generated_signature_describes_signer() {
        let identity = identity();
        let engine = CmsEngine::new(DigestAlgorithm::Sha256, &identity);
        let signature = engine.generate(&digest()).unwrap();

        let summary = signature.summary();
        assert_eq!(summary.digest_algorithm, Some(DigestAlgorithm::Sha256));
        assert_eq!(summary.signer.as_deref(), Some("CMS Test"));
        assert_eq!(summary.certificate_count, 1);

        let draft = engine.draft(None).unwrap();
        assert!(draft.len() >= signature.len());
    }

    #[test]
    fn raw_parts_must_match_digest() {
        let identity = identity();
        let engine = CmsEngine::new(DigestAlgorithm::Sha256, &identity);
        let parts = RawSignatureParts {
            signature: vec![0x01; 72],
            signed_attributes: signed_attributes_for_digest(&digest()).unwrap(),
        };
        assert!(engine.wrap_raw(&digest(), &parts).is_ok());

        let other = DigestBytes::new(DigestAlgorithm::Sha256, vec![0x4d; 32]).unwrap();
        assert!(matches!(
            engine.wrap_raw(&other, &parts),
            Err(PesignError::MalformedSignature(_))
        ));
    }

    #[test]
    fn algorithm_mismatch_is_internal_error() {
        let identity = identity();
        let engine = CmsEngine::new(DigestAlgorithm::Sha384, &identity);
        assert!(matches!(
            engine.generate(&digest()),
            Err(PesignError::InternalConsistency(_))
        ));
    }
}
