//! A single embedded Authenticode signature (PKCS#7 `ContentInfo` DER).

use std::fmt;

use openssl::nid::Nid;
use openssl::x509::{X509Ref, X509};

use crate::domain::constants::{
    ASN1_CONTEXT_0_TAG, ASN1_INTEGER_TAG, ASN1_OID_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG,
    PKCS7_SIGNED_DATA_OID,
};
use crate::domain::crypto::DigestAlgorithm;
use crate::domain::pkcs7::der::{self, Tlv};
use crate::infra::error::{PesignError, PesignResult};

#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    der: Vec<u8>,
}

/// Descriptive view of a signature used by listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureSummary {
    pub length: usize,
    pub digest_algorithm: Option<DigestAlgorithm>,
    pub signer: Option<String>,
    pub certificate_count: usize,
}

impl Signature {
    /// Validate `bytes` as a PKCS#7 `SignedData` and keep exactly its DER
    /// encoding; trailing padding is dropped.
    pub fn from_der(bytes: &[u8]) -> PesignResult<Self> {
        let outer = der::read_tlv(bytes)?;
        if outer.tag != ASN1_SEQUENCE_TAG {
            return Err(PesignError::MalformedSignature(
                "signature is not a DER SEQUENCE".into(),
            ));
        }
        let content_type = der::children(outer.contents).next().transpose()?;
        match content_type {
            Some(t) if t.tag == ASN1_OID_TAG && t.contents == PKCS7_SIGNED_DATA_OID => {}
            _ => {
                return Err(PesignError::MalformedSignature(
                    "signature is not a PKCS#7 SignedData structure".into(),
                ))
            }
        }
        Ok(Self {
            der: outer.raw.to_vec(),
        })
    }

    #[must_use]
    pub fn as_der(&self) -> &[u8] {
        &self.der
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.der.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.der.is_empty()
    }

    /// Inner `SignedData` SEQUENCE elements.
    fn signed_data_fields(&self) -> PesignResult<Vec<Tlv<'_>>> {
        let outer = der::read_tlv(&self.der)?;
        let explicit = der::children(outer.contents)
            .nth(1)
            .transpose()?
            .filter(|t| t.tag == ASN1_CONTEXT_0_TAG)
            .ok_or_else(|| PesignError::MalformedSignature("missing SignedData content".into()))?;
        let signed_data = der::read_tlv(explicit.contents)?;
        der::children(signed_data.contents).collect()
    }

    /// Digest algorithm named first in `digestAlgorithms`.
    pub fn digest_algorithm(&self) -> PesignResult<Option<DigestAlgorithm>> {
        let fields = self.signed_data_fields()?;
        let Some(set) = fields.iter().find(|t| t.tag == ASN1_SET_TAG) else {
            return Ok(None);
        };
        let Some(alg_id) = der::children(set.contents).next().transpose()? else {
            return Ok(None);
        };
        let oid = der::children(alg_id.contents).next().transpose()?;
        Ok(oid.and_then(|o| DigestAlgorithm::from_oid(o.contents)))
    }

    /// Certificates carried in the `certificates` field, in order.
    pub fn certificates(&self) -> PesignResult<Vec<X509>> {
        let fields = self.signed_data_fields()?;
        // version, digestAlgorithms, contentInfo, then the optional [0] certificates
        let Some(certs) = fields.iter().skip(3).find(|t| t.tag == ASN1_CONTEXT_0_TAG) else {
            return Ok(Vec::new());
        };
        der::children(certs.contents)
            .map(|c| Ok(X509::from_der(c?.raw)?))
            .collect()
    }

    /// Certificate identified by the first `SignerInfo`'s issuer and serial.
    pub fn signer_certificate(&self) -> PesignResult<Option<X509>> {
        let certs = self.certificates()?;
        let fields = self.signed_data_fields()?;
        let signer_infos = fields.iter().rev().find(|t| t.tag == ASN1_SET_TAG);
        let sid = match signer_infos {
            Some(set) => match der::children(set.contents).next().transpose()? {
                Some(info) => der::children(info.contents).nth(1).transpose()?,
                None => None,
            },
            None => None,
        };
        let Some(sid) = sid.filter(|s| s.tag == ASN1_SEQUENCE_TAG) else {
            return Ok(certs.into_iter().next());
        };
        let mut parts = der::children(sid.contents);
        let issuer = parts.next().transpose()?;
        let serial = parts.next().transpose()?.filter(|t| t.tag == ASN1_INTEGER_TAG);
        let (Some(issuer), Some(serial)) = (issuer, serial) else {
            return Ok(certs.into_iter().next());
        };
        let serial = strip_leading_zeros(serial.contents);

        for cert in &certs {
            if cert.issuer_name().to_der()? == issuer.raw
                && strip_leading_zeros(&cert.serial_number().to_bn()?.to_vec()) == serial
            {
                return Ok(Some(cert.clone()));
            }
        }
        Ok(certs.into_iter().next())
    }

    /// Best-effort description; unparseable parts are left empty.
    #[must_use]
    pub fn summary(&self) -> SignatureSummary {
        SignatureSummary {
            length: self.der.len(),
            digest_algorithm: self.digest_algorithm().ok().flatten(),
            signer: self
                .signer_certificate()
                .ok()
                .flatten()
                .and_then(|c| common_name(&c)),
            certificate_count: self.certificates().map(|c| c.len()).unwrap_or(0),
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    &bytes[skip..]
}

/// Subject CN of a certificate.
#[must_use]
pub fn common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|e| e.data().as_utf8().ok())
        .map(|s| s.to_string())
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature(len={})", self.der.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_signed_data() -> Vec<u8> {
        let alg = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[&der::oid(DigestAlgorithm::Sha384.oid()), &[0x05, 0x00]],
        );
        let signed_data = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &[0x02, 0x01, 0x01],
                &der::tlv(ASN1_SET_TAG, &alg),
                &der::tlv(ASN1_SEQUENCE_TAG, &[]),
                &der::tlv(ASN1_SET_TAG, &[]),
            ],
        );
        der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &der::oid(PKCS7_SIGNED_DATA_OID),
                &der::tlv(ASN1_CONTEXT_0_TAG, &signed_data),
            ],
        )
    }

    #[test]
    fn trims_padding_and_reads_digest_algorithm() {
        let mut bytes = fake_signed_data();
        let exact = bytes.len();
        bytes.extend_from_slice(&[0; 5]);
        let sig = Signature::from_der(&bytes).unwrap();
        assert_eq!(sig.len(), exact);
        assert_eq!(sig.digest_algorithm().unwrap(), Some(DigestAlgorithm::Sha384));
        let summary = sig.summary();
        assert_eq!(summary.certificate_count, 0);
        assert_eq!(summary.signer, None);
    }

    #[test]
    fn rejects_other_content_types() {
        let other = der::tlv_concat(ASN1_SEQUENCE_TAG, &[&der::oid(&[0x2a, 0x03])]);
        assert!(Signature::from_der(&other).is_err());
        assert!(Signature::from_der(&[0x04, 0x00]).is_err());
    }
}
