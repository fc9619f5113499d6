//! Signed attributes of a PKCS#7 `SignerInfo`.

use std::fmt;

use crate::domain::constants::{ASN1_CONTEXT_0_TAG, ASN1_SEQUENCE_TAG, ASN1_SET_TAG};
use crate::domain::pkcs7::der;
use crate::infra::error::{PesignError, PesignResult};

/// One `Attribute ::= SEQUENCE { type OID, values SET OF ANY }` with a single value.
#[derive(Clone)]
pub struct SignedAttribute {
    pub oid: &'static [u8],
    pub der: Vec<u8>,
}

impl SignedAttribute {
    #[must_use]
    pub fn new(oid: &'static [u8], value_der: &[u8]) -> Self {
        let der = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[&der::oid(oid), &der::tlv(ASN1_SET_TAG, value_der)],
        );
        Self { oid, der }
    }
}

impl fmt::Debug for SignedAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SignedAttribute(oid={}, len={})",
            hex::encode(self.oid),
            self.der.len()
        )
    }
}

/// Signed attributes in DER SET OF order.
///
/// The same content is signed under the SET tag and embedded in the
/// `SignerInfo` under the [0] IMPLICIT tag.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedAttributes {
    set_der: Vec<u8>,
}

impl SignedAttributes {
    #[must_use]
    pub fn from_attributes(mut attrs: Vec<SignedAttribute>) -> Self {
        attrs.sort_by(|a, b| a.der.cmp(&b.der));
        let concatenated: Vec<u8> = attrs.iter().flat_map(|a| a.der.iter().copied()).collect();
        Self {
            set_der: der::tlv(ASN1_SET_TAG, &concatenated),
        }
    }

    /// Accept an externally produced attribute SET (or its [0] form).
    pub fn from_der(bytes: &[u8]) -> PesignResult<Self> {
        let tlv = der::read_tlv(bytes)?;
        if tlv.tag != ASN1_SET_TAG && tlv.tag != ASN1_CONTEXT_0_TAG {
            return Err(PesignError::MalformedSignature(format!(
                "signed attributes must be a DER SET, found tag {:#04x}",
                tlv.tag
            )));
        }
        for attr in der::children(tlv.contents) {
            if attr?.tag != ASN1_SEQUENCE_TAG {
                return Err(PesignError::MalformedSignature(
                    "signed attribute is not a SEQUENCE".into(),
                ));
            }
        }
        let mut set_der = tlv.raw.to_vec();
        set_der[0] = ASN1_SET_TAG;
        Ok(Self { set_der })
    }

    /// Encoding that is hashed and signed.
    #[must_use]
    pub fn set_der(&self) -> &[u8] {
        &self.set_der
    }

    /// Encoding embedded in the `SignerInfo`.
    #[must_use]
    pub fn implicit_der(&self) -> Vec<u8> {
        let mut out = self.set_der.clone();
        out[0] = ASN1_CONTEXT_0_TAG;
        out
    }

    /// Whether an attribute with exactly this encoding is present.
    #[must_use]
    pub fn contains(&self, attr: &SignedAttribute) -> bool {
        der::read_tlv(&self.set_der)
            .map(|set| {
                der::children(set.contents)
                    .filter_map(Result::ok)
                    .any(|a| a.raw == attr.der.as_slice())
            })
            .unwrap_or(false)
    }
}

impl fmt::Debug for SignedAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignedAttributes(len={})", self.set_der.len())
    }
}
