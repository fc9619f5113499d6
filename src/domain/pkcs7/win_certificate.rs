//! `WIN_CERTIFICATE` framing of the PE certificate table.

use crate::domain::constants::{
    align_to_cert_table, WIN_CERTIFICATE_HEADER_LEN, WIN_CERT_REVISION_1_0, WIN_CERT_REVISION_2_0,
    WIN_CERT_TYPE_PKCS_SIGNED_DATA,
};
use crate::domain::pkcs7::Signature;
use crate::infra::error::{PesignError, PesignResult};

/// Bytes one signature occupies in the table, header and padding included.
#[must_use]
pub fn entry_size(der_len: usize) -> usize {
    align_to_cert_table(WIN_CERTIFICATE_HEADER_LEN + der_len)
}

/// Serialized size of a table holding `signatures`.
#[must_use]
pub fn table_size<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> usize {
    signatures.into_iter().map(|s| entry_size(s.len())).sum()
}

/// Serialize signatures as consecutive 8-byte aligned `WIN_CERTIFICATE`
/// entries. `dwLength` covers the padding.
pub fn encode_table<'a>(
    signatures: impl IntoIterator<Item = &'a Signature>,
) -> PesignResult<Vec<u8>> {
    let mut table = Vec::new();
    for sig in signatures {
        let size = entry_size(sig.len());
        let dw_length = u32::try_from(size).map_err(|_| {
            PesignError::MalformedSignature(format!("signature of {} bytes is too large", sig.len()))
        })?;
        table.extend_from_slice(&dw_length.to_le_bytes());
        table.extend_from_slice(&WIN_CERT_REVISION_2_0.to_le_bytes());
        table.extend_from_slice(&WIN_CERT_TYPE_PKCS_SIGNED_DATA.to_le_bytes());
        table.extend_from_slice(sig.as_der());
        table.resize(table.len() + size - WIN_CERTIFICATE_HEADER_LEN - sig.len(), 0);
    }
    Ok(table)
}

/// Parse every entry of a certificate table.
pub fn parse_table(table: &[u8]) -> PesignResult<Vec<Signature>> {
    let mut signatures = Vec::new();
    let mut pos = 0;
    while pos < table.len() {
        let rest = &table[pos..];
        if rest.len() < WIN_CERTIFICATE_HEADER_LEN {
            if rest.iter().all(|b| *b == 0) {
                break;
            }
            return Err(PesignError::MalformedSignature(format!(
                "truncated WIN_CERTIFICATE header at table offset {pos}"
            )));
        }
        let dw_length = u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        let revision = u16::from_le_bytes([rest[4], rest[5]]);
        let cert_type = u16::from_le_bytes([rest[6], rest[7]]);

        if dw_length == 0 && rest.iter().all(|b| *b == 0) {
            break;
        }
        if dw_length < WIN_CERTIFICATE_HEADER_LEN || dw_length > rest.len() {
            return Err(PesignError::MalformedSignature(format!(
                "WIN_CERTIFICATE length {dw_length} invalid at table offset {pos}"
            )));
        }
        if revision != WIN_CERT_REVISION_2_0 && revision != WIN_CERT_REVISION_1_0 {
            return Err(PesignError::MalformedSignature(format!(
                "unsupported WIN_CERTIFICATE revision {revision:#06x}"
            )));
        }
        if cert_type != WIN_CERT_TYPE_PKCS_SIGNED_DATA {
            return Err(PesignError::MalformedSignature(format!(
                "unsupported WIN_CERTIFICATE type {cert_type:#06x}"
            )));
        }

        signatures.push(Signature::from_der(
            &rest[WIN_CERTIFICATE_HEADER_LEN..dw_length],
        )?);
        pos += align_to_cert_table(dw_length).min(rest.len());
    }
    Ok(signatures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constants::{ASN1_CONTEXT_0_TAG, ASN1_SEQUENCE_TAG, PKCS7_SIGNED_DATA_OID};
    use crate::domain::pkcs7::der;

    fn signature_with_payload(payload_len: usize) -> Signature {
        let inner = der::tlv(ASN1_SEQUENCE_TAG, &der::tlv(0x04, &vec![0x5a; payload_len]));
        let bytes = der::tlv_concat(
            ASN1_SEQUENCE_TAG,
            &[
                &der::oid(PKCS7_SIGNED_DATA_OID),
                &der::tlv(ASN1_CONTEXT_0_TAG, &inner),
            ],
        );
        Signature::from_der(&bytes).unwrap()
    }

    #[test]
    fn entries_are_aligned_and_round_trip() {
        let sigs = vec![signature_with_payload(13), signature_with_payload(40)];
        let table = encode_table(&sigs).unwrap();
        assert_eq!(table.len() % 8, 0);
        assert_eq!(table.len(), table_size(&sigs));

        let parsed = parse_table(&table).unwrap();
        assert_eq!(parsed, sigs);
    }

    #[test]
    fn zero_tail_is_ignored() {
        let sigs = vec![signature_with_payload(3)];
        let mut table = encode_table(&sigs).unwrap();
        table.extend_from_slice(&[0u8; 16]);
        assert_eq!(parse_table(&table).unwrap().len(), 1);
    }

    #[test]
    fn rejects_bad_type_and_length() {
        let sigs = vec![signature_with_payload(3)];
        let mut table = encode_table(&sigs).unwrap();
        table[6] = 0x01;
        assert!(parse_table(&table).is_err());

        let mut table = encode_table(&sigs).unwrap();
        table[0..4].copy_from_slice(&4096u32.to_le_bytes());
        assert!(parse_table(&table).is_err());
    }
}
