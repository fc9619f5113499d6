//! Centralized constants for DER tags, OIDs and PE/COFF offsets.
//! Only literals shared by more than one module belong here.

// === ASN.1 DER tags ===

pub const ASN1_BOOLEAN_TAG: u8 = 0x01;
pub const ASN1_INTEGER_TAG: u8 = 0x02;
pub const ASN1_BIT_STRING_TAG: u8 = 0x03;
pub const ASN1_OCTET_STRING_TAG: u8 = 0x04;
pub const ASN1_OID_TAG: u8 = 0x06;
pub const ASN1_SEQUENCE_TAG: u8 = 0x30;
pub const ASN1_SET_TAG: u8 = 0x31;

/// Context-specific constructed [0]; used both for EXPLICIT content wrappers
/// and for the IMPLICIT signed-attributes field of a `SignerInfo`.
pub const ASN1_CONTEXT_0_TAG: u8 = 0xa0;

/// ASN.1 NULL value (tag + length)
pub const ASN1_NULL: &[u8] = &[0x05, 0x00];

// === PKCS#7 / PKCS#9 OIDs (content octets only) ===

/// 1.2.840.113549.1.7.2
pub const PKCS7_SIGNED_DATA_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x07, 0x02];

/// 1.2.840.113549.1.9.3
pub const PKCS9_CONTENT_TYPE_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x03];

/// 1.2.840.113549.1.9.4
pub const PKCS9_MESSAGE_DIGEST_OID: &[u8] =
    &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x04];

/// 1.2.840.113549.1.9.5
pub const PKCS9_SIGNING_TIME_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x05];

// === Digest algorithm OIDs ===

/// 2.16.840.1.101.3.4.2.1
pub const SHA256_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01];

/// 2.16.840.1.101.3.4.2.2
pub const SHA384_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x02];

/// 2.16.840.1.101.3.4.2.3
pub const SHA512_ALGORITHM_OID: &[u8] = &[0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x03];

// === Signature algorithm OIDs ===

/// rsaEncryption (1.2.840.113549.1.1.1)
pub const RSA_ENCRYPTION_OID: &[u8] = &[0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x01, 0x01];

/// ecdsa-with-SHA256 (1.2.840.10045.4.3.2)
pub const ECDSA_WITH_SHA256_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];

/// ecdsa-with-SHA384 (1.2.840.10045.4.3.3)
pub const ECDSA_WITH_SHA384_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x03];

/// ecdsa-with-SHA512 (1.2.840.10045.4.3.4)
pub const ECDSA_WITH_SHA512_OID: &[u8] = &[0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x04];

// === Microsoft Authenticode OIDs ===

/// SpcIndirectDataContent (1.3.6.1.4.1.311.2.1.4)
pub const SPC_INDIRECT_DATA_OID: &[u8] =
    &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x04];

/// SpcStatementType (1.3.6.1.4.1.311.2.1.11)
pub const SPC_STATEMENT_TYPE_OID: &[u8] =
    &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x0b];

/// SpcSpOpusInfo (1.3.6.1.4.1.311.2.1.12)
pub const SPC_SP_OPUS_INFO_OID: &[u8] =
    &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x0c];

/// SpcPeImageData (1.3.6.1.4.1.311.2.1.15)
pub const SPC_PE_IMAGE_DATA_OID: &[u8] =
    &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x0f];

/// Individual code signing purpose (1.3.6.1.4.1.311.2.1.21)
pub const SPC_INDIVIDUAL_SP_KEY_PURPOSE_OID: &[u8] =
    &[0x2b, 0x06, 0x01, 0x04, 0x01, 0x82, 0x37, 0x02, 0x01, 0x15];

/// "<<<Obsolete>>>" as a BMPString payload, the conventional SpcLink file value.
pub const SPC_OBSOLETE_BMP: &[u8] = &[
    0x00, 0x3c, 0x00, 0x3c, 0x00, 0x3c, 0x00, 0x4f, 0x00, 0x62, 0x00, 0x73, 0x00, 0x6f, 0x00,
    0x6c, 0x00, 0x65, 0x00, 0x74, 0x00, 0x65, 0x00, 0x3e, 0x00, 0x3e, 0x00, 0x3e,
];

// === PE/COFF ===

/// Offset of `e_lfanew` in the DOS header
pub const DOS_PE_POINTER_OFFSET: usize = 0x3c;

/// "PE\0\0" signature plus the COFF file header
pub const PE_SIGNATURE_AND_COFF_LEN: usize = 4 + 20;

pub const PE32_MAGIC: u16 = 0x10b;
pub const PE32PLUS_MAGIC: u16 = 0x20b;

/// Checksum field offset within the optional header (same for PE32 and PE32+)
pub const OPTIONAL_HEADER_CHECKSUM_OFFSET: usize = 64;

/// Data directory array offset within the optional header
pub const PE32_DATA_DIRECTORIES_OFFSET: usize = 96;
pub const PE32PLUS_DATA_DIRECTORIES_OFFSET: usize = 112;

/// Index of the certificate table in the data directory array
pub const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;

pub const DATA_DIRECTORY_ENTRY_LEN: usize = 8;

/// Section excluded from the digest when vendor certificates are omitted
pub const VENDOR_CERT_SECTION: &str = ".vendor_cert";

// === WIN_CERTIFICATE ===

pub const WIN_CERT_REVISION_1_0: u16 = 0x0100;
pub const WIN_CERT_REVISION_2_0: u16 = 0x0200;
pub const WIN_CERT_TYPE_PKCS_SIGNED_DATA: u16 = 0x0002;
pub const WIN_CERTIFICATE_HEADER_LEN: usize = 8;

/// Alignment of the certificate table and of every entry inside it
pub const CERT_TABLE_ALIGNMENT: usize = 8;

/// Round `len` up to the certificate table alignment.
#[must_use]
pub const fn align_to_cert_table(len: usize) -> usize {
    (len + CERT_TABLE_ALIGNMENT - 1) & !(CERT_TABLE_ALIGNMENT - 1)
}
