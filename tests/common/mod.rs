//! Shared fixtures for integration tests: synthetic PE32+ images and a
//! self-signed certificate store.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::sign::Verifier;
use openssl::x509::{X509NameBuilder, X509};
use pesign::domain::pkcs7::der;
use pesign::{ActionFlags, ActionWorkflowEngine, PesignResult, SigningOptions};
use tempfile::TempDir;

pub const SIGNER_NICKNAME: &str = "test-signer";
pub const SIGNER_COMMON_NAME: &str = "Test Signer";
pub const KEYLESS_NICKNAME: &str = "other-signer";

const PE_OFFSET: usize = 0x80;
const OPTIONAL_HEADER_SIZE: usize = 240;
const FILE_ALIGNMENT: usize = 0x200;
pub const TEXT_OFFSET: usize = 0x200;
pub const VENDOR_CERT_OFFSET: usize = 0x400;
pub const SECTION_SIZE: usize = 0x200;
pub const STRING_TABLE_OFFSET: usize = VENDOR_CERT_OFFSET + SECTION_SIZE;
/// Holds `.vendor_cert` at offset 4, zero-filled to keep the image 8-byte aligned.
const STRING_TABLE_LEN: usize = 0x18;

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_section(buf: &mut [u8], offset: usize, name: &[u8; 8], rva: u32, raw: usize) {
    buf[offset..offset + 8].copy_from_slice(name);
    put_u32(buf, offset + 8, SECTION_SIZE as u32);
    put_u32(buf, offset + 12, rva);
    put_u32(buf, offset + 16, SECTION_SIZE as u32);
    put_u32(buf, offset + 20, raw as u32);
    put_u32(buf, offset + 36, 0x6000_0020);
}

/// Minimal x86-64 EFI application with `.text` and `.vendor_cert` sections
/// followed by `trailing` bytes of overlay data.
///
/// `.vendor_cert` is longer than the 8-byte name field, so the header names
/// it `/4` and the name lives in the COFF string table after the sections,
/// as linkers emit it.
pub fn build_pe(trailing: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; STRING_TABLE_OFFSET + STRING_TABLE_LEN];

    buf[0..2].copy_from_slice(b"MZ");
    put_u32(&mut buf, 0x3c, PE_OFFSET as u32);

    buf[PE_OFFSET..PE_OFFSET + 4].copy_from_slice(b"PE\0\0");
    let coff = PE_OFFSET + 4;
    put_u16(&mut buf, coff, 0x8664);
    put_u16(&mut buf, coff + 2, 2);
    put_u32(&mut buf, coff + 8, STRING_TABLE_OFFSET as u32);
    put_u16(&mut buf, coff + 16, OPTIONAL_HEADER_SIZE as u16);
    put_u16(&mut buf, coff + 18, 0x0022);

    let opt = coff + 20;
    put_u16(&mut buf, opt, 0x20b);
    put_u32(&mut buf, opt + 4, SECTION_SIZE as u32);
    put_u32(&mut buf, opt + 16, 0x1000);
    put_u32(&mut buf, opt + 20, 0x1000);
    put_u64(&mut buf, opt + 24, 0x1_4000_0000);
    put_u32(&mut buf, opt + 32, 0x1000);
    put_u32(&mut buf, opt + 36, FILE_ALIGNMENT as u32);
    put_u32(&mut buf, opt + 56, 0x3000);
    put_u32(&mut buf, opt + 60, TEXT_OFFSET as u32);
    put_u16(&mut buf, opt + 68, 10);
    put_u32(&mut buf, opt + 108, 16);

    let sections = opt + OPTIONAL_HEADER_SIZE;
    put_section(&mut buf, sections, b".text\0\0\0", 0x1000, TEXT_OFFSET);
    put_section(&mut buf, sections + 40, b"/4\0\0\0\0\0\0", 0x2000, VENDOR_CERT_OFFSET);

    let name = b".vendor_cert\0";
    put_u32(&mut buf, STRING_TABLE_OFFSET, (4 + name.len()) as u32);
    buf[STRING_TABLE_OFFSET + 4..STRING_TABLE_OFFSET + 4 + name.len()].copy_from_slice(name);

    for (i, byte) in buf[TEXT_OFFSET..VENDOR_CERT_OFFSET].iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }
    for (i, byte) in buf[VENDOR_CERT_OFFSET..STRING_TABLE_OFFSET].iter_mut().enumerate() {
        *byte = 0xa0 ^ (i % 127) as u8;
    }
    buf.extend_from_slice(trailing);
    buf
}

fn self_signed(common_name: &str, key: &PKey<Private>, serial: u32) -> X509 {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    let name = name.build();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(serial).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(365).unwrap())
        .unwrap();
    builder.sign(key, MessageDigest::sha256()).unwrap();
    builder.build()
}

fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

/// Scratch directory holding an image, a certificate store and outputs.
pub struct Workspace {
    pub dir: TempDir,
    pub signer_key: PKey<Private>,
    pub signer_cert: X509,
}

impl Workspace {
    pub fn new() -> Self {
        Self::with_image(&build_pe(&[]))
    }

    pub fn with_image(image: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let certdir = dir.path().join("certs");
        fs::create_dir(&certdir).unwrap();

        let signer_key = rsa_key();
        let signer_cert = self_signed(SIGNER_COMMON_NAME, &signer_key, 0x1001);
        fs::write(
            certdir.join(format!("{SIGNER_NICKNAME}.pem")),
            signer_cert.to_pem().unwrap(),
        )
        .unwrap();
        fs::write(
            certdir.join(format!("{SIGNER_NICKNAME}.key")),
            signer_key.private_key_to_pem_pkcs8().unwrap(),
        )
        .unwrap();

        let other_key = rsa_key();
        let other_cert = self_signed("Other Signer", &other_key, 0x1002);
        fs::write(
            certdir.join(format!("{KEYLESS_NICKNAME}.der")),
            other_cert.to_der().unwrap(),
        )
        .unwrap();

        fs::write(dir.path().join("input.efi"), image).unwrap();
        Self {
            dir,
            signer_key,
            signer_cert,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn input(&self) -> PathBuf {
        self.path("input.efi")
    }

    pub fn certdir(&self) -> PathBuf {
        self.path("certs")
    }

    /// Options reading `input.efi` with the fixture certificate store.
    pub fn options(&self) -> SigningOptions {
        SigningOptions {
            infile: Some(self.input()),
            certdir: self.certdir(),
            ..SigningOptions::default()
        }
    }

    pub fn signing_options(&self, infile: &Path, outfile: &Path) -> SigningOptions {
        SigningOptions {
            infile: Some(infile.to_path_buf()),
            outfile: Some(outfile.to_path_buf()),
            certname: Some(SIGNER_NICKNAME.to_string()),
            ..self.options()
        }
    }

    /// Sign `infile` into `outfile`, embedding a fresh signature.
    pub fn sign(&self, infile: &Path, outfile: &Path) -> PesignResult<String> {
        run(
            self.signing_options(infile, outfile),
            ActionFlags::GENERATE_SIGNATURE | ActionFlags::IMPORT_SIGNATURE,
        )
    }
}

/// Run one workflow and return what it printed.
pub fn run(options: SigningOptions, flags: ActionFlags) -> PesignResult<String> {
    let mut engine = ActionWorkflowEngine::new(options, Vec::new());
    engine.handle_action(flags)?;
    Ok(String::from_utf8(engine.into_output()).unwrap())
}

/// Pieces of an embedded Authenticode signature needed to check it.
pub struct SignedParts {
    /// Image digest carried in `SpcIndirectDataContent`.
    pub image_digest: Vec<u8>,
    /// Contents of the SPC SEQUENCE, the input of `messageDigest`.
    pub spc_contents: Vec<u8>,
    /// Signed attributes re-tagged as a SET, the input of the signature.
    pub signed_attributes: Vec<u8>,
    pub signature_value: Vec<u8>,
}

fn nth<'a>(contents: &'a [u8], index: usize) -> der::Tlv<'a> {
    der::children(contents).nth(index).unwrap().unwrap()
}

pub fn dissect(signature: &[u8]) -> SignedParts {
    let outer = der::read_tlv(signature).unwrap();
    let signed_data = der::read_tlv(nth(outer.contents, 1).contents).unwrap();

    let content_info = nth(signed_data.contents, 2);
    let spc = der::read_tlv(nth(content_info.contents, 1).contents).unwrap();
    let digest_info = nth(spc.contents, 1);
    let image_digest = nth(digest_info.contents, 1).contents.to_vec();

    let signer_infos = nth(signed_data.contents, 4);
    let signer_info = nth(signer_infos.contents, 0);
    let attrs = nth(signer_info.contents, 3);
    let mut signed_attributes = attrs.raw.to_vec();
    signed_attributes[0] = 0x31;
    let signature_value = nth(signer_info.contents, 5).contents.to_vec();

    SignedParts {
        image_digest,
        spc_contents: spc.contents.to_vec(),
        signed_attributes,
        signature_value,
    }
}

/// Check the signature value against the signer's public key.
pub fn verify_with(parts: &SignedParts, cert: &X509, digest: MessageDigest) -> bool {
    let key = cert.public_key().unwrap();
    let mut verifier = Verifier::new(digest, &key).unwrap();
    verifier.update(&parts.signed_attributes).unwrap();
    verifier.verify(&parts.signature_value).unwrap()
}
