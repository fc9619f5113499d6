//! State shared by the steps of one workflow run.

use std::path::{Path, PathBuf};

use crate::domain::crypto::{DigestAlgorithm, DigestBytes};
use crate::domain::pe::PeImage;
use crate::domain::pkcs7::{Signature, SignatureList};
use crate::infra::config::DEFAULT_CERTIFICATE_DIRECTORY;
use crate::infra::error::{PesignError, PesignResult};
use crate::infra::files::{same_file, FileRole, InputFile, InputImage, OutputFile, OutputImage};
use crate::services::{
    AuthenticodeDigester, CertificateStore, DigestOptions, SignatureStore, SigningIdentity,
};

/// Everything a caller can ask of a run.
#[derive(Debug, Clone)]
pub struct SigningOptions {
    pub infile: Option<PathBuf>,
    pub outfile: Option<PathBuf>,
    pub certname: Option<String>,
    pub certdir: PathBuf,
    /// Signature index; workflows pick their own default when unset.
    pub signum: Option<i64>,
    pub force: bool,
    pub ascii: bool,
    pub padding: bool,
    pub digest: DigestAlgorithm,
    pub raw_signature: Option<PathBuf>,
    pub in_signed_attributes: Option<PathBuf>,
    pub out_signed_attributes: Option<PathBuf>,
    pub in_signature: Option<PathBuf>,
    pub out_signature: Option<PathBuf>,
    pub out_public_key: Option<PathBuf>,
    pub out_certificate: Option<PathBuf>,
}

impl Default for SigningOptions {
    fn default() -> Self {
        Self {
            infile: None,
            outfile: None,
            certname: None,
            certdir: PathBuf::from(DEFAULT_CERTIFICATE_DIRECTORY),
            signum: None,
            force: false,
            ascii: false,
            padding: false,
            digest: DigestAlgorithm::default(),
            raw_signature: None,
            in_signed_attributes: None,
            out_signed_attributes: None,
            in_signature: None,
            out_signature: None,
            out_public_key: None,
            out_certificate: None,
        }
    }
}

impl SigningOptions {
    #[must_use]
    pub fn artifact_path(&self, role: FileRole, for_output: bool) -> Option<&Path> {
        let path = match (role, for_output) {
            (FileRole::RawSignature, _) => &self.raw_signature,
            (FileRole::SignedAttributes, false) => &self.in_signed_attributes,
            (FileRole::SignedAttributes, true) => &self.out_signed_attributes,
            (FileRole::Signature, false) => &self.in_signature,
            (FileRole::Signature, true) => &self.out_signature,
            (FileRole::PublicKey, _) => &self.out_public_key,
            (FileRole::Certificate, _) => &self.out_certificate,
        };
        path.as_deref()
    }
}

/// Cryptographic state: the signature list, digests and selected certificate.
#[derive(Debug)]
pub struct CmsContext {
    pub signatures: SignatureList,
    selected_digest: DigestAlgorithm,
    digests: [Option<DigestBytes>; 3],
    identity: Option<SigningIdentity>,
}

impl CmsContext {
    #[must_use]
    pub fn new(selected_digest: DigestAlgorithm) -> Self {
        Self {
            signatures: SignatureList::new(),
            selected_digest,
            digests: [None, None, None],
            identity: None,
        }
    }

    #[must_use]
    pub fn selected_digest(&self) -> DigestAlgorithm {
        self.selected_digest
    }

    /// Most recent digest computed with the selected algorithm.
    #[must_use]
    pub fn digest(&self) -> Option<&DigestBytes> {
        self.digests[self.selected_digest.index()].as_ref()
    }

    fn store_digest(&mut self, digest: DigestBytes) {
        let slot = digest.algorithm().index();
        self.digests[slot] = Some(digest);
    }

    pub fn identity(&self) -> PesignResult<&SigningIdentity> {
        self.identity
            .as_ref()
            .ok_or_else(|| PesignError::InternalConsistency("no certificate selected".into()))
    }
}

/// Which image a digest is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestTarget {
    Input,
    Output,
}

pub struct SigningContext {
    options: SigningOptions,
    outmode: Option<u32>,
    input: Option<InputImage>,
    output: Option<OutputImage>,
    pub cms: CmsContext,
}

impl SigningContext {
    #[must_use]
    pub fn new(options: SigningOptions) -> Self {
        let cms = CmsContext::new(options.digest);
        Self {
            options,
            outmode: None,
            input: None,
            output: None,
            cms,
        }
    }

    #[must_use]
    pub fn options(&self) -> &SigningOptions {
        &self.options
    }

    /// Path checks for workflows that write a new image.
    pub fn check_inputs(&self) -> PesignResult<()> {
        let infile = self
            .options
            .infile
            .as_deref()
            .ok_or_else(|| PesignError::MissingPath("No input file specified.".into()))?;
        let outfile = self
            .options
            .outfile
            .as_deref()
            .ok_or_else(|| PesignError::MissingPath("No output file specified.".into()))?;
        if same_file(infile, outfile) {
            return Err(PesignError::Precondition(
                "in-place file editing is not yet supported".into(),
            ));
        }
        Ok(())
    }

    /// Open the input image and load its signature list.
    pub fn open_input(&mut self) -> PesignResult<()> {
        let input = InputImage::open(self.options.infile.as_deref())?;
        self.cms.signatures = SignatureStore::parse_existing(input.image()).map_err(|e| {
            log::debug!("signature list parse failure: {e}");
            PesignError::MalformedSignature("could not parse signature list in EFI binary".into())
        })?;
        log::debug!(
            "input carries {} signature(s)",
            self.cms.signatures.len()
        );
        self.outmode = input.mode();
        self.input = Some(input);
        Ok(())
    }

    pub fn close_input(&mut self) {
        self.input = None;
    }

    /// Create the output image as a copy of the open input, table cleared.
    pub fn open_output(&mut self) -> PesignResult<()> {
        let input = self
            .input
            .as_ref()
            .ok_or_else(|| PesignError::InternalConsistency("input image is not open".into()))?;
        let output = OutputImage::open(input, self.options.outfile.as_deref(), self.options.force)?;
        self.output = Some(output);
        Ok(())
    }

    /// Write the final signature list, update the checksum and close.
    pub fn close_output(&mut self) -> PesignResult<()> {
        let mut output = self
            .output
            .take()
            .ok_or_else(|| PesignError::InternalConsistency("output image is not open".into()))?;
        SignatureStore::finalize(&self.cms.signatures, output.image_mut())?;
        output.finalize()
    }

    pub fn open_artifact_input(&self, role: FileRole) -> PesignResult<InputFile> {
        InputFile::open(role, self.options.artifact_path(role, false))
    }

    pub fn open_artifact_output(&self, role: FileRole) -> PesignResult<OutputFile> {
        OutputFile::create(
            role,
            self.options.artifact_path(role, true),
            self.options.force,
            self.outmode,
        )
    }

    /// Select the certificate named by the options.
    pub fn find_certificate(&mut self, require_signing_key: bool) -> PesignResult<()> {
        let name = self
            .options
            .certname
            .as_deref()
            .ok_or_else(|| PesignError::MissingPath("No certificate specified.".into()))?;
        let store = CertificateStore::open(&self.options.certdir)?;
        self.cms.identity = Some(store.find(name, require_signing_key)?);
        Ok(())
    }

    #[must_use]
    pub fn input_image(&self) -> Option<&PeImage> {
        self.input.as_ref().map(InputImage::image)
    }

    #[must_use]
    pub fn input_path(&self) -> Option<&Path> {
        self.input.as_ref().map(InputImage::path)
    }

    pub fn output_image(&self) -> PesignResult<&PeImage> {
        self.output
            .as_ref()
            .map(OutputImage::image)
            .ok_or_else(|| PesignError::InternalConsistency("output image is not open".into()))
    }

    pub fn output_image_mut(&mut self) -> PesignResult<&mut PeImage> {
        self.output
            .as_mut()
            .map(OutputImage::image_mut)
            .ok_or_else(|| PesignError::InternalConsistency("output image is not open".into()))
    }

    /// Insert into the signature list and the output's reserved table.
    pub fn insert_signature(&mut self, index: i64, signature: Signature) -> PesignResult<()> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| PesignError::InternalConsistency("output image is not open".into()))?;
        SignatureStore::insert(&mut self.cms.signatures, output.image_mut(), index, signature)
    }

    pub fn remove_signature(&mut self, index: i64) -> PesignResult<Signature> {
        let output = self
            .output
            .as_mut()
            .ok_or_else(|| PesignError::InternalConsistency("output image is not open".into()))?;
        SignatureStore::remove(&mut self.cms.signatures, output.image_mut(), index)
    }

    /// Compute and remember the digest of the input or output image.
    pub fn generate_digest(
        &mut self,
        target: DigestTarget,
        options: DigestOptions,
    ) -> PesignResult<DigestBytes> {
        let image = match target {
            DigestTarget::Input => self.input_image().ok_or_else(|| {
                PesignError::InternalConsistency("input image is not open".into())
            })?,
            DigestTarget::Output => self.output_image()?,
        };
        let digest = AuthenticodeDigester::new(self.cms.selected_digest(), options).digest(image)?;
        self.cms.store_digest(digest.clone());
        Ok(digest)
    }
}
