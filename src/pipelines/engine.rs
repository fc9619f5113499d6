//! `ActionWorkflowEngine` runs the workflow selected by a set of action flags.
//!
//! Each workflow is a fixed sequence of context and service steps. Any
//! failure aborts the run; handles still open are closed when the context
//! is dropped, and an output image that was never finalized keeps the
//! unmodified copy of the input written when it was opened.

use std::io::Write;

use crate::domain::actions::{ActionFlags, Workflow};
use crate::domain::pkcs7::{win_certificate, SignatureSummary};
use crate::infra::error::{PesignError, PesignResult};
use crate::infra::files::FileRole;
use crate::pipelines::context::{DigestTarget, SigningContext, SigningOptions};
use crate::services::{
    cms, CmsEngine, DigestOptions, ExportMode, SignatureSpaceAllocator, SignatureStore,
};

pub struct ActionWorkflowEngine<W: Write> {
    ctx: SigningContext,
    out: W,
}

impl<W: Write> ActionWorkflowEngine<W> {
    /// `out` receives listings and printed digests.
    pub fn new(options: SigningOptions, out: W) -> Self {
        Self {
            ctx: SigningContext::new(options),
            out,
        }
    }

    #[must_use]
    pub fn context(&self) -> &SigningContext {
        &self.ctx
    }

    pub fn into_output(self) -> W {
        self.out
    }

    pub fn handle_action(&mut self, flags: ActionFlags) -> PesignResult<()> {
        let workflow = Workflow::try_from(flags)?;
        log::info!("running {workflow:?} (flags {:#06x})", flags.bits());
        if workflow.rewrites_image() {
            self.ctx.check_inputs()?;
        }
        match workflow {
            Workflow::ImportRawSignature => self.import_raw_signature(),
            Workflow::ExportSignedAttributes => self.export_signed_attributes(),
            Workflow::ImportSignature => self.import_signature(),
            Workflow::ExportPublicKey => self.export_public_key(),
            Workflow::ExportCertificate => self.export_certificate(),
            Workflow::ExportSignature => self.export_signature(),
            Workflow::RemoveSignature => self.remove_signature(),
            Workflow::ListSignatures => self.list_signatures(),
            Workflow::PrintDigest { omit_vendor_cert } => self.print_digest(omit_vendor_cert),
            Workflow::GenerateAndExportSignature => self.generate_and_export_signature(),
            Workflow::GenerateAndEmbedSignature => self.generate_and_embed_signature(),
        }
    }

    fn signing_digest_options() -> DigestOptions {
        DigestOptions {
            padding: true,
            omit_vendor_cert: false,
        }
    }

    fn read_artifact(&self, role: FileRole) -> PesignResult<Vec<u8>> {
        let mut file = self.ctx.open_artifact_input(role)?;
        file.read_all()
    }

    fn write_artifact(&self, role: FileRole, bytes: &[u8]) -> PesignResult<()> {
        let mut file = self.ctx.open_artifact_output(role)?;
        file.write_all(bytes)?;
        file.close()
    }

    /// Index for insertion; defaults to appending. Indices past `count + 1`
    /// are rejected before any output is created.
    fn insertion_index(&self) -> PesignResult<i64> {
        let count = self.ctx.cms.signatures.len() as i64;
        match self.ctx.options().signum {
            Some(n) if n > count + 1 => Err(PesignError::InvalidSignatureNumber),
            Some(n) => Ok(n),
            None => Ok(count),
        }
    }

    fn import_raw_signature(&mut self) -> PesignResult<()> {
        self.ctx.find_certificate(false)?;

        let raw = self.read_artifact(FileRole::RawSignature)?;
        let sattrs = self.read_artifact(FileRole::SignedAttributes)?;
        let parts = SignatureStore::import_raw(raw, &sattrs)?;

        self.ctx.open_input()?;
        let index = self.insertion_index()?;
        self.ctx.open_output()?;
        self.ctx.close_input();

        let digest = self
            .ctx
            .generate_digest(DigestTarget::Output, Self::signing_digest_options())?;
        let identity = self.ctx.cms.identity()?.clone();
        let engine = CmsEngine::new(self.ctx.cms.selected_digest(), &identity);

        let needed = SignatureSpaceAllocator::size_needed(
            &engine,
            &self.ctx.cms.signatures,
            self.ctx.output_image()?,
            Some(&parts),
        )?;
        SignatureSpaceAllocator::allocate(self.ctx.output_image_mut()?, needed)?;

        let signature = engine.wrap_raw(&digest, &parts)?;
        self.ctx.insert_signature(index, signature)?;
        self.ctx.close_output()
    }

    fn export_signed_attributes(&mut self) -> PesignResult<()> {
        self.ctx.open_input()?;
        let digest = self
            .ctx
            .generate_digest(DigestTarget::Input, Self::signing_digest_options())?;
        let attrs = cms::signed_attributes_for_digest(&digest)?;
        self.write_artifact(FileRole::SignedAttributes, attrs.set_der())?;
        self.ctx.close_input();
        Ok(())
    }

    fn import_signature(&mut self) -> PesignResult<()> {
        self.ctx.open_input()?;
        let index = self.insertion_index()?;
        self.ctx.open_output()?;
        self.ctx.close_input();

        let bytes = self.read_artifact(FileRole::Signature)?;
        let signature = SignatureStore::parse_signature(&bytes)?;

        let amount = SignatureSpaceAllocator::extend_amount(
            &self.ctx.cms.signatures,
            self.ctx.output_image()?,
            &signature,
        )?;
        SignatureSpaceAllocator::allocate(self.ctx.output_image_mut()?, amount)?;
        SignatureSpaceAllocator::check_signature_space(
            &self.ctx.cms.signatures,
            self.ctx.output_image()?,
            &signature,
        )?;

        self.ctx.insert_signature(index, signature)?;
        self.ctx.close_output()
    }

    fn export_public_key(&mut self) -> PesignResult<()> {
        self.ctx.find_certificate(true)?;
        let key = self.ctx.cms.identity()?.certificate.public_key()?;
        let bytes = if self.ctx.options().ascii {
            key.public_key_to_pem()?
        } else {
            key.public_key_to_der()?
        };
        self.write_artifact(FileRole::PublicKey, &bytes)
    }

    fn export_certificate(&mut self) -> PesignResult<()> {
        self.ctx.find_certificate(false)?;
        let certificate = &self.ctx.cms.identity()?.certificate;
        let bytes = if self.ctx.options().ascii {
            certificate.to_pem()?
        } else {
            certificate.to_der()?
        };
        self.write_artifact(FileRole::Certificate, &bytes)
    }

    fn export_signature(&mut self) -> PesignResult<()> {
        self.ctx.open_input()?;
        let count = self.ctx.cms.signatures.len() as i64;
        let index = self.ctx.options().signum.unwrap_or(0);
        if index > count {
            return Err(PesignError::InvalidSignatureNumber);
        }
        let mode = ExportMode::from_ascii_flag(self.ctx.options().ascii);
        let bytes = SignatureStore::export(&self.ctx.cms.signatures, index, mode)?;
        self.write_artifact(FileRole::Signature, &bytes)?;
        self.ctx.close_input();
        Ok(())
    }

    fn remove_signature(&mut self) -> PesignResult<()> {
        self.ctx.open_input()?;
        self.ctx.open_output()?;
        self.ctx.close_input();

        let index = self.ctx.options().signum.unwrap_or(0);
        self.ctx.remove_signature(index)?;
        self.ctx.close_output()
    }

    fn list_signatures(&mut self) -> PesignResult<()> {
        self.ctx.open_input()?;
        let signatures = &self.ctx.cms.signatures;
        let out = &mut self.out;
        let result = if signatures.is_empty() {
            writeln!(out, "No signatures found.")
        } else {
            SignatureStore::list(signatures)
                .try_for_each(|(index, summary)| write_summary(out, index, &summary))
                .and_then(|()| writeln!(out, "{LISTING_RULE}"))
        };
        result.map_err(|e| PesignError::io("Error writing listing", e))?;
        self.ctx.close_input();
        Ok(())
    }

    fn print_digest(&mut self, omit_vendor_cert: bool) -> PesignResult<()> {
        self.ctx.open_input()?;
        let options = DigestOptions {
            padding: self.ctx.options().padding,
            omit_vendor_cert,
        };
        let digest = self.ctx.generate_digest(DigestTarget::Input, options)?;
        let path = self
            .ctx
            .input_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        writeln!(self.out, "{path} {}", digest.to_hex())
            .map_err(|e| PesignError::io("Error writing digest", e))?;
        self.ctx.close_input();
        Ok(())
    }

    fn generate_and_export_signature(&mut self) -> PesignResult<()> {
        self.ctx.find_certificate(true)?;
        self.ctx.open_input()?;
        let digest = self
            .ctx
            .generate_digest(DigestTarget::Input, Self::signing_digest_options())?;
        let identity = self.ctx.cms.identity()?;
        let signature = CmsEngine::new(self.ctx.cms.selected_digest(), identity).generate(&digest)?;

        let mode = ExportMode::from_ascii_flag(self.ctx.options().ascii);
        let bytes = SignatureStore::encode_signature(&signature, mode);
        self.write_artifact(FileRole::Signature, &bytes)?;
        self.ctx.close_input();
        Ok(())
    }

    fn generate_and_embed_signature(&mut self) -> PesignResult<()> {
        self.ctx.find_certificate(true)?;
        self.ctx.open_input()?;
        let index = self.insertion_index()?;
        self.ctx.open_output()?;
        self.ctx.close_input();

        let before = self
            .ctx
            .generate_digest(DigestTarget::Output, Self::signing_digest_options())?;
        let identity = self.ctx.cms.identity()?.clone();
        let engine = CmsEngine::new(self.ctx.cms.selected_digest(), &identity);

        let needed = SignatureSpaceAllocator::size_needed(
            &engine,
            &self.ctx.cms.signatures,
            self.ctx.output_image()?,
            None,
        )?;
        SignatureSpaceAllocator::allocate(self.ctx.output_image_mut()?, needed)?;

        let digest = self
            .ctx
            .generate_digest(DigestTarget::Output, Self::signing_digest_options())?;
        if digest != before {
            return Err(PesignError::InternalConsistency(
                "image digest changed while reserving signature space".into(),
            ));
        }

        let signature = engine.generate(&digest)?;
        self.ctx.insert_signature(index, signature)?;
        self.ctx.close_output()
    }
}

const LISTING_RULE: &str = "---------------------------------------------";

fn write_summary<W: Write>(out: &mut W, index: usize, summary: &SignatureSummary) -> std::io::Result<()> {
    let algorithm = summary.digest_algorithm.map_or("unknown", |a| a.as_str());
    writeln!(out, "{LISTING_RULE}")?;
    writeln!(
        out,
        "signature {index}: {} bytes ({} in table), digest {algorithm}",
        summary.length,
        win_certificate::entry_size(summary.length)
    )?;
    writeln!(
        out,
        "The signer's common name is {}",
        summary.signer.as_deref().unwrap_or("unknown")
    )?;
    writeln!(out, "There were {} certs included.", summary.certificate_count)
}
