//! Requested actions and the workflows they select.

use bitflags::bitflags;

use crate::infra::error::PesignError;

bitflags! {
    /// Action bits accumulated from the command line.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ActionFlags: u32 {
        const GENERATE_DIGEST      = 0x0001;
        const GENERATE_SIGNATURE   = 0x0002;
        const IMPORT_RAW_SIGNATURE = 0x0004;
        const IMPORT_SIGNATURE     = 0x0008;
        const IMPORT_SATTRS        = 0x0010;
        const EXPORT_SATTRS        = 0x0020;
        const EXPORT_SIGNATURE     = 0x0040;
        const EXPORT_PUBKEY        = 0x0080;
        const EXPORT_CERT          = 0x0100;
        const REMOVE_SIGNATURE     = 0x0200;
        const LIST_SIGNATURES      = 0x0400;
        const PRINT_DIGEST         = 0x0800;
        const OMIT_VENDOR_CERT     = 0x1000;
    }
}

impl ActionFlags {
    /// Names of the set bits, lowest first.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// The eleven supported action combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    ImportRawSignature,
    ExportSignedAttributes,
    ImportSignature,
    ExportPublicKey,
    ExportCertificate,
    ExportSignature,
    RemoveSignature,
    ListSignatures,
    PrintDigest { omit_vendor_cert: bool },
    GenerateAndExportSignature,
    GenerateAndEmbedSignature,
}

const WORKFLOWS: &[(ActionFlags, Workflow)] = &[
    (
        ActionFlags::IMPORT_RAW_SIGNATURE.union(ActionFlags::IMPORT_SATTRS),
        Workflow::ImportRawSignature,
    ),
    (ActionFlags::EXPORT_SATTRS, Workflow::ExportSignedAttributes),
    (ActionFlags::IMPORT_SIGNATURE, Workflow::ImportSignature),
    (ActionFlags::EXPORT_PUBKEY, Workflow::ExportPublicKey),
    (ActionFlags::EXPORT_CERT, Workflow::ExportCertificate),
    (ActionFlags::EXPORT_SIGNATURE, Workflow::ExportSignature),
    (ActionFlags::REMOVE_SIGNATURE, Workflow::RemoveSignature),
    (ActionFlags::LIST_SIGNATURES, Workflow::ListSignatures),
    (
        ActionFlags::GENERATE_DIGEST.union(ActionFlags::PRINT_DIGEST),
        Workflow::PrintDigest {
            omit_vendor_cert: false,
        },
    ),
    (
        ActionFlags::GENERATE_DIGEST
            .union(ActionFlags::PRINT_DIGEST)
            .union(ActionFlags::OMIT_VENDOR_CERT),
        Workflow::PrintDigest {
            omit_vendor_cert: true,
        },
    ),
    (
        ActionFlags::EXPORT_SIGNATURE.union(ActionFlags::GENERATE_SIGNATURE),
        Workflow::GenerateAndExportSignature,
    ),
    (
        ActionFlags::IMPORT_SIGNATURE.union(ActionFlags::GENERATE_SIGNATURE),
        Workflow::GenerateAndEmbedSignature,
    ),
];

impl TryFrom<ActionFlags> for Workflow {
    type Error = PesignError;

    fn try_from(flags: ActionFlags) -> Result<Self, Self::Error> {
        if flags.is_empty() {
            return Err(PesignError::InvalidInput("Nothing to do.".into()));
        }
        WORKFLOWS
            .iter()
            .find(|(combo, _)| *combo == flags)
            .map(|(_, workflow)| *workflow)
            .ok_or_else(|| PesignError::IncompatibleFlags {
                bits: flags.bits(),
                names: flags.names(),
            })
    }
}

impl Workflow {
    /// Workflows that write a new image.
    #[must_use]
    pub fn rewrites_image(&self) -> bool {
        matches!(
            self,
            Workflow::ImportRawSignature
                | Workflow::ImportSignature
                | Workflow::RemoveSignature
                | Workflow::GenerateAndEmbedSignature
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_combination_resolves() {
        for (flags, workflow) in WORKFLOWS {
            assert_eq!(Workflow::try_from(*flags).unwrap(), *workflow);
        }
    }

    #[test]
    fn omit_vendor_cert_only_applies_to_digest_printing() {
        let flags = ActionFlags::GENERATE_DIGEST
            | ActionFlags::PRINT_DIGEST
            | ActionFlags::OMIT_VENDOR_CERT;
        assert_eq!(
            Workflow::try_from(flags).unwrap(),
            Workflow::PrintDigest {
                omit_vendor_cert: true
            }
        );
        let flags = ActionFlags::LIST_SIGNATURES | ActionFlags::OMIT_VENDOR_CERT;
        assert!(Workflow::try_from(flags).is_err());
    }

    #[test]
    fn incompatible_combination_reports_names() {
        let flags = ActionFlags::EXPORT_PUBKEY | ActionFlags::REMOVE_SIGNATURE;
        match Workflow::try_from(flags) {
            Err(PesignError::IncompatibleFlags { bits, names }) => {
                assert_eq!(bits, 0x280);
                assert_eq!(names, vec!["EXPORT_PUBKEY", "REMOVE_SIGNATURE"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn empty_flags_is_an_error() {
        assert!(Workflow::try_from(ActionFlags::empty()).is_err());
    }
}
