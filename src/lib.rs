//! pesign library
//!
//! Authenticode signing workflows for PE/COFF images such as UEFI
//! applications: computing image digests, generating and importing PKCS#7
//! signatures, exporting signed attributes and certificates, and editing the
//! certificate table of an image.
//!
//! The crate is layered the same way throughout:
//! - `domain`: PE layout, digests, PKCS#7 values and action flags
//! - `services`: stateless operations over those values
//! - `infra`: errors, configuration, file handles and ASCII armor
//! - `pipelines`: the per-run context and the workflow engine

pub mod domain;
pub mod infra;
pub mod pipelines;
pub mod services;

pub use domain::actions::{ActionFlags, Workflow};
pub use domain::crypto::{DigestAlgorithm, DigestBytes};
pub use domain::pe::PeImage;
pub use domain::pkcs7::{Signature, SignatureList};
pub use infra::config::{ConfigManager, PesignConfiguration};
pub use infra::error::{PesignError, PesignResult};
pub use pipelines::{ActionWorkflowEngine, SigningOptions};
