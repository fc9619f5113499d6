//! Service layer: the operations workflows are composed from.

pub mod cert_store;
pub mod cms;
pub mod digest;
pub mod signature_store;
pub mod space;

pub use cert_store::{CertificateStore, SigningIdentity};
pub use cms::{CmsEngine, RawSignatureParts};
pub use digest::{AuthenticodeDigester, DigestOptions};
pub use signature_store::{ExportMode, SignatureStore};
pub use space::SignatureSpaceAllocator;
