//! PKCS#7 / Authenticode domain types.
//!
//! `Signature` wraps the exact DER of one embedded `ContentInfo`;
//! `SignatureList` is the ordered content of a certificate table, framed by
//! the `win_certificate` codec. The `der` module holds the small DER toolkit
//! the CMS assembly and inspection code is built on.

pub mod attributes;
pub mod der;
mod list;
mod signature;
pub mod win_certificate;

pub use attributes::{SignedAttribute, SignedAttributes};
pub use list::SignatureList;
pub use signature::{common_name, Signature, SignatureSummary};
