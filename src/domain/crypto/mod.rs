//! Foundational cryptographic domain types.
//!
//! Provides the digest algorithm enumeration and a strongly-typed digest value
//! whose length is checked against the algorithm that produced it.

mod digest_bytes;
mod hash;

pub use digest_bytes::{DigestBytes, DigestBytesError};
pub use hash::DigestAlgorithm;
