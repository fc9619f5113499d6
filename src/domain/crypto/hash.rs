//! Digest algorithm domain type.
//!
//! SHA-256, SHA-384 and SHA-512 are supported for Authenticode digests. Each
//! variant knows its DER OID, its `sha2` hasher and its OpenSSL counterpart.

use std::fmt;
use std::str::FromStr;

use openssl::hash::MessageDigest;
use sha2::digest::DynDigest;
use sha2::{Sha256, Sha384, Sha512};

use crate::domain::constants::{SHA256_ALGORITHM_OID, SHA384_ALGORITHM_OID, SHA512_ALGORITHM_OID};
use crate::infra::error::PesignError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DigestAlgorithm {
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub const ALL: [DigestAlgorithm; 3] = [
        DigestAlgorithm::Sha256,
        DigestAlgorithm::Sha384,
        DigestAlgorithm::Sha512,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha256 => "sha256",
            DigestAlgorithm::Sha384 => "sha384",
            DigestAlgorithm::Sha512 => "sha512",
        }
    }

    #[must_use]
    pub fn digest_size(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 32,
            DigestAlgorithm::Sha384 => 48,
            DigestAlgorithm::Sha512 => 64,
        }
    }

    /// Position of this algorithm in per-algorithm tables.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            DigestAlgorithm::Sha256 => 0,
            DigestAlgorithm::Sha384 => 1,
            DigestAlgorithm::Sha512 => 2,
        }
    }

    /// OID content octets (no tag or length).
    #[must_use]
    pub fn oid(&self) -> &'static [u8] {
        match self {
            DigestAlgorithm::Sha256 => SHA256_ALGORITHM_OID,
            DigestAlgorithm::Sha384 => SHA384_ALGORITHM_OID,
            DigestAlgorithm::Sha512 => SHA512_ALGORITHM_OID,
        }
    }

    #[must_use]
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.oid() == oid)
    }

    #[must_use]
    pub fn hasher(&self) -> Box<dyn DynDigest> {
        match self {
            DigestAlgorithm::Sha256 => Box::new(Sha256::default()),
            DigestAlgorithm::Sha384 => Box::new(Sha384::default()),
            DigestAlgorithm::Sha512 => Box::new(Sha512::default()),
        }
    }

    #[must_use]
    pub fn message_digest(&self) -> MessageDigest {
        match self {
            DigestAlgorithm::Sha256 => MessageDigest::sha256(),
            DigestAlgorithm::Sha384 => MessageDigest::sha384(),
            DigestAlgorithm::Sha512 => MessageDigest::sha512(),
        }
    }

    /// One-shot hash of `data`.
    #[must_use]
    pub fn hash(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize().into_vec()
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAlgorithm {
    type Err = PesignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(DigestAlgorithm::Sha256),
            "sha384" | "sha-384" => Ok(DigestAlgorithm::Sha384),
            "sha512" | "sha-512" => Ok(DigestAlgorithm::Sha512),
            other => Err(PesignError::InvalidInput(format!(
                "Unknown digest type \"{other}\""
            ))),
        }
    }
}
