//! Ordered signature list attached to an image.

use crate::domain::pkcs7::{win_certificate, Signature};
use crate::infra::error::PesignResult;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureList {
    signatures: Vec<Signature>,
}

impl SignatureList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw certificate table.
    pub fn from_table(table: &[u8]) -> PesignResult<Self> {
        Ok(Self {
            signatures: win_certificate::parse_table(table)?,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Signature> {
        self.signatures.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signature> {
        self.signatures.iter()
    }

    /// Callers validate `index <= len()`.
    pub(crate) fn insert(&mut self, index: usize, signature: Signature) {
        self.signatures.insert(index, signature);
    }

    /// Callers validate `index < len()`.
    pub(crate) fn remove(&mut self, index: usize) -> Signature {
        self.signatures.remove(index)
    }

    /// Serialized size of the list in the certificate table.
    #[must_use]
    pub fn table_size(&self) -> usize {
        win_certificate::table_size(&self.signatures)
    }

    /// Serialized size with `extra` appended.
    #[must_use]
    pub fn table_size_with(&self, extra: &Signature) -> usize {
        self.table_size() + win_certificate::entry_size(extra.len())
    }

    pub fn encode(&self) -> PesignResult<Vec<u8>> {
        win_certificate::encode_table(&self.signatures)
    }
}
