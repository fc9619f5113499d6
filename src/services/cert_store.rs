//! Certificate database backed by a directory of PEM/DER files.
//!
//! Each certificate file (`.pem`, `.crt`, `.cer`, `.der`) may be paired with
//! a private key stored next to it as `<stem>.key`. A certificate is found
//! by its nickname (the file stem) or by its subject common name.

use std::fs;
use std::path::{Path, PathBuf};

use openssl::pkey::{PKey, Private};
use openssl::x509::X509;

use crate::domain::pkcs7::common_name;
use crate::infra::error::{PesignError, PesignResult};

const CERTIFICATE_EXTENSIONS: &[&str] = &["pem", "crt", "cer", "der"];
const KEY_EXTENSION: &str = "key";

/// Certificate selected for a workflow, with its key when one is available.
#[derive(Clone)]
pub struct SigningIdentity {
    pub nickname: String,
    pub certificate: X509,
    pub private_key: Option<PKey<Private>>,
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningIdentity")
            .field("nickname", &self.nickname)
            .field("subject", &common_name(&self.certificate))
            .field("has_private_key", &self.private_key.is_some())
            .finish()
    }
}

impl SigningIdentity {
    pub fn signing_key(&self) -> PesignResult<&PKey<Private>> {
        self.private_key.as_ref().ok_or_else(|| {
            PesignError::Certificate(format!(
                "certificate {} has no private key available",
                self.nickname
            ))
        })
    }

    fn matches(&self, name: &str) -> bool {
        self.nickname == name || common_name(&self.certificate).as_deref() == Some(name)
    }
}

pub struct CertificateStore {
    directory: PathBuf,
    entries: Vec<SigningIdentity>,
}

impl CertificateStore {
    pub fn open(directory: &Path) -> PesignResult<Self> {
        let listing = fs::read_dir(directory).map_err(|e| {
            PesignError::io(
                format!(
                    "Could not open certificate database \"{}\"",
                    directory.display()
                ),
                e,
            )
        })?;

        let mut paths: Vec<PathBuf> = listing
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| CERTIFICATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::load_entry(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => log::warn!("skipping {}: {e}", path.display()),
            }
        }
        log::debug!(
            "loaded {} certificate(s) from {}",
            entries.len(),
            directory.display()
        );
        Ok(Self {
            directory: directory.to_path_buf(),
            entries,
        })
    }

    fn load_entry(path: &Path) -> PesignResult<SigningIdentity> {
        let bytes = fs::read(path)
            .map_err(|e| PesignError::io(format!("reading {}", path.display()), e))?;
        let certificate = X509::from_pem(&bytes).or_else(|_| X509::from_der(&bytes))?;
        let nickname = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let key_path = path.with_extension(KEY_EXTENSION);
        let private_key = if key_path.is_file() {
            let key_bytes = fs::read(&key_path)
                .map_err(|e| PesignError::io(format!("reading {}", key_path.display()), e))?;
            let key = PKey::private_key_from_pem(&key_bytes)
                .or_else(|_| PKey::private_key_from_der(&key_bytes))?;
            if certificate.public_key()?.public_eq(&key) {
                Some(key)
            } else {
                log::warn!(
                    "{} does not match certificate {}; ignoring key",
                    key_path.display(),
                    nickname
                );
                None
            }
        } else {
            None
        };

        Ok(SigningIdentity {
            nickname,
            certificate,
            private_key,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locate exactly one certificate called `name`.
    ///
    /// With `require_signing_key` only certificates whose private key is
    /// available are candidates.
    pub fn find(&self, name: &str, require_signing_key: bool) -> PesignResult<SigningIdentity> {
        let candidates: Vec<&SigningIdentity> = self
            .entries
            .iter()
            .filter(|e| e.matches(name))
            .filter(|e| !require_signing_key || e.private_key.is_some())
            .collect();

        match candidates.as_slice() {
            [] => {
                log::debug!(
                    "no usable certificate {name:?} among {} in {}",
                    self.entries.len(),
                    self.directory.display()
                );
                Err(PesignError::CertificateNotFound(name.to_string()))
            }
            [identity] => {
                log::info!("using certificate {} ({:?})", identity.nickname, name);
                Ok((*identity).clone())
            }
            many => Err(PesignError::Certificate(format!(
                "certificate name {name} is ambiguous ({} matches)",
                many.len()
            ))),
        }
    }
}
