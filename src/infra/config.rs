//! Configuration file support.
//!
//! Defaults for the certificate database, digest, certificate nickname and
//! output encoding may be stored in a TOML file. Command-line options always
//! take precedence over values loaded here.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::crypto::DigestAlgorithm;
use crate::infra::error::{PesignError, PesignResult};

/// Default certificate database location.
pub const DEFAULT_CERTIFICATE_DIRECTORY: &str = "/etc/pki/pesign";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PesignConfiguration {
    /// Directory holding certificates and their keys
    pub certificate_directory: PathBuf,

    /// Digest used when none is given on the command line
    pub default_digest: String,

    /// Certificate nickname used when none is given on the command line
    pub default_certificate: Option<String>,

    /// Pad digests to the certificate table alignment
    pub padding: bool,

    /// Armor exported artifacts
    pub ascii_armor: bool,
}

impl Default for PesignConfiguration {
    fn default() -> Self {
        Self {
            certificate_directory: PathBuf::from(DEFAULT_CERTIFICATE_DIRECTORY),
            default_digest: DigestAlgorithm::default().as_str().to_string(),
            default_certificate: None,
            padding: false,
            ascii_armor: false,
        }
    }
}

impl PesignConfiguration {
    pub fn digest_algorithm(&self) -> PesignResult<DigestAlgorithm> {
        self.default_digest.parse().map_err(|_| {
            PesignError::Configuration(format!(
                "Invalid digest algorithm: {}",
                self.default_digest
            ))
        })
    }
}

/// Locates and loads the configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Self {
        Self {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn default_config_path() -> PathBuf {
        match dirs::config_dir() {
            Some(dir) => dir.join("pesign").join("config.toml"),
            None => PathBuf::from("pesign-config.toml"),
        }
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the file if it exists, otherwise use defaults.
    pub fn load_or_default(&self) -> PesignResult<PesignConfiguration> {
        if self.config_path.exists() {
            self.load()
        } else {
            log::debug!(
                "no configuration at {}, using defaults",
                self.config_path.display()
            );
            Ok(PesignConfiguration::default())
        }
    }

    pub fn load(&self) -> PesignResult<PesignConfiguration> {
        log::info!("Loading configuration from: {}", self.config_path.display());
        let content = fs::read_to_string(&self.config_path).map_err(|e| {
            PesignError::Configuration(format!(
                "Failed to read config file {}: {e}",
                self.config_path.display()
            ))
        })?;
        let config: PesignConfiguration = toml::from_str(&content)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn validate_config(config: &PesignConfiguration) -> PesignResult<()> {
        config.digest_algorithm()?;
        if config.certificate_directory.as_os_str().is_empty() {
            return Err(PesignError::Configuration(
                "certificate_directory must not be empty".into(),
            ));
        }
        if matches!(&config.default_certificate, Some(name) if name.trim().is_empty()) {
            return Err(PesignError::Configuration(
                "default_certificate must not be blank".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
