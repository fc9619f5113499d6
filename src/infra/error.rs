//! Error types for pesign operations.
//! Every failed workflow surfaces as a single `PesignError` carrying the
//! diagnostic text printed by the command-line front end.

use thiserror::Error;

/// Result type for pesign operations
pub type PesignResult<T> = Result<T, PesignError>;

/// Errors raised while executing a signing workflow
#[derive(Error, Debug, miette::Diagnostic)]
pub enum PesignError {
    #[error("{0}")]
    #[diagnostic(code(pesign::missing_path), help("pass the file with its command-line option"))]
    MissingPath(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    #[diagnostic(code(pesign::precondition))]
    Precondition(String),

    #[error("{0}")]
    #[diagnostic(code(pesign::pe_parsing))]
    PeParsing(String),

    #[error("{0}")]
    #[diagnostic(code(pesign::malformed_signature))]
    MalformedSignature(String),

    #[error("Could not find certificate {0}")]
    #[diagnostic(
        code(pesign::certificate_not_found),
        help("certificates are matched by file stem or subject common name in the --certdir directory")
    )]
    CertificateNotFound(String),

    #[error("{0}")]
    Certificate(String),

    #[error("cryptographic operation failed: {0}")]
    Cryptographic(String),

    #[error("Invalid signature number.")]
    InvalidSignatureNumber,

    #[error("Invalid signature number {index}. Must be between 0 and {last}.")]
    #[diagnostic(code(pesign::signature_index), help("list the embedded signatures with -S"))]
    SignatureIndexOutOfRange { index: i64, last: i64 },

    #[error("No valid signature #{0}.")]
    #[diagnostic(code(pesign::signature_index), help("list the embedded signatures with -S"))]
    NoSuchSignature(i64),

    #[error("Incompatible flags (0x{bits:08x}): {}", names.join(" "))]
    #[diagnostic(code(pesign::incompatible_flags))]
    IncompatibleFlags { bits: u32, names: Vec<&'static str> },

    #[error("{0}")]
    InvalidInput(String),

    #[error("internal consistency check failed: {0}")]
    InternalConsistency(String),

    #[error("Configuration error: {0}")]
    #[diagnostic(code(pesign::configuration))]
    Configuration(String),
}

impl PesignError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PesignError::Io {
            context: context.into(),
            source,
        }
    }

    /// Line printed to stderr when a workflow fails.
    ///
    /// Index and flag-combination diagnostics are printed bare; everything
    /// else carries the program prefix.
    #[must_use]
    pub fn diagnostic_line(&self) -> String {
        match self {
            PesignError::InvalidSignatureNumber
            | PesignError::SignatureIndexOutOfRange { .. }
            | PesignError::NoSuchSignature(_)
            | PesignError::IncompatibleFlags { .. } => self.to_string(),
            _ => format!("pesign: {self}"),
        }
    }

    /// Plain-text diagnostic report with the error code and help, for
    /// verbose logging.
    #[must_use]
    pub fn narrative(&self) -> String {
        let mut out = String::new();
        if miette::NarratableReportHandler::new()
            .render_report(&mut out, self)
            .is_err()
        {
            return self.to_string();
        }
        out
    }
}

impl From<std::io::Error> for PesignError {
    fn from(error: std::io::Error) -> Self {
        PesignError::io("I/O error", error)
    }
}

impl From<openssl::error::ErrorStack> for PesignError {
    fn from(error: openssl::error::ErrorStack) -> Self {
        PesignError::Cryptographic(error.to_string())
    }
}

impl From<der::Error> for PesignError {
    fn from(error: der::Error) -> Self {
        PesignError::MalformedSignature(format!("ASN.1 encoding error: {error}"))
    }
}

impl From<goblin::error::Error> for PesignError {
    fn from(error: goblin::error::Error) -> Self {
        PesignError::PeParsing(error.to_string())
    }
}

impl From<toml::de::Error> for PesignError {
    fn from(error: toml::de::Error) -> Self {
        PesignError::Configuration(error.to_string())
    }
}
