//! pesign command-line interface
//!
//! Each option sets one or more action flags; the accumulated flags select
//! a single workflow, which runs once. Diagnostics go to stderr and any
//! failure exits with status 1.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use pesign::{
    ActionFlags, ActionWorkflowEngine, ConfigManager, DigestAlgorithm, PesignError,
    PesignResult, SigningOptions,
};

#[derive(Parser, Debug)]
#[command(name = "pesign")]
#[command(about = "Sign, inspect and edit Authenticode signatures of PE/COFF images")]
#[command(long_about = "
pesign - Authenticode signing for PE/COFF (EFI) images

EXAMPLES:
    # Print the Authenticode digest of an image
    pesign -i grubx64.efi -h

    # Sign an image with a certificate from the database
    pesign -i grubx64.efi -o grubx64.signed.efi -c 'Signing Key' -s

    # Export the signed attributes for an external signer, then import the result
    pesign -i grubx64.efi -E grubx64.sattrs
    pesign -i grubx64.efi -o grubx64.signed.efi -c 'Signing Key' -R grubx64.sig -I grubx64.sattrs

    # List and remove embedded signatures
    pesign -i grubx64.signed.efi -S
    pesign -i grubx64.signed.efi -o grubx64.efi -r -u 0

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging level (debug, info, warn, error)
")]
#[command(version, disable_help_flag = true)]
struct Cli {
    /// Image to read
    #[arg(short = 'i', long = "in", value_name = "FILE")]
    infile: Option<PathBuf>,

    /// Image to write
    #[arg(short = 'o', long = "out", value_name = "FILE")]
    outfile: Option<PathBuf>,

    /// Certificate nickname or subject common name
    #[arg(short = 'c', long = "certificate", value_name = "NAME")]
    certificate: Option<String>,

    /// Certificate database directory
    #[arg(short = 'n', long = "certdir", value_name = "DIR")]
    certdir: Option<PathBuf>,

    /// Overwrite existing output files
    #[arg(short = 'f', long)]
    force: bool,

    /// Signature index to operate on
    #[arg(
        short = 'u',
        long = "signature-number",
        value_name = "N",
        allow_negative_numbers = true
    )]
    signature_number: Option<i64>,

    /// Digest algorithm (sha256, sha384, sha512)
    #[arg(short = 'd', long = "digest-type", value_name = "ALG", value_parser = parse_digest)]
    digest_type: Option<DigestAlgorithm>,

    /// Use ASCII armor for exported artifacts
    #[arg(short = 'a', long)]
    ascii_armor: bool,

    /// Pad the image to the certificate table alignment when hashing
    #[arg(short = 'P', long)]
    padding: bool,

    /// Print the image digest
    #[arg(short = 'h', long = "hash")]
    hash: bool,

    /// Leave the .vendor_cert section out of the printed digest
    #[arg(short = 'O', long = "omit-vendor-cert")]
    omit_vendor_cert: bool,

    /// Generate a signature (embedded, or exported with -e)
    #[arg(short = 's', long)]
    sign: bool,

    /// Export a signature to FILE
    #[arg(short = 'e', long = "export-signature", value_name = "FILE")]
    export_signature: Option<PathBuf>,

    /// Import a signature from FILE
    #[arg(short = 'm', long = "import-signature", value_name = "FILE")]
    import_signature: Option<PathBuf>,

    /// Import a raw signature value from FILE
    #[arg(short = 'R', long = "import-raw-signature", value_name = "FILE")]
    import_raw_signature: Option<PathBuf>,

    /// Import signed attributes from FILE
    #[arg(short = 'I', long = "import-signed-attributes", value_name = "FILE")]
    import_signed_attributes: Option<PathBuf>,

    /// Export signed attributes to FILE
    #[arg(short = 'E', long = "export-signed-attributes", value_name = "FILE")]
    export_signed_attributes: Option<PathBuf>,

    /// Export the certificate's public key to FILE
    #[arg(short = 'K', long = "export-pubkey", value_name = "FILE")]
    export_pubkey: Option<PathBuf>,

    /// Export the certificate to FILE
    #[arg(short = 'C', long = "export-cert", value_name = "FILE")]
    export_cert: Option<PathBuf>,

    /// Remove a signature
    #[arg(short = 'r', long = "remove-signature")]
    remove_signature: bool,

    /// List embedded signatures
    #[arg(short = 'S', long = "list-signatures")]
    list_signatures: bool,

    /// Configuration file (defaults to the user configuration directory)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    fn action_flags(&self) -> ActionFlags {
        let mut flags = ActionFlags::empty();
        if self.hash {
            flags |= ActionFlags::GENERATE_DIGEST | ActionFlags::PRINT_DIGEST;
        }
        if self.omit_vendor_cert {
            flags |= ActionFlags::OMIT_VENDOR_CERT;
        }
        if self.sign {
            flags |= ActionFlags::GENERATE_SIGNATURE;
            if self.export_signature.is_none() {
                flags |= ActionFlags::IMPORT_SIGNATURE;
            }
        }
        if self.export_signature.is_some() {
            flags |= ActionFlags::EXPORT_SIGNATURE;
        }
        if self.import_signature.is_some() {
            flags |= ActionFlags::IMPORT_SIGNATURE;
        }
        if self.import_raw_signature.is_some() {
            flags |= ActionFlags::IMPORT_RAW_SIGNATURE;
        }
        if self.import_signed_attributes.is_some() {
            flags |= ActionFlags::IMPORT_SATTRS;
        }
        if self.export_signed_attributes.is_some() {
            flags |= ActionFlags::EXPORT_SATTRS;
        }
        if self.export_pubkey.is_some() {
            flags |= ActionFlags::EXPORT_PUBKEY;
        }
        if self.export_cert.is_some() {
            flags |= ActionFlags::EXPORT_CERT;
        }
        if self.remove_signature {
            flags |= ActionFlags::REMOVE_SIGNATURE;
        }
        if self.list_signatures {
            flags |= ActionFlags::LIST_SIGNATURES;
        }
        flags
    }

    /// Merge command-line values over the configuration file.
    fn signing_options(self) -> PesignResult<SigningOptions> {
        let manager = match &self.config {
            Some(path) => ConfigManager::with_path(path),
            None => ConfigManager::new(),
        };
        let config = if self.config.is_some() {
            manager.load()?
        } else {
            manager.load_or_default()?
        };

        let digest = match self.digest_type {
            Some(digest) => digest,
            None => config.digest_algorithm()?,
        };

        Ok(SigningOptions {
            infile: self.infile,
            outfile: self.outfile,
            certname: self.certificate.or(config.default_certificate),
            certdir: self.certdir.unwrap_or(config.certificate_directory),
            signum: self.signature_number,
            force: self.force,
            ascii: self.ascii_armor || config.ascii_armor,
            padding: self.padding || config.padding,
            digest,
            raw_signature: self.import_raw_signature,
            in_signed_attributes: self.import_signed_attributes,
            out_signed_attributes: self.export_signed_attributes,
            in_signature: self.import_signature,
            out_signature: self.export_signature,
            out_public_key: self.export_pubkey,
            out_certificate: self.export_cert,
        })
    }
}

fn parse_digest(value: &str) -> Result<DigestAlgorithm, String> {
    value.parse().map_err(|e: PesignError| e.to_string())
}

fn run(cli: Cli) -> PesignResult<()> {
    let flags = cli.action_flags();
    let options = cli.signing_options()?;
    let stdout = io::stdout();
    let mut engine = ActionWorkflowEngine::new(options, stdout.lock());
    engine.handle_action(flags)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

fn report(error: &PesignError) {
    eprintln!("{}", error.diagnostic_line());
    log::debug!("{}", error.narrative());
}
