//! File handles for the image and the artifacts a workflow reads or writes.
//!
//! Every handle owns its `File`; dropping it closes the descriptor, so an
//! early error return never leaks an open file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::domain::pe::PeImage;
use crate::infra::error::{PesignError, PesignResult};

/// Artifacts exchanged with the outside world besides the image itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRole {
    RawSignature,
    SignedAttributes,
    Signature,
    PublicKey,
    Certificate,
}

impl FileRole {
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            FileRole::RawSignature => "raw signature",
            FileRole::SignedAttributes => "signed attributes",
            FileRole::Signature => "signature",
            FileRole::PublicKey => "pubkey",
            FileRole::Certificate => "certificate",
        }
    }
}

/// Whether two paths name the same file, textually or after resolution.
#[must_use]
pub fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn create_output(path: &Path, force: bool, mode: Option<u32>) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).truncate(true);
    if force {
        options.create(true);
    } else {
        options.create_new(true);
    }
    #[cfg(unix)]
    if let Some(mode) = mode {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;
    options.open(path)
}

fn refuse_existing(path: &Path, force: bool) -> PesignResult<()> {
    if !force && path.exists() {
        return Err(PesignError::Precondition(format!(
            "\"{}\" exists and --force was not given.",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn file_mode(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn file_mode(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

/// An artifact opened for reading.
#[derive(Debug)]
pub struct InputFile {
    role: FileRole,
    path: PathBuf,
    file: File,
}

impl InputFile {
    pub fn open(role: FileRole, path: Option<&Path>) -> PesignResult<Self> {
        let path = path.ok_or_else(|| {
            PesignError::MissingPath(format!(
                "No input file specified for {}",
                role.description()
            ))
        })?;
        let file = File::open(path).map_err(|e| {
            PesignError::io(
                format!(
                    "Error opening {} file \"{}\" for input",
                    role.description(),
                    path.display()
                ),
                e,
            )
        })?;
        Ok(Self {
            role,
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn read_all(&mut self) -> PesignResult<Vec<u8>> {
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes).map_err(|e| {
            PesignError::io(
                format!(
                    "Error reading {} file \"{}\"",
                    self.role.description(),
                    self.path.display()
                ),
                e,
            )
        })?;
        Ok(bytes)
    }
}

/// An artifact opened for writing.
#[derive(Debug)]
pub struct OutputFile {
    role: FileRole,
    path: PathBuf,
    file: File,
}

impl OutputFile {
    pub fn create(
        role: FileRole,
        path: Option<&Path>,
        force: bool,
        mode: Option<u32>,
    ) -> PesignResult<Self> {
        let path = path.ok_or_else(|| {
            PesignError::MissingPath(format!(
                "No output file specified for {}.",
                role.description()
            ))
        })?;
        refuse_existing(path, force)?;
        let file = create_output(path, force, mode).map_err(|e| {
            PesignError::io(
                format!(
                    "Error opening {} file \"{}\" for output",
                    role.description(),
                    path.display()
                ),
                e,
            )
        })?;
        Ok(Self {
            role,
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> PesignResult<()> {
        self.file.write_all(bytes).map_err(|e| {
            PesignError::io(
                format!(
                    "Error writing {} file \"{}\"",
                    self.role.description(),
                    self.path.display()
                ),
                e,
            )
        })
    }

    /// Flush to disk and close.
    pub fn close(self) -> PesignResult<()> {
        self.file.sync_all().map_err(|e| {
            PesignError::io(format!("Error closing \"{}\"", self.path.display()), e)
        })
    }
}

/// The image being read.
#[derive(Debug)]
pub struct InputImage {
    path: PathBuf,
    mode: Option<u32>,
    image: PeImage,
    _file: File,
}

impl InputImage {
    pub fn open(path: Option<&Path>) -> PesignResult<Self> {
        let path = path
            .ok_or_else(|| PesignError::MissingPath("No input file specified.".into()))?;
        let mut file = File::open(path)
            .map_err(|e| PesignError::io("Error opening input", e))?;
        let metadata = file
            .metadata()
            .map_err(|e| PesignError::io("Error opening input", e))?;
        let mut bytes = Vec::with_capacity(metadata.len() as usize);
        file.read_to_end(&mut bytes)
            .map_err(|e| PesignError::io("Error reading input", e))?;
        let image = PeImage::parse(bytes).map_err(|e| {
            PesignError::PeParsing(format!("could not load input file: {e}"))
        })?;
        log::info!("opened input {} ({} bytes)", path.display(), image.len());
        Ok(Self {
            path: path.to_path_buf(),
            mode: file_mode(&metadata),
            image,
            _file: file,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Permission bits of the input, applied to files created from it.
    #[must_use]
    pub fn mode(&self) -> Option<u32> {
        self.mode
    }

    #[must_use]
    pub fn image(&self) -> &PeImage {
        &self.image
    }
}

/// The image being written.
///
/// Opening copies the input byte for byte and then clears the certificate
/// table in memory; the file only receives the final image on `finalize`.
#[derive(Debug)]
pub struct OutputImage {
    path: PathBuf,
    file: File,
    image: PeImage,
}

impl OutputImage {
    pub fn open(input: &InputImage, path: Option<&Path>, force: bool) -> PesignResult<Self> {
        let path = path
            .ok_or_else(|| PesignError::MissingPath("No output file specified.".into()))?;
        refuse_existing(path, force)?;
        let mut file = create_output(path, force, input.mode())
            .map_err(|e| PesignError::io("Error opening output", e))?;

        let bytes = input.image().as_bytes();
        file.set_len(bytes.len() as u64)
            .and_then(|()| file.write_all(bytes))
            .map_err(|e| PesignError::io("Error writing output", e))?;

        let mut image = PeImage::parse(bytes.to_vec())?;
        image.clear_certificate_table()?;
        log::info!("opened output {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
            image,
        })
    }

    #[must_use]
    pub fn image(&self) -> &PeImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut PeImage {
        &mut self.image
    }

    /// Replace the file content with the in-memory image and close it.
    pub fn finalize(mut self) -> PesignResult<()> {
        let bytes = self.image.as_bytes();
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.set_len(bytes.len() as u64))
            .and_then(|()| self.file.write_all(bytes))
            .and_then(|()| self.file.sync_all())
            .map_err(|e| PesignError::io("Error writing output", e))?;
        log::info!(
            "wrote {} ({} bytes)",
            self.path.display(),
            bytes.len()
        );
        Ok(())
    }
}
