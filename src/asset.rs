//! Leaf assets — single named byte resources and their streams.
//!
//! An [`Asset`] is the leaf element of an archive: either a literal text
//! value or a file on the local filesystem.  Reading an asset yields a
//! [`Blob`], a single-use byte stream with a declared total length.  Assets
//! are content-addressed: the SHA-256 of the raw contents is computed once
//! and memoized on the value.

use std::fmt;
use std::fs::File;
use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to open asset file '{}': {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
    #[error("asset path '{}' is a directory; try using an archive", .0.display())]
    IsDirectory(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Blob ─────────────────────────────────────────────────────────────────────

/// A single-use readable byte stream with a declared total length.
///
/// The declared length is what the producer *claims*; format writers verify
/// it against the bytes actually copied and fail the write on a mismatch.
/// A blob must be fully consumed or dropped before the next member of the
/// same cursor is requested.
pub struct Blob {
    size: u64,
    body: Box<dyn Read>,
}

impl Blob {
    /// Wraps a raw stream with a declared length.  The length is not checked
    /// here; consumers detect disagreement when they drain the stream.
    pub fn new(body: Box<dyn Read>, size: u64) -> Self {
        Blob { size, body }
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Blob { size, body: Box::new(Cursor::new(data)) }
    }

    /// Wraps an open file, taking the length from its metadata.
    pub fn from_file(file: File) -> io::Result<Self> {
        let size = file.metadata()?.len();
        Ok(Blob { size, body: Box::new(file) })
    }

    /// Declared total length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for Blob {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob").field("size", &self.size).finish()
    }
}

// ── Asset ────────────────────────────────────────────────────────────────────

/// Payload of an [`Asset`].  Exactly one source backs each asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Source {
    Text(String),
    Path(PathBuf),
}

/// A leaf byte resource: literal text or a file on the local filesystem.
///
/// The content hash is the only field ever written after construction, and
/// only from unset to its final value.
#[derive(Debug, Clone)]
pub struct Asset {
    pub(crate) source: Source,
    pub(crate) hash: OnceLock<String>,
}

impl Asset {
    /// Produces a text asset and its content hash.
    pub fn from_text(text: impl Into<String>) -> Result<Self, AssetError> {
        let asset = Asset { source: Source::Text(text.into()), hash: OnceLock::new() };
        asset.ensure_hash_with_wd(Path::new("."))?;
        Ok(asset)
    }

    /// Produces a path asset and its content hash, resolving relative paths
    /// against the process working directory.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, AssetError> {
        let wd = std::env::current_dir()?;
        Self::from_path_with_wd(path, &wd)
    }

    pub fn from_path_with_wd(path: impl Into<PathBuf>, wd: &Path) -> Result<Self, AssetError> {
        let asset = Asset { source: Source::Path(path.into()), hash: OnceLock::new() };
        asset.ensure_hash_with_wd(wd)?;
        Ok(asset)
    }

    /// Rebuilds an asset from its wire parts without touching the source.
    pub(crate) fn from_wire(source: Source, hash: Option<String>) -> Self {
        let cell = OnceLock::new();
        if let Some(h) = hash {
            let _ = cell.set(h);
        }
        Asset { source, hash: cell }
    }

    pub fn is_text(&self) -> bool {
        matches!(self.source, Source::Text(_))
    }

    pub fn is_path(&self) -> bool {
        matches!(self.source, Source::Path(_))
    }

    pub fn text(&self) -> Option<&str> {
        match &self.source {
            Source::Text(t) => Some(t),
            Source::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            Source::Path(p) => Some(p),
            Source::Text(_) => None,
        }
    }

    /// The memoized content hash, when already computed.
    pub fn hash(&self) -> Option<&str> {
        self.hash.get().map(String::as_str)
    }

    /// Opens the asset's contents as a [`Blob`].
    pub fn read_with_wd(&self, wd: &Path) -> Result<Blob, AssetError> {
        match &self.source {
            Source::Text(text) => Ok(Blob::from_bytes(text.clone().into_bytes())),
            Source::Path(path) => {
                let path = if path.is_absolute() { path.clone() } else { wd.join(path) };
                let file = File::open(&path)
                    .map_err(|source| AssetError::Open { path: path.clone(), source })?;
                if file.metadata()?.is_dir() {
                    return Err(AssetError::IsDirectory(path));
                }
                Ok(Blob::from_file(file)?)
            }
        }
    }

    pub fn read(&self) -> Result<Blob, AssetError> {
        let wd = std::env::current_dir()?;
        self.read_with_wd(&wd)
    }

    /// Computes and memoizes the SHA-256 of the asset's contents.  A no-op
    /// once the hash is set.
    pub fn ensure_hash_with_wd(&self, wd: &Path) -> Result<(), AssetError> {
        if self.hash.get().is_some() {
            return Ok(());
        }
        let mut blob = self.read_with_wd(wd)?;
        let mut hasher = Sha256::new();
        io::copy(&mut blob, &mut hasher)?;
        let _ = self.hash.set(hex::encode(hasher.finalize()));
        Ok(())
    }

    pub fn ensure_hash(&self) -> Result<(), AssetError> {
        let wd = std::env::current_dir()?;
        self.ensure_hash_with_wd(&wd)
    }

    /// Value equality: same source and same (possibly unset) hash.
    pub fn equals(&self, other: &Asset) -> bool {
        self.source == other.source && self.hash() == other.hash()
    }
}
