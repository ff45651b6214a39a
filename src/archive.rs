//! High-level [`Archive`] API — the primary embedding surface.
//!
//! An archive is a bundle of named byte blobs with exactly one physical
//! backing: an in-memory map of assets and nested archives, a path on the
//! local filesystem (a directory tree or an already-packed archive file), or
//! a remote URI.  Whatever the backing, an archive can be read as a flat
//! stream of members, re-encoded into tar / tar+gzip / zip, and
//! fingerprinted with a canonical SHA-256 content hash.
//!
//! ```no_run
//! use varc::archive::Archive;
//! use varc::format::Format;
//!
//! let archive = Archive::from_path("site-content")?;
//! let bytes = archive.bytes(Format::TarGzip)?;
//! println!("{} ({} B)", archive.hash().unwrap(), bytes.len());
//! # Ok::<(), varc::archive::ArchiveError>(())
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::asset::{Asset, AssetError};
use crate::fetch::{self, FetchError};
use crate::format::{detect_archive_format, Format};
use crate::reader::{read_archive, AssetsReader, ByteSource, DirectoryReader, Reader};
use crate::writer;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("path cannot be empty when constructing a path archive")]
    EmptyPath,
    #[error("uri cannot be empty when constructing a uri archive")]
    EmptyUri,
    #[error("archive has no contents to read")]
    NoContents,
    #[error("couldn't read archive path '{}': {source}", .path.display())]
    Path { path: PathBuf, source: io::Error },
    #[error("'{}' is neither a recognized archive type nor a directory", .0.display())]
    NotArchiveOrDirectory(PathBuf),
    #[error("file at URL '{0}' is not a recognized archive format")]
    UriNotArchive(String),
    #[error("unsupported archive format: {}", .0.name())]
    UnsupportedFormat(Format),
    #[error("failed to expand archive asset '{name}': {source}")]
    ExpandAsset { name: String, source: AssetError },
    #[error("failed to expand sub-archive '{name}': {source}")]
    ExpandSubArchive { name: String, source: Box<ArchiveError> },
    #[error("incorrect blob size for {name}: expected {expected}, got {actual}")]
    SizeMismatch { name: String, expected: u64, actual: u64 },
    #[error("unsupported tar entry type for '{0}'")]
    UnsupportedEntryType(String),
    #[error("failed to read ZIP inner file {name}: {source}")]
    ZipEntry { name: String, source: zip::result::ZipError },
    #[error("file {0} is too large to read")]
    EntryTooLarge(String),
    #[error("failed to read ZIP: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── Archive ──────────────────────────────────────────────────────────────────

/// Element type of a map-backed archive: a leaf asset or a nested archive,
/// composing to arbitrary depth.
#[derive(Debug, Clone)]
pub enum AssetOrArchive {
    Asset(Asset),
    Archive(Archive),
}

/// Physical backing of an archive.  Exactly one case is set; an empty asset
/// map is a legal archive with zero members.
#[derive(Debug, Clone)]
pub(crate) enum Backing {
    Assets(BTreeMap<String, AssetOrArchive>),
    Path(PathBuf),
    Uri(String),
}

/// A content-addressable bundle of named byte blobs.
///
/// Immutable once constructed, except for the content hash, which is
/// computed lazily and memoized write-once.
#[derive(Debug, Clone)]
pub struct Archive {
    pub(crate) backing: Backing,
    pub(crate) hash: OnceLock<String>,
}

impl Archive {
    // ── Constructors ─────────────────────────────────────────────────────────

    /// Produces a map-backed archive and its content hash, resolving any
    /// relative asset paths against the process working directory.
    pub fn from_assets(assets: BTreeMap<String, AssetOrArchive>) -> Result<Self, ArchiveError> {
        let wd = std::env::current_dir()?;
        Self::from_assets_with_wd(assets, &wd)
    }

    pub fn from_assets_with_wd(
        assets: BTreeMap<String, AssetOrArchive>,
        wd: &Path,
    ) -> Result<Self, ArchiveError> {
        let archive = Archive { backing: Backing::Assets(assets), hash: OnceLock::new() };
        archive.ensure_hash_with_wd(wd)?;
        Ok(archive)
    }

    /// Produces a path-backed archive and its content hash.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let wd = std::env::current_dir()?;
        Self::from_path_with_wd(path, &wd)
    }

    pub fn from_path_with_wd(path: impl Into<PathBuf>, wd: &Path) -> Result<Self, ArchiveError> {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return Err(ArchiveError::EmptyPath);
        }
        let archive = Archive { backing: Backing::Path(path), hash: OnceLock::new() };
        archive.ensure_hash_with_wd(wd)?;
        Ok(archive)
    }

    /// Produces a URI-backed archive and its content hash.
    pub fn from_uri(uri: impl Into<String>) -> Result<Self, ArchiveError> {
        let wd = std::env::current_dir()?;
        Self::from_uri_with_wd(uri, &wd)
    }

    pub fn from_uri_with_wd(uri: impl Into<String>, wd: &Path) -> Result<Self, ArchiveError> {
        let uri = uri.into();
        if uri.is_empty() {
            return Err(ArchiveError::EmptyUri);
        }
        let archive = Archive { backing: Backing::Uri(uri), hash: OnceLock::new() };
        archive.ensure_hash_with_wd(wd)?;
        Ok(archive)
    }

    /// Rebuilds an archive from its wire parts without touching the source.
    pub(crate) fn from_wire(backing: Backing, hash: Option<String>) -> Self {
        let cell = OnceLock::new();
        if let Some(h) = hash {
            let _ = cell.set(h);
        }
        Archive { backing, hash: cell }
    }

    // ── Predicates & accessors ───────────────────────────────────────────────

    /// True when the archive is map-backed.  A map-backed archive whose map
    /// is empty is indistinguishable, once only a hash is known, from one
    /// whose contents are simply not resolved yet: if the memoized hash is
    /// absent or equals the empty-archive digest the value is treated as a
    /// genuinely empty map, otherwise as an unresolved placeholder.
    pub fn is_assets(&self) -> bool {
        match &self.backing {
            Backing::Path(_) | Backing::Uri(_) => false,
            Backing::Assets(map) => {
                !map.is_empty()
                    || match self.hash.get() {
                        None => true,
                        Some(hash) => hash == empty_archive_hash(),
                    }
            }
        }
    }

    pub fn is_path(&self) -> bool {
        matches!(&self.backing, Backing::Path(_))
    }

    pub fn is_uri(&self) -> bool {
        matches!(&self.backing, Backing::Uri(_))
    }

    /// Whether the archive's contents can be read at all.
    pub fn has_contents(&self) -> bool {
        self.is_assets() || self.is_path() || self.is_uri()
    }

    pub fn assets(&self) -> Option<&BTreeMap<String, AssetOrArchive>> {
        match &self.backing {
            Backing::Assets(map) if self.is_assets() => Some(map),
            _ => None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.backing {
            Backing::Path(path) => Some(path),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.backing {
            Backing::Uri(uri) => Some(uri),
            _ => None,
        }
    }

    /// The memoized content hash, when already computed.
    pub fn hash(&self) -> Option<&str> {
        self.hash.get().map(String::as_str)
    }

    /// Value equality, determined solely by content hash: archives from
    /// different sources are equal when their hashes match, and archives
    /// whose hashes cannot be resolved are never equal.
    pub fn equals(&self, other: &Archive) -> bool {
        if self.ensure_hash().is_err() || other.ensure_hash().is_err() {
            return false;
        }
        self.hash() == other.hash()
    }

    // ── Reading ──────────────────────────────────────────────────────────────

    /// Opens a cursor over the named blobs that comprise the archive,
    /// resolving relative paths against the process working directory.
    pub fn open(&self) -> Result<Box<dyn Reader + '_>, ArchiveError> {
        let wd = std::env::current_dir()?;
        self.open_with_wd(&wd)
    }

    /// Opens a cursor over the named blobs that comprise the archive.
    pub fn open_with_wd(&self, wd: &Path) -> Result<Box<dyn Reader + '_>, ArchiveError> {
        match &self.backing {
            Backing::Assets(map) => {
                if !self.is_assets() {
                    // Placeholder: only a (non-empty) hash is known.
                    return Err(ArchiveError::NoContents);
                }
                Ok(Box::new(AssetsReader::new(map, wd)))
            }
            Backing::Path(path) => open_path(path, wd),
            Backing::Uri(uri) => open_uri(uri),
        }
    }

    /// Returns the archive's native format and a raw byte stream of the
    /// underlying file/response when the backing is already an encoded
    /// archive (path- or URI-backed with a recognized suffix); `None`
    /// otherwise.  No parsing is performed.
    pub fn read_source_archive(&self) -> Result<Option<(Format, ByteSource)>, ArchiveError> {
        let wd = std::env::current_dir()?;
        self.read_source_archive_with_wd(&wd)
    }

    pub fn read_source_archive_with_wd(
        &self,
        wd: &Path,
    ) -> Result<Option<(Format, ByteSource)>, ArchiveError> {
        match &self.backing {
            Backing::Assets(_) => Ok(None),
            Backing::Path(path) => {
                let path = absolutize(path, wd);
                let format = detect_archive_format(&path.to_string_lossy());
                if format == Format::NotArchive {
                    return Ok(None);
                }
                let file = File::open(&path)
                    .map_err(|source| ArchiveError::Path { path, source })?;
                Ok(Some((format, ByteSource::File(file))))
            }
            Backing::Uri(uri) => {
                // A malformed URI disables the fast path; the full open
                // reports the parse error with context instead.
                let Ok(parts) = fetch::parse_uri(uri) else {
                    return Ok(None);
                };
                let format = detect_archive_format(parts.path);
                if format == Format::NotArchive {
                    return Ok(None);
                }
                let src = fetch::open_uri_stream(uri)?;
                Ok(Some((format, src)))
            }
        }
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Produces a single archive stream in the desired format, copying the
    /// underlying bytes verbatim when the source is already encoded in that
    /// format and re-encoding member by member otherwise.
    pub fn archive(&self, format: Format, w: &mut dyn Write) -> Result<(), ArchiveError> {
        let wd = std::env::current_dir()?;
        self.archive_with_wd(format, w, &wd)
    }

    pub fn archive_with_wd(
        &self,
        format: Format,
        w: &mut dyn Write,
        wd: &Path,
    ) -> Result<(), ArchiveError> {
        if let Some((source_format, mut src)) = self.read_source_archive_with_wd(wd)? {
            if source_format == format {
                log::debug!("source is already {}; copying raw bytes", format.name());
                io::copy(&mut src, w)?;
                return Ok(());
            }
        }

        match format {
            Format::Tar => writer::write_tar(self.open_with_wd(wd)?.as_mut(), w),
            Format::TarGzip => writer::write_tar_gzip(self.open_with_wd(wd)?.as_mut(), w),
            Format::Zip => writer::write_zip(self.open_with_wd(wd)?.as_mut(), w),
            Format::Jar | Format::NotArchive => Err(ArchiveError::UnsupportedFormat(format)),
        }
    }

    /// Fetches the archive contents as a byte vector.  The least efficient
    /// way to use the streaming machinery, but handy for APIs that demand
    /// `Vec<u8>`.
    pub fn bytes(&self, format: Format) -> Result<Vec<u8>, ArchiveError> {
        let wd = std::env::current_dir()?;
        self.bytes_with_wd(format, &wd)
    }

    pub fn bytes_with_wd(&self, format: Format, wd: &Path) -> Result<Vec<u8>, ArchiveError> {
        let mut data = Vec::new();
        self.archive_with_wd(format, &mut data, wd)?;
        Ok(data)
    }

    // ── Hashing ──────────────────────────────────────────────────────────────

    /// Computes and memoizes the SHA-256 of the archive's contents.  A no-op
    /// once the hash is set.
    pub fn ensure_hash(&self) -> Result<(), ArchiveError> {
        let wd = std::env::current_dir()?;
        self.ensure_hash_with_wd(&wd)
    }

    pub fn ensure_hash_with_wd(&self, wd: &Path) -> Result<(), ArchiveError> {
        if self.hash.get().is_some() {
            return Ok(());
        }

        let mut hasher = Sha256::new();
        if let Some((_, mut src)) = self.read_source_archive_with_wd(wd)? {
            // Fast path: the backing is already an encoded archive, so hash
            // its raw bytes without parsing or re-encoding anything.
            io::copy(&mut src, &mut hasher)?;
        } else {
            // Synthesize a canonical encoding.  Tar performs no compression,
            // so no compressor settings can perturb the digest.
            self.archive_with_wd(Format::Tar, &mut hasher, wd)?;
        }
        let _ = self.hash.set(hex::encode(hasher.finalize()));
        Ok(())
    }
}

/// Hex SHA-256 of the canonical empty archive (an empty tar stream),
/// computed once from the actual encoder output rather than hardcoded.
pub fn empty_archive_hash() -> &'static str {
    static EMPTY_HASH: OnceLock<String> = OnceLock::new();
    EMPTY_HASH.get_or_init(|| {
        let bytes = tar::Builder::new(Vec::new())
            .into_inner()
            .expect("writing an empty tar to memory cannot fail");
        hex::encode(Sha256::digest(&bytes))
    })
}

fn absolutize(path: &Path, wd: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        wd.join(path)
    }
}

fn open_path(path: &Path, wd: &Path) -> Result<Box<dyn Reader + 'static>, ArchiveError> {
    let path = absolutize(path, wd);
    let format = detect_archive_format(&path.to_string_lossy());

    if format == Format::NotArchive {
        // Not an archive file; if it is a directory, expand it out
        // uncompressed as an archive.
        let meta = fs::metadata(&path)
            .map_err(|source| ArchiveError::Path { path: path.clone(), source })?;
        if !meta.is_dir() {
            return Err(ArchiveError::NotArchiveOrDirectory(path));
        }
        return Ok(Box::new(DirectoryReader::new(path)?));
    }

    let file = File::open(&path)
        .map_err(|source| ArchiveError::Path { path: path.clone(), source })?;
    read_archive(ByteSource::File(file), format)
}

fn open_uri(uri: &str) -> Result<Box<dyn Reader + 'static>, ArchiveError> {
    // The format comes from the URL's path component; query and fragment
    // never participate in suffix matching.
    let parts = fetch::parse_uri(uri)?;
    let format = detect_archive_format(parts.path);
    if format == Format::NotArchive {
        return Err(ArchiveError::UriNotArchive(uri.to_string()));
    }
    let src = fetch::open_uri_stream(uri)?;
    read_archive(src, format)
}
