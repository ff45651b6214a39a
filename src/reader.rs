//! Sequential cursors over archive members.
//!
//! Every physical backing — in-memory asset map, directory tree, tar stream,
//! zip file — is read through the same [`Reader`] interface: a single-use
//! cursor of `(name, blob)` pairs.  Names are relative, cleaned, and use
//! forward slashes regardless of the host platform.  A reader releases its
//! resources on drop, including any nested sub-readers opened while
//! flattening an asset map.

use std::collections::{BTreeMap, VecDeque};
use std::fs::{self, File};
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use walkdir::WalkDir;

use crate::archive::{ArchiveError, AssetOrArchive};
use crate::asset::Blob;
use crate::format::Format;

/// Reserved bookkeeping subdirectory: always excluded from directory-backed
/// archives, the way a VCS state directory would be.
pub const BOOKKEEPING_DIR: &str = ".varc";

/// Presents the contents of an archive as a stream of named blobs.
///
/// The blob returned by a call to `next()` must be read in full (or dropped)
/// before the next call.  Exhaustion is signaled by `Ok(None)`.
pub trait Reader {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError>;
}

/// Raw bytes backing a format-parsed archive: an open file (randomly
/// addressable) or an opaque stream that must be buffered for formats
/// needing random access.
pub enum ByteSource {
    File(File),
    Stream(Box<dyn Read>),
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ByteSource::File(f)   => f.read(buf),
            ByteSource::Stream(s) => s.read(buf),
        }
    }
}

/// Normalizes an archive member name: drops `.` segments, resolves `..`
/// where possible, collapses repeated slashes.
pub(crate) fn clean_name(name: &str) -> String {
    let rooted = name.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for seg in name.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => { parts.pop(); }
                _ if rooted => {}
                _ => parts.push(".."),
            },
            _ => parts.push(seg),
        }
    }
    if parts.is_empty() {
        return if rooted { "/".to_string() } else { ".".to_string() };
    }
    let joined = parts.join("/");
    if rooted { format!("/{joined}") } else { joined }
}

// ── Asset-map reader ─────────────────────────────────────────────────────────

/// Flattens an in-memory asset map into a depth-first stream, sorted by name
/// at each level.  Nested archives are opened on demand and their members
/// emitted under a `name/` prefix; a sub-reader is exhausted before the
/// cursor advances to the next key.
pub struct AssetsReader<'a> {
    entries: std::collections::btree_map::Iter<'a, String, AssetOrArchive>,
    sub: Option<(String, Box<dyn Reader + 'a>)>,
    wd: PathBuf,
}

impl<'a> AssetsReader<'a> {
    pub(crate) fn new(assets: &'a BTreeMap<String, AssetOrArchive>, wd: &Path) -> Self {
        AssetsReader { entries: assets.iter(), sub: None, wd: wd.to_path_buf() }
    }
}

impl Reader for AssetsReader<'_> {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError> {
        loop {
            // Drain the sub-archive currently being flattened, if any.
            if let Some((root, sub)) = &mut self.sub {
                if let Some((name, blob)) = sub.next()? {
                    return Ok(Some((clean_name(&format!("{root}/{name}")), blob)));
                }
                self.sub = None;
            }

            match self.entries.next() {
                None => return Ok(None),
                Some((name, AssetOrArchive::Asset(asset))) => {
                    let blob = asset
                        .read_with_wd(&self.wd)
                        .map_err(|source| ArchiveError::ExpandAsset { name: name.clone(), source })?;
                    return Ok(Some((name.clone(), blob)));
                }
                Some((name, AssetOrArchive::Archive(nested))) => {
                    let sub = nested.open_with_wd(&self.wd).map_err(|source| {
                        ArchiveError::ExpandSubArchive { name: name.clone(), source: Box::new(source) }
                    })?;
                    self.sub = Some((name.clone(), sub));
                }
            }
        }
    }
}

// ── Directory reader ─────────────────────────────────────────────────────────

/// Streams a directory tree in deterministic lexical walk order.
///
/// The walk excludes the [`BOOKKEEPING_DIR`] subtree and plain directories.
/// A symlink pointing at a directory contributes nothing; a symlink pointing
/// at a file is archived as a copy of that file's bytes, not as a link.
pub struct DirectoryReader {
    root: PathBuf,
    pending: VecDeque<PathBuf>,
}

impl DirectoryReader {
    pub fn new(root: PathBuf) -> Result<Self, ArchiveError> {
        let mut pending = VecDeque::new();
        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != BOOKKEEPING_DIR);
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            if entry.file_type().is_dir() {
                continue;
            }
            if entry.file_type().is_symlink() {
                let meta = fs::metadata(entry.path()).map_err(|source| ArchiveError::Path {
                    path: entry.path().to_path_buf(),
                    source,
                })?;
                if meta.is_dir() {
                    continue;
                }
            }
            pending.push_back(entry.into_path());
        }
        log::debug!("walked '{}': {} member(s)", root.display(), pending.len());
        Ok(DirectoryReader { root, pending })
    }
}

impl Reader for DirectoryReader {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError> {
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };

        // Crop the path s.t. it is relative to the walked root, then
        // normalize separators to forward slashes.
        let rel = path.strip_prefix(&self.root).unwrap_or(&path);
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let file = File::open(&path)
            .map_err(|source| ArchiveError::Path { path: path.clone(), source })?;
        let blob = Blob::from_file(file)?;
        Ok(Some((clean_name(&name), blob)))
    }
}

// ── Tar reader ───────────────────────────────────────────────────────────────

/// Reads an existing tar stream.  Directory entries are skipped; any other
/// non-file entry type (symlink, fifo, ...) is an error, since it cannot be
/// represented as a named blob.
///
/// `tar::Entries` borrows its archive, so the members are drained into an
/// in-memory queue up front; the cursor contract observed by callers is
/// unchanged.
pub struct TarReader {
    members: VecDeque<(String, Blob)>,
}

impl TarReader {
    pub fn new<R: Read>(src: R) -> Result<Self, ArchiveError> {
        let mut archive = tar::Archive::new(src);
        let mut members = VecDeque::new();
        for entry in archive.entries()? {
            let mut entry = entry?;
            let entry_type = entry.header().entry_type();
            if entry_type.is_dir() {
                continue;
            }
            let name = clean_name(&entry.path()?.to_string_lossy());
            if !entry_type.is_file() {
                return Err(ArchiveError::UnsupportedEntryType(name));
            }
            let size = entry.size();
            let mut data = Vec::new();
            entry.read_to_end(&mut data)?;
            members.push_back((name, Blob::new(Box::new(Cursor::new(data)), size)));
        }
        Ok(TarReader { members })
    }
}

impl Reader for TarReader {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError> {
        Ok(self.members.pop_front())
    }
}

// ── Zip reader ───────────────────────────────────────────────────────────────

pub(crate) trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Reads an existing zip (or jar) file in archive order.  Requires random
/// access to the underlying bytes; non-seekable sources are buffered fully
/// into memory by [`read_archive`].
pub struct ZipReader {
    archive: zip::ZipArchive<Box<dyn ReadSeek>>,
    index: usize,
}

impl ZipReader {
    pub(crate) fn new(src: Box<dyn ReadSeek>) -> Result<Self, ArchiveError> {
        let archive = zip::ZipArchive::new(src)?;
        Ok(ZipReader { archive, index: 0 })
    }
}

impl Reader for ZipReader {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError> {
        while self.index < self.archive.len() {
            let index = self.index;
            self.index += 1;

            let mut file = self.archive.by_index(index).map_err(|source| {
                ArchiveError::ZipEntry { name: format!("#{index}"), source }
            })?;
            // Skip directories, since they aren't included in tar and
            // directory streams either.
            if file.is_dir() {
                continue;
            }

            let name = clean_name(file.name());
            let declared = file.size();
            if declared > i64::MAX as u64 {
                return Err(ArchiveError::EntryTooLarge(name));
            }
            let mut data = Vec::new();
            file.read_to_end(&mut data)?;
            return Ok(Some((name, Blob::new(Box::new(Cursor::new(data)), declared))));
        }
        Ok(None)
    }
}

// ── Format dispatch ──────────────────────────────────────────────────────────

/// Opens a cursor over an already-encoded archive byte source.
pub fn read_archive(src: ByteSource, format: Format) -> Result<Box<dyn Reader>, ArchiveError> {
    match format {
        Format::Tar => Ok(Box::new(TarReader::new(src)?)),
        Format::TarGzip => Ok(Box::new(TarReader::new(GzDecoder::new(src))?)),
        Format::Zip | Format::Jar => {
            let seekable: Box<dyn ReadSeek> = match src {
                ByteSource::File(f) => Box::new(f),
                ByteSource::Stream(mut s) => {
                    let mut data = Vec::new();
                    s.read_to_end(&mut data)?;
                    Box::new(Cursor::new(data))
                }
            };
            Ok(Box::new(ZipReader::new(seekable)?))
        }
        Format::NotArchive => Err(ArchiveError::UnsupportedFormat(format)),
    }
}
