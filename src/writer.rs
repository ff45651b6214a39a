//! Re-encoding archive members into tar and zip containers.
//!
//! Each writer drains a [`Reader`] to exhaustion.  A per-write set of seen
//! names deduplicates repeated flattened names (overlapping nested archives
//! can legitimately produce the same member twice); only the first
//! occurrence is written.  After every entry the number of bytes actually
//! copied is checked against the blob's declared size — a mismatch means a
//! corrupt or concurrently-mutated source and fails the write outright.

use std::collections::HashSet;
use std::io::{self, Cursor, Read, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use zip::write::SimpleFileOptions;

use crate::archive::ArchiveError;
use crate::reader::Reader;

// Entries carry a fixed mode and no owner/group, so identical contents
// produce identical bytes no matter where they came from.
const TAR_ENTRY_MODE: u32 = 0o600;

/// Encodes the reader's members as a POSIX tar stream.
pub fn write_tar(reader: &mut dyn Reader, w: &mut dyn Write) -> Result<(), ArchiveError> {
    let mut builder = tar::Builder::new(w);
    let mut seen: HashSet<String> = HashSet::new();
    while let Some((name, mut blob)) = reader.next()? {
        if !seen.insert(name.clone()) {
            continue;
        }

        // tar expects exactly the number of bytes the header declares, so
        // the blob is staged and checked before anything hits the sink.
        let declared = blob.size();
        let mut data = Vec::new();
        blob.read_to_end(&mut data)?;
        if data.len() as u64 != declared {
            return Err(ArchiveError::SizeMismatch {
                name,
                expected: declared,
                actual: data.len() as u64,
            });
        }

        let mut header = tar::Header::new_gnu();
        header.set_mode(TAR_ENTRY_MODE);
        header.set_size(declared);
        header.set_cksum();
        builder.append_data(&mut header, &name, data.as_slice())?;
    }
    builder.finish()?;
    Ok(())
}

/// Encodes the reader's members as a gzip-compressed tar stream.
pub fn write_tar_gzip(reader: &mut dyn Reader, w: &mut dyn Write) -> Result<(), ArchiveError> {
    let mut gz = GzEncoder::new(w, Compression::default());
    write_tar(reader, &mut gz)?;
    gz.finish()?;
    Ok(())
}

/// Encodes the reader's members as a zip file.
///
/// `zip::ZipWriter` needs a seekable sink for its central directory, so the
/// output is staged in memory and copied to `w` at the end; the caller keeps
/// a plain `Write` contract.
pub fn write_zip(reader: &mut dyn Reader, w: &mut dyn Write) -> Result<(), ArchiveError> {
    // A nonzero but constant modification time: some consumers reject the
    // zip epoch, and the format cannot represent dates before 1980.
    let modified = zip::DateTime::from_date_and_time(1990, 1, 1, 0, 0, 0)
        .expect("constant zip timestamp is representable");
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(modified);

    let mut staged = Cursor::new(Vec::new());
    {
        let mut zw = zip::ZipWriter::new(&mut staged);
        let mut seen: HashSet<String> = HashSet::new();
        while let Some((name, mut blob)) = reader.next()? {
            if !seen.insert(name.clone()) {
                continue;
            }

            let declared = blob.size();
            zw.start_file(&*name, options)?;
            let copied = io::copy(&mut blob, &mut zw)?;
            if copied != declared {
                return Err(ArchiveError::SizeMismatch {
                    name,
                    expected: declared,
                    actual: copied,
                });
            }
        }
        zw.finish()?;
    }
    w.write_all(&staged.into_inner())?;
    Ok(())
}
