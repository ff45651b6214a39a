//! Archive format identities and filename-suffix detection.
//!
//! The set of on-disk formats is closed: plain tar, gzip-compressed tar, zip,
//! and jar (read exactly like zip).  Detection is purely suffix-based so that
//! multi-dot names such as `my.file.tar.gz` resolve to the right entry; no
//! magic-byte sniffing is performed.

/// On-disk container format of an archive, or [`Format::NotArchive`] when the
/// name matches no known suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    NotArchive,
    Tar,
    TarGzip,
    Zip,
    Jar,
}

/// Filename suffix → format table.  Suffixes are distinct, so table order is
/// not significant.
pub const ARCHIVE_EXTS: &[(&str, Format)] = &[
    (".tar",    Format::Tar),
    (".tgz",    Format::TarGzip),
    (".tar.gz", Format::TarGzip),
    (".zip",    Format::Zip),
    (".jar",    Format::Jar),
];

/// Infers the archive format of `path` from its suffix.
pub fn detect_archive_format(path: &str) -> Format {
    for (ext, format) in ARCHIVE_EXTS {
        if path.ends_with(ext) {
            return *format;
        }
    }
    Format::NotArchive
}

impl Format {
    /// Human-readable name (for diagnostics only — never parsed back).
    pub fn name(self) -> &'static str {
        match self {
            Format::NotArchive => "not-archive",
            Format::Tar        => "tar",
            Format::TarGzip    => "tar.gz",
            Format::Zip        => "zip",
            Format::Jar        => "jar",
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "tar"             => Some(Format::Tar),
            "tgz" | "tar.gz"  => Some(Format::TarGzip),
            "zip"             => Some(Format::Zip),
            "jar"             => Some(Format::Jar),
            _                 => None,
        }
    }
}
