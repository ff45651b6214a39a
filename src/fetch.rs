//! URI streams: local `file://` opens and the remote-fetch collaborator seam.
//!
//! Only `file`, `http`, and `https` schemes are understood.  HTTP(S) bodies
//! come from a process-wide [`RemoteFetch`] implementation registered by the
//! embedder; any retry policy lives inside that collaborator, never here.

use std::error::Error;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::OnceLock;

use thiserror::Error as ThisError;

use crate::reader::ByteSource;

#[derive(ThisError, Debug)]
pub enum FetchError {
    #[error("invalid URI '{0}'")]
    InvalidUri(String),
    #[error("unrecognized or unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("file:// URIs cannot have a host: {0}")]
    FileHost(String),
    #[error("no remote fetcher is registered for '{0}'")]
    NoFetcher(String),
    #[error("failed to fetch '{url}': {source}")]
    Get { url: String, source: Box<dyn Error + Send + Sync> },
    #[error("failed to open '{}': {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },
}

// ── Remote fetch collaborator ────────────────────────────────────────────────

/// HTTP GET collaborator for `http(s)://`-backed archives.
///
/// Implementations are expected to retry transient failures internally and
/// return the final response body as a readable stream.
pub trait RemoteFetch: Send + Sync {
    fn get(&self, url: &str) -> Result<Box<dyn Read>, Box<dyn Error + Send + Sync>>;
}

static REMOTE_FETCHER: OnceLock<Box<dyn RemoteFetch>> = OnceLock::new();

/// Registers the process-wide remote fetcher.  Write-once: returns false if
/// a fetcher was already registered (the existing one is kept).
pub fn set_remote_fetcher(fetcher: Box<dyn RemoteFetch>) -> bool {
    REMOTE_FETCHER.set(fetcher).is_ok()
}

fn remote_fetcher() -> Option<&'static dyn RemoteFetch> {
    REMOTE_FETCHER.get().map(|f| f.as_ref())
}

// ── URI handling ─────────────────────────────────────────────────────────────

/// Scheme / host / path split of a URI.  The path excludes any query string
/// or fragment, so it is safe for suffix-based format detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uri<'a> {
    pub scheme: &'a str,
    pub host: &'a str,
    pub path: &'a str,
}

pub fn parse_uri(uri: &str) -> Result<Uri<'_>, FetchError> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| FetchError::InvalidUri(uri.to_string()))?;
    if scheme.is_empty() {
        return Err(FetchError::InvalidUri(uri.to_string()));
    }
    let rest = match rest.find(|c| c == '?' || c == '#') {
        Some(i) => &rest[..i],
        None => rest,
    };
    let (host, path) = match rest.find('/') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    Ok(Uri { scheme, host, path })
}

/// Opens the raw byte stream behind a URI.
pub fn open_uri_stream(uri: &str) -> Result<ByteSource, FetchError> {
    let parts = parse_uri(uri)?;
    match parts.scheme {
        "http" | "https" => match remote_fetcher() {
            Some(fetcher) => {
                log::debug!("fetching '{uri}'");
                let body = fetcher
                    .get(uri)
                    .map_err(|source| FetchError::Get { url: uri.to_string(), source })?;
                Ok(ByteSource::Stream(body))
            }
            None => Err(FetchError::NoFetcher(uri.to_string())),
        },
        "file" => {
            if !parts.host.is_empty() && parts.host != "localhost" {
                return Err(FetchError::FileHost(parts.host.to_string()));
            }
            let file = File::open(parts.path).map_err(|source| FetchError::Open {
                path: PathBuf::from(parts.path),
                source,
            })?;
            Ok(ByteSource::File(file))
        }
        scheme => Err(FetchError::UnsupportedScheme(scheme.to_string())),
    }
}
