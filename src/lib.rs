pub mod archive;
pub mod asset;
pub mod fetch;
pub mod format;
pub mod reader;
pub mod wire;
pub mod writer;

pub use archive::{empty_archive_hash, Archive, ArchiveError, AssetOrArchive};
pub use asset::{Asset, AssetError, Blob};
pub use fetch::{FetchError, RemoteFetch};
pub use format::{detect_archive_format, Format};
pub use reader::{Reader, BOOKKEEPING_DIR};
pub use wire::WireError;
