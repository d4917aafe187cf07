//! Preview images from project archives

pub mod archive;
pub mod cache;

pub use archive::{ArchiveEntry, ArchiveReader, ZipArchiveReader, DEFAULT_MAX_ENTRY_SIZE};
pub use cache::{archive_name_for, ThumbnailCache, ThumbnailPattern};
