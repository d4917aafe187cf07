//! Archive reading
//!
//! Project files (`.3mf`) are zip containers. The cache only needs a handful
//! of small image entries from them, so readers take a name filter and load
//! just the entries that pass it.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use bytes::Bytes;

/// One entry read from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry path inside the archive
    pub name: String,
    /// Entry contents
    pub data: Bytes,
}

/// Blocking archive reader
///
/// Implementations are called from the blocking thread pool.
pub trait ArchiveReader: Send + Sync + 'static {
    /// Read all entries whose name passes `wanted`, in archive order
    fn read_entries(
        &self,
        path: &Path,
        wanted: &dyn Fn(&str) -> bool,
    ) -> std::io::Result<Vec<ArchiveEntry>>;
}

/// Largest entry a reader loads by default
pub const DEFAULT_MAX_ENTRY_SIZE: u64 = 16 * 1024 * 1024; // 16MB

/// Zip archive reader
#[derive(Debug, Clone, Copy)]
pub struct ZipArchiveReader {
    max_entry_size: u64,
}

impl ZipArchiveReader {
    /// Create a reader with the default entry size limit
    pub fn new() -> Self {
        Self {
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }

    /// Set the largest entry loaded; bigger entries are skipped
    pub fn max_entry_size(mut self, limit: u64) -> Self {
        self.max_entry_size = limit;
        self
    }
}

impl Default for ZipArchiveReader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveReader for ZipArchiveReader {
    fn read_entries(
        &self,
        path: &Path,
        wanted: &dyn Fn(&str) -> bool,
    ) -> std::io::Result<Vec<ArchiveEntry>> {
        let file = File::open(path)?;
        let mut archive = zip::ZipArchive::new(BufReader::new(file)).map_err(invalid_data)?;

        let mut entries = Vec::new();
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(invalid_data)?;
            if entry.is_dir() || !wanted(entry.name()) {
                continue;
            }

            let name = entry.name().to_string();

            // Declared sizes come from the archive header and may lie
            let capacity = entry.size().min(self.max_entry_size) as usize;
            let mut data = Vec::with_capacity(capacity);
            entry
                .by_ref()
                .take(self.max_entry_size + 1)
                .read_to_end(&mut data)?;

            if data.len() as u64 > self.max_entry_size {
                tracing::warn!(
                    path = %path.display(),
                    entry = %name,
                    limit = self.max_entry_size,
                    "Skipping oversized archive entry"
                );
                continue;
            }

            entries.push(ArchiveEntry {
                name,
                data: Bytes::from(data),
            });
        }

        Ok(entries)
    }
}

fn invalid_data(e: zip::result::ZipError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, e)
}
