//! Thumbnail cache
//!
//! Serves preview images embedded in project archives. The archive for a job
//! is found by swapping the job file's extension for `.3mf` and looking it up
//! in a fixed directory.
//!
//! The cache is append-only: an entry, once stored, is returned for the rest
//! of the process lifetime and nothing is ever evicted. Memory use therefore
//! grows with the number of distinct archives requested. Only successful
//! extractions are cached, so a missing archive is looked up again next time.
//! Misses are read one at a time, so concurrent requests for the same archive
//! open it only once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{Mutex, RwLock};

use super::archive::{ArchiveEntry, ArchiveReader, ZipArchiveReader};

/// Extension of project archives
pub const ARCHIVE_EXTENSION: &str = "3mf";

/// Thumbnail entry patterns, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailPattern {
    /// `Metadata/plate_<n>.png`
    PlatePreview,
    /// `thumbnail.png` in any directory
    Thumbnail,
    /// `preview.png` in any directory
    Preview,
}

impl ThumbnailPattern {
    /// All patterns in priority order
    pub const PRIORITY: [ThumbnailPattern; 3] = [
        ThumbnailPattern::PlatePreview,
        ThumbnailPattern::Thumbnail,
        ThumbnailPattern::Preview,
    ];

    /// Whether an archive entry path matches this pattern (case-insensitive)
    pub fn matches(self, entry_name: &str) -> bool {
        let name = entry_name.to_ascii_lowercase();
        match self {
            ThumbnailPattern::PlatePreview => is_plate_preview(&name),
            ThumbnailPattern::Thumbnail => name.ends_with("thumbnail.png"),
            ThumbnailPattern::Preview => name.ends_with("preview.png"),
        }
    }

    /// Whether any pattern matches
    pub fn any(entry_name: &str) -> bool {
        Self::PRIORITY.iter().any(|p| p.matches(entry_name))
    }
}

fn is_plate_preview(name: &str) -> bool {
    const PREFIX: &str = "metadata/plate_";

    let Some(stem) = name.strip_suffix(".png") else {
        return false;
    };
    let Some(at) = stem.rfind(PREFIX) else {
        return false;
    };

    let number = &stem[at + PREFIX.len()..];
    !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit())
}

/// Pick the entry matching the highest-priority pattern
fn select_thumbnail(entries: Vec<ArchiveEntry>) -> Option<ArchiveEntry> {
    let pos = ThumbnailPattern::PRIORITY
        .iter()
        .find_map(|pattern| entries.iter().position(|e| pattern.matches(&e.name)))?;
    entries.into_iter().nth(pos)
}

/// Archive filename for a job filename, e.g. `plate_1.gcode` → `plate_1.3mf`
pub fn archive_name_for(gcode_filename: &str) -> Option<String> {
    let stem = Path::new(gcode_filename).file_stem()?.to_str()?;
    if stem.is_empty() {
        return None;
    }
    Some(format!("{}.{}", stem, ARCHIVE_EXTENSION))
}

/// Memoizing thumbnail extractor
pub struct ThumbnailCache {
    /// Directory holding project archives
    archive_dir: PathBuf,
    reader: Arc<dyn ArchiveReader>,
    entries: RwLock<HashMap<String, Bytes>>,

    /// Held while an archive is read after a miss
    misses: Mutex<()>,
}

impl ThumbnailCache {
    /// Create a cache reading zip archives from `archive_dir`
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self::with_reader(archive_dir, Arc::new(ZipArchiveReader::new()))
    }

    /// Create a cache with a custom archive reader
    pub fn with_reader(archive_dir: impl Into<PathBuf>, reader: Arc<dyn ArchiveReader>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
            reader,
            entries: RwLock::new(HashMap::new()),
            misses: Mutex::new(()),
        }
    }

    /// Directory holding project archives
    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Thumbnail for the archive matching a job filename
    pub async fn thumbnail_for_gcode(&self, gcode_filename: &str) -> Option<Bytes> {
        let archive = archive_name_for(gcode_filename)?;
        self.extract_thumbnail(&archive).await
    }

    /// Thumbnail embedded in an archive, from cache when available
    pub async fn extract_thumbnail(&self, archive_name: &str) -> Option<Bytes> {
        if let Some(data) = self.entries.read().await.get(archive_name) {
            return Some(data.clone());
        }

        // Archive names come from device telemetry; never leave the archive directory
        if archive_name.is_empty()
            || archive_name.contains(['/', '\\'])
            || archive_name == ".."
        {
            tracing::warn!(archive = %archive_name, "Rejected archive name");
            return None;
        }

        let _miss = self.misses.lock().await;
        if let Some(data) = self.entries.read().await.get(archive_name) {
            return Some(data.clone());
        }

        let path = self.archive_dir.join(archive_name);
        let reader = Arc::clone(&self.reader);
        let read_path = path.clone();
        let result = tokio::task::spawn_blocking(move || {
            reader.read_entries(&read_path, &ThumbnailPattern::any)
        })
        .await;

        let entries = match result {
            Ok(Ok(entries)) => entries,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Archive not found");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read archive");
                return None;
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "Archive read task failed");
                return None;
            }
        };

        let Some(entry) = select_thumbnail(entries) else {
            tracing::debug!(archive = %archive_name, "No thumbnail in archive");
            return None;
        };

        tracing::debug!(
            archive = %archive_name,
            entry = %entry.name,
            size = entry.data.len(),
            "Thumbnail extracted"
        );

        let mut cache = self.entries.write().await;
        let data = cache
            .entry(archive_name.to_string())
            .or_insert(entry.data)
            .clone();
        Some(data)
    }

    /// Number of cached thumbnails
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether nothing is cached
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop every cached thumbnail
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    type Files = &'static [(&'static str, &'static str)];

    /// In-memory reader counting archive opens
    struct CountingReader {
        archives: HashMap<String, Files>,
        opens: AtomicUsize,
    }

    impl CountingReader {
        fn new(archives: &[(&str, Files)]) -> Arc<Self> {
            Arc::new(Self {
                archives: archives
                    .iter()
                    .map(|(name, files)| (name.to_string(), *files))
                    .collect(),
                opens: AtomicUsize::new(0),
            })
        }

        fn opens(&self) -> usize {
            self.opens.load(Ordering::SeqCst)
        }
    }

    impl ArchiveReader for CountingReader {
        fn read_entries(
            &self,
            path: &Path,
            wanted: &dyn Fn(&str) -> bool,
        ) -> std::io::Result<Vec<ArchiveEntry>> {
            self.opens.fetch_add(1, Ordering::SeqCst);

            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            let files = self
                .archives
                .get(name)
                .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;

            Ok(files
                .iter()
                .filter(|(entry, _)| wanted(entry))
                .map(|(entry, data)| ArchiveEntry {
                    name: entry.to_string(),
                    data: Bytes::from_static(data.as_bytes()),
                })
                .collect())
        }
    }

    #[test]
    fn test_archive_name_for() {
        assert_eq!(archive_name_for("plate_1.gcode").as_deref(), Some("plate_1.3mf"));
        assert_eq!(
            archive_name_for("/data/Metadata/benchy.gcode.3mf").as_deref(),
            Some("benchy.gcode.3mf")
        );
        assert_eq!(archive_name_for("noext").as_deref(), Some("noext.3mf"));
        assert_eq!(archive_name_for(""), None);
    }

    #[test]
    fn test_patterns() {
        assert!(ThumbnailPattern::PlatePreview.matches("Metadata/plate_1.png"));
        assert!(ThumbnailPattern::PlatePreview.matches("metadata/PLATE_12.PNG"));
        assert!(!ThumbnailPattern::PlatePreview.matches("Metadata/plate_1_small.png"));
        assert!(!ThumbnailPattern::PlatePreview.matches("Metadata/plate_.png"));
        assert!(ThumbnailPattern::Thumbnail.matches("Metadata/thumbnail.png"));
        assert!(ThumbnailPattern::Thumbnail.matches("thumbnail.png"));
        assert!(ThumbnailPattern::Preview.matches("Auxiliaries/preview.png"));
        assert!(!ThumbnailPattern::any("3D/3dmodel.model"));
    }

    #[tokio::test]
    async fn test_priority_order() {
        let reader = CountingReader::new(&[(
            "part.3mf",
            &[
                ("preview.png", "preview"),
                ("Metadata/thumbnail.png", "thumb"),
                ("Metadata/plate_2.png", "plate-2"),
                ("Metadata/plate_1.png", "plate-1"),
            ],
        )]);
        let cache = ThumbnailCache::with_reader("/archives", reader);

        // Plate preview wins even though it comes last; first plate in archive order
        let data = cache.extract_thumbnail("part.3mf").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"plate-2"));
    }

    #[tokio::test]
    async fn test_fallback_patterns() {
        let reader = CountingReader::new(&[
            ("a.3mf", &[("preview.png", "preview"), ("thumbnail.png", "thumb")]),
            ("b.3mf", &[("docs/preview.png", "preview")]),
        ]);
        let cache = ThumbnailCache::with_reader("/archives", reader);

        assert_eq!(
            cache.extract_thumbnail("a.3mf").await,
            Some(Bytes::from_static(b"thumb"))
        );
        assert_eq!(
            cache.extract_thumbnail("b.3mf").await,
            Some(Bytes::from_static(b"preview"))
        );
    }

    #[tokio::test]
    async fn test_cache_hit_skips_io() {
        let reader = CountingReader::new(&[("plate_1.3mf", &[("Metadata/plate_1.png", "img")])]);
        let cache = ThumbnailCache::with_reader("/archives", reader.clone());

        let first = cache.thumbnail_for_gcode("plate_1.gcode").await.unwrap();
        let second = cache.thumbnail_for_gcode("plate_1.gcode").await.unwrap();
        let third = cache.extract_thumbnail("plate_1.3mf").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first, third);
        assert_eq!(reader.opens(), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_misses_read_once() {
        let reader = CountingReader::new(&[("plate_1.3mf", &[("Metadata/plate_1.png", "img")])]);
        let cache = ThumbnailCache::with_reader("/archives", reader.clone());

        let (a, b) = tokio::join!(
            cache.extract_thumbnail("plate_1.3mf"),
            cache.extract_thumbnail("plate_1.3mf")
        );

        assert_eq!(a, b);
        assert!(a.is_some());
        assert_eq!(reader.opens(), 1);
    }

    #[tokio::test]
    async fn test_missing_archive_not_cached() {
        let reader = CountingReader::new(&[]);
        let cache = ThumbnailCache::with_reader("/archives", reader.clone());

        assert!(cache.thumbnail_for_gcode("ghost.gcode").await.is_none());
        assert!(cache.thumbnail_for_gcode("ghost.gcode").await.is_none());

        assert_eq!(reader.opens(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_no_matching_entry() {
        let reader = CountingReader::new(&[("part.3mf", &[("3D/3dmodel.model", "<model/>")])]);
        let cache = ThumbnailCache::with_reader("/archives", reader);

        assert!(cache.extract_thumbnail("part.3mf").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_traversal() {
        let reader = CountingReader::new(&[]);
        let cache = ThumbnailCache::with_reader("/archives", reader.clone());

        assert!(cache.extract_thumbnail("../secret.3mf").await.is_none());
        assert!(cache.extract_thumbnail("..").await.is_none());
        assert_eq!(reader.opens(), 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let reader = CountingReader::new(&[("p.3mf", &[("thumbnail.png", "t")])]);
        let cache = ThumbnailCache::with_reader("/archives", reader.clone());

        cache.extract_thumbnail("p.3mf").await.unwrap();
        cache.clear().await;
        cache.extract_thumbnail("p.3mf").await.unwrap();

        assert_eq!(reader.opens(), 2);
    }

    #[tokio::test]
    async fn test_zip_archive_on_disk() {
        use std::io::Write;
        use zip::write::SimpleFileOptions;

        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("benchy.3mf")).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("Metadata/plate_1.png", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"\x89PNG-data").unwrap();
        writer.finish().unwrap();

        let cache = ThumbnailCache::new(dir.path());
        let data = cache.thumbnail_for_gcode("benchy.gcode").await.unwrap();
        assert_eq!(data, Bytes::from_static(b"\x89PNG-data"));
    }
}
