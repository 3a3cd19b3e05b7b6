use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

use crate::io::{LocalFileReader, ReadAt};

use super::ZipError;
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Coarse classification of an extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractErrorKind {
    CorruptArchive,
    Io,
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("corrupt archive {}: {reason}", archive.display())]
    CorruptArchive { archive: PathBuf, reason: String },
    #[error("i/o error extracting {} at {}: {source}", archive.display(), path.display())]
    Io {
        archive: PathBuf,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractError {
    pub fn kind(&self) -> ExtractErrorKind {
        match self {
            ExtractError::CorruptArchive { .. } => ExtractErrorKind::CorruptArchive,
            ExtractError::Io { .. } => ExtractErrorKind::Io,
        }
    }

    fn corrupt(archive: &Path, reason: impl Into<String>) -> Self {
        ExtractError::CorruptArchive {
            archive: archive.to_path_buf(),
            reason: reason.into(),
        }
    }

    fn io(archive: &Path, path: &Path, source: std::io::Error) -> Self {
        ExtractError::Io {
            archive: archive.to_path_buf(),
            path: path.to_path_buf(),
            source,
        }
    }

    /// Structural and truncation errors mean the archive is bad; other I/O
    /// failures while reading it are reported as I/O.
    fn from_zip(archive: &Path, err: ZipError) -> Self {
        match err {
            ZipError::Format(reason) => Self::corrupt(archive, reason),
            ZipError::Io(source) if source.kind() == std::io::ErrorKind::UnexpectedEof => {
                Self::corrupt(archive, "unexpected end of archive")
            }
            ZipError::Io(source) => Self::io(archive, archive, source),
        }
    }
}

/// What an extraction produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Entries with absolute or parent-escaping names that were not written.
    pub skipped: usize,
}

/// Unpacks a zip archive on disk into a directory, keeping its layout.
pub struct ArchiveExtractor {
    timeout: Option<Duration>,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Bound the whole extraction; exceeding it is an I/O failure (`TimedOut`).
    ///
    /// The limit is checked before each entry, so no write is left running
    /// once `extract` returns.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Extract every entry of `archive` under `dest`, which must already exist.
    ///
    /// On failure `dest` may hold a partial tree; removing it is up to the caller.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<ExtractStats, ExtractError> {
        let deadline = self
            .timeout
            .and_then(|limit| Some((Instant::now().checked_add(limit)?, limit)));

        let reader =
            LocalFileReader::open(archive).map_err(|e| ExtractError::io(archive, archive, e))?;
        let parser = ZipParser::new(Arc::new(reader));
        let entries = parser
            .list_files()
            .await
            .map_err(|e| ExtractError::from_zip(archive, e))?;
        debug!(archive = %archive.display(), entries = entries.len(), "read central directory");

        let mut stats = ExtractStats::default();
        for entry in &entries {
            if let Some((deadline, limit)) = deadline
                && Instant::now() >= deadline
            {
                return Err(ExtractError::io(
                    archive,
                    dest,
                    std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        format!("extraction exceeded {limit:?}"),
                    ),
                ));
            }

            let Some(relative) = sanitize_entry_name(&entry.file_name) else {
                warn!(entry = %entry.file_name, "skipping archive entry with unsafe path");
                stats.skipped += 1;
                continue;
            };
            let output_path = dest.join(&relative);

            if entry.is_directory {
                fs::create_dir_all(&output_path)
                    .await
                    .map_err(|e| ExtractError::io(archive, &output_path, e))?;
                stats.directories += 1;
                continue;
            }

            let data = read_entry(&parser, entry)
                .await
                .map_err(|e| ExtractError::from_zip(archive, e))?;

            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| ExtractError::io(archive, parent, e))?;
            }
            fs::write(&output_path, &data)
                .await
                .map_err(|e| ExtractError::io(archive, &output_path, e))?;

            stats.files += 1;
            stats.bytes += data.len() as u64;
        }

        Ok(stats)
    }
}

/// Read and decompress one entry's data.
async fn read_entry<R: ReadAt>(
    parser: &ZipParser<R>,
    entry: &ZipFileEntry,
) -> Result<Vec<u8>, ZipError> {
    let data_offset = parser.data_offset(entry).await?;
    let in_bounds = data_offset
        .checked_add(entry.compressed_size)
        .is_some_and(|end| end <= parser.size());
    if !in_bounds {
        return Err(ZipError::format(format!(
            "data for {} extends past the end of the archive",
            entry.file_name
        )));
    }

    let mut compressed = vec![0u8; entry.compressed_size as usize];
    parser
        .reader()
        .read_exact_at(data_offset, &mut compressed)
        .await?;

    let data = match entry.compression_method {
        CompressionMethod::Stored => compressed,
        CompressionMethod::Deflate => {
            // never trust the declared size for more than a capacity hint
            let hint = entry.uncompressed_size.min(64 * 1024 * 1024) as usize;
            let mut out = Vec::with_capacity(hint);
            DeflateDecoder::new(compressed.as_slice())
                .take(entry.uncompressed_size.saturating_add(1))
                .read_to_end(&mut out)
                .map_err(|e| {
                    ZipError::format(format!("cannot inflate {}: {e}", entry.file_name))
                })?;
            out
        }
        CompressionMethod::Unknown(method) => {
            return Err(ZipError::format(format!(
                "unsupported compression method {method} for {}",
                entry.file_name
            )));
        }
    };

    if data.len() as u64 != entry.uncompressed_size {
        return Err(ZipError::format(format!(
            "{} is {} bytes, central directory says {}",
            entry.file_name,
            data.len(),
            entry.uncompressed_size
        )));
    }

    Ok(data)
}

/// Relative path an entry may be written to, or `None` when its name is
/// absolute or climbs out of the extraction root.
fn sanitize_entry_name(name: &str) -> Option<PathBuf> {
    let normalized = name.replace('\\', "/");
    let mut relative = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => relative.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!relative.as_os_str().is_empty()).then_some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_nested_relative_names() {
        assert_eq!(
            sanitize_entry_name("pack/sub/glow.milk"),
            Some(PathBuf::from("pack/sub/glow.milk"))
        );
        assert_eq!(
            sanitize_entry_name("./pack\\wave.prjm"),
            Some(PathBuf::from("pack/wave.prjm"))
        );
    }

    #[test]
    fn sanitize_rejects_escaping_names() {
        assert_eq!(sanitize_entry_name("../evil.milk"), None);
        assert_eq!(sanitize_entry_name("pack/../../evil.milk"), None);
        assert_eq!(sanitize_entry_name("/etc/passwd"), None);
        assert_eq!(sanitize_entry_name(""), None);
    }

    #[tokio::test]
    async fn garbage_is_a_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("broken.zip");
        std::fs::write(&archive, b"this is not a zip archive at all, just text").unwrap();
        let out = dir.path().join("out");
        std::fs::create_dir(&out).unwrap();

        let err = ArchiveExtractor::new()
            .extract(&archive, &out)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractErrorKind::CorruptArchive);
    }

    #[tokio::test]
    async fn tiny_file_is_a_corrupt_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("tiny.zip");
        std::fs::write(&archive, b"PK").unwrap();

        let err = ArchiveExtractor::new()
            .extract(&archive, dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractErrorKind::CorruptArchive);
    }

    #[tokio::test]
    async fn empty_archive_finishes_within_any_limit() {
        // end of central directory record with zero entries
        let mut eocd = vec![0u8; 22];
        eocd[..4].copy_from_slice(b"PK\x05\x06");
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        std::fs::write(&archive, &eocd).unwrap();

        let stats = ArchiveExtractor::new()
            .with_timeout(Duration::ZERO)
            .extract(&archive, dir.path())
            .await
            .unwrap();
        assert_eq!(stats, ExtractStats::default());
    }

    #[tokio::test]
    async fn missing_archive_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArchiveExtractor::new()
            .extract(&dir.path().join("absent.zip"), dir.path())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ExtractErrorKind::Io);
    }
}
