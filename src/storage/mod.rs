//! Local persistence of generated images
//!
//! Downloads output assets and writes them into the vault's output folder
//! under batch-stable file names.

pub mod mock;
pub mod vault;

pub use mock::MockAssetPersister;
pub use vault::VaultStorage;

use crate::models::OutputFormat;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Naming context shared by every asset of one generation job.
///
/// A single timestamp per batch keeps `index -> file name` stable no matter
/// in which order the concurrent downloads finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetBatch {
    timestamp_ms: i64,
    format: OutputFormat,
}

impl AssetBatch {
    pub fn new(format: OutputFormat) -> Self {
        Self::with_timestamp(chrono::Utc::now().timestamp_millis(), format)
    }

    pub fn with_timestamp(timestamp_ms: i64, format: OutputFormat) -> Self {
        Self {
            timestamp_ms,
            format,
        }
    }

    pub fn file_name(&self, index: usize) -> String {
        format!(
            "generated-image-{}-{}.{}",
            self.timestamp_ms,
            index,
            self.format.extension()
        )
    }
}

#[async_trait]
pub trait AssetPersister: Send + Sync {
    /// Download `url` and store it; returns the vault-relative path.
    async fn persist(&self, url: &str, index: usize, batch: &AssetBatch) -> Result<String>;

    /// Remove an asset written by [`AssetPersister::persist`].
    async fn discard(&self, path: &str) -> Result<()>;

    /// Folder (relative to the vault) assets are written to.
    fn output_folder(&self) -> &str;
}

/// Write `bytes` to `path` through a temp file in the same directory.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// [`write_atomic`] on the blocking thread pool.
pub(crate) async fn write_atomic_async(path: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
        .await
        .map_err(|e| Error::Invariant(format!("File write task join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_batch_file_names_are_distinct_per_index() {
        let batch = AssetBatch::with_timestamp(1_700_000_000_000, OutputFormat::Webp);

        assert_eq!(batch.file_name(0), "generated-image-1700000000000-0.webp");
        assert_ne!(batch.file_name(0), batch.file_name(1));
    }

    #[test]
    fn test_write_atomic_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("nested").join("note.md");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_failed_async_write_leaves_no_file_behind() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let result = write_atomic_async(blocker.join("image.webp"), b"bytes".to_vec()).await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
