use crate::storage::traits::{Sink, StorageError, StorageResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Extension given to every saved page
const PAGE_EXTENSION: &str = "html";

/// Filesystem sink writing one file per source URL
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSink;

impl FileSink {
    pub fn new() -> Self {
        Self
    }
}

/// Returns the file name a page fetched from `url` is stored under
///
/// The name is the hex SHA-256 of the URL string, which is stable across
/// runs and collision-free for practical purposes.
///
/// # Examples
///
/// ```
/// use topic_ripple::storage::page_file_name;
///
/// let name = page_file_name("https://example.com/");
/// assert!(name.ends_with(".html"));
/// assert_eq!(name, page_file_name("https://example.com/"));
/// ```
pub fn page_file_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{}.{}", hex::encode(hasher.finalize()), PAGE_EXTENSION)
}

impl Sink for FileSink {
    fn save(&self, body: &[u8], directory: &Path, source_url: &str) -> StorageResult<PathBuf> {
        let path = directory.join(page_file_name(source_url));

        std::fs::write(&path, body).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::debug!("Saved {} -> {}", source_url, path.display());
        Ok(path)
    }
}
