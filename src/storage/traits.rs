//! Storage traits and error types
//!
//! This module defines the trait interface for page sinks and the
//! associated error types.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for page sink implementations
///
/// A sink persists one fetched document into a topic directory. The file
/// name must be derived deterministically from `source_url`, so saving the
/// same URL twice overwrites instead of duplicating.
///
/// Implementations are called from a blocking worker thread and must be
/// safe to share between tasks.
pub trait Sink: Send + Sync {
    /// Saves `body` fetched from `source_url` into `directory`
    ///
    /// # Returns
    ///
    /// The path of the written file
    fn save(&self, body: &[u8], directory: &Path, source_url: &str) -> StorageResult<PathBuf>;
}
