//! Storage module for persisting fetched pages
//!
//! Each topic owns one directory under the output root; every fetched page
//! becomes one file inside it, named after a hash of its URL.

mod fs;
mod traits;

pub use fs::{page_file_name, FileSink};
pub use traits::{Sink, StorageError, StorageResult};

use std::path::{Path, PathBuf};

/// Returns the directory a topic's pages are stored in
///
/// # Arguments
///
/// * `topics_dir` - The output root
/// * `topic_id` - The topic's filesystem-safe identifier
pub fn topic_dir(topics_dir: &Path, topic_id: &str) -> PathBuf {
    topics_dir.join(topic_id)
}
