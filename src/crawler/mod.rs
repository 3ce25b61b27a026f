//! Crawler module for topic discovery and page fetching
//!
//! This module contains the core crawling logic, including:
//! - Per-host admission control
//! - HTTP fetching with timeout retries and content filtering
//! - Topic and link extraction
//! - Per-topic processing and the cycle scheduler

mod fetcher;
mod parser;
mod processor;
mod scheduler;
mod throttle;
mod topic;

pub use fetcher::{build_http_client, is_html_content_type, FetchResult, FetchSettings, Fetcher};
pub use parser::{ListingParser, PageParser};
pub use processor::{TopicOutcome, TopicProcessor};
pub use scheduler::{CrawlScheduler, CycleReport};
pub use throttle::{ActivityGuard, HostThrottle};
pub use topic::{is_safe_topic_id, Topic};

use crate::config::Config;
use crate::CrawlError;
use std::future::Future;

/// Runs the crawler until `shutdown` resolves
///
/// This is the main entry point for a long-running crawl. It will:
/// 1. Build the HTTP client and host throttle
/// 2. Fetch the seed page every `sleep-interval` seconds
/// 3. Crawl every new topic found there in the background
///
/// # Arguments
///
/// * `config` - A validated configuration
/// * `shutdown` - Resolves when the loop should stop
pub async fn crawl<F>(config: &Config, shutdown: F) -> Result<(), CrawlError>
where
    F: Future<Output = ()>,
{
    CrawlScheduler::new(config)?.run(shutdown).await
}

/// Runs exactly one cycle and waits for every topic in it to finish
pub async fn crawl_once(config: &Config) -> Result<CycleReport, CrawlError> {
    CrawlScheduler::new(config)?.run_once().await
}
