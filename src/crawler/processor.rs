//! Per-topic processing
//!
//! A topic is crawled at most once: its directory under the output root is
//! the only record that it has been done. The directory is created only
//! after the topic's primary page has been fetched, so a failed first fetch
//! leaves nothing behind and the topic is retried on the next cycle.

use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::parser::PageParser;
use crate::crawler::topic::Topic;
use crate::storage::{topic_dir, Sink};
use crate::CrawlError;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// How processing a topic ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicOutcome {
    /// The topic directory already existed; no request was made
    AlreadyCrawled,

    /// The primary page could not be fetched; nothing was written
    PrimaryUnavailable,

    /// The primary page was saved but the discussion page was unavailable
    PrimaryOnly,

    /// The primary page and every available outbound page were saved
    Crawled {
        /// Files written, primary page included
        pages_saved: usize,
    },
}

impl TopicOutcome {
    /// Files written while processing the topic
    pub fn pages_saved(&self) -> usize {
        match self {
            Self::AlreadyCrawled | Self::PrimaryUnavailable => 0,
            Self::PrimaryOnly => 1,
            Self::Crawled { pages_saved } => *pages_saved,
        }
    }
}

/// Crawls one topic: primary page, discussion page, outbound links
pub struct TopicProcessor {
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn PageParser>,
    sink: Arc<dyn Sink>,
    topics_dir: PathBuf,
    comments_url_prefix: String,
}

impl TopicProcessor {
    pub fn new(
        fetcher: Arc<Fetcher>,
        parser: Arc<dyn PageParser>,
        sink: Arc<dyn Sink>,
        topics_dir: impl Into<PathBuf>,
        comments_url_prefix: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            parser,
            sink,
            topics_dir: topics_dir.into(),
            comments_url_prefix: comments_url_prefix.into(),
        }
    }

    pub fn topics_dir(&self) -> &Path {
        &self.topics_dir
    }

    /// URL of the topic's discussion page
    pub fn discussion_url(&self, topic: &Topic) -> String {
        format!("{}{}", self.comments_url_prefix, topic.id())
    }

    /// Processes one topic
    ///
    /// # Steps
    ///
    /// 1. Return `AlreadyCrawled` if the topic directory exists
    /// 2. Fetch the primary page; absent → `PrimaryUnavailable`
    /// 3. Create the directory and save the primary page
    /// 4. Fetch the discussion page; absent → `PrimaryOnly`
    /// 5. Extract and de-duplicate outbound links
    /// 6. Fetch every link concurrently, saving each page as it arrives
    ///
    /// Two cycles that discover the same new topic at the same moment can
    /// both pass step 1 and fetch it twice. The second write overwrites the
    /// first.
    ///
    /// # Errors
    ///
    /// Any error aborts this topic only. If the directory was already
    /// created, the pages saved so far stay and the topic counts as crawled
    /// on later cycles.
    pub async fn process(&self, topic: &Topic) -> Result<TopicOutcome, CrawlError> {
        let dir = topic_dir(&self.topics_dir, topic.id());

        if tokio::fs::try_exists(&dir).await? {
            tracing::info!("Already crawled: {} ({})", topic.id(), topic.link());
            return Ok(TopicOutcome::AlreadyCrawled);
        }

        let primary = match self.fetcher.fetch(topic.link()).await? {
            Some(page) => page,
            None => {
                tracing::info!("Topic page unavailable: {}", topic.link());
                return Ok(TopicOutcome::PrimaryUnavailable);
            }
        };

        tokio::fs::create_dir_all(&dir).await?;
        self.persist(primary, &dir).await?;

        let discussion_url = self.discussion_url(topic);
        let discussion = match self.fetcher.fetch(&discussion_url).await? {
            Some(page) => page,
            None => {
                tracing::info!("Discussion page unavailable: {}", discussion_url);
                return Ok(TopicOutcome::PrimaryOnly);
            }
        };

        let links = {
            let html = String::from_utf8_lossy(&discussion.body);
            self.parser
                .extract_links(&html)
                .map_err(|source| CrawlError::Parse {
                    url: discussion_url.clone(),
                    source,
                })?
        };
        let links = dedup_links(links);
        tracing::debug!("Topic {}: {} outbound links", topic.id(), links.len());

        let mut pending: FuturesUnordered<_> =
            links.iter().map(|link| self.fetcher.fetch(link)).collect();

        let mut pages_saved = 1;
        while let Some(result) = pending.next().await {
            if let Some(page) = result? {
                self.persist(page, &dir).await?;
                pages_saved += 1;
            }
        }

        tracing::info!(
            "Crawled topic {}: {} pages saved",
            topic.id(),
            pages_saved
        );
        Ok(TopicOutcome::Crawled { pages_saved })
    }

    /// Hands a page to the sink on the blocking pool
    async fn persist(&self, page: FetchResult, dir: &Path) -> Result<PathBuf, CrawlError> {
        let sink = Arc::clone(&self.sink);
        let dir = dir.to_path_buf();
        let path =
            tokio::task::spawn_blocking(move || sink.save(&page.body, &dir, &page.url)).await??;
        Ok(path)
    }
}

/// Removes repeated links, keeping first occurrences in order
fn dedup_links(links: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
