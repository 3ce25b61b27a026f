//! Crawl scheduler
//!
//! This module handles:
//! - Starting a crawl cycle on a fixed interval
//! - Fanning a cycle out into one task per discovered topic
//! - Clearing the host gates between cycles when nothing is in flight
//!
//! Cycles overlap: the scheduler never waits for a cycle to drain before
//! starting the next one. While any earlier cycle is still running the gates
//! are kept, so requests still in flight stay bounded.

use crate::config::Config;
use crate::crawler::fetcher::Fetcher;
use crate::crawler::parser::{ListingParser, PageParser};
use crate::crawler::processor::{TopicOutcome, TopicProcessor};
use crate::crawler::throttle::HostThrottle;
use crate::storage::{FileSink, Sink};
use crate::CrawlError;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};

/// Summary of one crawl cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The seed page could not be fetched
    pub seed_unavailable: bool,

    /// Topics found on the seed page
    pub topics_found: usize,

    /// Topics crawled in this cycle (primary page saved)
    pub crawled: usize,

    /// Topics skipped because their directory already existed
    pub already_crawled: usize,

    /// Topics whose primary page was unavailable
    pub unavailable: usize,

    /// Topics aborted by an error
    pub failed: usize,

    /// Files written across all topics
    pub pages_saved: usize,
}

impl CycleReport {
    fn record(&mut self, outcome: &TopicOutcome) {
        match outcome {
            TopicOutcome::AlreadyCrawled => self.already_crawled += 1,
            TopicOutcome::PrimaryUnavailable => self.unavailable += 1,
            TopicOutcome::PrimaryOnly | TopicOutcome::Crawled { .. } => self.crawled += 1,
        }
        self.pages_saved += outcome.pages_saved();
    }
}

/// Everything a cycle task needs, shared between overlapping cycles
struct CycleContext {
    seed_url: String,
    fetcher: Arc<Fetcher>,
    parser: Arc<dyn PageParser>,
    processor: Arc<TopicProcessor>,
}

impl CycleContext {
    fn throttle(&self) -> &Arc<HostThrottle> {
        self.fetcher.throttle()
    }

    /// Runs one cycle: seed page, topic discovery, per-topic tasks
    ///
    /// Waits for its own topic tasks only to build the report; the
    /// scheduling loop never waits for this.
    async fn run(&self) -> Result<CycleReport, CrawlError> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        let seed = match self.fetcher.fetch(&self.seed_url).await? {
            Some(page) => page,
            None => {
                tracing::warn!("Seed page unavailable: {}", self.seed_url);
                report.seed_unavailable = true;
                return Ok(report);
            }
        };

        let topics = {
            let html = String::from_utf8_lossy(&seed.body);
            self.parser
                .extract_topics(&html)
                .map_err(|source| CrawlError::Parse {
                    url: self.seed_url.clone(),
                    source,
                })?
        };
        report.topics_found = topics.len();
        tracing::info!("Found {} topics on {}", topics.len(), self.seed_url);

        let mut tasks = JoinSet::new();
        for topic in topics {
            // Registered before spawning so the registry never looks idle
            // between discovery and the first fetch
            let guard = self.throttle().track();
            let processor = Arc::clone(&self.processor);
            tasks.spawn(async move {
                let _guard = guard;
                let result = processor.process(&topic).await;
                (topic, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(&outcome),
                Ok((topic, Err(e))) => {
                    tracing::error!(
                        "Failed to process topic {} ({}): {}",
                        topic.id(),
                        topic.link(),
                        e
                    );
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::error!("Topic task aborted: {}", e);
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            "Cycle finished in {:?}: {} topics, {} crawled, {} already crawled, {} unavailable, {} failed, {} pages saved",
            started.elapsed(),
            report.topics_found,
            report.crawled,
            report.already_crawled,
            report.unavailable,
            report.failed,
            report.pages_saved
        );

        Ok(report)
    }
}

/// Drives crawl cycles on a fixed interval
pub struct CrawlScheduler {
    context: Arc<CycleContext>,
    interval: Duration,
}

impl CrawlScheduler {
    /// Creates a scheduler with the default HTTP fetcher, listing parser and file sink
    ///
    /// # Arguments
    ///
    /// * `config` - Crawler settings, checked with `config::validate` first
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        crate::config::validate(config)?;
        let throttle = Arc::new(HostThrottle::new(config.crawler.max_connections as usize));
        let fetcher = Arc::new(Fetcher::new(&config.crawler, throttle)?);
        let parser = Arc::new(ListingParser::new(&config.site.base_url)?);
        Ok(Self::with_parts(
            config,
            fetcher,
            parser,
            Arc::new(FileSink::new()),
        ))
    }

    /// Creates a scheduler from explicit collaborators
    ///
    /// The registry used for resets is the one `fetcher` admits through.
    pub fn with_parts(
        config: &Config,
        fetcher: Arc<Fetcher>,
        parser: Arc<dyn PageParser>,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let processor = Arc::new(TopicProcessor::new(
            Arc::clone(&fetcher),
            Arc::clone(&parser),
            sink,
            config.output.topics_dir.clone(),
            config.site.comments_url_prefix.clone(),
        ));

        Self {
            context: Arc::new(CycleContext {
                seed_url: config.site.base_url.clone(),
                fetcher,
                parser,
                processor,
            }),
            interval: config.crawler.sleep_interval(),
        }
    }

    /// The registry shared by every fetch this scheduler makes
    pub fn throttle(&self) -> &Arc<HostThrottle> {
        self.context.throttle()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts a cycle in the background
    ///
    /// The cycle is registered with the throttle before this returns, so a
    /// following `reset_if_idle` cannot clear gates under it.
    pub fn start_cycle(&self) -> JoinHandle<Result<CycleReport, CrawlError>> {
        let guard = self.throttle().track();
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            let _guard = guard;
            let result = context.run().await;
            if let Err(e) = &result {
                tracing::error!("Cycle failed: {}", e);
            }
            result
        })
    }

    /// Runs a single cycle to completion
    pub async fn run_once(&self) -> Result<CycleReport, CrawlError> {
        self.start_cycle().await?
    }

    /// Runs cycles every `interval` until `shutdown` resolves
    ///
    /// Each tick starts a cycle, sleeps, then clears the host gates if no
    /// cycle or topic task is still running. A cycle that fails is logged
    /// and does not stop the loop; a cycle task that panics does.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), CrawlError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut cycles: Vec<JoinHandle<Result<CycleReport, CrawlError>>> = Vec::new();
        let mut cycle_number: u64 = 0;

        loop {
            cycle_number += 1;
            tracing::info!("Starting cycle {}", cycle_number);
            cycles.push(self.start_cycle());

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, stopping after {} cycles", cycle_number);
                    return Ok(());
                }
            }

            reap_finished(&mut cycles).await?;

            if self.throttle().reset_if_idle() {
                tracing::debug!(
                    "No cycle in flight, host gates cleared (generation {})",
                    self.throttle().generation()
                );
            } else {
                tracing::info!(
                    "Previous cycle still in flight ({} tasks), keeping host gates",
                    self.throttle().active()
                );
            }
        }
    }
}

/// Collects cycles that have finished, surfacing panics
async fn reap_finished(
    cycles: &mut Vec<JoinHandle<Result<CycleReport, CrawlError>>>,
) -> Result<(), CrawlError> {
    let mut still_running = Vec::with_capacity(cycles.len());
    for handle in cycles.drain(..) {
        if !handle.is_finished() {
            still_running.push(handle);
            continue;
        }

        // Cycle errors were already logged inside the task
        if let Err(e) = handle.await {
            if e.is_panic() {
                return Err(CrawlError::Task(e));
            }
        }
    }
    *cycles = still_running;
    Ok(())
}
