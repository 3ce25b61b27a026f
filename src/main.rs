//! Topic-Ripple main entry point
//!
//! This is the command-line interface for the Topic-Ripple crawler.

use clap::Parser;
use std::path::PathBuf;
use topic_ripple::config::{resolve_config, Config, ConfigOverrides};
use topic_ripple::crawler::{crawl, crawl_once};
use tracing_subscriber::EnvFilter;

/// Topic-Ripple: A polite, self-throttling topic crawler
///
/// Topic-Ripple re-reads a listing page on a fixed interval and archives
/// every new topic's page together with the external pages linked from
/// its discussion thread.
#[derive(Parser, Debug)]
#[command(name = "topic-ripple")]
#[command(version)]
#[command(about = "A polite, self-throttling topic crawler", long_about = None)]
struct Cli {
    /// Path to an optional TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum concurrent connections per host
    #[arg(short = 'c', long)]
    max_connections: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(short = 't', long)]
    connect_timeout: Option<u64>,

    /// Seconds between crawl cycles
    #[arg(short = 'i', long)]
    sleep_interval: Option<u64>,

    /// Retries after a timed-out request
    #[arg(short = 'a', long)]
    reconnect_max_attempts: Option<u32>,

    /// Seconds to wait between retries
    #[arg(short = 'd', long)]
    reconnect_delay: Option<f64>,

    /// Directory that receives one sub-directory per topic
    #[arg(short = 'f', long)]
    topics_dir: Option<PathBuf>,

    /// Listing page fetched at the start of every cycle
    #[arg(long)]
    base_url: Option<String>,

    /// Run a single cycle, wait for it to finish, and exit
    #[arg(long)]
    once: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            max_connections: self.max_connections,
            connect_timeout: self.connect_timeout,
            sleep_interval: self.sleep_interval,
            reconnect_max_attempts: self.reconnect_max_attempts,
            reconnect_delay: self.reconnect_delay,
            base_url: self.base_url.clone(),
            topics_dir: self.topics_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let config = match resolve_config(cli.config.as_deref(), cli.overrides()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    log_config(&config);

    if cli.once {
        let report = crawl_once(&config).await?;
        tracing::info!("Single cycle complete: {:?}", report);
        return Ok(());
    }

    tracing::info!("Started.");
    match crawl(&config, shutdown_signal()).await {
        Ok(()) => {
            tracing::info!("Crawler stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Unexpected error: {}", e);
            Err(e.into())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("topic_ripple=info,warn"),
            1 => EnvFilter::new("topic_ripple=debug,info"),
            2 => EnvFilter::new("topic_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn log_config(config: &Config) {
    tracing::info!(
        "Seed: {} | per-host connections: {} | timeout: {}s | interval: {}s | retries: {} every {}s",
        config.site.base_url,
        config.crawler.max_connections,
        config.crawler.connect_timeout,
        config.crawler.sleep_interval,
        config.crawler.reconnect_max_attempts,
        config.crawler.reconnect_delay
    );
    tracing::info!("Topics directory: {}", config.output.topics_dir.display());
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        // Never resolve rather than stopping the crawler immediately
        std::future::pending::<()>().await;
    }
}
