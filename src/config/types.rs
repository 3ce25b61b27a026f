use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Topic-Ripple
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of concurrent connections to a single host
    #[serde(rename = "max-connections")]
    pub max_connections: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "connect-timeout")]
    pub connect_timeout: u64,

    /// Interval between crawl cycles (seconds)
    #[serde(rename = "sleep-interval")]
    pub sleep_interval: u64,

    /// Number of retries after a timed-out request
    #[serde(rename = "reconnect-max-attempts")]
    pub reconnect_max_attempts: u32,

    /// Delay between retries (seconds, fractional)
    #[serde(rename = "reconnect-delay")]
    pub reconnect_delay: f64,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl CrawlerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_delay)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_connections: 3,
            connect_timeout: 10,
            sleep_interval: 60,
            reconnect_max_attempts: 3,
            reconnect_delay: 0.5,
            user_agent: format!("topic-ripple/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// The site whose listing page seeds every cycle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Listing page fetched at the start of each cycle
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Discussion page URL is this prefix followed by the topic id
    #[serde(rename = "comments-url-prefix")]
    pub comments_url_prefix: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://news.ycombinator.com".to_string(),
            comments_url_prefix: "https://news.ycombinator.com/item?id=".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory holding one sub-directory per topic
    #[serde(rename = "topics-dir")]
    pub topics_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            topics_dir: PathBuf::from("."),
        }
    }
}
