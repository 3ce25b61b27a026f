//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client with the configured user agent
//! - Per-host admission through the `HostThrottle`
//! - Retry logic for timeouts
//! - Content-Type filtering before the body is read
//! - Error classification

use crate::config::CrawlerConfig;
use crate::crawler::throttle::HostThrottle;
use crate::url::host_key_of;
use crate::CrawlError;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// A successfully fetched HTML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// The URL that was requested
    pub url: String,

    /// Raw response body
    pub body: Vec<u8>,
}

/// Timeout and retry settings for a `Fetcher`
#[derive(Debug, Clone, Copy)]
pub struct FetchSettings {
    /// Deadline for one request, from connect through body read
    pub timeout: Duration,

    /// Retries after a timed-out attempt
    pub reconnect_max_attempts: u32,

    /// Sleep between attempts
    pub reconnect_delay: Duration,
}

impl From<&CrawlerConfig> for FetchSettings {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            timeout: config.connect_timeout(),
            reconnect_max_attempts: config.reconnect_max_attempts,
            reconnect_delay: config.reconnect_delay(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use topic_ripple::config::CrawlerConfig;
/// use topic_ripple::crawler::build_http_client;
///
/// let client = build_http_client(&CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(config: &CrawlerConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.connect_timeout())
        .gzip(true)
        .brotli(true)
        .build()
}

/// Checks whether a Content-Type header value denotes an HTML document
///
/// Parameters such as `charset` are ignored.
///
/// # Examples
///
/// ```
/// use topic_ripple::crawler::is_html_content_type;
///
/// assert!(is_html_content_type("text/html; charset=utf-8"));
/// assert!(!is_html_content_type("application/json"));
/// ```
pub fn is_html_content_type(value: &str) -> bool {
    let mime = value.split(';').next().unwrap_or("").trim();
    mime.eq_ignore_ascii_case("text/html") || mime.eq_ignore_ascii_case("application/xhtml+xml")
}

/// Fetches pages under per-host admission control
///
/// # Outcomes
///
/// | Condition | Result |
/// |-----------|--------|
/// | HTML response | `Ok(Some(FetchResult))` |
/// | Missing, malformed or non-HTML Content-Type | `Ok(None)`, body not read |
/// | Timeout | Retry up to `reconnect_max_attempts` times, then `Ok(None)` |
/// | Connection failure (refused, DNS) | `Ok(None)` immediately |
/// | Any other transport error | `Err(CrawlError::Http)` |
/// | Unparsable URL | `Err(CrawlError::Url)` |
///
/// The HTTP status code is not inspected.
pub struct Fetcher {
    client: Client,
    throttle: Arc<HostThrottle>,
    settings: FetchSettings,
}

impl Fetcher {
    /// Creates a fetcher with a client built from `config`
    pub fn new(config: &CrawlerConfig, throttle: Arc<HostThrottle>) -> Result<Self, CrawlError> {
        let client = build_http_client(config)?;
        Ok(Self::with_client(client, FetchSettings::from(config), throttle))
    }

    /// Creates a fetcher around an existing client
    pub fn with_client(client: Client, settings: FetchSettings, throttle: Arc<HostThrottle>) -> Self {
        Self {
            client,
            throttle,
            settings,
        }
    }

    /// The registry this fetcher admits requests through
    pub fn throttle(&self) -> &Arc<HostThrottle> {
        &self.throttle
    }

    /// Fetches `url`, holding its host's gate for the whole exchange
    ///
    /// The permit is held across retries and released on every exit path
    /// when `_permit` goes out of scope.
    pub async fn fetch(&self, url: &str) -> Result<Option<FetchResult>, CrawlError> {
        let host = host_key_of(url)?;
        let _permit = self.throttle.acquire(&host).await?;

        let mut attempts = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_timeout() => {
                    if attempts < self.settings.reconnect_max_attempts {
                        attempts += 1;
                        tokio::time::sleep(self.settings.reconnect_delay).await;
                        tracing::info!("Reconnect #{} for {}", attempts, url);
                    } else {
                        tracing::info!("Connection timeout: {}", url);
                        return Ok(None);
                    }
                }
                Err(e) if e.is_connect() => {
                    tracing::info!("Cannot connect to {}: {}", url, e);
                    return Ok(None);
                }
                Err(source) => {
                    return Err(CrawlError::Http {
                        url: url.to_string(),
                        source,
                    })
                }
            }
        }
    }

    /// Performs a single GET attempt
    async fn fetch_once(&self, url: &str) -> Result<Option<FetchResult>, reqwest::Error> {
        let response = self
            .client
            .get(url)
            .timeout(self.settings.timeout)
            .send()
            .await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        match content_type {
            None => {
                tracing::info!("Missing or malformed Content-Type: {}", url);
                return Ok(None);
            }
            Some(ct) if !is_html_content_type(&ct) => {
                tracing::info!("Not html ({}): {}", ct, url);
                return Ok(None);
            }
            Some(_) => {}
        }

        let body = response.bytes().await?;
        tracing::debug!("Fetched {} ({} bytes)", url, body.len());

        Ok(Some(FetchResult {
            url: url.to_string(),
            body: body.to_vec(),
        }))
    }
}
