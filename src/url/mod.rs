//! URL handling module for Topic-Ripple
//!
//! This module provides host-key extraction for throttling and the
//! "is this link external to the crawled site" test used by the parser.

mod domain;

use crate::{UrlError, UrlResult};
use url::Url;

pub use domain::host_key;

/// Parses an absolute HTTP(S) URL
///
/// # Arguments
///
/// * `raw` - The URL string
///
/// # Returns
///
/// * `Ok(Url)` - A parsed URL with an `http` or `https` scheme and a host
/// * `Err(UrlError)` - The string is not a usable crawl target
pub fn parse_http_url(raw: &str) -> UrlResult<Url> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(format!("{}: {}", raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost(raw.to_string()));
    }

    Ok(url)
}

/// Returns the host key for a raw URL string
pub fn host_key_of(raw: &str) -> UrlResult<String> {
    let url = parse_http_url(raw)?;
    host_key(&url).ok_or_else(|| UrlError::MissingHost(raw.to_string()))
}

/// Checks whether `link` points outside the crawled site
///
/// Only absolute `http`/`https` links count; relative links always belong to
/// the site that served them and are never external.
///
/// # Arguments
///
/// * `link` - The raw href value
/// * `site_host` - Host key of the crawled site
///
/// # Examples
///
/// ```
/// use topic_ripple::url::is_external;
///
/// assert!(is_external("https://example.org/post", "news.ycombinator.com"));
/// assert!(!is_external("https://news.ycombinator.com/item?id=1", "news.ycombinator.com"));
/// assert!(!is_external("item?id=1", "news.ycombinator.com"));
/// ```
pub fn is_external(link: &str, site_host: &str) -> bool {
    let link = link.trim();
    if !link.starts_with("http://") && !link.starts_with("https://") {
        return false;
    }

    match host_key_of(link) {
        Ok(host) => !host.eq_ignore_ascii_case(site_host),
        Err(_) => false,
    }
}
