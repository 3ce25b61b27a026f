//! HTML parser for extracting topics and outbound links
//!
//! This module handles parsing listing and discussion pages:
//! - Topics from listing rows (`<tr class="athing" id="...">`)
//! - Outbound links from discussion pages
//!
//! "Outbound" means an absolute `http`/`https` link whose host differs from
//! the crawled site's host. Relative links are always internal.

use crate::crawler::topic::Topic;
use crate::url::{host_key_of, is_external};
use crate::{ParseError, UrlError};
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Extracts topics and outbound links from raw markup
///
/// Implementations must be cheap to share between tasks; the crawler holds
/// one behind an `Arc` for its whole lifetime.
pub trait PageParser: Send + Sync {
    /// Extracts the topics listed on a seed page
    fn extract_topics(&self, html: &str) -> Result<Vec<Topic>, ParseError>;

    /// Extracts outbound links from a discussion page
    ///
    /// The result may contain duplicates.
    fn extract_links(&self, html: &str) -> Result<Vec<String>, ParseError>;
}

/// Parser for Hacker-News-shaped listing pages
///
/// # Listing Rules
///
/// **Include:**
/// - `<tr class="athing" id="ID">` rows; `ID` becomes the topic id
/// - The row's title anchor: `span.titleline > a` or the older `a.storylink`
///
/// **Exclude:**
/// - Rows whose title anchor is not an external link (e.g. "Ask HN" posts)
/// - Rows whose id is not filesystem-safe
/// - Repeated ids (the first row wins)
#[derive(Debug, Clone)]
pub struct ListingParser {
    site_host: String,
}

impl ListingParser {
    /// Creates a parser for the site served at `base_url`
    ///
    /// # Example
    ///
    /// ```
    /// use topic_ripple::crawler::{ListingParser, PageParser};
    ///
    /// let parser = ListingParser::new("https://news.ycombinator.com").unwrap();
    /// let html = r#"<a href="https://example.com/">x</a><a href="item?id=1">y</a>"#;
    /// assert_eq!(parser.extract_links(html).unwrap(), vec!["https://example.com/"]);
    /// ```
    pub fn new(base_url: &str) -> Result<Self, UrlError> {
        Ok(Self {
            site_host: host_key_of(base_url)?,
        })
    }

    /// Host key of the crawled site
    pub fn site_host(&self) -> &str {
        &self.site_host
    }
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {}", css, e)))
}

impl PageParser for ListingParser {
    fn extract_topics(&self, html: &str) -> Result<Vec<Topic>, ParseError> {
        let document = Html::parse_document(html);
        let row_selector = selector("tr.athing[id]")?;
        let title_selector = selector("span.titleline > a[href], a.storylink[href]")?;

        let mut seen = HashSet::new();
        let mut topics = Vec::new();

        for row in document.select(&row_selector) {
            let Some(id) = row.value().attr("id") else {
                continue;
            };

            let Some(href) = row
                .select(&title_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
            else {
                tracing::debug!("Row {} has no title link", id);
                continue;
            };

            let href = href.trim();
            if !is_external(href, &self.site_host) {
                tracing::debug!("Skipping internal topic {} ({})", id, href);
                continue;
            }

            match Topic::new(href, id) {
                Ok(topic) => {
                    if seen.insert(topic.id().to_string()) {
                        topics.push(topic);
                    }
                }
                Err(e) => tracing::warn!("Skipping listing row: {}", e),
            }
        }

        Ok(topics)
    }

    fn extract_links(&self, html: &str) -> Result<Vec<String>, ParseError> {
        let document = Html::parse_document(html);
        let anchor_selector = selector("a[href]")?;

        let links = document
            .select(&anchor_selector)
            .filter_map(|a| a.value().attr("href"))
            .map(str::trim)
            .filter(|href| is_external(href, &self.site_host))
            .map(str::to_string)
            .collect();

        Ok(links)
    }
}
