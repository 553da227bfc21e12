//! Artwork and summary extraction from Overcast episode pages.
//!
//! Both lookups always produce a value: a failed fetch or a missing match
//! yields the documented fallback instead of an error.

use std::borrow::Cow;

use async_trait::async_trait;
use log::{error, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::http::HttpTransport;

static ARTWORK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"img class="art fullart" src="([^"]*)""#).expect("artwork pattern"));
static SUMMARY_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"meta name="og:description" content="([^"]*)""#).expect("summary pattern"));

/// Per-episode enrichment used by the aggregator.
#[async_trait]
pub trait EpisodeEnricher: Send + Sync {
    /// Artwork image URL from an episode page, or an empty string.
    async fn artwork_url(&self, page_url: &str) -> String;

    /// Description from an episode page, or `default_title`.
    async fn summary(&self, page_url: &str, default_title: &str) -> String;
}

/// Named entities Overcast descriptions use beyond the XML five.
fn resolve_html_entity(name: &str) -> Option<&'static str> {
    match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        "hellip" => Some("\u{2026}"),
        "mdash" => Some("\u{2014}"),
        "ndash" => Some("\u{2013}"),
        "rsquo" => Some("\u{2019}"),
        "lsquo" => Some("\u{2018}"),
        "rdquo" => Some("\u{201d}"),
        "ldquo" => Some("\u{201c}"),
        _ => None,
    }
}

/// Decodes character references; text with unknown entities is returned as-is.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape_with(text, resolve_html_entity).unwrap_or(Cow::Borrowed(text))
}

pub fn extract_artwork(page: &str) -> Option<String> {
    ARTWORK_PATTERN
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).into_owned())
        .filter(|url| !url.is_empty())
}

pub fn extract_summary(page: &str) -> Option<String> {
    SUMMARY_PATTERN
        .captures(page)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()).trim().to_string())
        .filter(|summary| !summary.is_empty())
}

pub struct PageScraper<T: HttpTransport> {
    transport: T,
}

impl<T: HttpTransport> PageScraper<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    async fn page_content(&self, url: &str) -> Option<String> {
        match self.transport.get(url).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                error!("Failed to fetch page content from {}: HTTP {}", url, response.status);
                None
            }
            Err(e) => {
                error!("Failed to fetch page content from {}: {}", url, e);
                None
            }
        }
    }
}

#[async_trait]
impl<T: HttpTransport> EpisodeEnricher for PageScraper<T> {
    async fn artwork_url(&self, page_url: &str) -> String {
        let Some(content) = self.page_content(page_url).await else {
            return String::new();
        };
        extract_artwork(&content).unwrap_or_else(|| {
            warn!("Could not find artwork URL for {}", page_url);
            String::new()
        })
    }

    async fn summary(&self, page_url: &str, default_title: &str) -> String {
        self.page_content(page_url)
            .await
            .and_then(|content| extract_summary(&content))
            .unwrap_or_else(|| default_title.to_string())
    }
}
