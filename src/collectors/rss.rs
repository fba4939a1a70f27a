//! RSS feed collector.
//!
//! Pulls recent items from an RSS 2.0 feed and, when enabled, follows
//! each item link to extract the full article text from the page. Feeds
//! in the wild are messy, so parsing is tolerant: CDATA wrappers,
//! entity-encoded text, and unparseable dates all degrade gracefully
//! instead of failing the batch.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};

use crate::error::TaskError;

use super::types::{FetchedArticle, Fetcher};

/// Feed used when none is configured.
pub const DEFAULT_FEED_URL: &str = "https://feeds.bbci.co.uk/news/world/rss.xml";

/// Hard cap on items taken from one feed read.
const DEFAULT_MAX_ITEMS: usize = 20;

/// Page text shorter than this is considered an extraction failure and
/// the feed description is used instead.
const MIN_PAGE_TEXT_CHARS: usize = 200;

/// Paragraphs shorter than this are navigation or caption cruft.
const MIN_PARAGRAPH_CHARS: usize = 40;

/// Collector for RSS 2.0 news feeds.
///
/// # Example
///
/// ```ignore
/// use linguanews::collectors::{Fetcher, RssFetcher};
///
/// let fetcher = RssFetcher::new("https://feeds.bbci.co.uk/news/world/rss.xml");
/// let articles = fetcher.fetch(10).await?;
/// for article in articles {
///     println!("{}: {}", article.title, article.source_url);
/// }
/// ```
pub struct RssFetcher {
    http_client: Client,
    feed_url: String,
    fetch_full_pages: bool,
    max_items: usize,
}

struct RssItem {
    title: String,
    link: String,
    description: String,
    pub_date: Option<DateTime<Utc>>,
}

impl RssFetcher {
    /// Creates a fetcher for the given feed URL.
    pub fn new(feed_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .user_agent("linguanews/1.0")
                .build()
                .expect("Failed to build HTTP client"),
            feed_url: feed_url.into(),
            fetch_full_pages: true,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }

    /// Toggles following item links for full article text. When off,
    /// the feed description is used as the article body.
    pub fn with_full_pages(mut self, fetch_full_pages: bool) -> Self {
        self.fetch_full_pages = fetch_full_pages;
        self
    }

    /// Overrides the per-read item cap.
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    /// Configured feed URL.
    pub fn feed_url(&self) -> &str {
        &self.feed_url
    }

    async fn fetch_page_text(&self, url: &str) -> Option<String> {
        let response = self.http_client.get(url).send().await.ok()?;
        if !response.status().is_success() {
            debug!(url = %url, status = %response.status(), "Article page fetch failed");
            return None;
        }
        let html = response.text().await.ok()?;
        let text = extract_paragraphs(&html);
        if text.chars().count() < MIN_PAGE_TEXT_CHARS {
            debug!(url = %url, "Extracted page text too short, falling back to description");
            return None;
        }
        Some(text)
    }
}

impl Default for RssFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_URL)
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    async fn fetch(&self, limit: usize) -> Result<Vec<FetchedArticle>, TaskError> {
        let response = self
            .http_client
            .get(&self.feed_url)
            .send()
            .await
            .map_err(|e| TaskError::unavailable("news feed", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TaskError::unavailable(
                "news feed",
                format!("feed returned status {status}"),
            ));
        }

        let xml = response
            .text()
            .await
            .map_err(|e| TaskError::unavailable("news feed", e))?;

        let items = parse_feed(&xml);
        if items.is_empty() {
            return Err(TaskError::unavailable("news feed", "feed contained no items"));
        }

        let items: Vec<RssItem> = items
            .into_iter()
            .take(limit.min(self.max_items))
            .collect();
        debug!(feed = %self.feed_url, items = items.len(), "Parsed feed");

        let mut articles = Vec::with_capacity(items.len());
        if self.fetch_full_pages {
            let pages = futures::future::join_all(
                items.iter().map(|item| self.fetch_page_text(&item.link)),
            )
            .await;
            for (item, page) in items.into_iter().zip(pages) {
                let content = page.unwrap_or_else(|| item.description.clone());
                articles.push(to_article(item, content));
            }
        } else {
            for item in items {
                let content = item.description.clone();
                articles.push(to_article(item, content));
            }
        }

        info!(feed = %self.feed_url, articles = articles.len(), "Fetched articles");
        Ok(articles)
    }
}

fn to_article(item: RssItem, content: String) -> FetchedArticle {
    let mut article = FetchedArticle::new(item.link, item.title, content);
    if let Some(published) = item.pub_date {
        article = article.with_published_at(published);
    }
    article
}

/// Extracts items from RSS 2.0 XML. Items without a title or link are
/// skipped.
fn parse_feed(xml: &str) -> Vec<RssItem> {
    let item_re = Regex::new(r"(?s)<item>(.*?)</item>").expect("Invalid item regex");
    item_re
        .captures_iter(xml)
        .filter_map(|caps| parse_item(caps.get(1)?.as_str()))
        .collect()
}

fn parse_item(block: &str) -> Option<RssItem> {
    let title = extract_tag(block, "title")?;
    let link = extract_tag(block, "link")?;
    let description = extract_tag(block, "description").unwrap_or_default();
    let pub_date = extract_tag(block, "pubDate")
        .and_then(|raw| DateTime::parse_from_rfc2822(&raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc));

    Some(RssItem {
        title,
        link,
        description,
        pub_date,
    })
}

fn extract_tag(block: &str, tag: &str) -> Option<String> {
    let re = Regex::new(&format!(r"(?s)<{tag}[^>]*>(.*?)</{tag}>")).ok()?;
    let raw = re.captures(block)?.get(1)?.as_str();
    let cleaned = decode_entities(strip_cdata(raw)).trim().to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn strip_cdata(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(trimmed)
}

// `&amp;` last so already-encoded sequences decode exactly once.
fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Pulls readable text out of an article page: paragraph contents with
/// markup stripped, short cruft dropped.
fn extract_paragraphs(html: &str) -> String {
    let p_re = Regex::new(r"(?s)<p[^>]*>(.*?)</p>").expect("Invalid paragraph regex");
    let tag_re = Regex::new(r"<[^>]+>").expect("Invalid tag regex");

    let mut paragraphs = Vec::new();
    for caps in p_re.captures_iter(html) {
        if let Some(body) = caps.get(1) {
            let stripped = tag_re.replace_all(body.as_str(), "");
            let text = decode_entities(stripped.trim());
            if text.chars().count() >= MIN_PARAGRAPH_CHARS {
                paragraphs.push(text);
            }
        }
    }
    paragraphs.join("\n\n")
}
