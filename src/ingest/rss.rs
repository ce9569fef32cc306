//! RSS 2.0 feed source.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use super::{normalize_content, FeedSource};
use crate::models::RawNewsItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    // Full-article body many feeds carry alongside the description.
    // quick-xml strips the namespace prefix, so match on the local name.
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
}

fn parse_pub_date(ts: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = OffsetDateTime::parse(ts, &Rfc2822) {
        let unix = dt.to_offset(UtcOffset::UTC).unix_timestamp();
        return Utc.timestamp_opt(unix, 0).single();
    }
    // Obsolete zone names ("GMT", "EST") and RFC 3339 timestamps both show
    // up in the wild.
    if let Ok(dt) = DateTime::parse_from_rfc2822(ts) {
        return Some(dt.with_timezone(&Utc));
    }
    DateTime::parse_from_rfc3339(ts)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn host_of(url: &str) -> &str {
    let rest = url.split("://").nth(1).unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

/// Parse one RSS document into raw items. `feed_url` names the source when
/// the channel has no usable title.
pub(crate) fn parse_feed(xml: &str, feed_url: &str) -> Result<Vec<RawNewsItem>> {
    let t0 = std::time::Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);
    let rss: Rss =
        from_str(&xml_clean).with_context(|| format!("parsing rss xml from {feed_url}"))?;

    let source = rss
        .channel
        .title
        .as_deref()
        .map(normalize_content)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| host_of(feed_url).to_string());

    let mut out = Vec::with_capacity(rss.channel.items.len());
    for it in rss.channel.items {
        let title = normalize_content(it.title.as_deref().unwrap_or_default());
        if title.is_empty() {
            continue;
        }
        let body = it
            .content_encoded
            .as_deref()
            .or(it.description.as_deref())
            .unwrap_or_default();
        let content = normalize_content(body);
        let url = it
            .link
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());
        let published_at = it.pub_date.as_deref().and_then(parse_pub_date);

        out.push(RawNewsItem::new(
            source.clone(),
            title,
            url,
            published_at,
            content,
        ));
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("ingest_parse_ms").record(ms);
    counter!("ingest_items_total").increment(out.len() as u64);
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

pub struct RssSource {
    url: String,
    client: reqwest::Client,
}

impl RssSource {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait]
impl FeedSource for RssSource {
    async fn fetch(&self) -> Result<Vec<RawNewsItem>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("fetching feed {}", self.url))?
            .error_for_status()
            .with_context(|| format!("feed returned error status: {}", self.url))?
            .text()
            .await
            .with_context(|| format!("reading feed body from {}", self.url))?;
        parse_feed(&body, &self.url)
    }

    fn name(&self) -> &str {
        &self.url
    }
}

/// One `RssSource` per configured feed URL, sharing a client.
pub fn build_sources(feeds: &[String]) -> Result<Vec<Box<dyn FeedSource>>> {
    let client = reqwest::Client::builder()
        .user_agent("ai-news-curator/0.1")
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("building feed http client")?;
    Ok(feeds
        .iter()
        .map(|u| Box::new(RssSource::new(u.clone(), client.clone())) as Box<dyn FeedSource>)
        .collect())
}
