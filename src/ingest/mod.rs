// src/ingest/mod.rs
pub mod rss;

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::models::RawNewsItem;

/// One-time metrics registration.
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("ingest_items_total", "Total items parsed from feeds.");
        describe_counter!(
            "ingest_kept_total",
            "Items kept after dedup + age filtering."
        );
        describe_counter!(
            "ingest_dedup_total",
            "Items dropped as duplicate URLs across feeds."
        );
        describe_counter!(
            "ingest_age_filtered_total",
            "Items dropped for being older than the age cutoff."
        );
        describe_counter!("ingest_feed_errors_total", "Feed fetch/parse errors.");
        describe_histogram!("ingest_parse_ms", "Feed parse time in milliseconds.");
    });
}

/// Longest content kept per item; feeds routinely ship whole articles.
const MAX_CONTENT_CHARS: usize = 5000;

/// Normalize feed text: decode HTML entities, strip tags, collapse
/// whitespace, cap length.
pub fn normalize_content(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_CONTENT_CHARS {
        out = out.chars().take(MAX_CONTENT_CHARS).collect();
    }

    out
}

/// A source of news items (one RSS feed, a fixture in tests).
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawNewsItem>>;
    fn name(&self) -> &str;
}

/// Midnight UTC `max_age_days` before the target date. `None` disables the
/// age filter (only reachable on date overflow).
fn age_cutoff(target_date: NaiveDate, max_age_days: i64) -> Option<DateTime<Utc>> {
    target_date
        .checked_sub_days(Days::new(max_age_days.max(0) as u64))
        .map(|d| d.and_time(NaiveTime::MIN).and_utc())
}

/// Fetch every configured feed. Per-feed errors are logged and skipped;
/// surviving items are deduplicated by URL across feeds (first feed wins)
/// and filtered by publication age. Items without a parsed date are kept.
pub async fn fetch_all_feeds(
    sources: &[Box<dyn FeedSource>],
    target_date: NaiveDate,
    max_age_days: i64,
) -> Vec<RawNewsItem> {
    ensure_metrics_described();

    let cutoff = age_cutoff(target_date, max_age_days);

    let mut out: Vec<RawNewsItem> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut dedup = 0usize;
    let mut age_filtered = 0usize;

    for src in sources {
        let items = match src.fetch().await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = ?e, feed = src.name(), "feed error");
                counter!("ingest_feed_errors_total").increment(1);
                continue;
            }
        };
        for item in items {
            if let Some(url) = item.url.as_deref() {
                if seen_urls.contains(url) {
                    dedup += 1;
                    continue;
                }
            }
            if let (Some(cutoff), Some(published)) = (cutoff, item.published_at) {
                if published < cutoff {
                    age_filtered += 1;
                    continue;
                }
            }
            if let Some(url) = item.url.clone() {
                seen_urls.insert(url);
            }
            out.push(item);
        }
    }

    counter!("ingest_kept_total").increment(out.len() as u64);
    counter!("ingest_dedup_total").increment(dedup as u64);
    counter!("ingest_age_filtered_total").increment(age_filtered as u64);
    tracing::info!(
        kept = out.len(),
        dedup,
        age_filtered,
        feeds = sources.len(),
        "feed ingestion finished"
    );

    out
}
