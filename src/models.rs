//! Core entities flowing through the curation pipeline:
//! raw feed item → classified → scored → cluster → summarized cluster.
//! Plain data with serde derives; enrichment fields are additive so every
//! stage output still carries the full upstream record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The fixed category set. Anything the model proposes outside this list is
/// clamped to "Other".
pub const CATEGORIES: [&str; 7] = [
    "AI Models",
    "AI Infrastructure & Hardware",
    "AI Research",
    "AI Policy & Regulation",
    "Developer Tools & Platforms",
    "Tech Business & Strategy",
    "Other",
];

pub const FALLBACK_CATEGORY: &str = "Other";

/// Snap a model-proposed category onto the fixed set.
pub fn canonical_category(raw: &str) -> String {
    let t = raw.trim();
    if CATEGORIES.contains(&t) {
        t.to_string()
    } else {
        FALLBACK_CATEGORY.to_string()
    }
}

/// First `max_chars` characters of `s` (characters, not bytes; clipping must
/// never split a multi-byte character).
pub(crate) fn clip(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Hex digest of the first `n` bytes of Sha256(input).
pub(crate) fn hex_digest(input: &str, n: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(n * 2);
    for b in digest.iter().take(n) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// A normalized news item as fetched from a feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawNewsItem {
    /// Content fingerprint; stable across re-fetches of the same story.
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub source: String,
    pub published_at: Option<DateTime<Utc>>,
    pub content: String,
}

impl RawNewsItem {
    pub fn new(
        source: impl Into<String>,
        title: impl Into<String>,
        url: Option<String>,
        published_at: Option<DateTime<Utc>>,
        content: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let title = title.into();
        let id = Self::fingerprint(&source, &title, url.as_deref());
        Self {
            id,
            title,
            url,
            source,
            published_at,
            content: content.into(),
        }
    }

    /// Identity is (source, title, url); body text may differ between fetches.
    pub fn fingerprint(source: &str, title: &str, url: Option<&str>) -> String {
        let seed = format!("{}:{}:{}", source, title, url.unwrap_or_default());
        hex_digest(&seed, 16)
    }
}

/// How a classification was produced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ClassificationMethod {
    ZeroShot,
    FewShot,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassifiedNewsItem {
    #[serde(flatten)]
    pub item: RawNewsItem,
    pub category: String,
    pub classification_confidence: f32,
    pub classification_method: ClassificationMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredNewsItem {
    #[serde(flatten)]
    pub item: ClassifiedNewsItem,
    /// 1 (minor) ..= 5 (industry-shifting).
    pub impact_score: u8,
    pub impact_reason: String,
    pub impact_dimensions: Vec<String>,
}

impl ScoredNewsItem {
    pub fn raw(&self) -> &RawNewsItem {
        &self.item.item
    }
}

/// A group of near-duplicate stories. `representative` is the highest-impact
/// member seen so far and is always present in `members`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsCluster {
    pub cluster_id: String,
    pub representative: ScoredNewsItem,
    pub members: Vec<ScoredNewsItem>,
}

impl NewsCluster {
    pub fn size(&self) -> usize {
        self.members.len()
    }
}

/// Marker appended to `impact_reason` when the model surfaced a responsible-AI
/// angle; the report splits on it.
pub const RESPONSIBLE_AI_MARKER: &str = "Responsible AI Notes:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizedCluster {
    pub cluster_id: String,
    pub category: String,
    pub impact_score: u8,
    pub title: String,
    pub summary: String,
    pub impact_reason: String,
    /// Deduplicated member URLs, first occurrence order.
    pub sources: Vec<String>,
    /// Member item ids, in member order.
    pub raw_ids: Vec<String>,
}

impl SummarizedCluster {
    /// `impact_reason` without the responsible-AI suffix, for report sections
    /// that render the note separately.
    pub fn reason_without_notes(&self) -> &str {
        match self.impact_reason.find(RESPONSIBLE_AI_MARKER) {
            Some(pos) => self.impact_reason[..pos].trim_end(),
            None => &self.impact_reason,
        }
    }

    /// The responsible-AI note, if one was attached.
    pub fn responsible_ai_notes(&self) -> Option<&str> {
        self.impact_reason
            .find(RESPONSIBLE_AI_MARKER)
            .map(|pos| self.impact_reason[pos + RESPONSIBLE_AI_MARKER.len()..].trim())
            .filter(|s| !s.is_empty())
    }
}
