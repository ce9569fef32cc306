//! Runtime settings. Scalars come from environment variables (`.env` is
//! loaded by the binaries); the feed list can also come from a file:
//! 1) $RSS_FEEDS (comma-separated)
//! 2) $NEWS_FEEDS_PATH (TOML or JSON file)
//! 3) config/feeds.toml
//! 4) config/feeds.json
//! 5) built-in default list

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

pub const DEFAULT_MAX_NEWS_AGE_DAYS: i64 = 2;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MAX_CONCURRENT: usize = 10;
pub const DEFAULT_CACHE_RETENTION_DAYS: u32 = 7;

const ENV_FEEDS: &str = "RSS_FEEDS";
const ENV_FEEDS_PATH: &str = "NEWS_FEEDS_PATH";

pub const DEFAULT_FEEDS: [&str; 6] = [
    "https://hnrss.org/frontpage",
    "https://techcrunch.com/feed/",
    "https://openai.com/blog/rss.xml",
    "https://developer.nvidia.com/blog/feed/",
    "http://export.arxiv.org/rss/cs.CL",
    "http://export.arxiv.org/rss/cs.AI",
];

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub openai_model: String,
    pub embedding_model: String,
    pub max_news_age_days: i64,
    pub similarity_threshold: f32,
    pub max_concurrent: usize,
    pub cache_retention_days: u32,
    pub data_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub rss_feeds: Vec<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let similarity_threshold = parse_threshold(env::var("SIMILARITY_THRESHOLD").ok())
            .unwrap_or(DEFAULT_SIMILARITY_THRESHOLD);
        Ok(Self {
            openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
            openai_api_base: env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            embedding_model: env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| "text-embedding-3-small".to_string()),
            max_news_age_days: env_parse("MAX_NEWS_AGE_DAYS", DEFAULT_MAX_NEWS_AGE_DAYS),
            similarity_threshold,
            max_concurrent: env_parse("MAX_CONCURRENT", DEFAULT_MAX_CONCURRENT).max(1),
            cache_retention_days: env_parse("CACHE_RETENTION_DAYS", DEFAULT_CACHE_RETENTION_DAYS),
            data_dir: PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string())),
            reports_dir: PathBuf::from(
                env::var("REPORTS_DIR").unwrap_or_else(|_| "reports".to_string()),
            ),
            rss_feeds: load_feeds_default()?,
        })
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    pub fn raw_news_dir(&self) -> PathBuf {
        self.data_dir.join("raw_news")
    }

    pub fn curated_dir(&self) -> PathBuf {
        self.data_dir.join("curated")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold(raw: Option<String>) -> Option<f32> {
    raw.and_then(|s| s.trim().parse::<f32>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}

/// Resolve the feed list. A set `$RSS_FEEDS` wins; a set `$NEWS_FEEDS_PATH`
/// must point at an existing file.
pub fn load_feeds_default() -> Result<Vec<String>> {
    if let Ok(raw) = env::var(ENV_FEEDS) {
        let feeds = clean_list(raw.split(',').map(|s| s.to_string()).collect());
        if !feeds.is_empty() {
            return Ok(feeds);
        }
    }
    if let Ok(p) = env::var(ENV_FEEDS_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_feeds_from(&pb);
        } else {
            return Err(anyhow!("NEWS_FEEDS_PATH points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/feeds.toml");
    if toml_p.exists() {
        return load_feeds_from(&toml_p);
    }
    let json_p = PathBuf::from("config/feeds.json");
    if json_p.exists() {
        return load_feeds_from(&json_p);
    }
    Ok(DEFAULT_FEEDS.iter().map(|s| s.to_string()).collect())
}

/// Load feeds from an explicit path. Supports TOML or JSON formats.
pub fn load_feeds_from(path: &Path) -> Result<Vec<String>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("reading feeds from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_feeds(&content, ext.as_str())
}

fn parse_feeds(s: &str, hint_ext: &str) -> Result<Vec<String>> {
    let try_toml = hint_ext == "toml" || s.contains("feeds");
    if try_toml {
        if let Ok(v) = parse_toml_feeds(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json_feeds(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml_feeds(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported feeds format"))
}

fn parse_toml_feeds(s: &str) -> Result<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct TomlFeeds {
        feeds: Vec<String>,
    }
    let v: TomlFeeds = toml::from_str(s)?;
    Ok(clean_list(v.feeds))
}

fn parse_json_feeds(s: &str) -> Result<Vec<String>> {
    let v: Vec<String> = serde_json::from_str(s)?;
    Ok(clean_list(v))
}

/// Trim entries and drop empties. Order is kept; feed order decides which
/// copy of a cross-posted story wins URL dedup later.
fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn feed_formats_parse_and_keep_order() {
        let toml = r#"feeds = [" https://a/rss ", "", "https://b/rss"]"#;
        let json = r#"["https://b/rss", "  https://a/rss  ", ""]"#;
        assert_eq!(
            parse_toml_feeds(toml).unwrap(),
            vec!["https://a/rss".to_string(), "https://b/rss".to_string()]
        );
        assert_eq!(
            parse_json_feeds(json).unwrap(),
            vec!["https://b/rss".to_string(), "https://a/rss".to_string()]
        );
    }

    #[test]
    fn threshold_parses_and_clamps() {
        assert_eq!(parse_threshold(Some("0.95".into())), Some(0.95));
        assert_eq!(parse_threshold(Some("1.7".into())), Some(1.0));
        assert_eq!(parse_threshold(Some("abc".into())), None);
        assert_eq!(parse_threshold(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_and_defaults() {
        std::env::remove_var("SIMILARITY_THRESHOLD");
        std::env::remove_var("MAX_CONCURRENT");
        std::env::remove_var(ENV_FEEDS_PATH);
        std::env::set_var(ENV_FEEDS, "https://x/rss,https://y/rss");

        let s = Settings::from_env().unwrap();
        assert_eq!(s.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);
        assert_eq!(s.max_concurrent, DEFAULT_MAX_CONCURRENT);
        assert_eq!(s.rss_feeds, vec!["https://x/rss", "https://y/rss"]);

        std::env::set_var("SIMILARITY_THRESHOLD", "0.9");
        std::env::set_var("MAX_CONCURRENT", "3");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.similarity_threshold, 0.9);
        assert_eq!(s.max_concurrent, 3);

        // Garbage falls back to the default.
        std::env::set_var("SIMILARITY_THRESHOLD", "not-a-number");
        let s = Settings::from_env().unwrap();
        assert_eq!(s.similarity_threshold, DEFAULT_SIMILARITY_THRESHOLD);

        std::env::remove_var("SIMILARITY_THRESHOLD");
        std::env::remove_var("MAX_CONCURRENT");
        std::env::remove_var(ENV_FEEDS);
    }

    #[serial_test::serial]
    #[test]
    fn feeds_path_env_takes_precedence_over_defaults() {
        std::env::remove_var(ENV_FEEDS);
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("feeds.json");
        fs::write(&p, r#"["https://only/rss"]"#).unwrap();
        std::env::set_var(ENV_FEEDS_PATH, p.display().to_string());

        let feeds = load_feeds_default().unwrap();
        assert_eq!(feeds, vec!["https://only/rss".to_string()]);

        std::env::set_var(ENV_FEEDS_PATH, tmp.path().join("missing.json").display().to_string());
        assert!(load_feeds_default().is_err());

        std::env::remove_var(ENV_FEEDS_PATH);
    }
}
