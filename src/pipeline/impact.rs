//! Impact scoring stage. Same cache discipline as classification: hits are
//! served from disk, successes are written back, failures produce a neutral
//! fallback and are not cached.

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::counter;
use serde_json::Value;

use crate::cache::{CacheOp, NewsCache};
use crate::concurrency::map_bounded;
use crate::llm::{coerce_number, prompts, DynLlmBackend, PIPELINE_TEMPERATURE};
use crate::models::{ClassifiedNewsItem, ScoredNewsItem};

const DEFAULT_IMPACT: i64 = 3;

pub async fn score_impact(
    backend: DynLlmBackend,
    items: Vec<ClassifiedNewsItem>,
    target_date: NaiveDate,
    cache: Option<Arc<NewsCache>>,
    max_concurrent: usize,
) -> Vec<ScoredNewsItem> {
    let cache_hits = match &cache {
        Some(c) => items
            .iter()
            .filter(|i| {
                c.get::<ScoredNewsItem>(&i.item.id, CacheOp::Score, target_date)
                    .is_some()
            })
            .count(),
        None => 0,
    };
    tracing::info!(
        items = items.len(),
        max_concurrent,
        cache_hits,
        "scoring news impact"
    );

    let cache = cache.map(|c| (c, target_date));
    map_bounded(items, max_concurrent, move |item| {
        let backend = Arc::clone(&backend);
        let cache = cache.clone();
        async move { score_one(backend, cache, item).await }
    })
    .await
}

async fn score_one(
    backend: DynLlmBackend,
    cache: Option<(Arc<NewsCache>, NaiveDate)>,
    item: ClassifiedNewsItem,
) -> ScoredNewsItem {
    if let Some((cache, date)) = &cache {
        if let Some(hit) = cache.get::<ScoredNewsItem>(&item.item.id, CacheOp::Score, *date) {
            counter!("score_cache_hits_total").increment(1);
            return hit;
        }
    }

    let prompt = prompts::impact_prompt(&item);
    match backend.call_json(&prompt, PIPELINE_TEMPERATURE).await {
        Ok(value) => {
            let scored = from_response(item, &value);
            if let Some((cache, date)) = &cache {
                cache.put(&scored.item.item.id, CacheOp::Score, *date, &scored);
            }
            scored
        }
        Err(e) => {
            tracing::warn!(error = ?e, item_id = %item.item.id, "impact scoring failed");
            counter!("score_errors_total").increment(1);
            fallback(item)
        }
    }
}

fn from_response(item: ClassifiedNewsItem, value: &Value) -> ScoredNewsItem {
    // Fractional scores are truncated, then clamped onto the 1..=5 scale.
    let score = value
        .get("impact_score")
        .and_then(coerce_number)
        .map(|v| v as i64)
        .unwrap_or(DEFAULT_IMPACT)
        .clamp(1, 5) as u8;
    let dimensions = value
        .get("impact_dimensions")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let reason = value
        .get("impact_reason")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    ScoredNewsItem {
        item,
        impact_score: score,
        impact_reason: reason,
        impact_dimensions: dimensions,
    }
}

fn fallback(item: ClassifiedNewsItem) -> ScoredNewsItem {
    ScoredNewsItem {
        item,
        impact_score: DEFAULT_IMPACT as u8,
        impact_reason: "Error during scoring".to_string(),
        impact_dimensions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassificationMethod, RawNewsItem};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        response: Result<Value, String>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn ok(v: Value) -> Arc<Self> {
            Arc::new(Self {
                response: Ok(v),
                calls: AtomicUsize::new(0),
            })
        }
        fn failing() -> Arc<Self> {
            Arc::new(Self {
                response: Err("upstream".into()),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl crate::llm::LlmBackend for ScriptedBackend {
        async fn call_json(&self, _prompt: &str, _temperature: f32) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(v) => Ok(v.clone()),
                Err(e) => anyhow::bail!("{e}"),
            }
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            anyhow::bail!("not used")
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    fn classified(title: &str) -> ClassifiedNewsItem {
        ClassifiedNewsItem {
            item: RawNewsItem::new("Src", title, None, None, "body"),
            category: "AI Models".to_string(),
            classification_confidence: 0.9,
            classification_method: ClassificationMethod::ZeroShot,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn parses_score_reason_and_dimensions() {
        let backend = ScriptedBackend::ok(serde_json::json!({
            "impact_score": 4,
            "impact_reason": "broad deployment",
            "impact_dimensions": ["industry", "developers"]
        }));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 4);
        assert_eq!(out[0].impact_reason, "broad deployment");
        assert_eq!(out[0].impact_dimensions, vec!["industry", "developers"]);
    }

    #[tokio::test]
    async fn fractional_scores_truncate_and_clamp() {
        let backend = ScriptedBackend::ok(serde_json::json!({"impact_score": 4.9}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 4);

        let backend = ScriptedBackend::ok(serde_json::json!({"impact_score": 11}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 5);

        let backend = ScriptedBackend::ok(serde_json::json!({"impact_score": -2}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 1);
    }

    #[tokio::test]
    async fn quoted_scores_coerce_before_defaulting() {
        let backend = ScriptedBackend::ok(serde_json::json!({"impact_score": "4"}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 4);

        let backend = ScriptedBackend::ok(serde_json::json!({"impact_score": "very high"}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 3);
    }

    #[tokio::test]
    async fn missing_score_defaults_to_three() {
        let backend = ScriptedBackend::ok(serde_json::json!({"impact_reason": "unclear"}));
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 3);
        assert_eq!(out[0].impact_reason, "unclear");
    }

    #[tokio::test]
    async fn backend_error_yields_neutral_fallback() {
        let backend = ScriptedBackend::failing();
        let out = score_impact(backend, vec![classified("a")], date(), None, 4).await;
        assert_eq!(out[0].impact_score, 3);
        assert_eq!(out[0].impact_reason, "Error during scoring");
        assert!(out[0].impact_dimensions.is_empty());
    }

    #[tokio::test]
    async fn cache_hit_skips_the_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(NewsCache::new(tmp.path()));
        let backend = ScriptedBackend::ok(serde_json::json!({
            "impact_score": 5,
            "impact_reason": "major release",
            "impact_dimensions": ["industry"]
        }));

        let items = vec![classified("a")];
        let first = score_impact(
            backend.clone(),
            items.clone(),
            date(),
            Some(Arc::clone(&cache)),
            4,
        )
        .await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let second = score_impact(backend.clone(), items, date(), Some(cache), 4).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, second);
    }
}
