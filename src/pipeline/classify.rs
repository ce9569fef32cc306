//! Classification stage. Zero-shot is the pipeline path and is cached per
//! (item, date); few-shot exists for the offline evaluation and is never
//! cached.

use std::sync::Arc;

use chrono::NaiveDate;
use metrics::counter;
use serde_json::Value;

use crate::cache::{CacheOp, NewsCache};
use crate::concurrency::map_bounded;
use crate::llm::{coerce_number, prompts, DynLlmBackend, PIPELINE_TEMPERATURE};
use crate::models::{
    canonical_category, ClassificationMethod, ClassifiedNewsItem, RawNewsItem, FALLBACK_CATEGORY,
};

pub async fn classify_zero_shot(
    backend: DynLlmBackend,
    items: Vec<RawNewsItem>,
    target_date: NaiveDate,
    cache: Option<Arc<NewsCache>>,
    max_concurrent: usize,
) -> Vec<ClassifiedNewsItem> {
    let cache_hits = match &cache {
        Some(c) => items
            .iter()
            .filter(|i| {
                c.get::<ClassifiedNewsItem>(&i.id, CacheOp::Classify, target_date)
                    .is_some()
            })
            .count(),
        None => 0,
    };
    tracing::info!(
        items = items.len(),
        max_concurrent,
        cache_hits,
        "classifying news items (zero-shot)"
    );

    let cache = cache.map(|c| (c, target_date));
    map_bounded(items, max_concurrent, move |item| {
        let backend = Arc::clone(&backend);
        let cache = cache.clone();
        async move { classify_one(backend, cache, item, ClassificationMethod::ZeroShot).await }
    })
    .await
}

pub async fn classify_few_shot(
    backend: DynLlmBackend,
    items: Vec<RawNewsItem>,
    max_concurrent: usize,
) -> Vec<ClassifiedNewsItem> {
    tracing::info!(
        items = items.len(),
        max_concurrent,
        "classifying news items (few-shot)"
    );
    map_bounded(items, max_concurrent, move |item| {
        let backend = Arc::clone(&backend);
        async move { classify_one(backend, None, item, ClassificationMethod::FewShot).await }
    })
    .await
}

async fn classify_one(
    backend: DynLlmBackend,
    cache: Option<(Arc<NewsCache>, NaiveDate)>,
    item: RawNewsItem,
    method: ClassificationMethod,
) -> ClassifiedNewsItem {
    if let Some((cache, date)) = &cache {
        if let Some(hit) = cache.get::<ClassifiedNewsItem>(&item.id, CacheOp::Classify, *date) {
            counter!("classify_cache_hits_total").increment(1);
            return hit;
        }
    }

    let template = match method {
        ClassificationMethod::ZeroShot => prompts::CLASSIFY_ZERO_SHOT,
        ClassificationMethod::FewShot => prompts::CLASSIFY_FEW_SHOT,
    };
    let prompt = prompts::classify_prompt(template, &item);

    match backend.call_json(&prompt, PIPELINE_TEMPERATURE).await {
        Ok(value) => {
            let classified = from_response(item, &value, method);
            if let Some((cache, date)) = &cache {
                cache.put(
                    &classified.item.id,
                    CacheOp::Classify,
                    *date,
                    &classified,
                );
            }
            classified
        }
        Err(e) => {
            tracing::warn!(error = ?e, item_id = %item.id, "classification failed");
            counter!("classify_errors_total").increment(1);
            fallback(item, method)
        }
    }
}

fn from_response(item: RawNewsItem, value: &Value, method: ClassificationMethod) -> ClassifiedNewsItem {
    let category = value
        .get("category")
        .and_then(Value::as_str)
        .map(canonical_category)
        .unwrap_or_else(|| FALLBACK_CATEGORY.to_string());
    let confidence = value
        .get("confidence")
        .and_then(coerce_number)
        .map(|v| v as f32)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    ClassifiedNewsItem {
        item,
        category,
        classification_confidence: confidence,
        classification_method: method,
    }
}

fn fallback(item: RawNewsItem, method: ClassificationMethod) -> ClassifiedNewsItem {
    ClassifiedNewsItem {
        item,
        category: FALLBACK_CATEGORY.to_string(),
        classification_confidence: 0.0,
        classification_method: method,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    fn raw(title: &str) -> RawNewsItem {
        RawNewsItem::new("Src", title, Some(format!("https://x/{title}")), None, "body")
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[tokio::test]
    async fn parses_category_and_confidence() {
        let backend =
            ScriptedBackend::ok(serde_json::json!({"category": "AI Models", "confidence": 0.9}));
        let out = classify_zero_shot(backend.clone(), vec![raw("a")], date(), None, 4).await;
        assert_eq!(out[0].category, "AI Models");
        assert!((out[0].classification_confidence - 0.9).abs() < 1e-6);
        assert_eq!(out[0].classification_method, ClassificationMethod::ZeroShot);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_category_clamps_and_confidence_defaults() {
        let backend = ScriptedBackend::ok(serde_json::json!({"category": "Quantum Weather"}));
        let out = classify_zero_shot(backend, vec![raw("a")], date(), None, 4).await;
        assert_eq!(out[0].category, "Other");
        assert!((out[0].classification_confidence - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn quoted_confidence_coerces() {
        let backend =
            ScriptedBackend::ok(serde_json::json!({"category": "AI Models", "confidence": "0.7"}));
        let out = classify_zero_shot(backend, vec![raw("a")], date(), None, 4).await;
        assert_eq!(out[0].category, "AI Models");
        assert!((out[0].classification_confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn backend_error_falls_back_to_other() {
        let backend = ScriptedBackend::failing();
        let out = classify_zero_shot(backend, vec![raw("a")], date(), None, 4).await;
        assert_eq!(out[0].category, "Other");
        assert_eq!(out[0].classification_confidence, 0.0);
    }

    #[tokio::test]
    async fn cache_hit_skips_the_backend() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = Arc::new(NewsCache::new(tmp.path()));
        let backend =
            ScriptedBackend::ok(serde_json::json!({"category": "AI Research", "confidence": 0.8}));

        let items = vec![raw("a")];
        let first = classify_zero_shot(
            backend.clone(),
            items.clone(),
            date(),
            Some(Arc::clone(&cache)),
            4,
        )
        .await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let second = classify_zero_shot(backend.clone(), items, date(), Some(cache), 4).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1); // served from cache
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn few_shot_marks_method_and_skips_cache_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let cache = NewsCache::new(tmp.path());
        let backend =
            ScriptedBackend::ok(serde_json::json!({"category": "AI Models", "confidence": 1.0}));

        let items = vec![raw("a")];
        let out = classify_few_shot(backend, items.clone(), 4).await;
        assert_eq!(out[0].classification_method, ClassificationMethod::FewShot);
        assert!(cache
            .get::<ClassifiedNewsItem>(&items[0].id, CacheOp::Classify, date())
            .is_none());
    }

    #[tokio::test]
    async fn preserves_input_order() {
        let backend =
            ScriptedBackend::ok(serde_json::json!({"category": "AI Models", "confidence": 0.9}));
        let items: Vec<_> = (0..8).map(|i| raw(&format!("t{i}"))).collect();
        let expected: Vec<_> = items.iter().map(|i| i.id.clone()).collect();
        let out = classify_zero_shot(backend, items, date(), None, 3).await;
        let got: Vec<_> = out.iter().map(|c| c.item.id.clone()).collect();
        assert_eq!(got, expected);
    }
}
