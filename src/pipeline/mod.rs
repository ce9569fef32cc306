// src/pipeline/mod.rs
//! The daily curation pipeline: fetch → classify → score → cluster →
//! summarize → report. Stages run strictly in sequence; concurrency lives
//! inside each stage.

pub mod classify;
pub mod cluster;
pub mod impact;
pub mod report;
pub mod summarize;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use metrics::{counter, histogram};
use serde::Serialize;

use crate::cache::NewsCache;
use crate::config::Settings;
use crate::ingest::{fetch_all_feeds, FeedSource};
use crate::llm::DynLlmBackend;

pub use classify::{classify_few_shot, classify_zero_shot};
pub use cluster::cluster_items;
pub use impact::score_impact;
pub use report::render_markdown;
pub use summarize::summarize_clusters;

/// Run the full pipeline for `target_date` and write the report. Returns the
/// report path. Fails only on empty ingestion, an embedding batch failure, or
/// unwritable curated/report files; everything else degrades per item.
pub async fn run_daily(
    settings: &Settings,
    backend: DynLlmBackend,
    sources: &[Box<dyn FeedSource>],
    target_date: NaiveDate,
    use_cache: bool,
) -> Result<PathBuf> {
    let cache = if use_cache {
        let cache = Arc::new(NewsCache::new(settings.cache_dir()));
        cache.clear_old_entries(settings.cache_retention_days);
        Some(cache)
    } else {
        None
    };

    let run_start = Instant::now();
    let mut timings: Vec<(&'static str, f64)> = Vec::with_capacity(6);
    tracing::info!(date = %target_date, use_cache, "starting daily pipeline");

    let t = Instant::now();
    let raw_items = fetch_all_feeds(sources, target_date, settings.max_news_age_days).await;
    timings.push(("fetch", t.elapsed().as_secs_f64()));
    if raw_items.is_empty() {
        bail!("no news items fetched");
    }
    snapshot_json(
        &settings.raw_news_dir(),
        &format!("{target_date}.raw.json"),
        &raw_items,
    );

    let t = Instant::now();
    let classified = classify_zero_shot(
        Arc::clone(&backend),
        raw_items,
        target_date,
        cache.clone(),
        settings.max_concurrent,
    )
    .await;
    timings.push(("classify", t.elapsed().as_secs_f64()));

    let t = Instant::now();
    let scored = score_impact(
        Arc::clone(&backend),
        classified,
        target_date,
        cache,
        settings.max_concurrent,
    )
    .await;
    timings.push(("score", t.elapsed().as_secs_f64()));

    let t = Instant::now();
    let clusters = cluster_items(
        Arc::clone(&backend),
        scored,
        settings.similarity_threshold,
    )
    .await
    .context("clustering news items")?;
    timings.push(("cluster", t.elapsed().as_secs_f64()));

    let t = Instant::now();
    let summarized = summarize_clusters(backend, clusters, settings.max_concurrent).await;
    timings.push(("summarize", t.elapsed().as_secs_f64()));

    let t = Instant::now();
    let markdown = render_markdown(&summarized, target_date);
    timings.push(("report", t.elapsed().as_secs_f64()));

    snapshot_json(
        &settings.curated_dir(),
        &format!("{target_date}.curated.json"),
        &summarized,
    );

    let report_path = settings.reports_dir.join(format!("{target_date}.md"));
    fs::create_dir_all(&settings.reports_dir)
        .with_context(|| format!("creating {}", settings.reports_dir.display()))?;
    fs::write(&report_path, markdown)
        .with_context(|| format!("writing report to {}", report_path.display()))?;

    counter!("pipeline_runs_total").increment(1);
    log_timing_summary(&timings, run_start.elapsed().as_secs_f64());
    tracing::info!(
        clusters = summarized.len(),
        report = %report_path.display(),
        "daily pipeline finished"
    );
    Ok(report_path)
}

/// Best-effort JSON snapshot of a pipeline artifact. Snapshots are for
/// debugging and reprocessing, so a failed write is a warning, not an error.
fn snapshot_json<T: Serialize>(dir: &Path, file_name: &str, value: &T) {
    let path = dir.join(file_name);
    let result = fs::create_dir_all(dir)
        .map_err(anyhow::Error::from)
        .and_then(|_| serde_json::to_string_pretty(value).map_err(anyhow::Error::from))
        .and_then(|json| fs::write(&path, json).map_err(anyhow::Error::from));
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "wrote snapshot"),
        Err(e) => tracing::warn!(error = ?e, path = %path.display(), "snapshot write failed"),
    }
}

fn log_timing_summary(timings: &[(&'static str, f64)], total: f64) {
    for (stage, secs) in timings {
        let share = if total > 0.0 { secs / total * 100.0 } else { 0.0 };
        histogram!("pipeline_stage_seconds", "stage" => *stage).record(*secs);
        tracing::info!(
            stage = *stage,
            seconds = %format!("{secs:.2}"),
            percent = %format!("{share:.1}"),
            "stage timing"
        );
    }
    tracing::info!(seconds = %format!("{total:.2}"), "total pipeline time");
}
