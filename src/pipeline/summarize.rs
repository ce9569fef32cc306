//! Cluster summarization. One editorial pass per cluster, merging member
//! coverage into a single title and summary. Failures degrade to the
//! representative's own title and reason so the report always renders.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use serde_json::Value;

use crate::concurrency::map_bounded;
use crate::llm::{prompts, DynLlmBackend, PIPELINE_TEMPERATURE};
use crate::models::{NewsCluster, SummarizedCluster, RESPONSIBLE_AI_MARKER};

pub async fn summarize_clusters(
    backend: DynLlmBackend,
    clusters: Vec<NewsCluster>,
    max_concurrent: usize,
) -> Vec<SummarizedCluster> {
    tracing::info!(
        clusters = clusters.len(),
        max_concurrent,
        "summarizing clusters"
    );
    map_bounded(clusters, max_concurrent, move |cluster| {
        let backend = Arc::clone(&backend);
        async move { summarize_one(backend, cluster).await }
    })
    .await
}

async fn summarize_one(backend: DynLlmBackend, cluster: NewsCluster) -> SummarizedCluster {
    let prompt = prompts::summary_prompt(&cluster);
    match backend.call_json(&prompt, PIPELINE_TEMPERATURE).await {
        Ok(value) => from_response(&cluster, &value),
        Err(e) => {
            tracing::warn!(error = ?e, cluster_id = %cluster.cluster_id, "summarization failed");
            counter!("summarize_errors_total").increment(1);
            fallback(&cluster, &e)
        }
    }
}

fn member_sources_and_ids(cluster: &NewsCluster) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    let mut raw_ids = Vec::with_capacity(cluster.members.len());
    for member in &cluster.members {
        let raw = member.raw();
        if let Some(url) = &raw.url {
            if seen.insert(url.clone()) {
                sources.push(url.clone());
            }
        }
        raw_ids.push(raw.id.clone());
    }
    (sources, raw_ids)
}

fn from_response(cluster: &NewsCluster, value: &Value) -> SummarizedCluster {
    let rep = &cluster.representative;
    let title = value
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(&rep.raw().title)
        .to_string();
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut impact_reason = rep.impact_reason.clone();
    if let Some(notes) = value
        .get("responsible_ai_notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
    {
        impact_reason.push_str("\n\n");
        impact_reason.push_str(RESPONSIBLE_AI_MARKER);
        impact_reason.push(' ');
        impact_reason.push_str(notes);
    }

    let (sources, raw_ids) = member_sources_and_ids(cluster);
    SummarizedCluster {
        cluster_id: cluster.cluster_id.clone(),
        category: rep.item.category.clone(),
        impact_score: rep.impact_score,
        title,
        summary,
        impact_reason,
        sources,
        raw_ids,
    }
}

fn fallback(cluster: &NewsCluster, err: &anyhow::Error) -> SummarizedCluster {
    let rep = &cluster.representative;
    let (sources, raw_ids) = member_sources_and_ids(cluster);
    SummarizedCluster {
        cluster_id: cluster.cluster_id.clone(),
        category: rep.item.category.clone(),
        impact_score: rep.impact_score,
        title: rep.raw().title.clone(),
        summary: format!("Error generating summary: {err}"),
        impact_reason: rep.impact_reason.clone(),
        sources,
        raw_ids,
    }
}
