//! Near-duplicate grouping. Items are embedded in batches, then assigned in
//! a single greedy pass: an item joins the first best cluster whose centroid
//! clears the similarity threshold, otherwise it opens a new cluster.
//!
//! Unlike the enrichment stages there is no per-item fallback here. Without
//! embeddings every item would land in its own cluster and the report would
//! silently degrade, so embedding failures abort the run.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::llm::DynLlmBackend;
use crate::models::{clip, NewsCluster, ScoredNewsItem};

const EMBED_BATCH_SIZE: usize = 100;
const EMBED_CONTENT_CHARS: usize = 1000;

fn embedding_text(item: &ScoredNewsItem) -> String {
    let raw = item.raw();
    format!("{}\n{}", raw.title, clip(&raw.content, EMBED_CONTENT_CHARS))
}

pub async fn cluster_items(
    backend: DynLlmBackend,
    items: Vec<ScoredNewsItem>,
    threshold: f32,
) -> Result<Vec<NewsCluster>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let texts: Vec<String> = items.iter().map(embedding_text).collect();
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH_SIZE) {
        embeddings.extend(backend.embed(batch).await?);
    }
    if embeddings.len() != items.len() {
        bail!(
            "embedding count mismatch: {} items, {} vectors",
            items.len(),
            embeddings.len()
        );
    }

    let clusters = assign_clusters(items, embeddings, threshold);
    let merged: usize = clusters
        .iter()
        .filter(|c| c.size() > 1)
        .map(|c| c.size())
        .sum();
    tracing::info!(
        clusters = clusters.len(),
        merged_items = merged,
        threshold,
        "clustered news items"
    );
    Ok(clusters)
}

fn assign_clusters(
    items: Vec<ScoredNewsItem>,
    embeddings: Vec<Vec<f32>>,
    threshold: f32,
) -> Vec<NewsCluster> {
    let mut clusters: Vec<NewsCluster> = Vec::new();
    let mut centroids: Vec<Vec<f32>> = Vec::new();

    for (item, embedding) in items.into_iter().zip(embeddings) {
        let mut best: Option<(usize, f32)> = None;
        for (ci, centroid) in centroids.iter().enumerate() {
            let sim = cosine_similarity(&embedding, centroid);
            // Strict ordering keeps the earliest cluster on ties.
            if sim >= threshold && best.map_or(true, |(_, b)| sim > b) {
                best = Some((ci, sim));
            }
        }

        match best {
            Some((ci, _)) => {
                let cluster = &mut clusters[ci];
                if item.impact_score > cluster.representative.impact_score {
                    cluster.representative = item.clone();
                    centroids[ci] = embedding;
                }
                cluster.members.push(item);
            }
            None => {
                clusters.push(NewsCluster {
                    cluster_id: Uuid::new_v4().to_string(),
                    representative: item.clone(),
                    members: vec![item],
                });
                centroids.push(embedding);
            }
        }
    }

    clusters
}

/// Cosine similarity over dense vectors; 0.0 for mismatched or degenerate
/// inputs rather than NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut na = 0.0f32;
    let mut nb = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}
