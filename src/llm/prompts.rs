//! Prompt templates (embedded at compile time) and the input builders that
//! append item data to them. Content sent to the model is clipped per stage
//! to keep request sizes predictable.

use crate::models::{clip, ClassifiedNewsItem, NewsCluster, RawNewsItem};

pub const CLASSIFY_ZERO_SHOT: &str = include_str!("../../prompts/classifier_zero_shot.txt");
pub const CLASSIFY_FEW_SHOT: &str = include_str!("../../prompts/classifier_few_shot.txt");
pub const IMPACT: &str = include_str!("../../prompts/impact.txt");
pub const SUMMARY: &str = include_str!("../../prompts/summary.txt");

pub fn classify_prompt(template: &str, item: &RawNewsItem) -> String {
    let input = serde_json::json!({
        "title": item.title,
        "content": clip(&item.content, 500),
    });
    format!("{}\n\nInput:\n{}", template, input)
}

pub fn impact_prompt(item: &ClassifiedNewsItem) -> String {
    let input = serde_json::json!({
        "title": item.item.title,
        "content": clip(&item.item.content, 800),
        "category": item.category,
    });
    format!("{}\n\nNews item:\n{}", IMPACT, input)
}

pub fn summary_prompt(cluster: &NewsCluster) -> String {
    let articles: Vec<_> = cluster
        .members
        .iter()
        .map(|m| {
            serde_json::json!({
                "title": m.raw().title,
                "content": clip(&m.raw().content, 500),
                "source": m.raw().source,
                "impact_score": m.impact_score,
                "impact_reason": m.impact_reason,
            })
        })
        .collect();
    let input = serde_json::json!({ "articles": articles });
    format!("{}\n\nArticles:\n{}", SUMMARY, input)
}
