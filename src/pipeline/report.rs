//! Markdown report rendering. Pure string building over the final cluster
//! list; all I/O stays in the orchestration layer.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::models::SummarizedCluster;

const EXEC_SUMMARY_ITEMS: usize = 5;
const EXEC_SUMMARY_CHARS: usize = 200;

pub fn render_markdown(clusters: &[SummarizedCluster], report_date: NaiveDate) -> String {
    // Impact descending; the sort is stable so clusters with equal scores keep
    // creation order.
    let mut sorted: Vec<&SummarizedCluster> = clusters.iter().collect();
    sorted.sort_by(|a, b| b.impact_score.cmp(&a.impact_score));

    let mut by_category: BTreeMap<&str, Vec<&SummarizedCluster>> = BTreeMap::new();
    for c in &sorted {
        by_category.entry(c.category.as_str()).or_default().push(*c);
    }

    let impact_5: Vec<&SummarizedCluster> = sorted
        .iter()
        .copied()
        .filter(|c| c.impact_score == 5)
        .collect();
    let impact_4: Vec<&SummarizedCluster> = sorted
        .iter()
        .copied()
        .filter(|c| c.impact_score == 4)
        .collect();
    let merged: Vec<&SummarizedCluster> = sorted
        .iter()
        .copied()
        .filter(|c| c.sources.len() > 1)
        .collect();
    let rai_notes: Vec<_> = sorted
        .iter()
        .filter_map(|c| c.responsible_ai_notes().map(|n| (c.title.as_str(), n)))
        .collect();

    let mut lines: Vec<String> = Vec::new();

    lines.push("# AI News Curator Daily Report".to_string());
    lines.push(format!("**Date:** {}", report_date.format("%Y-%m-%d")));
    lines.push(format!("**Total Stories:** {}", clusters.len()));
    lines.push(String::new());

    lines.push("## Executive Summary".to_string());
    lines.push(String::new());
    for c in sorted.iter().take(EXEC_SUMMARY_ITEMS) {
        lines.push(format!(
            "- **{}** ({}, Impact: {})",
            c.title, c.category, c.impact_score
        ));
        let preview: String = c.summary.chars().take(EXEC_SUMMARY_CHARS).collect();
        lines.push(format!("  {preview}..."));
        lines.push(String::new());
    }

    if !impact_5.is_empty() {
        lines.push("## Most Important (Impact Score: 5)".to_string());
        lines.push(String::new());
        for c in &impact_5 {
            lines.push(format!("### {}", c.title));
            lines.push(format!("**Category:** {}", c.category));
            lines.push(format!("**Impact Score:** {}", c.impact_score));
            lines.push(String::new());
            lines.push("**Summary:**".to_string());
            lines.push(c.summary.clone());
            lines.push(String::new());
            lines.push("**Why it matters:**".to_string());
            lines.push(c.reason_without_notes().to_string());
            lines.push(String::new());
            push_sources(&mut lines, &c.sources, 3);
        }
    }

    if !impact_4.is_empty() {
        lines.push("## High Priority (Impact Score: 4)".to_string());
        lines.push(String::new());
        for c in &impact_4 {
            lines.push(format!("### {}", c.title));
            lines.push(format!("**Category:** {}", c.category));
            lines.push(String::new());
            lines.push(c.summary.clone());
            lines.push(String::new());
            push_sources(&mut lines, &c.sources, 2);
        }
    }

    lines.push("## News by Category".to_string());
    lines.push(String::new());
    for (category, items) in &by_category {
        lines.push(format!("### {} ({} items)", category, items.len()));
        lines.push(String::new());
        for c in items {
            lines.push(format!("#### {}", c.title));
            lines.push(format!("*Impact Score: {}*", c.impact_score));
            lines.push(String::new());
            lines.push(c.summary.clone());
            lines.push(String::new());
            push_sources(&mut lines, &c.sources, 2);
        }
    }

    if !merged.is_empty() {
        lines.push("## Merged / Duplicate Stories".to_string());
        lines.push(String::new());
        lines.push(format!(
            "The following {} stories were merged from multiple sources:",
            merged.len()
        ));
        lines.push(String::new());
        for c in &merged {
            lines.push(format!(
                "- **{}**: Merged from {} sources",
                c.title,
                c.sources.len()
            ));
            let shown: Vec<&str> = c.sources.iter().take(3).map(String::as_str).collect();
            lines.push(format!("  - {}", shown.join(", ")));
            if c.sources.len() > 3 {
                lines.push(format!("  - ... and {} more", c.sources.len() - 3));
            }
            lines.push(String::new());
        }
    }

    if !rai_notes.is_empty() {
        lines.push("## Responsible AI Notes".to_string());
        lines.push(String::new());
        lines.push("The following items include notes on potential concerns:".to_string());
        lines.push(String::new());
        for (title, note) in &rai_notes {
            lines.push(format!("### {title}"));
            lines.push(note.to_string());
            lines.push(String::new());
        }
    }

    lines.push("---".to_string());
    lines.push(String::new());
    lines.push("*Generated by AI News Curator*".to_string());

    lines.join("\n")
}

fn push_sources(lines: &mut Vec<String>, sources: &[String], limit: usize) {
    if sources.is_empty() {
        return;
    }
    lines.push("**Sources:**".to_string());
    for s in sources.iter().take(limit) {
        lines.push(format!("- {s}"));
    }
    if sources.len() > limit {
        lines.push(format!("- ... and {} more", sources.len() - limit));
    }
    lines.push(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RESPONSIBLE_AI_MARKER;

    fn cluster(title: &str, category: &str, impact: u8, sources: &[&str]) -> SummarizedCluster {
        SummarizedCluster {
            cluster_id: format!("c-{title}"),
            category: category.to_string(),
            impact_score: impact,
            title: title.to_string(),
            summary: format!("Summary of {title}."),
            impact_reason: format!("{title} matters."),
            sources: sources.iter().map(|s| s.to_string()).collect(),
            raw_ids: vec!["r1".to_string()],
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()
    }

    fn exec_section(md: &str) -> &str {
        md.split("## Executive Summary")
            .nth(1)
            .unwrap()
            .split("## ")
            .next()
            .unwrap()
    }

    #[test]
    fn header_and_sections_reflect_the_input() {
        let clusters = vec![
            cluster("Top story", "AI Models", 5, &["https://x/1", "https://x/2"]),
            cluster("Second", "AI Research", 4, &["https://x/3"]),
            cluster("Minor", "Other", 2, &[]),
        ];
        let md = render_markdown(&clusters, date());

        assert!(md.contains("# AI News Curator Daily Report"));
        assert!(md.contains("**Date:** 2025-06-10"));
        assert!(md.contains("**Total Stories:** 3"));
        assert!(md.contains("## Most Important (Impact Score: 5)"));
        assert!(md.contains("## High Priority (Impact Score: 4)"));
        assert!(md.contains("### Top story"));
        assert!(md.contains("**Why it matters:**\nTop story matters."));
        // Only the two-source cluster is listed as merged.
        assert!(md.contains("## Merged / Duplicate Stories"));
        assert!(md.contains("**Top story**: Merged from 2 sources"));
        assert!(!md.contains("**Second**: Merged"));
    }

    #[test]
    fn impact_sections_absent_without_matching_clusters() {
        let clusters = vec![cluster("Only", "Other", 3, &["https://x/1"])];
        let md = render_markdown(&clusters, date());
        assert!(!md.contains("## Most Important"));
        assert!(!md.contains("## High Priority"));
        assert!(!md.contains("## Merged / Duplicate Stories"));
        assert!(!md.contains("## Responsible AI Notes"));
        assert!(md.contains("### Other (1 items)"));
    }

    #[test]
    fn executive_summary_caps_at_five_highest_impact() {
        let clusters: Vec<_> = (0..7)
            .map(|i| cluster(&format!("story-{i}"), "Other", 1 + (i % 5) as u8, &[]))
            .collect();
        let md = render_markdown(&clusters, date());
        let exec = exec_section(&md);
        assert_eq!(exec.matches("- **story-").count(), 5);
        // Highest score (story-4, impact 5) leads the summary.
        assert!(exec.trim_start().starts_with("- **story-4**"));
    }

    #[test]
    fn responsible_ai_section_uses_the_split_note() {
        let mut c = cluster("Flagged", "AI Models", 5, &["https://x/1"]);
        c.impact_reason = format!("Big.\n\n{RESPONSIBLE_AI_MARKER} Bias risk.");
        let md = render_markdown(&[c], date());
        assert!(md.contains("## Responsible AI Notes"));
        assert!(md.contains("### Flagged\nBias risk."));
        // The "Why it matters" block stays free of the note.
        assert!(md.contains("**Why it matters:**\nBig."));
    }

    #[test]
    fn long_summaries_are_clipped_in_the_executive_summary() {
        let mut c = cluster("Long", "Other", 3, &[]);
        c.summary = "z".repeat(500);
        let md = render_markdown(&[c], date());
        let exec = exec_section(&md);
        assert!(exec.contains(&format!("  {}...", "z".repeat(200))));
        assert!(!exec.contains(&"z".repeat(201)));
        // The category section keeps the full text.
        assert!(md.contains(&"z".repeat(500)));
    }

    #[test]
    fn source_lists_are_capped_per_section() {
        let urls: Vec<String> = (0..5).map(|i| format!("https://x/{i}")).collect();
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let md = render_markdown(&[cluster("Busy", "AI Models", 5, &url_refs)], date());
        // The impact-5 section shows 3 sources then the remainder count.
        assert!(md.contains("- https://x/2"));
        assert!(md.contains("- ... and 2 more"));
    }
}
