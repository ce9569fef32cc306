//! Offline classification evaluation: runs zero-shot and few-shot over a
//! labeled sample set and reports overall + per-category accuracy. The only
//! consumer of few-shot mode; nothing here touches the cache.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;

use ai_news_curator::models::{ClassifiedNewsItem, RawNewsItem};
use ai_news_curator::pipeline::{classify_few_shot, classify_zero_shot};
use ai_news_curator::{OpenAiBackend, Settings};

#[derive(Parser)]
#[command(name = "eval-classify", version, about = "Zero-shot vs few-shot classification accuracy")]
struct Cli {
    /// Labeled samples: JSON array of {id, title, content, true_category}.
    #[arg(long, default_value = "evaluation/sample_labels.json")]
    labels: PathBuf,
    #[arg(long, default_value_t = 10)]
    max_concurrent: usize,
}

#[derive(Debug, Deserialize)]
struct LabeledSample {
    id: String,
    title: String,
    content: String,
    true_category: String,
}

#[derive(Default)]
struct Tally {
    correct: usize,
    total: usize,
}

impl Tally {
    fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

fn tally(
    results: &[ClassifiedNewsItem],
    truth: &BTreeMap<String, String>,
) -> (Tally, BTreeMap<String, Tally>) {
    let mut overall = Tally::default();
    let mut per_category: BTreeMap<String, Tally> = BTreeMap::new();
    for item in results {
        let Some(true_cat) = truth.get(&item.item.id) else {
            continue;
        };
        let hit = &item.category == true_cat;
        overall.total += 1;
        overall.correct += hit as usize;
        let t = per_category.entry(true_cat.clone()).or_default();
        t.total += 1;
        t.correct += hit as usize;
    }
    (overall, per_category)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let raw = fs::read_to_string(&cli.labels)
        .with_context(|| format!("reading labels from {}", cli.labels.display()))?;
    let samples: Vec<LabeledSample> =
        serde_json::from_str(&raw).context("parsing labeled samples")?;
    if samples.is_empty() {
        bail!("no labeled samples in {}", cli.labels.display());
    }

    let mut items = Vec::with_capacity(samples.len());
    let mut truth = BTreeMap::new();
    for s in samples {
        // Labels carry their own ids; keep them instead of fingerprinting.
        items.push(RawNewsItem {
            id: s.id.clone(),
            title: s.title,
            url: None,
            source: "evaluation".to_string(),
            published_at: None,
            content: s.content,
        });
        truth.insert(s.id, s.true_category);
    }
    println!("Loaded {} labeled samples", items.len());

    let settings = Settings::from_env()?;
    let backend = Arc::new(OpenAiBackend::new(&settings)?);
    let eval_date = Utc::now().date_naive();

    println!("[1/2] Running zero-shot classification...");
    let zero_shot = classify_zero_shot(
        backend.clone(),
        items.clone(),
        eval_date,
        None,
        cli.max_concurrent,
    )
    .await;

    println!("[2/2] Running few-shot classification...");
    let few_shot = classify_few_shot(backend, items, cli.max_concurrent).await;

    let (zs, zs_by_cat) = tally(&zero_shot, &truth);
    let (fs_, fs_by_cat) = tally(&few_shot, &truth);

    println!("\nOverall Accuracy:");
    println!("  Zero-shot: {:.2}% ({}/{})", zs.accuracy() * 100.0, zs.correct, zs.total);
    println!("  Few-shot:  {:.2}% ({}/{})", fs_.accuracy() * 100.0, fs_.correct, fs_.total);
    println!("  Improvement: {:+.2}%", (fs_.accuracy() - zs.accuracy()) * 100.0);

    println!("\nPer-Category Accuracy:");
    println!("{:<35} {:<18} {:<18}", "Category", "Zero-shot", "Few-shot");
    for cat in truth.values().collect::<std::collections::BTreeSet<_>>() {
        let z = zs_by_cat.get(cat.as_str()).map_or(0.0, Tally::accuracy);
        let f = fs_by_cat.get(cat.as_str()).map_or(0.0, Tally::accuracy);
        println!("{cat:<35} {:>7.2}% {:>16.2}%", z * 100.0, f * 100.0);
    }

    let results_path = cli.labels.with_file_name("classification_results.md");
    let md = render_results(&zs, &fs_, &zs_by_cat, &fs_by_cat, &zero_shot, &few_shot, &truth);
    fs::write(&results_path, md)
        .with_context(|| format!("writing results to {}", results_path.display()))?;
    println!("\nResults saved to {}", results_path.display());
    Ok(())
}

fn render_results(
    zs: &Tally,
    fs_: &Tally,
    zs_by_cat: &BTreeMap<String, Tally>,
    fs_by_cat: &BTreeMap<String, Tally>,
    zero_shot: &[ClassifiedNewsItem],
    few_shot: &[ClassifiedNewsItem],
    truth: &BTreeMap<String, String>,
) -> String {
    let mut md = String::new();
    let _ = writeln!(md, "# Classification Evaluation Results\n");
    let _ = writeln!(md, "## Overall Accuracy\n");
    let _ = writeln!(md, "- **Zero-shot:** {:.2}% ({}/{})", zs.accuracy() * 100.0, zs.correct, zs.total);
    let _ = writeln!(md, "- **Few-shot:** {:.2}% ({}/{})", fs_.accuracy() * 100.0, fs_.correct, fs_.total);
    let _ = writeln!(md, "- **Improvement:** {:+.2}%\n", (fs_.accuracy() - zs.accuracy()) * 100.0);

    let _ = writeln!(md, "## Per-Category Accuracy\n");
    let _ = writeln!(md, "| Category | Zero-shot | Few-shot |");
    let _ = writeln!(md, "|----------|-----------|----------|");
    let categories: std::collections::BTreeSet<_> =
        zs_by_cat.keys().chain(fs_by_cat.keys()).collect();
    for cat in categories {
        let z = zs_by_cat.get(cat.as_str()).map_or(0.0, Tally::accuracy);
        let f = fs_by_cat.get(cat.as_str()).map_or(0.0, Tally::accuracy);
        let _ = writeln!(md, "| {cat} | {:.2}% | {:.2}% |", z * 100.0, f * 100.0);
    }

    for (heading, results) in [("Zero-shot", zero_shot), ("Few-shot", few_shot)] {
        let _ = writeln!(md, "\n### {heading} Predictions\n");
        let _ = writeln!(md, "| ID | Title | True Label | Predicted | Correct |");
        let _ = writeln!(md, "|----|-------|------------|-----------|---------|");
        for item in results {
            let true_cat = truth.get(&item.item.id).map(String::as_str).unwrap_or("?");
            let mark = if item.category == true_cat { "yes" } else { "no" };
            let title: String = item.item.title.chars().take(50).collect();
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} |",
                item.item.id, title, true_cat, item.category, mark
            );
        }
    }
    md
}
