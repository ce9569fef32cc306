//! AI News Curator — Binary Entrypoint
//! Runs the daily curation pipeline from the command line and prints the
//! report path on success.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ai_news_curator::ingest::rss::build_sources;
use ai_news_curator::{run_daily, OpenAiBackend, Settings};

#[derive(Parser)]
#[command(name = "ai-news-curator", version, about = "AI-powered daily news curation")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full daily pipeline and write reports/YYYY-MM-DD.md.
    Run {
        /// Target date (YYYY-MM-DD; default: today, UTC).
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Skip the enrichment cache (every item hits the model).
        #[arg(long)]
        no_cache: bool,
        /// Override MAX_CONCURRENT for this run.
        #[arg(long)]
        max_concurrent: Option<usize>,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("ai_news_curator=info,warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("pipeline failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            date,
            no_cache,
            max_concurrent,
        } => {
            let mut settings = Settings::from_env().context("loading settings")?;
            if let Some(n) = max_concurrent {
                settings.max_concurrent = n.max(1);
            }
            let target_date = date.unwrap_or_else(|| Utc::now().date_naive());

            let backend = Arc::new(OpenAiBackend::new(&settings)?);
            let sources = build_sources(&settings.rss_feeds)?;
            let report = run_daily(&settings, backend, &sources, target_date, !no_cache).await?;
            println!("Report generated: {}", report.display());
            Ok(())
        }
    }
}
