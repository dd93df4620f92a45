//! Manov-Ingest main entry point
//!
//! Command-line front end for one crawl-translate-ingest run.

use anyhow::Context;
use clap::Parser;
use manov_ingest::config::{load_config_with_hash, Config};
use manov_ingest::ingest::{IngestReport, ResumeResolver};
use manov_ingest::storage::{lock_store, NovelStore};
use manov_ingest::{IngestionService, IntermediateStore, SqliteNovelStore, Trigger};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Manov-Ingest: crawl, translate and publish web-novel chapters
///
/// Walks the source site from the last known chapter (or a given URL),
/// stages each page, translates new chapters through a local LLM and commits
/// them to the novel database.
#[derive(Parser, Debug)]
#[command(name = "manov-ingest")]
#[command(version)]
#[command(about = "Crawl, translate and ingest web-novel chapters", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Novel slug
    #[arg(long)]
    slug: String,

    /// Chapter URL to start from (required the first time a novel is crawled)
    #[arg(long)]
    url: Option<String>,

    /// Novel title, used when the novel does not exist yet
    #[arg(long)]
    title: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resolve and print the resume point without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show staged and persisted chapter counts and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Translate and commit already staged chapters without crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "url"])]
    ingest_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli.slug, cli.url.as_deref())
    } else if cli.stats {
        handle_stats(&config, &cli.slug)
    } else if cli.ingest_only {
        handle_ingest_only(&config, &cli.slug, cli.title.as_deref()).await
    } else {
        handle_ingest(&config, &cli.slug, cli.url.as_deref(), cli.title.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("manov_ingest=info,warn"),
            1 => EnvFilter::new("manov_ingest=debug,info"),
            2 => EnvFilter::new("manov_ingest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<SqliteNovelStore> {
    SqliteNovelStore::new(Path::new(&config.storage.database_path))
        .with_context(|| format!("opening database {}", config.storage.database_path))
}

/// Handles --dry-run: shows where the next crawl would start
fn handle_dry_run(config: &Config, slug: &str, url: Option<&str>) -> anyhow::Result<()> {
    println!("=== Manov-Ingest Dry Run ===\n");

    let store = Arc::new(Mutex::new(open_store(config)?));
    let staging = IntermediateStore::open(&config.storage.raw_dir, slug)?;

    println!("Novel: {}", slug);
    println!("Staging: {}", staging.dir().display());
    println!(
        "Budget: {}",
        match config.crawler.max_chapters_per_run {
            n if n > 0 => format!("{} chapter(s) per run", n),
            _ => "unlimited".to_string(),
        }
    );

    let point = ResumeResolver::new(&store, &staging).resolve(slug, url)?;
    println!("\nResume point ({}):", point.origin);
    println!("  URL: {}", point.url);
    println!("  Chapter: {} (unverified)", point.chapter_num);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles --stats: staged vs persisted chapters for one novel
fn handle_stats(config: &Config, slug: &str) -> anyhow::Result<()> {
    let store = Arc::new(Mutex::new(open_store(config)?));
    let staging = IntermediateStore::open(&config.storage.raw_dir, slug)?;
    let staged = staging.list_numbers()?;

    println!("Database: {}", config.storage.database_path);
    println!("Staging: {}\n", staging.dir().display());

    println!("Staged chapters: {}", staged.len());
    if let (Some(first), Some(last)) = (staged.first(), staged.last()) {
        println!("  Range: {}-{}", first, last);
    }
    if let Some(cursor) = staging.cursor()? {
        println!(
            "  Cursor: chapter {} ({}), updated {}",
            cursor.chapter_num, cursor.source_url, cursor.updated_at
        );
    }

    let store = lock_store(&store)?;
    match store.find_novel_by_slug(slug)? {
        Some(novel) => {
            println!("\nNovel: {} (id {}, {:?})", novel.title, novel.id, novel.status);
            println!("  Chapters: {}", store.count_chapters(novel.id)?);
            println!("  Translations: {}", store.count_translations(novel.id)?);
            if let Some(latest) = store.latest_chapter(novel.id)? {
                println!(
                    "  Latest: chapter {} ({})",
                    latest.chapter_num,
                    latest.source_url.as_deref().unwrap_or("no source URL")
                );
            }
        }
        None => println!("\nNovel '{}' is not in the database yet", slug),
    }

    Ok(())
}

/// Handles the main ingestion run
async fn handle_ingest(
    config: &Config,
    slug: &str,
    url: Option<&str>,
    title: Option<&str>,
) -> anyhow::Result<()> {
    let service = IngestionService::from_config(config)?;

    let outcome = match service.start_or_resume(slug, url, title) {
        Trigger::Accepted(handle) => handle.await.context("ingestion task panicked"),
        Trigger::Rejected(reason) => Err(anyhow::anyhow!("trigger rejected: {}", reason)),
    };

    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .context("crawl worker shutdown")?;

    match outcome? {
        Some(report) => {
            print_report(&report);
            Ok(())
        }
        None => anyhow::bail!("ingestion of '{}' did not run, see log", slug),
    }
}

/// Handles --ingest-only: retries staged chapters, no browser is started
async fn handle_ingest_only(config: &Config, slug: &str, title: Option<&str>) -> anyhow::Result<()> {
    let service = IngestionService::from_config(config)?;
    let outcome = service.coordinator().ingest_only(slug, title).await;

    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .context("crawl worker shutdown")?;

    print_report(&outcome?);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("\n=== Ingestion Report: {} ===", report.slug);
    if let Some(start) = &report.start {
        println!(
            "Started at chapter {} via {}{}",
            start.chapter_num,
            start.origin,
            if start.verified { " (verified)" } else { "" }
        );
    }
    if let Some(crawl) = &report.crawl {
        println!(
            "Crawl: {:?}, {} staged, {} collision(s)",
            crawl.outcome,
            crawl.staged.len(),
            crawl.collisions
        );
    }
    println!("Ingested: {:?}", report.ingested);
    println!("Skipped:  {} chapter(s)", report.skipped.len());
    println!("Healed:   {:?}", report.healed);
    println!("Degraded: {:?}", report.degraded);
    println!("Failed:   {:?}", report.failed);
    if !report.incidents.is_empty() {
        println!("\nIncidents:");
        for incident in &report.incidents {
            println!("  - {}", incident);
        }
    }
}
