//! Deal Scanner Service
//!
//! Feeds scraped listing dumps through the ingestion pipeline on a
//! schedule and reports per-batch outcomes. Each dump file is one batch
//! (one platform's scrape run); all batches in a cycle share one
//! admission threshold.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::sleep;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use common::{
    AdmissionPolicy, CatalogStore, Config, Database, Ingestor, MemoryCatalog, PgCatalog,
    RawListing,
};

/// Deal Scanner - ingests scraped listings into the product catalog
#[derive(Parser, Debug)]
#[command(name = "deal-scanner")]
#[command(about = "Ingests scraped listing dumps into the product catalog")]
struct Args {
    /// Run once and exit (instead of continuous polling)
    #[arg(long)]
    once: bool,

    /// Seconds between cycles (defaults to SCAN_INTERVAL_SECS)
    #[arg(long)]
    interval: Option<u64>,

    /// Directory (or single file) of raw listing JSON dumps
    #[arg(long, default_value = "results")]
    input: PathBuf,

    /// Discount threshold override (defaults to DISCOUNT_THRESHOLD)
    #[arg(long)]
    threshold: Option<i32>,

    /// Use the in-memory catalog instead of Postgres
    #[arg(long)]
    memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder().with_max_level(Level::INFO).init();

    let args = Args::parse();

    info!("Deal Scanner starting...");
    info!(
        "Mode: {}",
        if args.once {
            "single run"
        } else {
            "continuous"
        }
    );

    // Load configuration
    let config = Config::from_env()?;
    let interval = args.interval.unwrap_or(config.scan_interval_secs);
    let threshold = args.threshold.unwrap_or(config.discount_threshold);
    info!("Interval: {}s, threshold: {}%", interval, threshold);

    let store: Arc<dyn CatalogStore> = if args.memory {
        info!("Using in-memory catalog");
        Arc::new(MemoryCatalog::new(config.history_tz))
    } else {
        info!("Connecting to database...");
        let db = Database::connect(config.require_database_url()?).await?;
        db.health_check().await?;
        let catalog = PgCatalog::new(db, config.history_tz);
        catalog.ensure_schema().await?;
        info!("Database connected successfully");
        Arc::new(catalog)
    };

    let ingestor: Arc<Ingestor<dyn CatalogStore>> = Arc::new(Ingestor::new(store));

    // Main loop
    loop {
        // The policy is rebuilt per cycle so a threshold change (env or
        // flag on restart, settings store upstream) bounds its staleness.
        let policy = AdmissionPolicy::new(threshold);

        match run_cycle(&ingestor, &args.input, policy).await {
            Ok(batches) => info!("Cycle complete: {} batches ingested", batches),
            Err(e) => error!("Cycle failed: {e:#}"),
        }

        if args.once {
            info!("Single run mode - exiting");
            break;
        }

        info!("Sleeping for {}s...", interval);
        sleep(Duration::from_secs(interval)).await;
    }

    Ok(())
}

/// Ingest every dump file as its own batch, concurrently.
async fn run_cycle(
    ingestor: &Arc<Ingestor<dyn CatalogStore>>,
    input: &Path,
    policy: AdmissionPolicy,
) -> Result<usize> {
    let files = listing_files(input).await?;
    if files.is_empty() {
        warn!("No listing dumps found under {}", input.display());
        return Ok(0);
    }

    let mut handles = Vec::with_capacity(files.len());
    for file in files {
        let ingestor = Arc::clone(ingestor);
        handles.push(tokio::spawn(async move {
            let batch = load_batch(&file).await?;
            let report = ingestor.ingest(&batch, policy).await?;
            anyhow::Ok((file, report))
        }));
    }

    let mut batches = 0;
    for handle in handles {
        match handle.await? {
            Ok((file, report)) => {
                batches += 1;
                info!(
                    "{}: {} admitted, {} lower-price updates, {} unchanged, {} below threshold, {} unresolvable, {} errors",
                    file.display(),
                    report.admitted_new,
                    report.updated_lower_price,
                    report.unchanged,
                    report.skipped_below_threshold,
                    report.skipped_unresolvable,
                    report.skipped_error,
                );
            }
            Err(e) => error!("Batch failed: {e:#}"),
        }
    }
    Ok(batches)
}

async fn listing_files(input: &Path) -> Result<Vec<PathBuf>> {
    let meta = tokio::fs::metadata(input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    if meta.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut dir = tokio::fs::read_dir(input)
        .await
        .with_context(|| format!("listing {}", input.display()))?;
    let mut files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn load_batch(path: &Path) -> Result<Vec<RawListing>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))
}
