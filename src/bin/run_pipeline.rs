use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use workorder_engine::config::PipelineConfig;
use workorder_engine::ingestion;
use workorder_engine::quality::QualityChecker;
use workorder_engine::registry::CanonicalRegistry;
use workorder_engine::warehouse::{MemoryWarehouse, SqliteWarehouse, WarehouseStore};
use workorder_engine::WorkOrderPipeline;

#[derive(Parser)]
#[command(name = "run_pipeline")]
#[command(about = "Work order resolution and incremental merge pipeline")]
struct Args {
    /// Batch of raw records to process (.json or .csv)
    #[arg(required_unless_present = "check_only")]
    batch: Option<PathBuf>,

    /// Canonical name dictionary CSV (or set DICTIONARY_FILE env var)
    #[arg(short, long)]
    registry: Option<PathBuf>,

    /// Pipeline configuration JSON (defaults used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Warehouse database path
    #[arg(short, long, default_value = "warehouse.db")]
    warehouse: PathBuf,

    /// Resolve and merge into an in-memory store; nothing persisted
    #[arg(long)]
    dry_run: bool,

    /// Only run data quality checks against the existing warehouse
    #[arg(long)]
    check_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    if args.check_only {
        let store = SqliteWarehouse::open(&args.warehouse)?;
        return run_checks(&config, &store).await;
    }

    let registry_path = args
        .registry
        .or_else(|| std::env::var("DICTIONARY_FILE").ok().map(PathBuf::from));
    let registry = match registry_path {
        Some(path) => CanonicalRegistry::from_csv_path(&path)
            .with_context(|| format!("Failed to load registry from {}", path.display()))?,
        None => {
            warn!("No registry dictionary configured; every name will pass through");
            CanonicalRegistry::new()
        }
    };

    let Some(batch_path) = args.batch else {
        bail!("A batch file is required unless --check-only is set");
    };
    let batch = match batch_path.extension().and_then(|e| e.to_str()) {
        Some("csv") => ingestion::read_batch_csv_path(&batch_path)?,
        _ => ingestion::read_batch_json_path(&batch_path)?,
    };
    info!(records = batch.len(), "Batch loaded");

    let store: Box<dyn WarehouseStore> = if args.dry_run {
        info!("Dry run: merging into an in-memory store");
        Box::new(MemoryWarehouse::new())
    } else {
        Box::new(SqliteWarehouse::open(&args.warehouse)?)
    };

    let pipeline = WorkOrderPipeline::new(&config, Arc::new(registry));
    let report = pipeline.run_batch(batch, store.as_ref()).await?;

    println!("\n=== Pipeline Run Complete ===");
    println!("Run id:              {}", report.merge.run_id);
    println!("Records received:    {}", report.merge.records_received);
    println!("Records merged:      {}", report.merge.records_merged);
    println!("Skipped (watermark): {}", report.merge.records_skipped);
    println!("Malformed excluded:  {}", report.malformed.len());
    for source in &report.malformed {
        println!("  - {}", source);
    }
    println!("Flagged records:     {}", report.merge.flagged.len());
    println!(
        "Dimensions:          {} inserted, {} updated",
        report.merge.dimensions_inserted, report.merge.dimensions_updated
    );
    println!("Facts written:       {}", report.merge.facts_written);
    match report.merge.new_watermark {
        Some(watermark) => println!("Watermark advanced:  {}", watermark.to_rfc3339()),
        None => println!("Watermark advanced:  (unchanged)"),
    }

    println!("\n=== Data Quality ===");
    for check in &report.quality.checks {
        let status = if check.passed { "PASSED" } else { "FAILED" };
        println!("{:<40} {} (value: {:.3})", check.name, status, check.value);
    }

    if !report.success() {
        bail!("Data quality checks failed");
    }
    Ok(())
}

async fn run_checks(config: &PipelineConfig, store: &SqliteWarehouse) -> Result<()> {
    let report = QualityChecker::new(config.min_avg_completeness)
        .run(store)
        .await?;
    println!("=== Data Quality ===");
    for check in &report.checks {
        let status = if check.passed { "PASSED" } else { "FAILED" };
        println!("{:<40} {} (value: {:.3})", check.name, status, check.value);
    }
    if !report.passed() {
        bail!("Data quality checks failed");
    }
    Ok(())
}
