use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use retail_etl::config::EtlConfig;
use retail_etl::logging;
use retail_etl::pipeline::storage::{DocumentCollection, InMemoryCollection, SqliteCollection};
use retail_etl::pipeline::PipelineOrchestrator;

#[derive(Parser)]
#[command(name = "retail_etl")]
#[command(about = "Clean, enrich and load the Online Retail transaction dataset")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML configuration file (defaults to ./retail_etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the raw file and stage artifacts
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Impute descriptions, coerce types and drop duplicate rows
    Clean,
    /// Add TotalPrice to the cleaned rows
    Transform,
    /// Bulk-load the transformed rows into the collection
    Load(LoadArgs),
    /// Run clean, transform and load in one process
    Run(LoadArgs),
}

#[derive(Args, Clone)]
struct LoadArgs {
    /// Documents per bulk insert
    #[arg(long)]
    chunk_size: Option<usize>,
    /// Batches submitted concurrently
    #[arg(long)]
    workers: Option<usize>,
    /// Per-batch timeout in seconds
    #[arg(long)]
    batch_timeout_secs: Option<u64>,
    /// SQLite database file holding the collection
    #[arg(long)]
    database: Option<PathBuf>,
    /// Collection name
    #[arg(long)]
    collection: Option<String>,
    /// Load into a throwaway in-memory collection
    #[arg(long)]
    dry_run: bool,
    /// Print the final summary as JSON on stdout
    #[arg(long)]
    summary_json: bool,
}

impl LoadArgs {
    fn apply(&self, config: &mut EtlConfig) {
        if let Some(size) = self.chunk_size {
            config.loader.chunk_size = size;
        }
        if let Some(workers) = self.workers {
            config.loader.workers = workers;
        }
        if let Some(secs) = self.batch_timeout_secs {
            config.loader.batch_timeout_secs = secs;
        }
        if let Some(db) = &self.database {
            config.store.database_path = db.clone();
        }
        if let Some(collection) = &self.collection {
            config.store.collection = collection.clone();
        }
    }
}

fn open_collection(config: &EtlConfig, dry_run: bool) -> Result<Arc<dyn DocumentCollection>> {
    if dry_run {
        info!("Dry run: loading into an in-memory collection");
        return Ok(Arc::new(InMemoryCollection::new(&config.store.collection)));
    }
    let collection = SqliteCollection::open(&config.store.database_path, &config.store.collection)
        .with_context(|| {
            format!(
                "Failed to open collection {} in {}",
                config.store.collection,
                config.store.database_path.display()
            )
        })?;
    Ok(Arc::new(collection))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let mut config = EtlConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Commands::Load(args) | Commands::Run(args) = &cli.command {
        args.apply(&mut config);
    }
    config.validate().context("Invalid configuration")?;

    let _log_guard = logging::init_logging(&config.log_dir);

    let result = run_command(cli.command, config).await;
    if let Err(e) = &result {
        error!("Pipeline failed: {:#}", e);
    }
    result
}

async fn run_command(command: Commands, config: EtlConfig) -> Result<()> {
    match command {
        Commands::Clean => {
            println!("🧹 Cleaning {}...", config.raw_path().display());
            let orchestrator = PipelineOrchestrator::new(config);
            let output = orchestrator.clean().context("Clean stage failed")?;
            println!(
                "✅ Cleaned {} rows ({} descriptions imputed, {} duplicates dropped)",
                output.normalize.rows, output.normalize.descriptions_imputed, output.dedupe.dropped
            );
        }
        Commands::Transform => {
            println!("🔧 Transforming {}...", config.cleaned_path().display());
            let orchestrator = PipelineOrchestrator::new(config);
            let enriched = orchestrator.transform().context("Transform stage failed")?;
            println!("✅ Added TotalPrice to {} rows", enriched.len());
        }
        Commands::Load(args) => {
            let collection = open_collection(&config, args.dry_run)?;
            println!("💾 Loading {}...", config.transformed_path().display());
            let orchestrator = PipelineOrchestrator::new(config).with_collection(collection);
            let totals = orchestrator.load().await.context("Load stage failed")?;
            if args.summary_json {
                println!("{}", serde_json::to_string_pretty(&totals)?);
            } else {
                println!(
                    "✅ New documents inserted {}, duplicated documents {}",
                    totals.inserted, totals.duplicates
                );
            }
        }
        Commands::Run(args) => {
            let collection = open_collection(&config, args.dry_run)?;
            println!("🚀 Running full pipeline (clean + transform + load)...");
            let orchestrator = PipelineOrchestrator::new(config).with_collection(collection);
            let summary = orchestrator.run().await.context("Pipeline run failed")?;
            if args.summary_json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("✅ {}", summary.notification_message());
            }
        }
    }
    Ok(())
}
