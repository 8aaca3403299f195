//! docsync - incremental snapshot sync into a Postgres document collection.
//!
//! Fetches the latest full snapshot, writes only the rows newer than what the
//! collection already holds, and reports collection statistics around the run.

mod config;
mod db;
mod error;
mod source;

use crate::config::{Config, SourceConfig};
use crate::db::PgDocumentStore;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use docsync_engine::{MemoryStore, StatsReader, SyncEngine, SyncOptions, DEFAULT_BATCH_SIZE};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "docsync")]
#[command(about = "Incremental snapshot sync into a document collection")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write snapshot rows newer than the collection's newest document (default)
    Sync(SyncArgs),
    /// Print collection statistics
    Stats(CollectionArgs),
    /// Run database migrations and exit
    Migrate,
    /// Normalize a snapshot into an in-memory store and report what would be written
    DryRun(DryRunArgs),
}

#[derive(Debug, Default, Args)]
struct CollectionArgs {
    /// Collection name, overrides DOCSYNC_COLLECTION
    #[arg(long)]
    collection: Option<String>,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Snapshot location (s3://bucket/key or a local path), overrides SNAPSHOT_URL
    #[arg(long)]
    snapshot: Option<String>,

    /// Documents per bulk write, overrides DOCSYNC_BATCH_SIZE
    #[arg(long, value_parser = config::parse_batch_size)]
    batch_size: Option<usize>,

    #[command(flatten)]
    target: CollectionArgs,
}

#[derive(Debug, Args)]
struct DryRunArgs {
    /// Snapshot location (s3://bucket/key or a local path), overrides SNAPSHOT_URL
    #[arg(long)]
    snapshot: Option<String>,

    #[arg(long, value_parser = config::parse_batch_size, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsync=info,docsync_engine=info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Sync(SyncArgs::default()));

    if let Err(err) = run(command).await {
        tracing::error!("{}", err);
        return Err(err.into());
    }
    Ok(())
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Sync(args) => sync(args).await,
        Commands::Stats(args) => stats(args).await,
        Commands::Migrate => migrate().await,
        Commands::DryRun(args) => dry_run(args).await,
    }
}

fn load_config(target: &CollectionArgs) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(collection) = &target.collection {
        config.collection = collection.clone();
    }
    Ok(config)
}

/// Connect and bring the schema up to date.
async fn connect(config: &Config) -> Result<db::Pool> {
    let pool = db::create_pool(&config.database_url, config.max_connections).await?;
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    Ok(pool)
}

async fn sync(args: SyncArgs) -> Result<()> {
    let mut config = load_config(&args.target)?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    let source = SourceConfig::from_env(args.snapshot)?;

    tracing::info!(
        "Syncing {} into collection {} (batch size {})",
        source.url,
        config.collection,
        config.batch_size
    );

    let pool = connect(&config).await?;
    let store = PgDocumentStore::new(pool, config.collection.as_str());
    let reader = StatsReader::new(&store);
    println!("before: {}", reader.stats().await?);

    let snapshot = source::fetch_snapshot(&source).await?;
    let stats = SyncEngine::new(&store)
        .with_options(SyncOptions::with_batch_size(config.batch_size))
        .sync(&snapshot)
        .await?;

    println!("after:  {}", reader.stats().await?);
    println!("{stats}");
    Ok(())
}

async fn stats(args: CollectionArgs) -> Result<()> {
    let config = load_config(&args)?;
    let pool = connect(&config).await?;
    let store = PgDocumentStore::new(pool, config.collection.as_str());

    let stats = StatsReader::new(&store).stats().await?;
    println!("{}: {stats}", store.collection());
    Ok(())
}

async fn migrate() -> Result<()> {
    let config = Config::from_env()?;
    connect(&config).await?;
    println!("migrations applied");
    Ok(())
}

async fn dry_run(args: DryRunArgs) -> Result<()> {
    let source = SourceConfig::from_env(args.snapshot)?;
    let snapshot = source::fetch_snapshot(&source).await?;

    let store = MemoryStore::new();
    let stats = SyncEngine::new(&store)
        .with_options(SyncOptions::with_batch_size(args.batch_size))
        .sync(&snapshot)
        .await?;

    println!(
        "would write {} documents from {} rows ({} skipped)",
        store.len(),
        stats.total_processed,
        stats.errors
    );
    println!("{}", StatsReader::new(&store).stats().await?);
    println!("{stats}");
    Ok(())
}
