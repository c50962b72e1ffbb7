use clap::Parser;
use geodir_core::DatasetArgs;
use geodir_ingest::{
    Destination, IngestError, LoadSummary, Loader, LoaderConfig, MemoryDestination, PgDestination,
    DEFAULT_BATCH_SIZE,
};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("geodir_ingest=info,geodir_core=info"));

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().compact());

    let _ = tracing::dispatcher::set_global_default(tracing::Dispatch::new(subscriber));
}

#[derive(Parser)]
#[command(
    name = "geodir-ingest",
    about = "Resumable bulk load of a geocoded establishment file into PostGIS"
)]
struct Args {
    /// Delimited source file (header line first)
    source: PathBuf,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Destination table
    #[arg(long, default_value = "establishments")]
    table: String,

    /// Records per bulk insert
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// Checkpoint file holding the last durable source offset
    #[arg(long, default_value = ".import-checkpoint")]
    checkpoint_file: PathBuf,

    /// Create the PostGIS extension and destination table if absent
    #[arg(long)]
    init_schema: bool,

    /// work_mem for the load session
    #[arg(long, default_value = "256MB")]
    work_mem: String,

    /// Load into an in-memory table instead of a database and print the summary
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    dataset: DatasetArgs,
}

async fn run_load<D: Destination>(config: LoaderConfig, destination: D) -> Result<LoadSummary, IngestError> {
    info!(
        destination = destination.kind(),
        source = %config.source.display(),
        batch_size = config.batch_size,
        "starting load"
    );
    Loader::new(config, destination).run().await
}

fn print_summary(summary: &LoadSummary) {
    println!("rows inserted:        {}", summary.rows_inserted);
    println!("batches:              {}", summary.batches);
    println!("resumed from offset:  {}", summary.resumed_from);
    println!("malformed rows:       {}", summary.malformed_rows);
    println!("unresolvable geocode: {}", summary.unresolvable);
    println!("duplicates removed:   {}", summary.duplicates_removed);
    println!("geometries computed:  {}", summary.geometries_computed);
    println!("wall time:            {:.1}s", summary.elapsed.as_secs_f64());
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let args = Args::parse();
    let dataset = args.dataset.to_config()?;

    let config = LoaderConfig {
        source: args.source.clone(),
        dataset,
        batch_size: args.batch_size,
        checkpoint_file: args.checkpoint_file.clone(),
        init_schema: args.init_schema,
    };

    let result = if args.dry_run {
        run_load(config, MemoryDestination::new()).await
    } else {
        let Some(url) = args.database_url.as_deref() else {
            error!("no database configured: pass --database-url or set DATABASE_URL (or use --dry-run)");
            return Err(IngestError::precondition("DATABASE_URL is not set").into());
        };
        if !args.source.is_file() {
            error!(source = %args.source.display(), "source file not found");
            return Err(IngestError::precondition(format!(
                "source file {} not found",
                args.source.display()
            ))
            .into());
        }
        let destination = PgDestination::connect(url, &args.table, &args.work_mem).await?;
        run_load(config, destination).await
    };

    let summary = result?;
    print_summary(&summary);
    Ok(())
}
