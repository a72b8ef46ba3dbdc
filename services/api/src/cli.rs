use crate::infra::IngestionRuntime;
use crate::server;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use realestate_ai::config::AppConfig;
use realestate_ai::error::AppError;
use realestate_ai::ingestion::{schedule_ingestion, IngestionError};
use realestate_ai::permits::{provider_for, PermitService};
use realestate_ai::search::ListingStore;
use realestate_ai::telemetry;
use std::sync::Arc;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "RealEstate AI",
    about = "Run the RealEstate AI marketplace API and its listing pipelines",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Pull partner listing feeds into the search store
    Ingest {
        #[command(subcommand)]
        command: IngestCommand,
    },
    /// Manage the listing search database
    Search {
        #[command(subcommand)]
        command: SearchCommand,
    },
}

#[derive(Subcommand, Debug)]
enum IngestCommand {
    /// Run one ingestion pass and print its summary as JSON
    Run,
    /// Keep running ingestion on a cron schedule until interrupted
    Schedule(ScheduleArgs),
}

#[derive(Subcommand, Debug)]
enum SearchCommand {
    /// Create or migrate the listing schema and print its version
    SetupDb,
    /// Insert the demo listings that are not already stored
    SeedDb,
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
struct ScheduleArgs {
    /// Cron expression (five or six fields); defaults to INGESTION_CRON
    #[arg(long)]
    cron: Option<String>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Ingest { command } => {
            let config = load_config()?;
            let runtime = standalone_ingestion(&config)?;
            match command {
                IngestCommand::Run => ingest_once(&runtime).await,
                IngestCommand::Schedule(args) => {
                    let cron = args.cron.or_else(|| config.ingestion.cron.clone());
                    ingest_on_schedule(runtime, cron.as_deref().unwrap_or_default()).await
                }
            }
        }
        Command::Search { command } => {
            let config = load_config()?;
            let store = open_store(&config)?;
            match command {
                SearchCommand::SetupDb => {
                    let version = store.apply_schema()?;
                    println!("listing schema at version {version}");
                }
                SearchCommand::SeedDb => {
                    let inserted = store.seed(Utc::now())?;
                    println!("seeded {inserted} demo listings");
                }
            }
            Ok(())
        }
    }
}

fn load_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

fn open_store(config: &AppConfig) -> Result<Arc<ListingStore>, AppError> {
    if config.search.database_path.is_none() {
        warn!("SEARCH_DATABASE_PATH not set, changes will not outlive this process");
    }
    let store = ListingStore::open_optional(config.search.database_path.as_deref())?;
    Ok(Arc::new(store))
}

/// Outside the server there is no local search cache, so changes are only
/// announced to a remote search service when one is configured.
fn standalone_ingestion(config: &AppConfig) -> Result<Arc<IngestionRuntime>, AppError> {
    let store = open_store(config)?;
    let permits = Arc::new(PermitService::new(provider_for(&config.permits)));
    Ok(Arc::new(IngestionRuntime::build(config, store, permits, None)))
}

async fn ingest_once(runtime: &IngestionRuntime) -> Result<(), AppError> {
    let summary = runtime.run_once().await?;
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{json}"),
        Err(err) => println!("ingestion summary unavailable: {err}"),
    }
    Ok(())
}

async fn ingest_on_schedule(runtime: Arc<IngestionRuntime>, cron: &str) -> Result<(), AppError> {
    let handle = schedule_ingestion(cron, move || {
        let runtime = runtime.clone();
        async move { runtime.run_once().await }
    })?;
    handle.await.map_err(IngestionError::from)?;
    Ok(())
}
