use anyhow::Context;
use clap::{Parser, Subcommand};
use vastwatch_core::ConfigLoader;

mod commands;
mod table;

use commands::{
    CollectArgs, DataStatusArgs, ExportCsvArgs, ImportCsvArgs, LatestArgs, OccupancyArgs,
    TransitionsArgs,
};

#[derive(Parser)]
#[command(name = "vastwatch")]
#[command(about = "GPU rental market occupancy tracker for Vast.ai", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true, default_value = vastwatch_core::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Configuration profile layered over the config file (e.g. "dev" reads Config.dev.toml)
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the marketplace and store snapshot cycles in PostgreSQL
    Collect(CollectArgs),
    /// Market summary at the most recent poll cycle
    Latest(LatestArgs),
    /// Occupancy per offer or per group over a time window
    Occupancy(OccupancyArgs),
    /// Clearing prices of state transitions per group
    Transitions(TransitionsArgs),
    /// Row counts and time bounds of stored snapshots
    DataStatus(DataStatusArgs),
    /// Load snapshot rows from CSV into PostgreSQL
    ImportCsv(ImportCsvArgs),
    /// Write snapshot rows from PostgreSQL to CSV
    ExportCsv(ExportCsvArgs),
}

fn init_logging(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .init();
        }
        None => {
            // Reports go to stdout; keep logs on stderr.
            tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = match &cli.profile {
        Some(profile) => ConfigLoader::load_with_profile(&cli.config, profile),
        None => ConfigLoader::load_from(&cli.config),
    }
    .context("Failed to load configuration")?;

    match cli.command {
        Commands::Collect(args) => commands::run_collect(args, &config).await?,
        Commands::Latest(args) => commands::run_latest(args, &config).await?,
        Commands::Occupancy(args) => commands::run_occupancy(args, &config).await?,
        Commands::Transitions(args) => commands::run_transitions(args, &config).await?,
        Commands::DataStatus(args) => commands::run_data_status(args, &config).await?,
        Commands::ImportCsv(args) => commands::run_import_csv(args, &config).await?,
        Commands::ExportCsv(args) => commands::run_export_csv(args, &config).await?,
    }

    Ok(())
}
