use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use class_organize::allocation::AllocationEngine;
use class_organize::config::Config;
use class_organize::error::{Error, Result};
use class_organize::metrics;
use class_organize::models::SlotRequest;
use class_organize::notifications::Notifier;
use class_organize::server::{AppServer, AppState};
use class_organize::storage::open_store;

#[derive(Parser)]
#[command(
    name = "class-organize",
    version,
    about = "Academic timetable allocation: professors, rooms and classes without room double-booking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); overrides the configuration
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API
    Serve {
        /// Override the bind address, e.g. 127.0.0.1:3000
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Create the database schema and exit
    InitDb,

    /// Auto-allocate every free resource for one slot
    Allocate {
        /// Weekday label, e.g. Monday
        #[arg(short, long)]
        day: String,

        /// Window start (HH:MM)
        #[arg(short, long)]
        start: String,

        /// Window end (HH:MM)
        #[arg(short, long)]
        end: String,

        /// Shuffle seed for reproducible pairings
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show free professors, rooms and classes for one slot
    Availability {
        #[arg(short, long)]
        day: String,

        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let category = e.category();
            tracing::error!(
                error = %e,
                category = %category,
                recoverable = e.is_recoverable(),
                "Command failed"
            );
            eprintln!("Error ({category}): {e}");
            ExitCode::from(category.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config =
        Config::load(cli.config.as_deref()).map_err(|e| Error::config(format!("{e:#}")))?;
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }

    setup_tracing(&config.logging.format, &config.logging.level, cli.verbose)?;

    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed, continuing without metrics");
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            tracing::info!(
                bind_address = %config.server.bind_address,
                backend = %config.database.backend,
                "Starting serve command"
            );
            serve(config).await?;
        }

        Commands::InitDb => {
            tracing::info!(backend = %config.database.backend, "Starting init-db command");
            open_store(&config.database).await?;
            println!("Schema ready ({} backend)", config.database.backend);
        }

        Commands::Allocate {
            day,
            start,
            end,
            seed,
        } => {
            tracing::info!(day = %day, start = %start, end = %end, seed = ?seed, "Starting allocate command");
            allocate(&config, SlotRequest::new(day, start, end), seed).await?;
        }

        Commands::Availability { day, start, end } => {
            tracing::info!(day = %day, start = %start, end = %end, "Starting availability command");
            availability(&config, SlotRequest::new(day, start, end)).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> anyhow::Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("class_organize=debug,tower_http=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(format!("class_organize={level},warn"))
        })
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()?;
        }
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let store = open_store(&config.database).await?;
    let notifier = Notifier::from_config(&config.notifications)?;

    let server = AppServer::new(config.server.clone(), AppState::new(store, notifier))?;
    println!("{}", server.info().display());

    server.start_with_shutdown(shutdown_signal()).await?;
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

async fn allocate(config: &Config, slot: SlotRequest, seed: Option<u64>) -> Result<()> {
    let store = open_store(&config.database).await?;
    let engine = AllocationEngine::new(store);

    let outcome = match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            engine.auto_allocate(&slot, &mut rng).await?
        }
        None => engine.auto_allocate_fresh(&slot).await?,
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn availability(config: &Config, slot: SlotRequest) -> Result<()> {
    let store = open_store(&config.database).await?;
    let free = AllocationEngine::new(store).availability(&slot).await?;

    println!("{}", serde_json::to_string_pretty(&free)?);
    Ok(())
}
