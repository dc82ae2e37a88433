use anyhow::Result;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use wirekit::{ComponentContainer, FacilitiesInitialiser, ProtoComponents, RunOptions, ShutdownOptions};
use wirekit_bootstrap::{load_layered, CliArgs, LoadedConfig};

use std::path::PathBuf;
use std::sync::Arc;

mod components;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// WireKit Server - runs a component graph from layered configuration
#[derive(Parser)]
#[command(name = "wirekit-server")]
#[command(about = "WireKit Server - runs a component graph from layered configuration")]
#[command(version = "0.1.0")]
struct Cli {
    /// Configuration files or directories, merged in order (comma-separated or repeated)
    #[arg(short, long, value_delimiter = ',')]
    config: Vec<PathBuf>,

    /// Console log level override (trace, debug, info, warn, error, off)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the container and run until a shutdown signal
    Run,
    /// Validate configuration and component wiring, then exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.clone(),
        log_level: cli.log_level.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) files/dirs in order -> 3) env (APP__*) -> 4) CLI overrides
    let mut config = load_layered(&args.config)?;
    config.app.apply_cli_overrides(&args);

    if let Some(level) = &args.log_level {
        if wirekit::parse_level(level).is_none() {
            anyhow::bail!("unknown log level '{level}'");
        }
    }

    let base_dir = std::env::current_dir()?;
    wirekit_bootstrap::init_logging(&config.app.logging, &base_dir);

    tracing::info!(files = ?config.sources, "WireKit Server starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    };
    log_failure(result)
}

/// Report a failed command through the subscriber before `main` returns it.
fn log_failure<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!(error = %format!("{e:#}"), "WireKit Server failed");
    }
    result
}

async fn run_server(config: LoadedConfig) -> Result<()> {
    tracing::info!("Initializing components…");

    let run_options = RunOptions {
        config: Arc::new(config.accessor()),
        components: components::build(),
        facilities: FacilitiesInitialiser::discover(),
        drain: config.app.container.shutdown.clone(),
        shutdown: ShutdownOptions::Signals,
    };

    wirekit::run(run_options).await
}

/// Runs every phase up to (not including) start, so wiring and facility
/// errors surface without side effects.
fn check_config(config: &LoadedConfig) -> Result<()> {
    tracing::info!("Checking configuration…");

    let accessor = config.accessor();
    let mut protos = ProtoComponents::new();
    let enabled = FacilitiesInitialiser::discover().initialise(&accessor, &mut protos)?;
    protos.extend(components::build());

    let container = ComponentContainer::populate(protos, &accessor)?;

    println!("Configuration is valid");
    println!("Facilities: {}", enabled.join(", "));
    println!(
        "Components: {}",
        container.index().names().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}
