//! Certwarden - Main entry point
//!
//! Issues and renews TLS certificates for annotated routing declarations.

use std::sync::{Arc, LazyLock};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use certwarden_config::{parse_host_filter_list, Config};
use certwarden_controller::version::version;
use certwarden_controller::{Controller, FileStore, LoggingProvider, ProviderRegistry, SelfSignedIssuer};

static VERSION: LazyLock<String> = LazyLock::new(version);

/// Certwarden - TLS certificate controller for routing declarations
#[derive(Parser, Debug)]
#[command(name = "certwarden")]
#[command(author, version = VERSION.as_str(), about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long = "config", env = "CERTWARDEN_CONFIG")]
    config: Option<String>,

    /// Enable verbose logging (debug level)
    #[arg(long = "verbose")]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long = "log-json")]
    log_json: bool,

    /// Only watch this namespace (empty watches all)
    #[arg(long = "watch-namespace", env = "CERTWARDEN_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Comma separated host exclusion patterns
    #[arg(long = "host-filters", env = "CERTWARDEN_HOST_FILTERS")]
    host_filters: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate configuration and exit
    Test,
    /// Run the controller (default)
    Run,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Some(Commands::Test) => test_config(&cli),
        Some(Commands::Run) | None => run_controller(&cli),
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Load the configuration file (or defaults) and apply CLI overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            Config::from_file(path).context("Failed to load configuration file")?
        }
        None => {
            info!("No configuration specified, using defaults");
            Config::default()
        }
    };

    if let Some(namespace) = &cli.watch_namespace {
        config.controller.watch_namespace = namespace.clone();
    }
    if let Some(filters) = &cli.host_filters {
        config.controller.host_filters = parse_host_filter_list(filters);
    }

    let result = config.validate().context("Configuration validation failed")?;
    for warning in &result.warnings {
        warn!("{}", warning.message);
    }

    Ok(config)
}

/// Test configuration and exit
fn test_config(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let controller = &config.controller;

    info!("Configuration test successful:");
    info!("  - namespace: {}", controller.namespace().unwrap_or("<all>"));
    info!("  - resync interval: {}s", controller.resync_interval_secs);
    info!("  - minimum validity: {} day(s)", controller.minimum_validity_days);
    info!("  - {} host filter(s)", controller.host_filters.len());
    info!("  - supported providers: {}", controller.supported_providers.join(", "));

    println!(
        "certwarden: configuration {} test is successful",
        cli.config.as_deref().unwrap_or("(defaults)")
    );
    Ok(())
}

/// Run the controller until SIGINT or SIGTERM
fn run_controller(cli: &Cli) -> Result<()> {
    let config = Arc::new(load_config(cli)?);
    info!(version = %*VERSION, "Starting certwarden");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let store = Arc::new(
            FileStore::new(&config.store.path).context("Failed to open resource store")?,
        );
        let issuer = Arc::new(SelfSignedIssuer::new(config.issuer.validity_days));

        let mut providers = ProviderRegistry::new();
        for name in &config.controller.supported_providers {
            providers.register(Box::new(LoggingProvider::new(name.as_str())));
        }

        let shutdown = CancellationToken::new();
        spawn_signal_handler(shutdown.clone())?;

        Controller::new(config, store, issuer, providers)
            .run(shutdown)
            .await
            .context("Controller failed")
    })
}

fn spawn_signal_handler(shutdown: CancellationToken) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }
        shutdown.cancel();
    });
    Ok(())
}
