//! Precache - cache-first HTTP front with install-time precaching
//!
//! This binary precaches a configured asset list into a named cache store and
//! then serves requests from that store, falling back to the upstream origin.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use precache_server::{
    config::ServerConfig,
    error::{ServerError, ServerResult},
    server::{run_install, PrecacheServer},
};

/// Command line arguments
#[derive(Parser)]
#[command(
    name = "precache",
    about = "Cache-first HTTP front with install-time asset precaching",
    long_about = "Precaches a configured list of assets into a named cache store at startup, then answers every request from that store when possible and from the upstream origin otherwise."
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Log level
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand)]
enum Commands {
    /// Precache the asset list and serve requests
    Serve,
    /// Precache the asset list once and exit
    Install,
    /// Generate a default configuration file
    Config {
        /// Output file path
        #[arg(short, long, default_value = "precache.toml")]
        output: PathBuf,
        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        file: PathBuf,
    },
    /// Show information about this build
    Info,
}

#[tokio::main]
async fn main() -> ServerResult<()> {
    let args = Args::parse();

    init_logging(&args)?;

    match &args.command {
        Some(Commands::Serve) | None => serve(&args).await,
        Some(Commands::Install) => install(&args).await,
        Some(Commands::Config { output, force }) => generate_config(output, *force),
        Some(Commands::Validate { file }) => validate_config(file),
        Some(Commands::Info) => {
            show_info();
            Ok(())
        }
    }
}

/// Initialize logging based on command line arguments
fn init_logging(args: &Args) -> ServerResult<()> {
    let log_level = args
        .log_level
        .parse::<Level>()
        .map_err(|_| ServerError::Config(format!("Invalid log level: {}", args.log_level)))?;

    let mut env_filter = EnvFilter::from_default_env();
    for target in ["precache_server", "precache_core", "tower_http"] {
        let directive = format!("{}={}", target, log_level)
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid log directive: {}", e)))?;
        env_filter = env_filter.add_directive(directive);
    }

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().pretty())
            .with(env_filter)
            .init();
    }

    Ok(())
}

/// Load the configuration file if given, apply command line overrides
fn load_config(args: &Args) -> ServerResult<ServerConfig> {
    let mut config = if let Some(config_path) = &args.config {
        info!("Loading configuration from: {:?}", config_path);
        ServerConfig::from_file(config_path)
            .map_err(|e| ServerError::Config(format!("Failed to load config: {}", e)))?
    } else {
        info!("Using default configuration");
        ServerConfig::default()
    };

    if let Some(bind) = &args.bind {
        config.bind = bind
            .parse()
            .map_err(|e| ServerError::Config(format!("Invalid bind address: {}", e)))?;
    }

    Ok(config)
}

/// Precache and start the server
async fn serve(args: &Args) -> ServerResult<()> {
    info!("Starting precache v{}", precache_server::VERSION);

    let config = load_config(args)?;
    let server = PrecacheServer::bootstrap(config).await?;

    info!("Server configuration:");
    info!("  Bind address: {}", server.config().bind);
    info!("  Cache name: {}", server.config().cache.name);
    info!("  Precached entries: {}", server.state().install.stored.len());
    info!("  Upstream origin: {}", server.config().upstream.origin);

    server.start().await
}

/// Run install once and report what was stored
async fn install(args: &Args) -> ServerResult<()> {
    let config = load_config(args)?;
    if config.cache.dir.is_none() {
        info!("No cache.dir configured; entries will not outlive this process");
    }

    let report = run_install(&config).await?;
    info!("Installed {} entries into {}", report.stored.len(), report.cache_name);
    for key in &report.stored {
        info!("  {}", key);
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config(output: &Path, force: bool) -> ServerResult<()> {
    if output.exists() && !force {
        error!("Configuration file already exists: {:?}", output);
        error!("Use --force to overwrite");
        return Err(ServerError::Config(
            "Configuration file already exists".to_string(),
        ));
    }

    ServerConfig::default()
        .to_file(output)
        .map_err(|e| ServerError::Config(format!("Failed to write config: {}", e)))?;

    info!("Generated default configuration file: {:?}", output);
    Ok(())
}

/// Validate a configuration file
fn validate_config(path: &Path) -> ServerResult<()> {
    info!("Validating configuration file: {:?}", path);

    let config = ServerConfig::from_file(path).map_err(|e| {
        error!("Configuration validation failed: {}", e);
        ServerError::Config(format!("Invalid configuration: {}", e))
    })?;

    config.validate().map_err(|e| {
        error!("Configuration validation failed: {}", e);
        ServerError::Config(e)
    })?;

    info!("Configuration is valid");
    info!("  Bind address: {}", config.bind);
    info!("  Cache name: {}", config.cache.name);
    info!("  Assets: {}", config.cache.assets.len());
    info!("  Upstream origin: {}", config.upstream.origin);
    Ok(())
}

/// Show build information
fn show_info() {
    println!("precache v{}", precache_server::VERSION);
    println!("Cache-first HTTP front with install-time asset precaching");
    println!();
    println!("Defaults:");
    println!("  • Bind address: {}", ServerConfig::default().bind);
    println!("  • Cache name: {}", precache_core::DEFAULT_CACHE_NAME);
    println!("  • Asset list: empty");
    println!("  • Configuration file: precache.toml");
    println!();
    println!("Usage:");
    println!("  precache                          # Serve with default config");
    println!("  precache -c precache.toml         # Serve with custom config");
    println!("  precache install -c precache.toml # Precache once and exit");
    println!("  precache config                   # Generate default config");
    println!("  precache validate precache.toml   # Validate config file");
}
