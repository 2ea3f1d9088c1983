//! Main entry point for the anonymous chat service
//!
//! Loads configuration, initializes logging, runs the pairing service on the
//! configured transport and shuts it down gracefully on SIGINT or SIGTERM.

use anon_chat::config::{validate_config, AppConfig, TransportKind};
use anon_chat::service::AppState;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

/// Anonymous chat pairing service
#[derive(Parser)]
#[command(
    name = "anon-chat",
    version,
    about = "Anonymous one-on-one chat pairing service",
    long_about = "Anon Chat pairs participants by gender preference, relays their messages \
                 anonymously over Telegram or an AMQP gateway, and keeps an audit trail of \
                 sessions and messages in SQLite."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Query the health endpoint of a running instance and exit
    #[arg(long, help = "Check a running instance and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Transport override
    #[arg(long, value_name = "KIND", help = "Override transport (telegram, amqp)")]
    transport: Option<TransportKind>,

    /// Database path override
    #[arg(long, value_name = "PATH", help = "Override SQLite database path")]
    database: Option<String>,

    /// Health port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Ask a running instance for its health and exit accordingly
async fn perform_health_check(config: &AppConfig) -> Result<()> {
    let url = format!("http://127.0.0.1:{}/health", config.service.health_port);
    info!("Performing health check against {}", url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .context("Failed to build HTTP client")?;

    match client.get(&url).send().await {
        Ok(response) => {
            let healthy = response.status().is_success();
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            println!(
                "Health Check: {}",
                body["status"].as_str().unwrap_or("unknown")
            );
            std::process::exit(if healthy { 0 } else { 1 });
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received SIGINT (Ctrl+C) signal");
            },
            _ = terminate.recv() => {
                info!("Received SIGTERM signal");
            },
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received SIGINT (Ctrl+C) signal");
    }

    Ok(())
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Anon Chat Service v{}", anon_chat::VERSION);
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   Database: {}", config.storage.database_path);
    match config.transport.kind {
        TransportKind::Telegram => {
            info!("   Transport: telegram ({})", config.transport.telegram.api_url)
        }
        TransportKind::Amqp => info!(
            "   Transport: amqp (queue {}, exchange {})",
            config.transport.amqp.inbound_queue, config.transport.amqp.outbound_exchange
        ),
    }
    info!(
        "   Max concurrent events: {}",
        config.service.max_concurrent_events
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration from file or environment and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(config_path) => AppConfig::from_file(config_path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(kind) = args.transport {
        config.transport.kind = kind;
    }

    if let Some(database) = &args.database {
        config.storage.database_path = database.clone();
    }

    if let Some(health_port) = args.health_port {
        config.service.health_port = health_port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(&config).await;
    }

    if let Err(e) = validate_config(&config) {
        error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    display_startup_banner(&config);

    if args.dry_run {
        info!("Configuration validation successful");
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("✅ Anon Chat Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    if let Err(e) = wait_for_shutdown_signal().await {
        warn!("Signal handling failed, shutting down: {}", e);
    }

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    if let Err(e) = app_state.shutdown().await {
        error!("Shutdown finished with errors: {}", e);
    }

    info!("🛑 Anon Chat Service stopped");
    Ok(())
}
