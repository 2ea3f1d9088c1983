//! Admin API server for the anonymous chat service
//!
//! Runs as a separate process against the same SQLite database as the chat
//! service and exposes the audit trail to authenticated operators.

use anon_chat::admin::{AdminServer, AdminServerConfig, AdminService, TokenAuthenticator};
use anon_chat::config::{validate_admin_config, AppConfig};
use anon_chat::service::Storage;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(
    name = "chat-admin",
    version,
    about = "Admin API for the anonymous chat audit trail"
)]
struct Args {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// SQLite database shared with the chat service
    #[arg(long, value_name = "PATH")]
    database: Option<String>,

    /// Port for the admin API
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Log level override
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env()?,
    };

    if let Some(database) = &args.database {
        config.storage.database_path = database.clone();
    }
    if let Some(port) = args.port {
        config.admin.http_port = port;
    }
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    validate_admin_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.as_str().into()),
        )
        .with_target(false)
        .init();

    info!("🔐 Chat Admin v{}", anon_chat::VERSION);
    info!("   Database: {}", config.storage.database_path);
    info!("   Admins: {}", config.admin.credentials.len());

    let storage = match Storage::sqlite(&config.storage.database_path).await {
        Ok(storage) => storage,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let service = Arc::new(AdminService::new(
        storage.participants,
        storage.history,
        storage.audit,
        config.admin.clone(),
    ));
    let authenticator = Arc::new(TokenAuthenticator::new(&config.admin.credentials));

    let server = Arc::new(AdminServer::new(
        AdminServerConfig {
            port: config.admin.http_port,
            host: args.host.clone(),
        },
        service,
        authenticator,
    ));

    let server_task = {
        let server = server.clone();
        tokio::spawn(async move { server.start().await })
    };

    tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received");
            server.stop();
        }
        finished = server_task => {
            match finished {
                Ok(Ok(())) => info!("Admin server exited"),
                Ok(Err(e)) => error!("Admin server failed: {:#}", e),
                Err(e) => error!("Admin server task panicked: {}", e),
            }
            return Ok(());
        }
    }

    // Let in-flight requests finish
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!("Chat admin stopped");
    Ok(())
}
