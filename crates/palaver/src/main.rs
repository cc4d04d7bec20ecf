//! # palaver
//!
//! Chat server binary. Loads settings, opens the message store, and serves
//! the WebSocket, REST, and `/metrics` endpoints until interrupted.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use palaver_server::{ChatServer, JwtAuthenticator};
use palaver_settings::PalaverSettings;
use palaver_store::{ConnectionConfig, SqliteChatStore};
use tokio::net::TcpListener;

/// Palaver chat server.
#[derive(Parser, Debug)]
#[command(name = "palaver", about = "One-to-one chat server")]
struct Cli {
    /// Settings file (defaults to `~/.palaver/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the `SQLite` database (overrides settings).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log filter such as `info` or `palaver_server=debug`.
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    /// Fold command-line overrides into loaded settings.
    fn apply(self, settings: &mut PalaverSettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(path) = self.db_path {
            settings.database.path = path.to_string_lossy().into_owned();
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn load(cli: Cli) -> Result<PalaverSettings> {
    let path = cli
        .config
        .clone()
        .unwrap_or_else(palaver_settings::settings_path);
    let mut settings = palaver_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let settings = load(Cli::parse())?;

    if settings.logging.json {
        palaver_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        palaver_core::logging::init_subscriber(&settings.logging.level);
    }

    let db_path = PathBuf::from(&settings.database.path);
    ensure_parent_dir(&db_path)?;
    let db_config = ConnectionConfig {
        pool_size: settings.database.pool_size,
        busy_timeout_ms: settings.database.busy_timeout_ms,
    };
    let store = SqliteChatStore::open(&settings.database.path, &db_config)
        .context("Failed to open database")?;

    let auth = JwtAuthenticator::new(
        &settings.auth.jwt_secret,
        Duration::from_secs(settings.auth.token_ttl_secs),
    );

    let metrics = palaver_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server = ChatServer::new(&settings.server, Arc::new(store), Arc::new(auth))
        .with_metrics(metrics);
    let shutdown = Arc::clone(server.shutdown());

    let bind = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;

    let handle = tokio::spawn(server.serve(listener));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    shutdown.shutdown();
    handle
        .await
        .context("Server task panicked")?
        .context("Server failed")?;

    tracing::info!("Shutdown complete");
    Ok(())
}
