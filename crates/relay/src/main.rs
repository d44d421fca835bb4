//! # relay
//!
//! Broadcast relay binary: resolves settings, starts logging and metrics,
//! and serves the WebSocket relay until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use relay_core::ColorPool;
use relay_server::{RelayServer, ServerConfig};
use relay_settings::{ColorSettings, RelaySettings};

/// WebSocket broadcast relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "WebSocket broadcast relay")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.relay/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Cli {
    /// Settings file to read.
    fn settings_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(relay_settings::settings_path)
    }

    /// Apply command line overrides on top of loaded settings.
    fn apply(&self, settings: &mut RelaySettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

/// Build the color pool described by `colors`.
fn build_pool(colors: &ColorSettings) -> ColorPool {
    let pool = ColorPool::new(colors.palette.iter().map(String::as_str));
    if colors.shuffle { pool.shuffled() } else { pool }
}

/// Load settings from file and environment, then apply CLI flags.
fn resolve_settings(cli: &Cli) -> Result<RelaySettings> {
    resolve_settings_with(cli, |key| std::env::var(key).ok())
}

/// [`resolve_settings`] with environment lookups going through `lookup`.
fn resolve_settings_with<F>(cli: &Cli, lookup: F) -> Result<RelaySettings>
where
    F: Fn(&str) -> Option<String>,
{
    let path = cli.settings_path();
    let mut settings = relay_settings::load_with(&path, lookup)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    // Rejected env overrides warn while loading; the configured subscriber
    // does not exist yet.
    let settings = tracing::subscriber::with_default(
        relay_core::logging::bootstrap_subscriber(),
        || resolve_settings(&args),
    )?;

    if settings.logging.json {
        relay_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        relay_core::logging::init_subscriber(&settings.logging.level);
    }

    let metrics = relay_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let pool = build_pool(&settings.colors);
    tracing::info!(
        palette = pool.palette_size(),
        shuffled = settings.colors.shuffle,
        "color pool ready"
    );

    let config = ServerConfig::from(&settings.server);
    let server = RelayServer::new(config, pool, metrics);
    let (addr, handle) = server
        .listen()
        .await
        .context("Failed to bind server")?;

    tracing::info!("Relay listening on ws://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    let _ = server.shutdown().graceful_shutdown(None).await;
    let _ = handle.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
