//! # gqlws
//!
//! GraphQL-over-WebSocket server binary: loads settings, initialises logging
//! and metrics, and serves the built-in loop-back engine.

#![deny(unsafe_code)]

mod engine;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use gqlws_server::metrics::install_recorder;
use gqlws_server::{GqlwsServer, ServerConfig};
use gqlws_settings::{GqlwsSettings, loader};

use crate::engine::LoopbackEngine;

/// GraphQL subscription server.
#[derive(Parser, Debug)]
#[command(name = "gqlws", about = "GraphQL-over-WebSocket subscription server")]
struct Cli {
    /// IP address to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default `~/.gqlws/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format: `pretty` or `json` (overrides settings).
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    /// Apply command-line overrides on top of loaded settings.
    fn apply(&self, settings: &mut GqlwsSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(format) = &self.log_format {
            settings.logging.format = loader::parse_log_format(format)
                .with_context(|| format!("unknown log format '{format}'"))?;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args.config.clone().unwrap_or_else(loader::settings_path);
    let mut settings = loader::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;
    args.apply(&mut settings)?;
    settings.validate().context("invalid settings")?;

    gqlws_logging::init_logging(&settings.logging).context("failed to initialise logging")?;
    let metrics = install_recorder().context("failed to install metrics recorder")?;

    let config = ServerConfig::from_settings(&settings);
    let server = GqlwsServer::new(config, Arc::new(LoopbackEngine::default())).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("failed to start server")?;
    tracing::info!(%addr, path = %server.config().path, "listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let drained = server
        .shutdown()
        .graceful_shutdown(handle, server.registry(), None)
        .await;
    tracing::info!(drained, "shutdown complete");
    Ok(())
}
