//! # wsbridge-agent
//!
//! Loads settings, links every configured endpoint and keeps the
//! connections up until interrupted.

#![deny(unsafe_code)]

mod reconnect;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use wsbridge_http::{HttpClientConfig, ReqwestHttpClient};

use crate::reconnect::{Backoff, supervise};

/// Keeps configured WebSocket endpoints connected.
#[derive(Parser, Debug)]
#[command(name = "wsbridge-agent", about = "WebSocket protocol bridge")]
struct Cli {
    /// Settings file (defaults to `~/.wsbridge/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level, overriding settings.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.config.unwrap_or_else(wsbridge_settings::settings_path);
    let settings = wsbridge_settings::load_settings_from_path(&path)
        .with_context(|| format!("failed to load settings from {}", path.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.client.log_level);
    if settings.client.json_logs {
        wsbridge_core::logging::init_json_subscriber(level);
    } else {
        wsbridge_core::logging::init_subscriber(level);
    }
    tracing::info!(path = %path.display(), endpoints = settings.endpoints.len(), "settings loaded");

    let http = ReqwestHttpClient::new(&HttpClientConfig {
        timeout: settings.client.http_timeout(),
        ..HttpClientConfig::default()
    })
    .context("failed to build HTTP client")?;
    let hub = wiring::build_hub(&settings, Arc::new(http))?;
    if hub.is_empty() {
        tracing::warn!("no endpoints configured");
    }

    let stop = CancellationToken::new();
    let backoff = Backoff::from(&settings.client.reconnect);
    for endpoint in &settings.endpoints {
        if let Some(client) = hub.client(&endpoint.id) {
            supervise(&client, backoff.clone(), stop.clone());
        }
    }

    hub.connect_all();

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("shutting down");
    stop.cancel();
    hub.disconnect_all();
    for (protocol, status) in hub.statuses() {
        tracing::debug!(%protocol, %status, "final status");
    }
    Ok(())
}
