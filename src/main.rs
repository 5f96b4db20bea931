#![forbid(unsafe_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

mod cli;
mod config;
mod db;
mod fingerprint;
mod platform;
mod sources;
mod sync;
mod utils;
mod web;

use cli::Cli;
use config::Config;
use platform::HttpPlatformClient;
use sync::SyncEngine;
use sync::supervisor::{CycleOutcome, Supervisor, backoff_from_config};
use utils::logging::{component_span, init_tracing};
use web::WebServer;
use web::metrics::SyncMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from_file(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(channel_file) = cli.channel_file {
        config.sources.channel_file = channel_file;
    }
    if let Some(destination) = cli.destination {
        config.platform.destination = destination;
    }
    config.validate()?;

    init_tracing(&config.logging)?;
    info!("channel reposter starting up");

    let db_manager = db::DatabaseManager::new(&config.database).await?;
    db_manager.migrate().await?;
    info!("using store at {}", db_manager.path());

    let platform = Arc::new(HttpPlatformClient::new(&config.platform)?);
    let metrics = Arc::new(SyncMetrics::new());

    let engine = Arc::new(SyncEngine::new(
        platform,
        db_manager.sync_store(),
        &config,
        metrics.clone(),
        component_span("sync"),
    ));
    let mut supervisor = Supervisor::new(
        engine,
        backoff_from_config(&config.sync),
        component_span("supervisor"),
    );

    if cli.once {
        let step = supervisor.step().await;
        if step.outcome == CycleOutcome::Failed {
            anyhow::bail!("sync cycle failed");
        }
        return Ok(());
    }

    let web_handle = config.metrics.enabled.then(|| {
        let web_server = WebServer::new(&config.metrics, db_manager.clone(), metrics.clone());
        tokio::spawn(async move {
            if let Err(e) = web_server.start().await {
                error!("web server error: {}", e);
            }
        })
    });

    tokio::select! {
        _ = supervisor.run_forever() => {},
        _ = tokio::signal::ctrl_c() => {
            info!("received interrupt");
        },
    }

    if let Some(handle) = web_handle {
        handle.abort();
    }
    info!("channel reposter shutting down");
    Ok(())
}
