use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use agentbus::adapter::mcp;
use agentbus::adapter::rest::{self, RestState};
use agentbus::bus::{EventBus, WaitCoordinator};
use agentbus::cli::{CatalogCommands, Cli, Commands};
use agentbus::core_api::CoreApi;
use agentbus::domain::CatalogFile;
use agentbus::invite::InvitationExecutor;
use agentbus::presence::PresenceManager;
use agentbus::store::Store;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, stdio } => run_serve(config.resolve(), stdio).await,
        Commands::Catalog {
            command: CatalogCommands::Validate { path },
        } => validate_catalog(&path),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

fn load_catalog(path: Option<&std::path::Path>) -> anyhow::Result<Vec<agentbus::domain::CatalogEntry>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    if !path.exists() {
        tracing::warn!(path = %path.display(), "catalog file not found, starting with an empty catalog");
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file {}", path.display()))?;
    let file: CatalogFile = toml::from_str(&raw)
        .with_context(|| format!("failed to parse catalog file {}", path.display()))?;
    Ok(file.agents)
}

fn validate_catalog(path: &std::path::Path) -> anyhow::Result<()> {
    let entries = load_catalog(Some(path))?;
    println!("catalog {} is valid: {} entries", path.display(), entries.len());
    for entry in entries {
        println!("  - {} ({})  enabled={}", entry.name, entry.display_name, entry.enabled);
    }
    Ok(())
}

async fn run_serve(config: agentbus::config::BusConfig, serve_stdio: bool) -> anyhow::Result<()> {
    let catalog = load_catalog(config.catalog_path.as_deref())?;
    tracing::info!(entries = catalog.len(), "loaded agent catalog");

    let store = Arc::new(Store::connect(&config.db_path).await?);
    let events = Arc::new(EventBus::new());
    let wait = Arc::new(WaitCoordinator::new());
    let presence = Arc::new(PresenceManager::new(
        store.clone(),
        events.clone(),
        config.heartbeat_timeout_secs,
    ));
    let invitations = Arc::new(InvitationExecutor::new(catalog, config.upload_dir.join("invite-logs")));
    let core = Arc::new(CoreApi::new(
        store,
        events,
        wait,
        presence.clone(),
        invitations,
        &config,
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let sweeper = presence.clone().spawn_sweeper(shutdown_rx.clone());

    let rest_bind: SocketAddr = (config.bind_addr, config.port).into();
    let rest_state = RestState {
        core: core.clone(),
        upload_dir: config.upload_dir.clone(),
        upload_max_total_bytes: config.upload_max_total_bytes,
    };
    let http_handle = rest::start_http_server(rest_bind, rest_state, shutdown_rx.clone()).await?;

    let mcp_bind: SocketAddr = (config.bind_addr, config.port + 1).into();
    let mcp_core = core.clone();
    let mcp_config = config.clone();
    let mcp_shutdown_rx = shutdown_rx.clone();
    let mcp_sse_handle = tokio::spawn(async move {
        if let Err(error) = mcp::serve_sse(mcp_bind, mcp_core, mcp_config, mcp_shutdown_rx).await {
            tracing::error!(%error, "MCP SSE server exited with error");
        }
    });

    let mcp_stdio_handle = if serve_stdio {
        let stdio_core = core.clone();
        let stdio_config = config.clone();
        Some(tokio::spawn(async move {
            if let Err(error) = mcp::serve_stdio(stdio_core, stdio_config).await {
                tracing::error!(%error, "MCP stdio server exited with error");
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::time::timeout(std::time::Duration::from_secs(2), async {
        let _ = http_handle.await;
        let _ = mcp_sse_handle.await;
        if let Some(h) = mcp_stdio_handle {
            h.abort();
        }
        sweeper.abort();
    })
    .await;

    Ok(())
}
