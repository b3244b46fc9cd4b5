//! MCP over SSE, for clients that connect over HTTP rather than spawning
//! a child process (spec §6, §9). No SSE-MCP example survived retrieval
//! into the pack, so this binds rmcp's own `SseServer` helper directly
//! rather than threading the transport through the `axum::Router` the
//! REST adapter builds — both share the same in-process [`CoreApi`], so
//! REST and MCP-over-SSE clients always see the same state regardless of
//! which port they hit.

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::transport::sse_server::SseServer;
use tokio::sync::watch;
use tracing::info;

use crate::config::BusConfig;
use crate::core_api::CoreApi;

use super::server::BusMcpHandler;

pub async fn serve_sse(
    bind: SocketAddr,
    core: Arc<CoreApi>,
    config: BusConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let ct = SseServer::serve(bind).await?.with_service(move || {
        BusMcpHandler::new(
            core.clone(),
            config.clone(),
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        )
    });

    info!(%bind, "MCP SSE server listening");
    let _ = shutdown_rx.wait_for(|v| *v).await;
    ct.cancel();
    Ok(())
}
