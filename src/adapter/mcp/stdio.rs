//! MCP over stdio, for CLI-agent clients that spawn the bus as a child
//! process. Grounded on `SecBear-neuron/neuron-mcp/src/server.rs`'s
//! `serve_stdio`: `stdio()` transport, `handler.serve(transport)`, then
//! block on `.waiting()`.

use std::sync::Arc;

use rmcp::transport::io::stdio;
use rmcp::ServiceExt;

use crate::config::BusConfig;
use crate::core_api::CoreApi;

use super::server::BusMcpHandler;

pub async fn serve_stdio(core: Arc<CoreApi>, config: BusConfig) -> anyhow::Result<()> {
    let handler = BusMcpHandler::new(core, config, env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    let service = handler.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
