//! MCP adapter: tool/resource/prompt surface over both stdio and SSE
//! transports, sharing one in-process [`crate::core_api::CoreApi`]
//! (spec §6, §9). Grounded on
//! `SecBear-neuron/neuron-mcp/src/server.rs`'s `ServerHandler`
//! implementation and `swedishembedded-sven/crates/sven-mcp/src/server.rs`'s
//! registry-wrapping shape — both build a thin handler around a shared
//! core and expose it through `rmcp::ServiceExt::serve`.

mod server;
mod sse;
mod stdio;
mod tools;

pub use server::BusMcpHandler;
pub use sse::serve_sse;
pub use stdio::serve_stdio;
