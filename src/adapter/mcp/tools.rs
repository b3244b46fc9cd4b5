//! MCP tool input schemas and the static tool catalog (spec §6).
//!
//! Each struct mirrors one tool's JSON arguments; `schemars::JsonSchema`
//! gives `call_tool` a real input schema the way
//! `neuron-mcp/src/server.rs`'s `list_tools` derives one from
//! `ToolDyn::input_schema` — the difference is ours comes from a typed
//! struct instead of a hand-built `serde_json::json!` literal.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rmcp::model::Tool as McpTool;
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Deserialize, JsonSchema)]
pub struct ThreadCreateArgs {
    pub topic: String,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ThreadListArgs {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub include_archived: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ThreadGetArgs {
    pub thread_id: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ThreadSetStateArgs {
    pub thread_id: String,
    pub state: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct ThreadCloseArgs {
    pub thread_id: String,
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct ThreadArchiveArgs {
    pub thread_id: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct MsgPostArgs {
    pub thread_id: String,
    pub author: String,
    #[serde(default)]
    pub author_id: Option<String>,
    pub role: String,
    pub content: serde_json::Value,
    #[serde(default)]
    pub mentions: Option<HashSet<String>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Deserialize, JsonSchema)]
pub struct MsgListArgs {
    pub thread_id: String,
    #[serde(default)]
    pub after_seq: Option<i64>,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub include_system_prompt: Option<bool>,
}

#[derive(Deserialize, JsonSchema)]
pub struct MsgWaitArgs {
    pub thread_id: String,
    #[serde(default)]
    pub after_seq: i64,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Deserialize, JsonSchema)]
pub struct AgentRegisterArgs {
    pub ide: String,
    pub model: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capabilities: Option<serde_json::Value>,
}

#[derive(Deserialize, JsonSchema)]
pub struct AgentHeartbeatArgs {
    pub agent_id: String,
    pub token: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct AgentUnregisterArgs {
    pub agent_id: String,
    pub token: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct AgentListArgs {}

#[derive(Deserialize, JsonSchema)]
pub struct AgentSetTypingArgs {
    pub thread_id: String,
    pub agent_id: String,
    pub is_typing: bool,
}

#[derive(Deserialize, JsonSchema)]
pub struct AgentInviteArgs {
    pub agent_name: String,
    pub thread_id: String,
}

#[derive(Deserialize, JsonSchema)]
pub struct BusGetConfigArgs {}

fn schema_of<T: JsonSchema>() -> serde_json::Map<String, serde_json::Value> {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}

fn tool(name: &'static str, description: &'static str, schema: serde_json::Map<String, serde_json::Value>) -> McpTool {
    McpTool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: None,
        execution: None,
        icons: None,
        meta: None,
    }
}

/// The full, closed tool catalog (spec §6's MCP tool surface table).
pub fn tool_list() -> Vec<McpTool> {
    vec![
        tool("thread_create", "Create a new thread.", schema_of::<ThreadCreateArgs>()),
        tool("thread_list", "List threads, optionally filtered by status.", schema_of::<ThreadListArgs>()),
        tool("thread_get", "Fetch a single thread by id.", schema_of::<ThreadGetArgs>()),
        tool("thread_set_state", "Transition a thread's status.", schema_of::<ThreadSetStateArgs>()),
        tool("thread_close", "Close a thread, optionally recording a summary.", schema_of::<ThreadCloseArgs>()),
        tool("thread_archive", "Archive a thread.", schema_of::<ThreadArchiveArgs>()),
        tool("msg_post", "Post a message into a thread.", schema_of::<MsgPostArgs>()),
        tool("msg_list", "List messages in a thread after a given seq.", schema_of::<MsgListArgs>()),
        tool("msg_wait", "Long-poll for new messages in a thread.", schema_of::<MsgWaitArgs>()),
        tool("agent_register", "Register an agent and receive a token.", schema_of::<AgentRegisterArgs>()),
        tool("agent_heartbeat", "Refresh an agent's liveness heartbeat.", schema_of::<AgentHeartbeatArgs>()),
        tool("agent_unregister", "Unregister an agent.", schema_of::<AgentUnregisterArgs>()),
        tool("agent_list", "List all registered agents with derived presence.", schema_of::<AgentListArgs>()),
        tool("agent_set_typing", "Broadcast a typing indicator for an agent in a thread.", schema_of::<AgentSetTypingArgs>()),
        tool("agent_invite", "Invoke a catalog agent into a thread.", schema_of::<AgentInviteArgs>()),
        tool("bus_get_config", "Fetch the bus's public configuration.", schema_of::<BusGetConfigArgs>()),
    ]
}
