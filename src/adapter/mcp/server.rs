//! [`BusMcpHandler`]: the `ServerHandler` implementation shared by both
//! the stdio and SSE transports.
//!
//! Shape grounded on `SecBear-neuron/neuron-mcp/src/server.rs`'s
//! `McpServerHandler` (manual `ServerHandler` impl, `get_info` /
//! `list_tools` / `call_tool`) and
//! `swedishembedded-sven/crates/sven-mcp/src/server.rs` (wrapping a
//! single shared registry/core behind `Arc`). Resource and prompt
//! support extend that shape to the rest of spec §6's MCP surface; the
//! pack carries no server-side resource/prompt example, so this part
//! follows rmcp's own conventions rather than a specific retrieved file.

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParams, CallToolResult, Content, GetPromptRequestParams, GetPromptResult,
    Implementation, ListPromptsResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParams, Prompt, PromptArgument, PromptMessage, PromptMessageContent,
    PromptMessageRole, ProtocolVersion, RawResource, ReadResourceRequestParams,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ErrorData;
use tokio_util::sync::CancellationToken;

use crate::config::BusConfig;
use crate::core_api::CoreApi;
use crate::domain::{message, Role, ThreadFilter, ThreadStatus};
use crate::error::BusError;

use super::tools;

fn to_error_data(error: BusError) -> ErrorData {
    ErrorData::invalid_params(format!("{:?}: {}", error.kind, error.reason), None)
}

pub struct BusMcpHandler {
    core: Arc<CoreApi>,
    config: BusConfig,
    name: String,
    version: String,
}

impl BusMcpHandler {
    pub fn new(core: Arc<CoreApi>, config: BusConfig, name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            core,
            config,
            name: name.into(),
            version: version.into(),
        }
    }

    fn ok_json<T: serde::Serialize>(value: &T) -> Result<CallToolResult, ErrorData> {
        let text = serde_json::to_string_pretty(value)
            .unwrap_or_else(|e| format!("{{\"error\":\"failed to encode result: {e}\"}}"));
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    async fn dispatch(&self, name: &str, args: serde_json::Value, ct: CancellationToken) -> Result<CallToolResult, ErrorData> {
        macro_rules! parse {
            ($ty:ty) => {
                serde_json::from_value::<$ty>(args)
                    .map_err(|e| ErrorData::invalid_params(format!("bad arguments: {e}"), None))?
            };
        }

        match name {
            "thread_create" => {
                let a: tools::ThreadCreateArgs = parse!(tools::ThreadCreateArgs);
                let thread = self
                    .core
                    .create_thread(&a.topic, a.metadata.unwrap_or_default())
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&thread)
            }
            "thread_list" => {
                let a: tools::ThreadListArgs = parse!(tools::ThreadListArgs);
                let filter = ThreadFilter {
                    status: a.status.as_deref().and_then(ThreadStatus::parse),
                    include_archived: a.include_archived.unwrap_or(false),
                };
                let threads = self.core.list_threads(filter).await.map_err(to_error_data)?;
                Self::ok_json(&threads)
            }
            "thread_get" => {
                let a: tools::ThreadGetArgs = parse!(tools::ThreadGetArgs);
                let thread = self.core.get_thread(&a.thread_id).await.map_err(to_error_data)?;
                Self::ok_json(&thread)
            }
            "thread_set_state" => {
                let a: tools::ThreadSetStateArgs = parse!(tools::ThreadSetStateArgs);
                let status = ThreadStatus::parse(&a.state)
                    .ok_or_else(|| ErrorData::invalid_params(format!("unknown state {}", a.state), None))?;
                let thread = self
                    .core
                    .set_thread_state(&a.thread_id, status)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&thread)
            }
            "thread_close" => {
                let a: tools::ThreadCloseArgs = parse!(tools::ThreadCloseArgs);
                let thread = self
                    .core
                    .close_thread(&a.thread_id, a.summary)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&thread)
            }
            "thread_archive" => {
                let a: tools::ThreadArchiveArgs = parse!(tools::ThreadArchiveArgs);
                let thread = self.core.archive_thread(&a.thread_id).await.map_err(to_error_data)?;
                Self::ok_json(&thread)
            }
            "msg_post" => {
                let a: tools::MsgPostArgs = parse!(tools::MsgPostArgs);
                let role = Role::parse(&a.role)
                    .ok_or_else(|| ErrorData::invalid_params(format!("unknown role {}", a.role), None))?;
                let msg = self
                    .core
                    .post_message(
                        &a.thread_id,
                        a.author_id,
                        &a.author,
                        role,
                        &a.content,
                        a.mentions.unwrap_or_default(),
                        a.metadata.unwrap_or_default(),
                    )
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&msg)
            }
            "msg_list" => {
                let a: tools::MsgListArgs = parse!(tools::MsgListArgs);
                let messages = self
                    .core
                    .list_messages(
                        &a.thread_id,
                        a.after_seq.unwrap_or(0),
                        a.limit.unwrap_or(200),
                        a.include_system_prompt.unwrap_or(false),
                    )
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&messages)
            }
            "msg_wait" => {
                let a: tools::MsgWaitArgs = parse!(tools::MsgWaitArgs);
                let default_timeout_ms = self.config.msg_wait_timeout_secs * 1000;
                let messages = self
                    .core
                    .wait_for_messages(
                        &a.thread_id,
                        a.after_seq,
                        a.timeout_ms.unwrap_or(default_timeout_ms),
                        a.agent_id.as_deref(),
                        &ct,
                    )
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&messages)
            }
            "agent_register" => {
                let a: tools::AgentRegisterArgs = parse!(tools::AgentRegisterArgs);
                let agent = self
                    .core
                    .register_agent(&a.ide, &a.model, a.name, a.capabilities)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&serde_json::json!({"agent_id": agent.id, "token": agent.token}))
            }
            "agent_heartbeat" => {
                let a: tools::AgentHeartbeatArgs = parse!(tools::AgentHeartbeatArgs);
                self.core.heartbeat(&a.agent_id, &a.token).await.map_err(to_error_data)?;
                Self::ok_json(&serde_json::json!({"ok": true}))
            }
            "agent_unregister" => {
                let a: tools::AgentUnregisterArgs = parse!(tools::AgentUnregisterArgs);
                self.core
                    .unregister_agent(&a.agent_id, &a.token)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&serde_json::json!({"ok": true}))
            }
            "agent_list" => {
                let _a: tools::AgentListArgs = parse!(tools::AgentListArgs);
                let agents = self.core.list_agents().await.map_err(to_error_data)?;
                Self::ok_json(&agents)
            }
            "agent_set_typing" => {
                let a: tools::AgentSetTypingArgs = parse!(tools::AgentSetTypingArgs);
                self.core
                    .set_typing(&a.thread_id, &a.agent_id, a.is_typing)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&serde_json::json!({"ok": true}))
            }
            "agent_invite" => {
                let a: tools::AgentInviteArgs = parse!(tools::AgentInviteArgs);
                let outcome = self
                    .core
                    .invite_agent(&a.agent_name, &a.thread_id)
                    .await
                    .map_err(to_error_data)?;
                Self::ok_json(&outcome)
            }
            "bus_get_config" => {
                let _a: tools::BusGetConfigArgs = parse!(tools::BusGetConfigArgs);
                Self::ok_json(&public_config(&self.config))
            }
            other => Err(ErrorData::invalid_params(format!("tool not found: {other}"), None)),
        }
    }
}

fn public_config(config: &BusConfig) -> serde_json::Value {
    serde_json::json!({
        "heartbeat_timeout_secs": config.heartbeat_timeout_secs,
        "msg_wait_timeout_secs": config.msg_wait_timeout_secs,
        "msg_wait_timeout_max_secs": config.msg_wait_timeout_max_secs,
    })
}

impl rmcp::ServerHandler for BusMcpHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: self.name.clone(),
                version: self.version.clone(),
                ..Default::default()
            },
            instructions: Some("A persistent multi-agent communication bus.".into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult::with_all_items(tools::tool_list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        let args = match request.arguments {
            Some(map) => serde_json::Value::Object(map),
            None => serde_json::Value::Object(serde_json::Map::new()),
        };
        self.dispatch(&request.name, args, context.ct.clone()).await
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let mut resources = vec![
            Resource::new(
                RawResource {
                    description: Some("Bus configuration".into()),
                    mime_type: Some("application/json".into()),
                    ..RawResource::new("chat://bus/config", "bus-config")
                },
                None,
            ),
            Resource::new(
                RawResource {
                    description: Some("Currently registered agents".into()),
                    mime_type: Some("application/json".into()),
                    ..RawResource::new("chat://agents/active", "active-agents")
                },
                None,
            ),
            Resource::new(
                RawResource {
                    description: Some("Non-archived, non-closed threads".into()),
                    mime_type: Some("application/json".into()),
                    ..RawResource::new("chat://threads/active", "active-threads")
                },
                None,
            ),
        ];
        let threads = self
            .core
            .list_threads(ThreadFilter::default())
            .await
            .map_err(to_error_data)?;
        for thread in threads {
            resources.push(Resource::new(
                RawResource {
                    description: Some(format!("Transcript for \"{}\"", thread.topic)),
                    mime_type: Some("application/json".into()),
                    ..RawResource::new(
                        format!("chat://threads/{}/transcript", thread.id),
                        format!("transcript-{}", thread.id),
                    )
                },
                None,
            ));
        }
        Ok(ListResourcesResult::with_all_items(resources))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = request.uri.clone();
        let body = self.resolve_resource(&uri).await.map_err(to_error_data)?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(body, uri)],
        })
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, ErrorData> {
        Ok(ListPromptsResult::with_all_items(vec![
            Prompt::new(
                "summarize_thread",
                Some("Summarize a thread's transcript."),
                Some(vec![
                    PromptArgument {
                        name: "topic".into(),
                        title: None,
                        description: Some("The thread's topic".into()),
                        required: Some(true),
                    },
                    PromptArgument {
                        name: "transcript".into(),
                        title: None,
                        description: Some("The thread's message transcript".into()),
                        required: Some(true),
                    },
                ]),
            ),
            Prompt::new(
                "handoff_to_agent",
                Some("Hand off a task from one agent to another."),
                Some(vec![
                    PromptArgument {
                        name: "from_agent".into(),
                        title: None,
                        description: Some("Agent handing off the task".into()),
                        required: Some(true),
                    },
                    PromptArgument {
                        name: "to_agent".into(),
                        title: None,
                        description: Some("Agent receiving the task".into()),
                        required: Some(true),
                    },
                    PromptArgument {
                        name: "task_description".into(),
                        title: None,
                        description: Some("What needs to be done".into()),
                        required: Some(true),
                    },
                    PromptArgument {
                        name: "context".into(),
                        title: None,
                        description: Some("Additional context".into()),
                        required: Some(false),
                    },
                ]),
            ),
        ]))
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, ErrorData> {
        let args = request.arguments.unwrap_or_default();
        let get = |key: &str| -> String {
            args.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
        };

        let text = match request.name.as_ref() {
            "summarize_thread" => format!(
                "Summarize the following thread.\n\nTopic: {}\n\nTranscript:\n{}",
                get("topic"),
                get("transcript")
            ),
            "handoff_to_agent" => {
                let context = get("context");
                format!(
                    "{} is handing off a task to {}.\n\nTask: {}{}",
                    get("from_agent"),
                    get("to_agent"),
                    get("task_description"),
                    if context.is_empty() {
                        String::new()
                    } else {
                        format!("\n\nContext: {context}")
                    }
                )
            }
            other => return Err(ErrorData::invalid_params(format!("prompt not found: {other}"), None)),
        };

        Ok(GetPromptResult {
            description: None,
            messages: vec![PromptMessage {
                role: PromptMessageRole::User,
                content: PromptMessageContent::text(text),
            }],
        })
    }
}

impl BusMcpHandler {
    async fn resolve_resource(&self, uri: &str) -> crate::error::Result<String> {
        if uri == "chat://bus/config" {
            return Ok(public_config(&self.config).to_string());
        }
        if uri == "chat://agents/active" {
            let agents = self.core.list_agents().await?;
            return Ok(serde_json::to_string_pretty(&agents).unwrap_or_default());
        }
        if uri == "chat://threads/active" {
            let threads = self.core.list_threads(ThreadFilter::default()).await?;
            return Ok(serde_json::to_string_pretty(&threads).unwrap_or_default());
        }
        if let Some(id) = uri
            .strip_prefix("chat://threads/")
            .and_then(|rest| rest.strip_suffix("/transcript"))
        {
            let messages = self.core.list_messages(id, 0, 10_000, false).await?;
            let rendered: Vec<serde_json::Value> = messages
                .iter()
                .map(|m| {
                    serde_json::json!({
                        "seq": m.seq,
                        "author": m.author_name,
                        "role": m.role,
                        "blocks": message::parse_content_blocks(&m.content),
                    })
                })
                .collect();
            return Ok(serde_json::to_string_pretty(&rendered).unwrap_or_default());
        }
        if let Some(id) = uri
            .strip_prefix("chat://threads/")
            .and_then(|rest| rest.strip_suffix("/summary"))
        {
            let thread = self.core.get_thread(id).await?;
            return Ok(thread.summary.unwrap_or_default());
        }
        if let Some(id) = uri
            .strip_prefix("chat://threads/")
            .and_then(|rest| rest.strip_suffix("/state"))
        {
            let thread = self.core.get_thread(id).await?;
            return Ok(thread.status.as_str().to_string());
        }
        Err(BusError::not_found(format!("no such resource: {uri}")))
    }
}
