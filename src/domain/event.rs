//! Event entity: in-memory, ephemeral notifications of core mutations.
//!
//! Events are never persisted. They are produced by [`crate::core_api::CoreApi`]
//! after a store transaction commits and fanned out by [`crate::bus`].

use serde::{Deserialize, Serialize};

/// The closed set of event types the bus can emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    MsgNew {
        thread_id: String,
        message_id: String,
        seq: i64,
    },
    ThreadNew {
        thread_id: String,
        topic: String,
    },
    ThreadState {
        thread_id: String,
        status: String,
    },
    ThreadClosed {
        thread_id: String,
        summary: Option<String>,
    },
    ThreadArchived {
        thread_id: String,
    },
    ThreadUnarchived {
        thread_id: String,
        status: String,
    },
    ThreadDeleted {
        thread_id: String,
    },
    AgentOnline {
        agent_id: String,
    },
    AgentOffline {
        agent_id: String,
    },
    AgentTyping {
        thread_id: String,
        agent_id: String,
        is_typing: bool,
    },
}

impl Event {
    /// The wire `type` tag, for SSE `event:` fields and debug logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::MsgNew { .. } => "msg.new",
            Event::ThreadNew { .. } => "thread.new",
            Event::ThreadState { .. } => "thread.state",
            Event::ThreadClosed { .. } => "thread.closed",
            Event::ThreadArchived { .. } => "thread.archived",
            Event::ThreadUnarchived { .. } => "thread.unarchived",
            Event::ThreadDeleted { .. } => "thread.deleted",
            Event::AgentOnline { .. } => "agent.online",
            Event::AgentOffline { .. } => "agent.offline",
            Event::AgentTyping { .. } => "agent.typing",
        }
    }
}
