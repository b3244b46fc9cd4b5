//! Raw SQLite row shapes and their conversion into domain types.
//!
//! Kept separate from `mod.rs` so the query layer's `FromRow` derives
//! don't crowd the operations they back.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{Agent, Message, Role, Thread, ThreadStatus};
use crate::error::{BusError, Result};

fn parse_ts(raw: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BusError::internal(format!("corrupt {field} timestamp: {e}")))
}

#[derive(FromRow)]
pub struct ThreadRow {
    pub id: String,
    pub topic: String,
    pub status: String,
    pub prior_status: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
    pub metadata: String,
}

impl ThreadRow {
    pub fn into_thread(self) -> Result<Thread> {
        let status = ThreadStatus::parse(&self.status)
            .ok_or_else(|| BusError::internal(format!("corrupt thread status {}", self.status)))?;
        let prior_status = self
            .prior_status
            .as_deref()
            .and_then(ThreadStatus::parse);
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_str(&self.metadata).unwrap_or_default();

        Ok(Thread {
            id: self.id,
            topic: self.topic,
            status,
            prior_status,
            summary: self.summary,
            created_at: parse_ts(&self.created_at, "thread.created_at")?,
            metadata,
        })
    }
}

#[derive(FromRow)]
pub struct MessageRow {
    pub id: String,
    pub thread_id: String,
    pub seq: i64,
    pub author_id: Option<String>,
    pub author_name: String,
    pub role: String,
    pub content: String,
    pub mentions: String,
    pub metadata: String,
    pub created_at: String,
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let role = Role::parse(&self.role)
            .ok_or_else(|| BusError::internal(format!("corrupt message role {}", self.role)))?;
        let mentions: HashSet<String> = serde_json::from_str(&self.mentions).unwrap_or_default();
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_str(&self.metadata).unwrap_or_default();

        Ok(Message {
            id: self.id,
            thread_id: self.thread_id,
            seq: self.seq,
            author_id: self.author_id,
            author_name: self.author_name,
            role,
            content: self.content,
            mentions,
            metadata,
            created_at: parse_ts(&self.created_at, "message.created_at")?,
        })
    }
}

#[derive(FromRow)]
pub struct AgentRow {
    pub id: String,
    pub name: String,
    pub ide: String,
    pub model: String,
    pub capabilities: Option<String>,
    pub token: String,
    pub last_heartbeat_at: String,
    pub last_activity_at: String,
    pub last_activity_kind: String,
    pub registered_at: String,
}

impl AgentRow {
    pub fn into_agent(self) -> Result<Agent> {
        let capabilities = self
            .capabilities
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());

        Ok(Agent {
            id: self.id,
            name: self.name,
            ide: self.ide,
            model: self.model,
            capabilities,
            token: self.token,
            last_heartbeat_at: parse_ts(&self.last_heartbeat_at, "agent.last_heartbeat_at")?,
            last_activity_at: parse_ts(&self.last_activity_at, "agent.last_activity_at")?,
            last_activity_kind: self.last_activity_kind,
            registered_at: parse_ts(&self.registered_at, "agent.registered_at")?,
        })
    }
}
