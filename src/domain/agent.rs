//! Agent entity: the presence registry row for a connected agent or operator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Presentation-layer liveness classification, derived on read from
/// `last_heartbeat_at` and `last_activity_at`. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Active,
    Waiting,
    Idle,
    Offline,
}

/// A registered agent or human operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub ide: String,
    pub model: String,
    pub capabilities: Option<serde_json::Value>,
    /// Opaque secret issued at registration. Never serialized back out
    /// to list/read callers — only returned once, at registration time.
    #[serde(skip_serializing)]
    pub token: String,
    pub last_heartbeat_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_activity_kind: String,
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    /// `true` iff the heartbeat is fresh relative to `timeout`. The sole
    /// source of truth for "online" per spec — computed functionally,
    /// never cached.
    pub fn is_online(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.last_heartbeat_at <= timeout
    }

    /// Derived presentation state. `Active` within 30s of any activity,
    /// `Waiting` within 60s of a `wait`-kind activity, `Idle` while
    /// online but older than that, `Offline` otherwise.
    pub fn state(&self, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> AgentState {
        if !self.is_online(now, heartbeat_timeout) {
            return AgentState::Offline;
        }
        let since_activity = now - self.last_activity_at;
        if since_activity <= chrono::Duration::seconds(30) {
            AgentState::Active
        } else if self.last_activity_kind == "msg_wait" && since_activity <= chrono::Duration::seconds(60)
        {
            AgentState::Waiting
        } else {
            AgentState::Idle
        }
    }
}

/// Projection of [`Agent`] safe to hand to API clients: no token, derived
/// `is_online`/`state` included.
#[derive(Debug, Clone, Serialize)]
pub struct AgentView {
    pub id: String,
    pub name: String,
    pub ide: String,
    pub model: String,
    pub capabilities: Option<serde_json::Value>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_activity_kind: String,
    pub registered_at: DateTime<Utc>,
    pub is_online: bool,
    pub state: AgentState,
}

impl AgentView {
    pub fn from_agent(agent: &Agent, now: DateTime<Utc>, heartbeat_timeout: chrono::Duration) -> Self {
        Self {
            id: agent.id.clone(),
            name: agent.name.clone(),
            ide: agent.ide.clone(),
            model: agent.model.clone(),
            capabilities: agent.capabilities.clone(),
            last_heartbeat_at: agent.last_heartbeat_at,
            last_activity_at: agent.last_activity_at,
            last_activity_kind: agent.last_activity_kind.clone(),
            registered_at: agent.registered_at,
            is_online: agent.is_online(now, heartbeat_timeout),
            state: agent.state(now, heartbeat_timeout),
        }
    }
}
