//! Core API: the façade every adapter (REST, MCP) drives (spec §4.7).
//!
//! Mirrors the teacher's `ApiState` role — a single struct adapters hold
//! an `Arc` to and call straight through — except where the teacher
//! wires HTTP handlers directly to storage, this façade interposes the
//! full validate → mutate → commit → publish pipeline so REST and MCP
//! can never diverge in behavior.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bus::{EventBus, WaitCoordinator};
use crate::config::BusConfig;
use crate::domain::{
    message, Agent, AgentView, CatalogEntry, Event, Message, Role, Thread, ThreadFilter,
    ThreadStatus,
};
use crate::error::{BusError, Result};
use crate::invite::{InvitationExecutor, InviteOutcome};
use crate::presence::PresenceManager;
use crate::store::Store;

pub struct CoreApi {
    store: Arc<Store>,
    events: Arc<EventBus>,
    wait: Arc<WaitCoordinator>,
    presence: Arc<PresenceManager>,
    invitations: Arc<InvitationExecutor>,
    heartbeat_timeout: chrono::Duration,
    msg_wait_timeout_max_ms: u64,
}

impl CoreApi {
    pub fn new(
        store: Arc<Store>,
        events: Arc<EventBus>,
        wait: Arc<WaitCoordinator>,
        presence: Arc<PresenceManager>,
        invitations: Arc<InvitationExecutor>,
        config: &BusConfig,
    ) -> Self {
        Self {
            store,
            events,
            wait,
            presence: presence.clone(),
            invitations,
            heartbeat_timeout: chrono::Duration::seconds(config.heartbeat_timeout_secs as i64),
            msg_wait_timeout_max_ms: config.msg_wait_timeout_max_secs * 1000,
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }

    // ── Threads ──────────────────────────────────────────────────────

    pub async fn create_thread(
        &self,
        topic: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Thread> {
        let thread = self.store.insert_thread(topic, metadata).await?;
        self.events.publish(Event::ThreadNew {
            thread_id: thread.id.clone(),
            topic: thread.topic.clone(),
        });
        Ok(thread)
    }

    pub async fn get_thread(&self, id: &str) -> Result<Thread> {
        self.store.fetch_thread(id).await
    }

    pub async fn list_threads(&self, filter: ThreadFilter) -> Result<Vec<Thread>> {
        self.store.list_threads(filter).await
    }

    pub async fn set_thread_state(&self, id: &str, new_status: ThreadStatus) -> Result<Thread> {
        let thread = self.store.update_thread_status(id, new_status).await?;
        self.events.publish(Event::ThreadState {
            thread_id: thread.id.clone(),
            status: thread.status.as_str().to_string(),
        });
        Ok(thread)
    }

    pub async fn close_thread(&self, id: &str, summary: Option<String>) -> Result<Thread> {
        let thread = self.store.close_thread(id, summary).await?;
        self.events.publish(Event::ThreadClosed {
            thread_id: thread.id.clone(),
            summary: thread.summary.clone(),
        });
        Ok(thread)
    }

    pub async fn archive_thread(&self, id: &str) -> Result<Thread> {
        let thread = self.store.archive_thread(id).await?;
        self.events.publish(Event::ThreadArchived {
            thread_id: thread.id.clone(),
        });
        Ok(thread)
    }

    pub async fn unarchive_thread(&self, id: &str) -> Result<Thread> {
        let thread = self.store.unarchive_thread(id).await?;
        self.events.publish(Event::ThreadUnarchived {
            thread_id: thread.id.clone(),
            status: thread.status.as_str().to_string(),
        });
        Ok(thread)
    }

    pub async fn delete_thread(&self, id: &str) -> Result<()> {
        self.store.delete_thread(id).await?;
        self.events.publish(Event::ThreadDeleted {
            thread_id: id.to_string(),
        });
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub async fn post_message(
        &self,
        thread_id: &str,
        author_id: Option<String>,
        author_name: &str,
        role: Role,
        raw_content: &serde_json::Value,
        mentions: HashSet<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Message> {
        let content = message::normalize_content(raw_content).map_err(BusError::invalid_input)?;
        let msg = self
            .store
            .insert_message(thread_id, author_id.clone(), author_name, role, &content, mentions, metadata)
            .await?;

        if let Some(author_id) = &author_id {
            let _ = self.store.touch_activity(author_id, "msg_post").await;
        }

        self.events.publish(Event::MsgNew {
            thread_id: msg.thread_id.clone(),
            message_id: msg.id.clone(),
            seq: msg.seq,
        });
        self.wait.notify(&msg.thread_id).await;

        Ok(msg)
    }

    pub async fn list_messages(
        &self,
        thread_id: &str,
        after_seq: i64,
        limit: i64,
        include_system_prompt: bool,
    ) -> Result<Vec<Message>> {
        self.store
            .list_messages(thread_id, after_seq, limit, include_system_prompt)
            .await
    }

    /// `wait-for-messages`: long-poll primitive (spec §4.4). Caller-requested
    /// timeout is clamped to `msg_wait_timeout_max_secs` so no single call
    /// can hold a connection open past the operator's ceiling.
    pub async fn wait_for_messages(
        &self,
        thread_id: &str,
        after_seq: i64,
        timeout_ms: u64,
        agent_id: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        self.store.fetch_thread(thread_id).await?;
        let clamped = timeout_ms.min(self.msg_wait_timeout_max_ms);

        if let Some(agent_id) = agent_id {
            let _ = self.store.touch_activity(agent_id, "msg_wait").await;
        }

        self.wait
            .wait_for_messages(&self.store, thread_id, after_seq, clamped, cancel)
            .await
    }

    // ── Agents ───────────────────────────────────────────────────────

    pub async fn register_agent(
        &self,
        ide: &str,
        model: &str,
        name: Option<String>,
        capabilities: Option<serde_json::Value>,
    ) -> Result<Agent> {
        let agent = self.store.register_agent(ide, model, name, capabilities).await?;
        self.events.publish(Event::AgentOnline {
            agent_id: agent.id.clone(),
        });
        Ok(agent)
    }

    /// Updates `last_heartbeat_at` and, if the agent had derived-offline
    /// since its last heartbeat, re-announces it with `agent.online`
    /// (spec §4.5).
    pub async fn heartbeat(&self, id: &str, token: &str) -> Result<()> {
        let now = self.now();
        let was_online = self
            .store
            .fetch_agent(id)
            .await
            .map(|a| a.is_online(now, self.heartbeat_timeout))
            .unwrap_or(false);

        self.store.heartbeat(id, token).await?;

        if !was_online {
            self.events.publish(Event::AgentOnline {
                agent_id: id.to_string(),
            });
        }
        Ok(())
    }

    pub async fn unregister_agent(&self, id: &str, token: &str) -> Result<()> {
        self.store.unregister_agent(id, token).await?;
        self.events.publish(Event::AgentOffline {
            agent_id: id.to_string(),
        });
        Ok(())
    }

    pub async fn list_agents(&self) -> Result<Vec<AgentView>> {
        let now = self.now();
        let agents = self.store.list_agents().await?;
        Ok(agents
            .into_iter()
            .map(|a| AgentView::from_agent(&a, now, self.heartbeat_timeout))
            .collect())
    }

    pub async fn get_agent(&self, id: &str) -> Result<AgentView> {
        let now = self.now();
        let agent = self.store.fetch_agent(id).await?;
        Ok(AgentView::from_agent(&agent, now, self.heartbeat_timeout))
    }

    pub async fn set_typing(&self, thread_id: &str, agent_id: &str, is_typing: bool) -> Result<()> {
        self.store.fetch_thread(thread_id).await?;
        self.store.fetch_agent(agent_id).await?;
        self.events.publish(Event::AgentTyping {
            thread_id: thread_id.to_string(),
            agent_id: agent_id.to_string(),
            is_typing,
        });
        Ok(())
    }

    pub fn presence(&self) -> &Arc<PresenceManager> {
        &self.presence
    }

    // ── Invitations ──────────────────────────────────────────────────

    pub fn catalog(&self) -> &[CatalogEntry] {
        self.invitations.catalog()
    }

    pub async fn invite_agent(&self, catalog_name: &str, thread_id: &str) -> Result<InviteOutcome> {
        self.store.fetch_thread(thread_id).await?;
        self.invitations.invite(catalog_name, thread_id).await
    }
}
