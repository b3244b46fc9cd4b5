//! Presence Manager: agent registry lifecycle and the offline sweeper
//! (spec §4.5).
//!
//! `is_online`/`state` are never stored — they're recomputed on every
//! read from `last_heartbeat_at`/`last_activity_at` (see
//! [`crate::domain::agent::Agent::state`]). The only job left for this
//! module is the 1s-tick sweeper that turns a stale heartbeat into an
//! `agent.offline` event, grounded on the `online: RwLock<HashSet<...>>`
//! mark/sweep shape in `other_examples/.../goose-conductor
//! message_bus.rs`. The sweeper tracks which agent ids it last saw
//! online so a still-offline agent is announced exactly once, not on
//! every tick (spec §4.5: "who were previously considered online").

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::bus::EventBus;
use crate::domain::Event;
use crate::store::Store;

const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

pub struct PresenceManager {
    store: Arc<Store>,
    events: Arc<EventBus>,
    heartbeat_timeout: chrono::Duration,
    known_online: Mutex<HashSet<String>>,
}

impl PresenceManager {
    pub fn new(store: Arc<Store>, events: Arc<EventBus>, heartbeat_timeout_secs: u64) -> Self {
        Self {
            store,
            events,
            heartbeat_timeout: chrono::Duration::seconds(heartbeat_timeout_secs as i64),
            known_online: Mutex::new(HashSet::new()),
        }
    }

    /// Spawn the 1s-tick sweeper. Stops when `shutdown` flips to `true`.
    pub fn spawn_sweeper(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep().await {
                            warn!(error = %e, "presence sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("presence sweeper stopped");
        })
    }

    async fn sweep(&self) -> crate::error::Result<()> {
        let now = chrono::Utc::now();
        let agents = self.store.list_agents().await?;
        let current_online: HashSet<String> = agents
            .iter()
            .filter(|a| a.is_online(now, self.heartbeat_timeout))
            .map(|a| a.id.clone())
            .collect();

        let mut known = self.known_online.lock().unwrap();
        for agent_id in known.iter() {
            if !current_online.contains(agent_id) {
                self.events.publish(Event::AgentOffline {
                    agent_id: agent_id.clone(),
                });
            }
        }
        *known = current_online;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sweep_emits_offline_exactly_once_on_transition() {
        let store = Arc::new(Store::connect_in_memory().await.unwrap());
        let events = Arc::new(EventBus::new());
        let agent = store
            .register_agent("cli", "gpt", Some("a".into()), None)
            .await
            .unwrap();

        let presence = PresenceManager::new(store.clone(), events.clone(), 1);
        let mut rx = events.subscribe();

        // baseline sweep: the agent's heartbeat is fresh, so it's recorded
        // as known-online and no event fires yet.
        presence.sweep().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_100)).await;
        presence.sweep().await.unwrap();

        let event = tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            Event::AgentOffline { agent_id } => assert_eq!(agent_id, agent.id),
            other => panic!("unexpected event: {other:?}"),
        }

        // the agent is still offline; a further sweep must not re-announce it.
        presence.sweep().await.unwrap();
        let nothing = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await;
        assert!(nothing.is_err(), "sweep re-announced an already-offline agent");
    }
}
