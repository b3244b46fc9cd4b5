//! The Wait Coordinator: `wait-for-messages` long-poll primitive (spec §4.4).
//!
//! Grounded on the per-key condition pattern in
//! `other_examples/.../agent-team-mail session.rs` and the
//! `RwLock<HashSet<...>>` online-tracking style in
//! `other_examples/.../goose-conductor message_bus.rs`, adapted here to a
//! per-thread `Notify` so a publish on thread A never wakes waiters on
//! thread B. Event-driven wake is backed by a >1s safety-net poll so a
//! missed notify (a publish landing in the gap between the store check
//! and the `notified()` registration) can never hang a waiter past one
//! tick. Timeouts and cancellations both resolve to an empty `Vec`,
//! never an error (spec §7).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::domain::Message;
use crate::error::Result;
use crate::store::Store;

const SAFETY_NET_POLL: Duration = Duration::from_secs(1);
const LIST_LIMIT: i64 = 500;

pub struct WaitCoordinator {
    notifiers: RwLock<HashMap<String, Arc<Notify>>>,
}

impl WaitCoordinator {
    pub fn new() -> Self {
        Self {
            notifiers: RwLock::new(HashMap::new()),
        }
    }

    async fn notifier_for(&self, thread_id: &str) -> Arc<Notify> {
        if let Some(n) = self.notifiers.read().await.get(thread_id) {
            return n.clone();
        }
        let mut guard = self.notifiers.write().await;
        guard
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    /// Wake any waiter registered on `thread_id`. Called by the Core API
    /// immediately after a message insert commits.
    pub async fn notify(&self, thread_id: &str) {
        if let Some(n) = self.notifiers.read().await.get(thread_id) {
            n.notify_waiters();
        }
    }

    /// Block until a message with `seq > after_seq` appears in
    /// `thread_id`, `timeout_ms` elapses, or `cancel` fires — whichever
    /// happens first. Always returns `Ok`; an empty vec means "nothing
    /// new before timeout/cancel", not an error.
    pub async fn wait_for_messages(
        &self,
        store: &Store,
        thread_id: &str,
        after_seq: i64,
        timeout_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Message>> {
        let notifier = self.notifier_for(thread_id).await;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            let messages = store
                .list_messages(thread_id, after_seq, LIST_LIMIT, true)
                .await?;
            if !messages.is_empty() {
                return Ok(messages);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let tick = SAFETY_NET_POLL.min(deadline - now);

            tokio::select! {
                _ = notifier.notified() => {}
                _ = tokio::time::sleep(tick) => {}
                _ = cancel.cancelled() => return Ok(Vec::new()),
            }
        }
    }
}

impl Default for WaitCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;
    use std::collections::{HashMap, HashSet};

    #[tokio::test]
    async fn wait_returns_empty_on_timeout() {
        let store = Store::connect_in_memory().await.unwrap();
        let thread = store.insert_thread("t", HashMap::new()).await.unwrap();
        let wc = WaitCoordinator::new();
        let cancel = CancellationToken::new();

        let result = wc
            .wait_for_messages(&store, &thread.id, 0, 50, &cancel)
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn wait_wakes_on_notify() {
        let store = Arc::new(Store::connect_in_memory().await.unwrap());
        let thread = store.insert_thread("t", HashMap::new()).await.unwrap();
        let wc = Arc::new(WaitCoordinator::new());
        let cancel = CancellationToken::new();

        let wait_store = store.clone();
        let wait_wc = wc.clone();
        let thread_id = thread.id.clone();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            wait_wc
                .wait_for_messages(&wait_store, &thread_id, 0, 5_000, &cancel_clone)
                .await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store
            .insert_message(
                &thread.id,
                None,
                "alice",
                Role::User,
                "hi",
                HashSet::new(),
                HashMap::new(),
            )
            .await
            .unwrap();
        wc.notify(&thread.id).await;

        let result = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn wait_cancels_immediately() {
        let store = Store::connect_in_memory().await.unwrap();
        let thread = store.insert_thread("t", HashMap::new()).await.unwrap();
        let wc = WaitCoordinator::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = wc
            .wait_for_messages(&store, &thread.id, 0, 5_000, &cancel)
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
