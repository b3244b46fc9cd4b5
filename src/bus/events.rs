//! The Event Bus: in-memory pub/sub fan-out to SSE subscribers (spec §4.3).
//!
//! Grounded on the teacher's `ApiState::event_tx: broadcast::Sender<ApiEvent>`
//! (`source-c-spacebot/src/api/state.rs`) — a bounded broadcast channel
//! where a slow subscriber falls behind and receives `Lagged` rather than
//! stalling publishers. `publish` is fire-and-forget: with zero
//! subscribers, `send` returning an error just means nobody was
//! listening, which is not a failure.

use tokio::sync::broadcast;

use crate::domain::Event;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(DEFAULT_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all current subscribers. Never blocks and
    /// never fails the caller — a `SendError` here only means there were
    /// no subscribers, which is the common case between SSE clients.
    pub fn publish(&self, event: Event) {
        let _ = self.tx.send(event);
    }

    /// Subscribe for SSE fan-out. A lagging subscriber sees
    /// `RecvError::Lagged(n)` on its next `recv`, which the SSE adapter
    /// turns into a `bus.lagged` notice rather than silently dropping it.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Event;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Event::AgentOnline {
            agent_id: "a1".into(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind(), "agent.online");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::AgentOffline {
            agent_id: "a1".into(),
        });
    }
}
