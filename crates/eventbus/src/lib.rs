//! The controller's EventBus: an in-process pub/sub channel with two
//! topics and bounded replay rings, in the shape of a single
//! tenant-filtered `broadcast::Sender<StreamEvent>`, generalized to two
//! topic channels plus a replay buffer for clients that connect after
//! history has already happened.

pub mod event;

use std::collections::VecDeque;

use tokio::sync::{broadcast, RwLock};

pub use event::Event;

/// Channel capacity for each topic; a slow subscriber that falls behind by
/// more than this many events gets a `Lagged` error on its next receive.
const CHANNEL_CAPACITY: usize = 1024;
const LOG_RING_CAPACITY: usize = 500;
const TRANSMISSION_RING_CAPACITY: usize = 50;

/// Two independent broadcast topics (`/admin`, `/public`) plus the two
/// bounded rings used to paint a dashboard's initial state before any new
/// events have arrived. Delivery is otherwise best-effort: subscribers see
/// only events published after they subscribe.
pub struct EventBus {
    admin_tx: broadcast::Sender<Event>,
    public_tx: broadcast::Sender<Event>,
    logs: RwLock<VecDeque<Event>>,
    transmissions: RwLock<VecDeque<Event>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (admin_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (public_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            admin_tx,
            public_tx,
            logs: RwLock::new(VecDeque::with_capacity(LOG_RING_CAPACITY)),
            transmissions: RwLock::new(VecDeque::with_capacity(TRANSMISSION_RING_CAPACITY)),
        }
    }

    #[must_use]
    pub fn subscribe_admin(&self) -> broadcast::Receiver<Event> {
        self.admin_tx.subscribe()
    }

    #[must_use]
    pub fn subscribe_public(&self) -> broadcast::Receiver<Event> {
        self.public_tx.subscribe()
    }

    /// Publishes to `/admin` only. The caller is trusted to have already
    /// redacted anything that isn't admin-safe; the bus applies no
    /// filtering of its own.
    pub async fn publish_admin(&self, event: Event) {
        self.record(&event).await;
        let _ = self.admin_tx.send(event);
    }

    /// Publishes to `/public` only. Use for events already built as their
    /// public-safe projection (e.g. `Event::ChallengesUpdate` from
    /// `Challenge::to_public_view()`).
    pub async fn publish_public(&self, event: Event) {
        self.record(&event).await;
        let _ = self.public_tx.send(event);
    }

    /// Publishes to both topics verbatim. Only appropriate for events with
    /// no admin-only fields to begin with.
    pub async fn publish_both(&self, event: Event) {
        self.record(&event).await;
        let _ = self.admin_tx.send(event.clone());
        let _ = self.public_tx.send(event);
    }

    async fn record(&self, event: &Event) {
        match event {
            Event::Log {.. } => {
                let mut logs = self.logs.write().await;
                if logs.len() == LOG_RING_CAPACITY {
                    logs.pop_front();
                }
                logs.push_back(event.clone());
            }
            Event::TransmissionComplete {.. } => {
                let mut txs = self.transmissions.write().await;
                if txs.len() == TRANSMISSION_RING_CAPACITY {
                    txs.pop_front();
                }
                txs.push_back(event.clone());
            }
            _ => {}
        }
    }

    /// Snapshot of the most recent log events, oldest first, for a
    /// dashboard's initial paint.
    pub async fn recent_logs(&self) -> Vec<Event> {
        self.logs.read().await.iter().cloned().collect()
    }

    /// Snapshot of the most recent completed transmissions, oldest first.
    pub async fn recent_transmissions(&self) -> Vec<Event> {
        self.transmissions.read().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn log_event(message: &str) -> Event {
        Event::Log {
            level: "info".to_owned(),
            message: message.to_owned(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn public_subscriber_does_not_see_admin_only_publish() {
        let bus = EventBus::new();
        let mut public_rx = bus.subscribe_public();
        bus.publish_admin(log_event("admin only")).await;
        assert!(public_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn subscriber_only_sees_events_after_it_subscribed() {
        let bus = EventBus::new();
        bus.publish_admin(log_event("before")).await;
        let mut rx = bus.subscribe_admin();
        bus.publish_admin(log_event("after")).await;
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, Event::Log { message,.. } if message == "after"));
    }

    #[tokio::test]
    async fn log_ring_caps_at_capacity() {
        let bus = EventBus::new();
        for i in 0..(LOG_RING_CAPACITY + 10) {
            bus.publish_admin(log_event(&i.to_string())).await;
        }
        let logs = bus.recent_logs().await;
        assert_eq!(logs.len(), LOG_RING_CAPACITY);
        assert!(matches!(&logs[0], Event::Log { message,.. } if message == "10"));
    }

    #[tokio::test]
    async fn non_log_non_transmission_events_are_not_retained() {
        let bus = EventBus::new();
        bus.publish_admin(Event::RunnerEnrolled {
                agent_id: "r1".to_owned(),
                timestamp: Utc::now(),
        })
        .await;
        assert!(bus.recent_logs().await.is_empty());
        assert!(bus.recent_transmissions().await.is_empty());
    }

    #[tokio::test]
    async fn transmission_ring_retains_completed_transmissions() {
        let bus = EventBus::new();
        bus.publish_admin(Event::TransmissionComplete {
                transmission_id: "t1".to_owned(),
                challenge_id: "c1".to_owned(),
                runner_id: "runner-1".to_owned(),
                success: true,
                timestamp: Utc::now(),
        })
        .await;
        assert_eq!(bus.recent_transmissions().await.len(), 1);
    }
}
