//! In-process change notifications
//!
//! Services publish an [`AppEvent`] whenever shared state changes; views and
//! long-lived components subscribe instead of polling the store.

use crate::models::Provider;
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// `None` when keys were changed in bulk.
    ApiKeysUpdated { provider: Option<Provider> },
    MetricsUpdated { total_records: usize },
    SessionSaved { session_id: String },
    SessionDeleted { session_id: String },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AppEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.sender.subscribe()
    }

    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: AppEvent) {
        trace!(?event, "Publishing event");
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(AppEvent::MetricsUpdated { total_records: 3 });

        assert_eq!(first.recv().await.unwrap(), AppEvent::MetricsUpdated { total_records: 3 });
        assert_eq!(second.recv().await.unwrap(), AppEvent::MetricsUpdated { total_records: 3 });
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(AppEvent::SessionDeleted {
            session_id: "abc".to_string(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
