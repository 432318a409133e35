//! Broadcast of discovery events to presentation collaborators.

use netwatch_core::events::{DiscoveryEvent, EventPayload};
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Fan-out of [`DiscoveryEvent`]s. Publishing never waits: with no
/// subscribers the event is dropped, and slow subscribers see a lag error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<DiscoveryEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, payload: EventPayload) {
        // Err only means nobody is listening.
        let _ = self.sender.send(DiscoveryEvent::new(payload));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new(4);
        bus.publish(EventPayload::HostVanished {
            ip: "10.0.0.1".to_string(),
        });

        let mut rx = bus.subscribe();
        bus.publish(EventPayload::HostVanished {
            ip: "10.0.0.2".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(
            event.payload,
            EventPayload::HostVanished {
                ip: "10.0.0.2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(EventPayload::HostVanished {
                ip: format!("10.0.0.{i}"),
            });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
