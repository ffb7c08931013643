use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::debug;

/// One published change notification.
#[derive(Debug, Clone)]
pub struct Event {
    pub topic: String,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget fan-out to change subscribers. Publishing never
/// blocks and never fails the mutation that triggered it.
pub trait EventBus: Send + Sync {
    fn publish(&self, topic: &str);
}

/// Log-and-publish helper used after each successful mutation.
pub fn dispatch(bus: &dyn EventBus, topic: &str) {
    debug!(topic = %topic, "event: Dispatch");
    bus.publish(topic);
}

/// Broadcast-channel bus; subscribers that lag simply miss events.
pub struct Broadcast {
    tx: broadcast::Sender<Event>,
}

impl Broadcast {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl EventBus for Broadcast {
    fn publish(&self, topic: &str) {
        // No subscribers is not an error for fire-and-forget fan-out.
        let _ = self.tx.send(Event {
            topic: topic.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Test bus that records published topics in order.
#[derive(Default)]
pub struct Recorder {
    topics: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().unwrap().clone()
    }
}

impl EventBus for Recorder {
    fn publish(&self, topic: &str) {
        self.topics.lock().unwrap().push(topic.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_fan_out() {
        let bus = Broadcast::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        dispatch(&bus, "instance.change");

        assert_eq!(rx1.try_recv().unwrap().topic, "instance.change");
        assert_eq!(rx2.try_recv().unwrap().topic, "instance.change");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = Broadcast::new(16);
        bus.publish("instance.change");
    }

    #[test]
    fn test_recorder_orders_topics() {
        let bus = Recorder::new();
        dispatch(&bus, "instance.change");
        dispatch(&bus, "disk.change");
        assert_eq!(bus.topics(), vec!["instance.change", "disk.change"]);
    }
}
