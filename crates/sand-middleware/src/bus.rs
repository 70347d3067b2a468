//! Headless, topic-addressed publish/subscribe event bus.
//!
//! Uses a [`tokio::sync::broadcast`] channel under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  Filtering by topic happens on the receiving side.
//!
//! # Topics
//!
//! | Topic | Traffic |
//! |---|---|
//! | `<group>/<device>/data/position` | Position telemetry of a tracked group |
//! | `ConfigTransformer/<camera>/data/cameras/transformation_target_points` | Recomputed calibration targets |
//! | `SensorFusion/all/data/collision` | Per-cycle collision verdict |
//! | `SensorFusion/all/data/collision_map` | Per-cycle collision grid |

use std::time::Duration;

use sand_types::{Event, EventPayload, SandError};
use tokio::runtime::Runtime;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// True when `topic` matches the subscription `pattern`.
///
/// `+` matches exactly one level, `#` matches every remaining level and must
/// be the final level of the pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let mut levels = topic.split('/');
    for filter in pattern.split('/') {
        if filter == "#" {
            return true;
        }
        match levels.next() {
            Some(level) if filter == "+" || filter == level => continue,
            _ => return false,
        }
    }
    levels.next().is_none()
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an already-built event.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when nobody is listening; on a live system that is a
    /// normal condition, not an error.
    pub fn publish(&self, event: Event) -> Result<usize, SandError> {
        match self.sender.send(event) {
            Ok(n) => Ok(n),
            Err(broadcast::error::SendError(_)) => Ok(0),
        }
    }

    /// Wrap `payload` in a fresh [`Event`] and publish it on `topic`.
    pub fn publish_to(&self, topic: &str, payload: EventPayload) -> Result<usize, SandError> {
        self.publish(Event::new(topic, payload))
    }

    /// Subscribe to every event on the bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Subscribe to events whose topic matches `pattern`.
    pub fn subscribe_topic(&self, pattern: impl Into<String>) -> TopicSubscriber {
        TopicSubscriber {
            pattern: pattern.into(),
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe for use from a plain OS thread.
    ///
    /// # Errors
    ///
    /// [`SandError::Io`] if the receiver's private runtime cannot be built.
    pub fn subscribe_blocking(&self, pattern: impl Into<String>) -> Result<BlockingSubscriber, SandError> {
        BlockingSubscriber::new(self.subscribe_topic(pattern))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Async subscriber
// ---------------------------------------------------------------------------

/// A subscriber that only delivers events whose topic matches its pattern.
pub struct TopicSubscriber {
    pattern: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicSubscriber {
    /// Wait for the next event that matches this subscriber's pattern.
    ///
    /// Returns `None` when the bus is closed and no further events will arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if topic_matches(&self.pattern, &event.topic) => {
                    return Some(event);
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(pattern = %self.pattern, lagged_by = n, "TopicSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

// ---------------------------------------------------------------------------
// Thread-side subscriber
// ---------------------------------------------------------------------------

/// A [`TopicSubscriber`] driven by its own single-threaded runtime so that a
/// worker thread can wait for events with a bounded timeout and check its
/// shutdown signal in between.
pub struct BlockingSubscriber {
    inner: TopicSubscriber,
    runtime: Runtime,
}

impl BlockingSubscriber {
    fn new(inner: TopicSubscriber) -> Result<Self, SandError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        Ok(Self { inner, runtime })
    }

    /// Block for at most `timeout` waiting for a matching event.
    ///
    /// * `Ok(Some(event))` – an event arrived.
    /// * `Ok(None)` – the timeout elapsed.
    /// * `Err(SandError::Channel)` – the bus has shut down.
    ///
    /// Must not be called from inside an async context.
    pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<Event>, SandError> {
        let inner = &mut self.inner;
        match self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, inner.recv()).await })
        {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(SandError::Channel(format!(
                "bus closed for subscription {}",
                inner.pattern
            ))),
            Err(_elapsed) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sand_types::{Point, PositionData};

    fn position_event(topic: &str) -> Event {
        Event::new(
            topic,
            EventPayload::Position(PositionData {
                x_position: 1.0,
                y_position: 2.0,
                z_position: 0.0,
            }),
        )
    }

    #[test]
    fn wildcard_matching() {
        assert!(topic_matches("+/+/data/position", "crane_a/gantry/data/position"));
        assert!(topic_matches("crane_a/#", "crane_a/gantry/data/position"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("+/data/position", "crane_a/gantry/data/position"));
        assert!(!topic_matches("+/+/data/position", "crane_a/gantry/data/position/extra"));
        assert!(!topic_matches("crane_b/#", "crane_a/gantry/data/position"));
        assert!(topic_matches("+/#", "crane_a/data/position"));
        assert!(topic_matches("+/#", "crane_a/gantry/trolley/data/position"));
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        let event = position_event("crane_a/gantry/data/position");
        bus.publish(event.clone())?;

        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.topic, event.topic);
        Ok(())
    }

    #[tokio::test]
    async fn topic_subscriber_filters() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_topic("+/+/data/position");

        // Not a position topic.
        bus.publish_to(
            "ConfigTransformer/f1_c1/data/cameras/transformation_target_points",
            EventPayload::TargetPoints(vec![Point::new(1.0, 1.0)]),
        )?;
        let good = position_event("crane_a/gantry/data/position");
        bus.publish(good.clone())?;

        let received = sub.recv().await.ok_or("No event received")?;
        assert_eq!(received.id, good.id);
        Ok(())
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_topic("#");
        let mut rx2 = bus.subscribe_topic("crane_a/#");

        let event = position_event("crane_a/gantry/data/position");
        bus.publish(event.clone())?;

        assert_eq!(rx1.recv().await.ok_or("rx1 empty")?.id, event.id);
        assert_eq!(rx2.recv().await.ok_or("rx2 empty")?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        let delivered = bus.publish(position_event("crane_a/gantry/data/position"));
        assert_eq!(delivered.unwrap(), 0);
    }

    #[test]
    fn blocking_subscriber_times_out_when_idle() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_blocking("+/+/data/position")?;
        assert!(sub.recv_timeout(Duration::from_millis(20))?.is_none());
        Ok(())
    }

    #[test]
    fn blocking_subscriber_receives_matching_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_blocking("+/+/data/position")?;
        let event = position_event("crane_a/gantry/data/position");
        bus.publish(event.clone())?;
        let received = sub.recv_timeout(Duration::from_millis(100))?.ok_or("timed out")?;
        assert_eq!(received.id, event.id);
        Ok(())
    }

    #[test]
    fn blocking_subscriber_reports_closed_bus() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut sub = bus.subscribe_blocking("#")?;
        drop(bus);
        assert!(sub.recv_timeout(Duration::from_millis(20)).is_err());
        Ok(())
    }

    /// Flooding a low-capacity channel while a subscriber sleeps must not
    /// lose the subscriber: it skips the lag and sees the newest events.
    #[tokio::test]
    async fn lagging_subscriber_recovers() {
        const CAPACITY: usize = 16;
        let bus = EventBus::new(CAPACITY);
        let mut slow_sub = bus.subscribe_topic("flood/#");

        for _ in 0..1_000 {
            let _ = bus.publish(position_event("flood/lidar/data/position"));
        }

        let received = slow_sub.recv().await;
        assert!(received.is_some(), "subscriber must resume after lagging");
    }
}
