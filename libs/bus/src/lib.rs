//! Event bus for the trading core
//!
//! Publish/subscribe over dotted topics (`trade.executed`, `order.*`).
//! Publishers never block: each subscription owns a bounded queue with its
//! chosen overflow policy, so a slow subscriber only loses (or buffers) its
//! own messages.
//!
//! Events for a given market are published in the engine's commit order and
//! carry a global monotonic sequence assigned at publish time.

pub mod events;

pub use events::{Event, EventEnvelope};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use tracing::warn;
use uuid::Uuid;

/// Overflow policy for one subscription's queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Drop the oldest buffered message to make room for the new one
    DropOldest,
    /// Drop the incoming message and keep the buffer as is
    DropNewest,
}

/// Topic pattern: exact (`trade.executed`), single-segment prefix wildcard
/// (`order.*`), or match-all (`*`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern(String);

impl TopicPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// Whether `topic` matches this pattern
    pub fn matches(&self, topic: &str) -> bool {
        match self.0.as_str() {
            "*" => true,
            pattern => match pattern.strip_suffix(".*") {
                Some(prefix) => topic
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('.')),
                None => pattern == topic,
            },
        }
    }
}

impl From<&str> for TopicPattern {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

struct SubscriptionQueue {
    buffer: Mutex<VecDeque<EventEnvelope>>,
    available: Condvar,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl SubscriptionQueue {
    fn push(&self, envelope: EventEnvelope) {
        let mut buffer = self.buffer.lock().expect("subscription buffer poisoned");
        if buffer.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                topic = envelope.event.topic(),
                dropped = self.dropped.load(Ordering::Relaxed),
                "subscriber lagging, dropping message"
            );
            match self.policy {
                OverflowPolicy::DropOldest => {
                    buffer.pop_front();
                }
                OverflowPolicy::DropNewest => return,
            }
        }
        buffer.push_back(envelope);
        drop(buffer);
        self.available.notify_one();
    }
}

/// Receiving half of a subscription
pub struct Subscription {
    queue: Arc<SubscriptionQueue>,
}

impl Subscription {
    /// Pop the next buffered event without blocking
    pub fn try_next(&self) -> Option<EventEnvelope> {
        self.queue
            .buffer
            .lock()
            .expect("subscription buffer poisoned")
            .pop_front()
    }

    /// Wait up to `timeout` for the next event
    pub fn next_timeout(&self, timeout: Duration) -> Option<EventEnvelope> {
        let mut buffer = self
            .queue
            .buffer
            .lock()
            .expect("subscription buffer poisoned");
        if let Some(envelope) = buffer.pop_front() {
            return Some(envelope);
        }
        let (mut buffer, _) = self
            .queue
            .available
            .wait_timeout(buffer, timeout)
            .expect("subscription buffer poisoned");
        buffer.pop_front()
    }

    /// Drain everything currently buffered
    pub fn drain(&self) -> Vec<EventEnvelope> {
        self.queue
            .buffer
            .lock()
            .expect("subscription buffer poisoned")
            .drain(..)
            .collect()
    }

    /// Messages lost to the overflow policy so far
    pub fn dropped(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

struct SubscriberSlot {
    pattern: TopicPattern,
    queue: Arc<SubscriptionQueue>,
}

/// Multi-producer, multi-subscriber event bus
pub struct EventBus {
    subscribers: Mutex<Vec<SubscriberSlot>>,
    sequence: AtomicU64,
}

/// Queue capacity used by [`EventBus::subscribe`]
const DEFAULT_CAPACITY: usize = 1024;

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(1),
        }
    }

    /// Subscribe with the default capacity and drop-oldest policy
    pub fn subscribe(&self, pattern: impl Into<TopicPattern>) -> Subscription {
        self.subscribe_with(pattern, DEFAULT_CAPACITY, OverflowPolicy::DropOldest)
    }

    /// Subscribe with an explicit buffer capacity and overflow policy
    pub fn subscribe_with(
        &self,
        pattern: impl Into<TopicPattern>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> Subscription {
        let queue = Arc::new(SubscriptionQueue {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_CAPACITY))),
            available: Condvar::new(),
            capacity: capacity.max(1),
            policy,
            dropped: AtomicU64::new(0),
        });
        self.subscribers
            .lock()
            .expect("subscriber list poisoned")
            .push(SubscriberSlot {
                pattern: pattern.into(),
                queue: Arc::clone(&queue),
            });
        Subscription { queue }
    }

    /// Publish an event to every matching subscription. Never blocks on a
    /// slow subscriber.
    pub fn publish(&self, event: Event, timestamp: i64) -> EventEnvelope {
        let envelope = EventEnvelope {
            event_id: Uuid::now_v7(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp,
            event,
        };
        let subscribers = self.subscribers.lock().expect("subscriber list poisoned");
        for slot in subscribers.iter() {
            if slot.pattern.matches(envelope.event.topic()) {
                slot.queue.push(envelope.clone());
            }
        }
        envelope
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
    use types::ids::{AccountId, Asset};
    use rust_decimal_macros::dec;

    fn balance_event() -> Event {
        Event::BalanceChanged {
            account_id: AccountId(1),
            asset: Asset::new("USDT"),
            available: dec!(100),
            locked: dec!(0),
            reason: "deposit".into(),
        }
    }

    #[test]
    fn test_topic_pattern_matching() {
        assert!(TopicPattern::new("*").matches("trade.executed"));
        assert!(TopicPattern::new("order.*").matches("order.canceled"));
        assert!(!TopicPattern::new("order.*").matches("trade.executed"));
        assert!(!TopicPattern::new("order.*").matches("orders.canceled"));
        assert!(TopicPattern::new("trade.executed").matches("trade.executed"));
        assert!(!TopicPattern::new("trade.executed").matches("trade.settled"));
    }

    #[test]
    fn test_publish_reaches_matching_subscribers_only() {
        let bus = EventBus::new();
        let all = bus.subscribe("*");
        let balances = bus.subscribe("balance.*");
        let trades = bus.subscribe("trade.*");

        bus.publish(balance_event(), 1);

        assert_eq!(all.drain().len(), 1);
        assert_eq!(balances.drain().len(), 1);
        assert_eq!(trades.drain().len(), 0);
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let bus = EventBus::new();
        let sub = bus.subscribe("*");
        bus.publish(balance_event(), 1);
        bus.publish(balance_event(), 2);
        let events = sub.drain();
        assert!(events[0].sequence < events[1].sequence);
    }

    #[test]
    fn test_drop_oldest_policy() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with("*", 2, OverflowPolicy::DropOldest);
        for ts in 1..=3 {
            bus.publish(balance_event(), ts);
        }
        let events = sub.drain();
        assert_eq!(events.len(), 2);
        // Oldest (ts 1) was dropped
        assert_eq!(events[0].timestamp, 2);
        assert_eq!(sub.dropped(), 1);
    }

    #[test]
    fn test_drop_newest_policy() {
        let bus = EventBus::new();
        let sub = bus.subscribe_with("*", 2, OverflowPolicy::DropNewest);
        for ts in 1..=3 {
            bus.publish(balance_event(), ts);
        }
        let events = sub.drain();
        assert_eq!(events.len(), 2);
        // Newest (ts 3) was dropped
        assert_eq!(events[1].timestamp, 2);
    }

    #[test]
    fn test_next_timeout_returns_buffered() {
        let bus = EventBus::new();
        let sub = bus.subscribe("*");
        bus.publish(balance_event(), 1);
        assert!(sub.next_timeout(Duration::from_millis(10)).is_some());
        assert!(sub.next_timeout(Duration::from_millis(10)).is_none());
    }
}
