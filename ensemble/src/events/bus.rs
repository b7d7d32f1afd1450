//! In-process pub/sub with bounded, lossy delivery.
//!
//! Built on `tokio::sync::broadcast`: each subscriber holds its own cursor
//! over a bounded ring, so a slow subscriber drops its **oldest** undelivered
//! events (counted per subscriber) while fast subscribers observe every event
//! in publish order. Producers never block.
//!
//! Auto-emit rules turn memory writes into higher-level custom events: a
//! `memory.added` whose item metadata matches a rule's filter re-publishes
//! under the rule's event name. Rules are ordered; an `exclusive` rule stops
//! evaluation after it fires.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{Event, EventType};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One declarative auto-emission rule.
///
/// Deserialized from the team config's `events.auto_emit_patterns`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoEmitRule {
    /// Name of the custom event to emit (e.g. `milestone.plan_ready`).
    pub event_name: String,
    /// Every key here must equal the memory item's metadata value.
    #[serde(default)]
    pub metadata_filter: Map<String, Value>,
    /// When set, a match stops evaluation of later rules.
    #[serde(default)]
    pub exclusive: bool,
}

impl AutoEmitRule {
    fn matches(&self, metadata: Option<&Value>) -> bool {
        let Some(Value::Object(meta)) = metadata else {
            return self.metadata_filter.is_empty();
        };
        self.metadata_filter
            .iter()
            .all(|(k, v)| meta.get(k) == Some(v))
    }
}

/// The bus handle. Cheap to clone; all clones publish into the same ring.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    rules: std::sync::Arc<Vec<AutoEmitRule>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            rules: std::sync::Arc::new(Vec::new()),
        }
    }

    /// Installs the ordered auto-emit rules (builder pattern).
    pub fn with_rules(mut self, rules: Vec<AutoEmitRule>) -> Self {
        self.rules = std::sync::Arc::new(rules);
        self
    }

    /// Publishes an event. Never blocks; with no subscribers the event is
    /// simply dropped. A `memory.added` event is additionally run through the
    /// auto-emit rules.
    pub fn publish(&self, event: Event) {
        let derived = if event.event_type == EventType::MemoryAdded {
            self.derive_auto_events(&event)
        } else {
            Vec::new()
        };
        trace!(event_type = %event.event_type.name(), "publish");
        let _ = self.tx.send(event);
        for event in derived {
            debug!(event_type = %event.event_type.name(), "auto-emit");
            let _ = self.tx.send(event);
        }
    }

    fn derive_auto_events(&self, source: &Event) -> Vec<Event> {
        let metadata = source.payload.get("metadata");
        let mut out = Vec::new();
        for rule in self.rules.iter() {
            if !rule.matches(metadata) {
                continue;
            }
            let mut derived = Event::new(
                EventType::Custom(rule.event_name.clone()),
                "event_bus",
            );
            derived.task_id = source.task_id.clone();
            derived.payload = source.payload.clone();
            derived
                .payload
                .insert("derived_from".into(), Value::String("memory.added".into()));
            out.push(derived);
            if rule.exclusive {
                break;
            }
        }
        out
    }

    /// Registers a subscriber for events matching `pattern` (exact type,
    /// `prefix.*`, or `*`). The subscriber sees events published after this
    /// call, in publish order, minus anything dropped while it lagged.
    pub fn subscribe(&self, pattern: impl Into<String>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            pattern: pattern.into(),
            dropped: 0,
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Waits up to `grace` for subscribers to drain the ring, then gives up.
    /// Returns the number of events still queued at the deadline.
    pub async fn close(&self, grace: Duration) -> usize {
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            if self.tx.is_empty() || self.tx.receiver_count() == 0 {
                return 0;
            }
            if tokio::time::Instant::now() >= deadline {
                return self.tx.len();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// A filtered, lossy event receiver.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    pattern: String,
    dropped: u64,
}

impl Subscription {
    /// Next matching event, or `None` when the bus is gone.
    ///
    /// Lag (queue overflow) is absorbed here: the oldest undelivered events
    /// are skipped and counted, and receiving continues.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.event_type.matches(&self.pattern) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.dropped += n;
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv); `None` when nothing
    /// matching is currently queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.event_type.matches(&self.pattern) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    self.dropped += n;
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains everything currently queued that matches the pattern.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut out = Vec::new();
        while let Some(event) = self.try_recv() {
            out.push(event);
        }
        out
    }

    /// Events this subscriber lost to queue overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
