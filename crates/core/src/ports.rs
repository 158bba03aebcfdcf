//! Port interfaces for persistence and outbound alerting
//!
//! Adapters live in `promptgate-infra`. The in-memory sinks here are for
//! embedding and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use promptgate_domain::{ErrorKind, PersistenceResult, UsagePeriod, UsageRecord};
use serde::Serialize;

/// Durable home for the usage ledger
#[async_trait]
pub trait UsageStore: Send + Sync {
    /// Append records
    ///
    /// A save that writes but times out is retried, so `load` may return a
    /// record more than once; `UsageTracker::restore` skips repeated ids.
    async fn save(&self, records: &[UsageRecord]) -> PersistenceResult<()>;

    /// Every record previously saved, in save order
    async fn load(&self) -> PersistenceResult<Vec<UsageRecord>>;
}

/// Structured alerts raised by the gateway
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GatewayEvent {
    CircuitOpened { service_id: String, consecutive_failures: u32 },
    CircuitClosed { service_id: String },
    QuotaThreshold { period: UsagePeriod, threshold: u8, percent_used: f64 },
    MonthlyUsageWarning { percent_used: f64 },
    Degraded { operation_id: String, kind: ErrorKind },
}

/// Receiver for [`GatewayEvent`]s; delivery is the implementor's concern
///
/// Called synchronously on the request path, never under a gateway lock.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: GatewayEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: GatewayEvent) {}
}

/// Buffers events in memory
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<GatewayEvent>>,
}

impl CollectingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far
    pub fn events(&self) -> Vec<GatewayEvent> {
        self.events.lock().clone()
    }

    /// Drain the buffer
    pub fn take(&self) -> Vec<GatewayEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for CollectingEventSink {
    fn emit(&self, event: GatewayEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_drains() {
        let sink = CollectingEventSink::new();
        sink.emit(GatewayEvent::CircuitClosed { service_id: "openai:gpt-4o".into() });
        sink.emit(GatewayEvent::MonthlyUsageWarning { percent_used: 91.0 });

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.take().len(), 2);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = GatewayEvent::QuotaThreshold {
            period: UsagePeriod::Daily,
            threshold: 75,
            percent_used: 80.0,
        };
        let json = serde_json::to_value(&event).expect("serialize");

        assert_eq!(json["event"], "quota_threshold");
        assert_eq!(json["period"], "daily");
        assert_eq!(json["threshold"], 75);
    }
}
