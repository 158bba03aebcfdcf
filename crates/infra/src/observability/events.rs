//! Event sink that renders gateway events as tracing events

use promptgate_core::{EventSink, GatewayEvent};
use tracing::{info, warn};

/// Logs every [`GatewayEvent`] under the `promptgate::events` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, event: GatewayEvent) {
        match event {
            GatewayEvent::CircuitOpened { service_id, consecutive_failures } => {
                warn!(target: "promptgate::events", %service_id, consecutive_failures, "circuit_opened");
            }
            GatewayEvent::CircuitClosed { service_id } => {
                info!(target: "promptgate::events", %service_id, "circuit_closed");
            }
            GatewayEvent::QuotaThreshold { period, threshold, percent_used } => {
                warn!(target: "promptgate::events", %period, threshold, percent_used, "quota_threshold_reached");
            }
            GatewayEvent::MonthlyUsageWarning { percent_used } => {
                warn!(target: "promptgate::events", percent_used, "monthly_usage_high");
            }
            GatewayEvent::Degraded { operation_id, kind } => {
                warn!(target: "promptgate::events", %operation_id, %kind, "response_degraded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use promptgate_domain::{ErrorKind, UsagePeriod};

    use super::*;

    #[test]
    fn test_every_event_renders() {
        let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink::new());
        for event in [
            GatewayEvent::CircuitOpened { service_id: "openai:gpt-4o".to_string(), consecutive_failures: 5 },
            GatewayEvent::CircuitClosed { service_id: "openai:gpt-4o".to_string() },
            GatewayEvent::QuotaThreshold { period: UsagePeriod::Daily, threshold: 75, percent_used: 76.2 },
            GatewayEvent::MonthlyUsageWarning { percent_used: 91.0 },
            GatewayEvent::Degraded { operation_id: "caption".to_string(), kind: ErrorKind::Timeout },
        ] {
            sink.emit(event);
        }
    }
}
