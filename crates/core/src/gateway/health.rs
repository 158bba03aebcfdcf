//! Read-only health snapshot

use std::time::Duration;

use promptgate_common::resilience::{CircuitBreakerMetrics, CircuitState};
use promptgate_common::{duration_millis, option_duration_millis, CacheStats};
use promptgate_domain::UsageQuota;
use serde::Serialize;

/// One service's breaker state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceHealth {
    pub service_id: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub rejected_calls: u64,
    #[serde(rename = "time_in_state_ms", with = "duration_millis")]
    pub time_in_state: Duration,
    #[serde(rename = "since_last_failure_ms", with = "option_duration_millis")]
    pub since_last_failure: Option<Duration>,
}

impl ServiceHealth {
    pub fn from_metrics(service_id: String, metrics: &CircuitBreakerMetrics) -> Self {
        Self {
            service_id,
            state: metrics.state,
            consecutive_failures: metrics.consecutive_failures,
            total_calls: metrics.total_calls,
            rejected_calls: metrics.rejected_calls,
            time_in_state: metrics.time_in_state,
            since_last_failure: metrics.since_last_failure,
        }
    }
}

/// Gateway-wide snapshot for dashboards and probes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayHealth {
    pub services: Vec<ServiceHealth>,
    pub cache: CacheStats,
    pub daily: UsageQuota,
    pub monthly: UsageQuota,
}

impl GatewayHealth {
    /// Services whose circuit is not closed
    pub fn unhealthy_services(&self) -> impl Iterator<Item = &ServiceHealth> {
        self.services.iter().filter(|service| service.state != CircuitState::Closed)
    }
}
