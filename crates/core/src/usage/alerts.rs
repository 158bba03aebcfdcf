//! Threshold alert throttling

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use promptgate_domain::UsagePeriod;
use serde::Serialize;

/// A crossed usage threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuotaAlert {
    pub period: UsagePeriod,
    pub threshold: u8,
    pub percent_used: f64,
}

/// Remembers when each (period, threshold) pair last fired
///
/// A pair fires at most once per suppression window, so sustained usage
/// above a threshold is reported once a day rather than on every call.
#[derive(Debug, Default)]
pub struct AlertThrottle {
    last_fired: HashMap<(UsagePeriod, u8), DateTime<Utc>>,
}

impl AlertThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts due for `percent_used`, marking each as fired at `now`
    pub fn evaluate(
        &mut self,
        period: UsagePeriod,
        percent_used: f64,
        thresholds: &[u8],
        window: Duration,
        now: DateTime<Utc>,
    ) -> Vec<QuotaAlert> {
        thresholds
            .iter()
            .copied()
            .filter(|threshold| percent_used >= f64::from(*threshold))
            .filter(|threshold| {
                let key = (period, *threshold);
                let due = self.last_fired.get(&key).map_or(true, |fired| {
                    (now - *fired).to_std().is_ok_and(|elapsed| elapsed >= window)
                });
                if due {
                    self.last_fired.insert(key, now);
                }
                due
            })
            .map(|threshold| QuotaAlert { period, threshold, percent_used })
            .collect()
    }
}
