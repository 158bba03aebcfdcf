//! Usage accounting records, limits and quota snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::impl_domain_status_conversions;

/// Token counts for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub const fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Append-only fact about one call that passed the quota gate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub provider: String,
    pub model: String,
    pub operation: String,
    pub tokens_used: u64,
    pub cost: f64,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl UsageRecord {
    /// Successful record with zero usage; fill in with the `with_*` methods
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        operation: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            provider: provider.into(),
            model: model.into(),
            operation: operation.into(),
            tokens_used: 0,
            cost: 0.0,
            duration_ms: 0,
            timestamp,
            success: true,
            user_id: None,
            org_id: None,
        }
    }

    #[must_use]
    pub fn with_usage(mut self, tokens_used: u64, cost: f64) -> Self {
        self.tokens_used = tokens_used;
        self.cost = cost;
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    #[must_use]
    pub fn failed(mut self) -> Self {
        self.success = false;
        self
    }

    #[must_use]
    pub fn with_user(mut self, user_id: Option<String>) -> Self {
        self.user_id = user_id;
        self
    }

    #[must_use]
    pub fn with_org(mut self, org_id: Option<String>) -> Self {
        self.org_id = org_id;
        self
    }

    /// Column names matching [`to_csv_row`](Self::to_csv_row)
    pub const CSV_HEADER: &'static str =
        "id,timestamp,provider,model,operation,tokens_used,cost,duration_ms,success,user_id,org_id";

    /// One RFC 4180 row; fields containing separators or quotes are quoted
    pub fn to_csv_row(&self) -> String {
        let fields = [
            self.id.to_string(),
            self.timestamp.to_rfc3339(),
            csv_escape(&self.provider),
            csv_escape(&self.model),
            csv_escape(&self.operation),
            self.tokens_used.to_string(),
            format!("{:.6}", self.cost),
            self.duration_ms.to_string(),
            self.success.to_string(),
            csv_escape(self.user_id.as_deref().unwrap_or_default()),
            csv_escape(self.org_id.as_deref().unwrap_or_default()),
        ];
        fields.join(",")
    }
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Accounting window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePeriod {
    Daily,
    Monthly,
}

impl_domain_status_conversions!(UsagePeriod {
    Daily => "daily",
    Monthly => "monthly",
});

/// Sums over a set of records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub tokens: u64,
    pub cost: f64,
    pub requests: u64,
    pub failed_requests: u64,
}

impl UsageTotals {
    pub fn add(&mut self, record: &UsageRecord) {
        self.tokens = self.tokens.saturating_add(record.tokens_used);
        self.cost += record.cost;
        self.requests += 1;
        if !record.success {
            self.failed_requests += 1;
        }
    }

    pub fn merge(&mut self, other: &Self) {
        self.tokens = self.tokens.saturating_add(other.tokens);
        self.cost += other.cost;
        self.requests += other.requests;
        self.failed_requests += other.failed_requests;
    }
}

/// Hard ceilings per window plus the per-call token ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageLimits {
    pub daily_tokens: u64,
    pub daily_cost: f64,
    pub daily_requests: u64,
    pub monthly_tokens: u64,
    pub monthly_cost: f64,
    pub monthly_requests: u64,
    pub per_request_tokens: u64,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            daily_tokens: 100_000,
            daily_cost: 10.0,
            daily_requests: 1_000,
            monthly_tokens: 2_000_000,
            monthly_cost: 200.0,
            monthly_requests: 20_000,
            per_request_tokens: 8_000,
        }
    }
}

impl UsageLimits {
    pub const fn for_period(&self, period: UsagePeriod) -> PeriodLimits {
        match period {
            UsagePeriod::Daily => PeriodLimits {
                tokens: self.daily_tokens,
                cost: self.daily_cost,
                requests: self.daily_requests,
            },
            UsagePeriod::Monthly => PeriodLimits {
                tokens: self.monthly_tokens,
                cost: self.monthly_cost,
                requests: self.monthly_requests,
            },
        }
    }
}

/// Ceilings for a single window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodLimits {
    pub tokens: u64,
    pub cost: f64,
    pub requests: u64,
}

/// Read-only usage snapshot for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageQuota {
    pub period: UsagePeriod,
    pub used: UsageTotals,
    pub limits: PeriodLimits,
    pub remaining: PeriodLimits,
    /// Highest of the token, cost and request ratios, in percent
    pub percent_used: f64,
    pub reset_at: DateTime<Utc>,
}

impl UsageQuota {
    pub fn compute(
        period: UsagePeriod,
        used: UsageTotals,
        limits: PeriodLimits,
        reset_at: DateTime<Utc>,
    ) -> Self {
        let remaining = PeriodLimits {
            tokens: limits.tokens.saturating_sub(used.tokens),
            cost: (limits.cost - used.cost).max(0.0),
            requests: limits.requests.saturating_sub(used.requests),
        };
        let percent_used = [
            ratio(used.tokens as f64, limits.tokens as f64),
            ratio(used.cost, limits.cost),
            ratio(used.requests as f64, limits.requests as f64),
        ]
        .into_iter()
        .fold(0.0_f64, f64::max)
            * 100.0;

        Self { period, used, limits, remaining, percent_used, reset_at }
    }

    pub fn is_exhausted(&self) -> bool {
        self.percent_used >= 100.0
    }
}

fn ratio(used: f64, limit: f64) -> f64 {
    if limit > 0.0 {
        used / limit
    } else {
        0.0
    }
}

/// Aggregated usage for one provider + model pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdownEntry {
    pub provider: String,
    pub model: String,
    pub requests: u64,
    pub failed_requests: u64,
    pub tokens: u64,
    pub cost: f64,
}
