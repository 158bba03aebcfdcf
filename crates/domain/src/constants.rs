//! Domain-level defaults
//!
//! Centralized location for the numbers the gateway falls back to when
//! configuration or providers leave a value unspecified.

// Classification
pub const DEFAULT_RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

// Retry policy
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

// Circuit breaker
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;
pub const DEFAULT_SUCCESS_THRESHOLD: u32 = 2;
pub const DEFAULT_CIRCUIT_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_HALF_OPEN_MAX_CALLS: u32 = 1;

// Response cache
pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;

// Alerting
pub const DEFAULT_ALERT_THRESHOLDS: [u8; 4] = [50, 75, 90, 100];
pub const DEFAULT_ALERT_SUPPRESSION_MS: u64 = 24 * 60 * 60 * 1_000;
pub const MONTHLY_WARNING_PERCENT: f64 = 90.0;

// Persistence
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_RETENTION_DAYS: u32 = 62;
pub const DEFAULT_MAX_UNFLUSHED: usize = 10_000;

// Pricing (USD per 1K tokens) for models missing from the table
pub const DEFAULT_INPUT_PRICE_PER_1K: f64 = 0.01;
pub const DEFAULT_OUTPUT_PRICE_PER_1K: f64 = 0.03;
