//! Domain types and models

pub mod failure;
pub mod pricing;
pub mod usage;

pub use failure::{ProviderFailure, TransportErrorKind};
pub use pricing::{ModelPricing, PriceTable};
pub use usage::{
    CostBreakdownEntry, PeriodLimits, TokenUsage, UsageLimits, UsagePeriod, UsageQuota,
    UsageRecord, UsageTotals,
};
