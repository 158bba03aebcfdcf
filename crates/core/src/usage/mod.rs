//! Usage accounting, quota enforcement and threshold alerts

pub mod alerts;
pub mod tracker;

pub use alerts::{AlertThrottle, QuotaAlert};
pub use tracker::{Admission, Reservation, TrackerSettings, UsageTracker};
