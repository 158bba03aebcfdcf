//! # PromptGate Core
//!
//! Resilient execution of AI provider calls - no storage or logging backends.
//!
//! This crate contains:
//! - Error classification of raw provider failures
//! - Fallback chains with response caching and degraded responses
//! - Usage accounting with quota admission and threshold alerts
//! - The [`Gateway`] facade combining them with retries and circuit breakers
//!
//! ## Architecture Principles
//! - Depends only on `promptgate-common` and `promptgate-domain`
//! - Persistence and event delivery via the traits in [`ports`]
//! - Time via [`promptgate_common::Clock`] so tests never sleep

pub mod classifier;
pub mod fallback;
pub mod gateway;
pub mod ports;
pub mod settings;
pub mod usage;

pub use classifier::ErrorClassifier;
pub use fallback::{
    operation, DegradationCatalog, FallbackOrchestrator, FallbackOutcome, Operation,
};
pub use gateway::{
    Execution, ExecutionRequest, Gateway, GatewayBuilder, GatewayHealth, ResponseSource,
    ServiceHealth, UsageExtractor,
};
pub use ports::{CollectingEventSink, EventSink, GatewayEvent, NullEventSink, UsageStore};
pub use usage::{Admission, AlertThrottle, QuotaAlert, Reservation, TrackerSettings, UsageTracker};
