//! Ordered fallback chains, response caching and graceful degradation

pub mod degradation;
pub mod orchestrator;

pub use degradation::DegradationCatalog;
pub use orchestrator::{operation, FallbackOrchestrator, FallbackOutcome, Operation};
