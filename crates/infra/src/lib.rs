//! # PromptGate Infrastructure
//!
//! Infrastructure implementations of core ports.
//!
//! This crate contains:
//! - Configuration loading from files and environment variables
//! - Usage stores (JSON-lines file, in-memory) and the background flusher
//! - Tracing subscriber setup and a tracing-backed event sink
//!
//! ## Architecture
//! - Implements traits defined in `promptgate-core`
//! - Contains all "impure" code (file I/O, global subscriber state)

pub mod config;
pub mod errors;
pub mod observability;
pub mod persistence;

pub use errors::{InfraError, InfraResult};
pub use observability::{init_tracing, LoggingConfig, TracingEventSink};
pub use persistence::{InMemoryUsageStore, JsonLinesUsageStore, UsageFlusher, UsageFlusherConfig};
