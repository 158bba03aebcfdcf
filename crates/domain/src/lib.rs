//! # PromptGate Domain
//!
//! Data model for the execution gateway.
//!
//! This crate contains:
//! - Error taxonomy (`ErrorKind`, `ClassifiedError`) and the raw
//!   `ProviderFailure` the classifier consumes
//! - The tagged `GatewayError` returned by executions
//! - Usage records, limits, quota snapshots and the model price table
//! - Serializable, validated gateway configuration
//!
//! ## Architecture
//! - Depends only on the foundation tier of `promptgate-common`
//! - No I/O, no async, no clocks: pure data and arithmetic

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
