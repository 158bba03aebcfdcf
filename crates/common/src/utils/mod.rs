//! Common utility functions
//!
//! - **[`serde`]**: Serialization helpers for durations expressed in
//!   milliseconds

pub mod serde;

pub use self::serde::{duration_millis, option_duration_millis};
