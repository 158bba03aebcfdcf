//! Logging setup and event rendering

pub mod events;
pub mod logging;

pub use events::TracingEventSink;
pub use logging::{init_tracing, LoggingConfig};
