//! Usage ledger persistence adapters

pub mod flusher;
pub mod json_file;
pub mod memory;

pub use flusher::{UsageFlusher, UsageFlusherConfig};
pub use json_file::JsonLinesUsageStore;
pub use memory::InMemoryUsageStore;
