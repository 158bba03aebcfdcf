//! Gateway facade and its request/response types

mod health;
mod request;
mod service;

pub use health::{GatewayHealth, ServiceHealth};
pub use request::{Execution, ExecutionRequest, ResponseSource, UsageExtractor};
pub use service::{Gateway, GatewayBuilder};
