//! Response cache primitives
//!
//! [`TtlCache`] is a concurrent map whose entries stop existing `ttl` after
//! they were written. It is sized for short-lived memoization of successful
//! results, not as a general purpose store.
//!
//! # Example
//! ```
//! use std::time::Duration;
//!
//! use promptgate_common::cache::{CacheConfig, TtlCache};
//!
//! let config = CacheConfig::builder()
//!     .ttl(Duration::from_secs(300))
//!     .max_entries(1000)
//!     .build()
//!     .unwrap();
//! let cache: TtlCache<String, String> = TtlCache::new(config).unwrap();
//!
//! cache.insert("caption:launch".to_string(), "Ship it".to_string());
//! assert_eq!(cache.get("caption:launch").as_deref(), Some("Ship it"));
//! assert_eq!(cache.stats().hits, 1);
//! ```

pub mod config;
pub mod core;
pub mod stats;

pub use self::config::{CacheConfig, CacheConfigBuilder};
pub use self::core::TtlCache;
pub use self::stats::CacheStats;
