//! Cache configuration types and builder

use std::time::Duration;

use crate::error::{ConfigError, ConfigResult};

/// Configuration for [`TtlCache`](super::TtlCache)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Entries older than this are never served
    pub ttl: Duration,

    /// Maximum number of entries (None = unlimited); the oldest entry is
    /// evicted when an insert would exceed it
    pub max_entries: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(300), max_entries: Some(1000) }
    }
}

impl CacheConfig {
    /// Create a new configuration builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Quick preset for an unbounded TTL cache
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    ///
    /// use promptgate_common::cache::CacheConfig;
    ///
    /// let config = CacheConfig::ttl(Duration::from_secs(60));
    /// assert_eq!(config.max_entries, None);
    /// ```
    pub fn ttl(ttl: Duration) -> Self {
        Self { ttl, max_entries: None }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.ttl.is_zero() {
            return Err(ConfigError::invalid("cache ttl must be greater than 0"));
        }
        if self.max_entries == Some(0) {
            return Err(ConfigError::invalid("max_entries must be greater than 0 when set"));
        }
        Ok(())
    }
}

/// Builder for CacheConfig with fluent API
#[derive(Debug, Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set time-to-live for entries
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl = ttl;
        self
    }

    /// Set maximum number of entries
    pub fn max_entries(mut self, max: usize) -> Self {
        self.config.max_entries = Some(max);
        self
    }

    /// Remove the size bound
    pub fn unbounded(mut self) -> Self {
        self.config.max_entries = None;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ConfigResult<CacheConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for cache::config.
    use super::*;

    #[test]
    fn test_cache_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.max_entries, Some(1000));
        assert!(config.validate().is_ok());
    }

    /// Validates builder validation.
    ///
    /// Assertions:
    /// - Zero TTL and a zero size bound are rejected.
    #[test]
    fn test_builder_validation() {
        assert!(CacheConfig::builder().ttl(Duration::ZERO).build().is_err());
        assert!(CacheConfig::builder().max_entries(0).build().is_err());

        let config = CacheConfig::builder()
            .ttl(Duration::from_secs(5))
            .unbounded()
            .build()
            .expect("valid config");
        assert_eq!(config, CacheConfig::ttl(Duration::from_secs(5)));
    }
}
