//! Execution request and result types

use std::fmt;
use std::sync::Arc;

use promptgate_domain::{ClassifiedError, RetrySettings, TokenUsage};
use serde_json::Value;

/// Extracts actual token usage from a successful response
pub type UsageExtractor<T> = Arc<dyn Fn(&T) -> TokenUsage + Send + Sync>;

/// Identity and budget of one gateway call
pub struct ExecutionRequest<T> {
    /// Cache key and degradation lookup key
    pub operation_id: String,
    pub provider: String,
    pub model: String,
    /// Token estimate used for admission
    pub estimated_tokens: u64,
    pub user_id: Option<String>,
    pub org_id: Option<String>,
    service_key: Option<String>,
    retry: Option<RetrySettings>,
    usage_from: Option<UsageExtractor<T>>,
}

impl<T> ExecutionRequest<T> {
    pub fn new(
        operation_id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        estimated_tokens: u64,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            provider: provider.into(),
            model: model.into(),
            estimated_tokens,
            user_id: None,
            org_id: None,
            service_key: None,
            retry: None,
            usage_from: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_org(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }

    /// Track circuit state under `key` instead of `provider:model`
    #[must_use]
    pub fn with_service_key(mut self, key: impl Into<String>) -> Self {
        self.service_key = Some(key.into());
        self
    }

    /// Replace the gateway's retry settings for this call only
    #[must_use]
    pub fn with_retry(mut self, retry: RetrySettings) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Record the response's real token usage instead of the estimate
    #[must_use]
    pub fn usage_from<F>(mut self, extractor: F) -> Self
    where
        F: Fn(&T) -> TokenUsage + Send + Sync + 'static,
    {
        self.usage_from = Some(Arc::new(extractor));
        self
    }

    /// Circuit breaker key for this call
    pub fn service_id(&self) -> String {
        self.service_key.clone().unwrap_or_else(|| format!("{}:{}", self.provider, self.model))
    }

    pub fn retry_override(&self) -> Option<&RetrySettings> {
        self.retry.as_ref()
    }

    /// Tokens to record for `value`; the estimate counts as input otherwise
    pub fn usage_of(&self, value: &T) -> TokenUsage {
        self.usage_from
            .as_ref()
            .map_or_else(|| TokenUsage::new(self.estimated_tokens, 0), |extract| extract(value))
    }
}

impl<T> fmt::Debug for ExecutionRequest<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("operation_id", &self.operation_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("estimated_tokens", &self.estimated_tokens)
            .field("service_key", &self.service_key)
            .field("retry", &self.retry)
            .field("usage_from", &self.usage_from.is_some())
            .finish_non_exhaustive()
    }
}

/// Where a completed value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Primary,
    /// Fallback at `index` in the fallback list (0 is the first fallback)
    Fallback { index: usize },
}

/// Successful gateway outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Execution<T> {
    Completed { value: T, source: ResponseSource, attempts: u32 },
    /// Every candidate failed and a placeholder was returned instead
    Degraded { payload: Value, error: ClassifiedError, attempts: u32 },
}

impl<T> Execution<T> {
    pub const fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Degraded { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Completed { value, .. } => Some(value),
            Self::Degraded { .. } => None,
        }
    }

    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Completed { attempts, .. } | Self::Degraded { attempts, .. } => *attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_id_defaults_to_provider_model() {
        let request = ExecutionRequest::<String>::new("caption", "openai", "gpt-4o", 100);
        assert_eq!(request.service_id(), "openai:gpt-4o");

        let keyed = request.with_service_key("tenant-a/openai");
        assert_eq!(keyed.service_id(), "tenant-a/openai");
    }

    #[test]
    fn test_usage_extraction() {
        let plain = ExecutionRequest::<String>::new("caption", "openai", "gpt-4o", 120);
        assert_eq!(plain.usage_of(&"x".to_string()), TokenUsage::new(120, 0));

        let measured = ExecutionRequest::<String>::new("caption", "openai", "gpt-4o", 120)
            .usage_from(|text: &String| TokenUsage::new(100, text.len() as u64));
        assert_eq!(measured.usage_of(&"abcd".to_string()), TokenUsage::new(100, 4));
    }
}
