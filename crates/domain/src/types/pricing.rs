//! Per-model token pricing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::usage::TokenUsage;
use crate::constants::{DEFAULT_INPUT_PRICE_PER_1K, DEFAULT_OUTPUT_PRICE_PER_1K};

/// USD per 1K tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub const fn new(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self { input_per_1k, output_per_1k }
    }

    /// Cost of a call with a known input/output split
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (usage.input_tokens as f64 / 1000.0) * self.input_per_1k
            + (usage.output_tokens as f64 / 1000.0) * self.output_per_1k
    }

    /// Upper bound for `tokens` when the split is unknown
    pub fn conservative_cost(&self, tokens: u64) -> f64 {
        (tokens as f64 / 1000.0) * self.input_per_1k.max(self.output_per_1k)
    }
}

impl Default for ModelPricing {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_PRICE_PER_1K, DEFAULT_OUTPUT_PRICE_PER_1K)
    }
}

/// Model name to price lookup
///
/// Lookup is exact first, then the longest configured name that prefixes the
/// requested model (so `gpt-4o-mini-2024-07-18` prices as `gpt-4o-mini`), then
/// the default rate. Unknown models never fail a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceTable {
    pub models: BTreeMap<String, ModelPricing>,
    pub default: ModelPricing,
}

impl Default for PriceTable {
    fn default() -> Self {
        let models = [
            ("gpt-4o", ModelPricing::new(0.005, 0.015)),
            ("gpt-4o-mini", ModelPricing::new(0.000_15, 0.000_6)),
            ("gpt-4-turbo", ModelPricing::new(0.01, 0.03)),
            ("gpt-3.5-turbo", ModelPricing::new(0.000_5, 0.001_5)),
            ("claude-3-5-sonnet", ModelPricing::new(0.003, 0.015)),
            ("claude-3-haiku", ModelPricing::new(0.000_25, 0.001_25)),
            ("claude-3-opus", ModelPricing::new(0.015, 0.075)),
            ("gemini-1.5-pro", ModelPricing::new(0.003_5, 0.010_5)),
            ("gemini-1.5-flash", ModelPricing::new(0.000_35, 0.001_05)),
        ]
        .into_iter()
        .map(|(name, pricing)| (name.to_string(), pricing))
        .collect();

        Self { models, default: ModelPricing::default() }
    }
}

impl PriceTable {
    /// Table with no models; every lookup returns `default`
    pub fn empty(default: ModelPricing) -> Self {
        Self { models: BTreeMap::new(), default }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>, pricing: ModelPricing) -> Self {
        self.models.insert(model.into(), pricing);
        self
    }

    /// Pricing configured for `model`, if any
    pub fn find(&self, model: &str) -> Option<&ModelPricing> {
        if let Some(exact) = self.models.get(model) {
            return Some(exact);
        }
        self.models
            .iter()
            .filter(|(name, _)| model.starts_with(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, pricing)| pricing)
    }

    /// Pricing for `model`, falling back to the default rate
    pub fn lookup(&self, model: &str) -> &ModelPricing {
        self.find(model).unwrap_or(&self.default)
    }

    pub fn is_known(&self, model: &str) -> bool {
        self.find(model).is_some()
    }

    /// Every configured rate and the default rate, for validation
    pub fn rates(&self) -> impl Iterator<Item = (&str, &ModelPricing)> {
        self.models
            .iter()
            .map(|(name, pricing)| (name.as_str(), pricing))
            .chain(std::iter::once(("default", &self.default)))
    }
}
