//! Placeholder responses for exhausted fallback chains

use promptgate_domain::DegradationRule;
use serde_json::{json, Map, Value};

/// Ordered rules matched against operation ids
///
/// Configured rules are consulted before the built-in ones. Matching is a
/// case-insensitive substring test; the first hit wins and an unmatched id
/// gets an empty object. Every payload is stamped with `degraded: true` and
/// the failure reason.
#[derive(Debug, Clone, PartialEq)]
pub struct DegradationCatalog {
    rules: Vec<DegradationRule>,
}

impl Default for DegradationCatalog {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DegradationCatalog {
    pub fn new(custom: Vec<DegradationRule>) -> Self {
        let mut rules: Vec<DegradationRule> = custom
            .into_iter()
            .map(|rule| DegradationRule { key: rule.key.to_lowercase(), ..rule })
            .collect();
        rules.extend(Self::builtin());
        Self { rules }
    }

    /// Shapes for the operation families the gateway fronts by default
    pub fn builtin() -> Vec<DegradationRule> {
        vec![
            DegradationRule::new("schedule", json!({ "schedule": [] })),
            DegradationRule::new("hashtag", json!({ "hashtags": [] })),
            DegradationRule::new("analy", json!({ "insights": [], "metrics": {} })),
            DegradationRule::new("caption", json!({ "content": "" })),
            DegradationRule::new("content", json!({ "content": "" })),
            DegradationRule::new("post", json!({ "content": "" })),
            DegradationRule::new("image", json!({ "images": [] })),
        ]
    }

    /// Placeholder for `operation_id`
    pub fn respond(&self, operation_id: &str, reason: &str) -> Value {
        let id = operation_id.to_lowercase();
        let base = self
            .rules
            .iter()
            .find(|rule| id.contains(rule.key.as_str()))
            .map_or_else(|| Value::Object(Map::new()), |rule| rule.payload.clone());

        let mut payload = match base {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        payload.insert("degraded".to_string(), Value::Bool(true));
        payload.insert("reason".to_string(), Value::String(reason.to_string()));
        Value::Object(payload)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Validates built-in shapes and the generic fallback.
    ///
    /// Assertions:
    /// - A schedule operation yields an empty schedule.
    /// - An unmatched id yields only the degradation markers.
    #[test]
    fn test_builtin_shapes() {
        let catalog = DegradationCatalog::default();

        let schedule = catalog.respond("weekly-Schedule-plan", "service_unavailable");
        assert_eq!(schedule["schedule"], json!([]));
        assert_eq!(schedule["degraded"], json!(true));
        assert_eq!(schedule["reason"], json!("service_unavailable"));

        let analytics = catalog.respond("engagement_analysis", "timeout");
        assert_eq!(analytics["metrics"], json!({}));

        let unknown = catalog.respond("translate", "timeout");
        assert_eq!(unknown, json!({ "degraded": true, "reason": "timeout" }));
    }

    #[test]
    fn test_custom_rules_take_precedence() {
        let catalog = DegradationCatalog::new(vec![
            DegradationRule::new("Schedule-V2", json!({ "slots": [] })),
            DegradationRule::new("summary", json!("n/a")),
        ]);

        let custom = catalog.respond("schedule-v2-build", "timeout");
        assert_eq!(custom["slots"], json!([]));
        assert!(custom.get("schedule").is_none());

        let wrapped = catalog.respond("summary", "timeout");
        assert_eq!(wrapped["value"], json!("n/a"));
        assert_eq!(catalog.len(), 2 + DegradationCatalog::builtin().len());
    }
}
