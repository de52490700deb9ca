//! Rule set loading
//!
//! Definitions arrive as parsed values (from the built-in database or rule
//! files read by the caller). Each one is validated on its own: a broken
//! definition becomes a `MalformedRule` warning and never stops the rest
//! from loading.

use super::definition::RuleDefinition;
use super::rule::Rule;
use crate::engine::AnalysisWarning;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

const BUILTIN_RULES: &str = include_str!("builtin.yaml");

/// Read-only collection of compiled rules
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The embedded rule database
    pub fn builtin() -> (Self, Vec<AnalysisWarning>) {
        Self::from_yaml_str(BUILTIN_RULES, "builtin")
    }

    /// Compile definitions, skipping (and reporting) invalid or duplicate ones
    pub fn from_values(values: Vec<Value>) -> (Self, Vec<AnalysisWarning>) {
        let mut set = Self::new();
        let warnings = set.extend_from_values(values);
        (set, warnings)
    }

    /// Parse a rule document: a `rules:` list, a bare list, or one or more
    /// `---` separated definitions
    pub fn from_yaml_str(text: &str, source: &str) -> (Self, Vec<AnalysisWarning>) {
        let mut set = Self::new();
        let warnings = set.extend_from_yaml_str(text, source);
        (set, warnings)
    }

    pub fn extend_from_yaml_str(&mut self, text: &str, source: &str) -> Vec<AnalysisWarning> {
        let mut values = Vec::new();
        let mut warnings = Vec::new();

        for (index, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
            match Value::deserialize(document) {
                Ok(Value::Null) => {}
                Ok(Value::Array(items)) => values.extend(items),
                Ok(Value::Object(mut obj)) => match obj.remove("rules") {
                    Some(Value::Array(items)) => values.extend(items),
                    Some(other) => warnings.push(AnalysisWarning::MalformedRule {
                        rule: format!("{}#{}", source, index),
                        reason: format!("'rules' must be a list, found {}", type_name(&other)),
                    }),
                    None => values.push(Value::Object(obj)),
                },
                Ok(other) => warnings.push(AnalysisWarning::MalformedRule {
                    rule: format!("{}#{}", source, index),
                    reason: format!("expected a rule mapping, found {}", type_name(&other)),
                }),
                Err(e) => warnings.push(AnalysisWarning::MalformedRule {
                    rule: format!("{}#{}", source, index),
                    reason: format!("invalid YAML: {}", e),
                }),
            }
        }

        warnings.extend(self.extend_from_values(values));
        warnings
    }

    pub fn extend_from_values(&mut self, values: Vec<Value>) -> Vec<AnalysisWarning> {
        let mut seen: HashSet<String> = self.rules.iter().map(|r| r.id.clone()).collect();
        let mut warnings = Vec::new();

        for (index, value) in values.into_iter().enumerate() {
            let label = value
                .get("id")
                .and_then(|id| id.as_str())
                .filter(|id| !id.is_empty())
                .map(|id| id.to_string())
                .unwrap_or_else(|| format!("#{}", index));

            let compiled = serde_json::from_value::<RuleDefinition>(value)
                .map_err(|e| e.to_string())
                .and_then(|def| Rule::compile(def).map_err(|e| e.to_string()));

            match compiled {
                Ok(rule) if !seen.insert(rule.id.clone()) => {
                    warnings.push(AnalysisWarning::MalformedRule {
                        rule: label,
                        reason: "duplicate rule id".to_string(),
                    });
                }
                Ok(rule) => self.rules.push(rule),
                Err(reason) => {
                    tracing::warn!("Skipping malformed rule {}: {}", label, reason);
                    warnings.push(AnalysisWarning::MalformedRule {
                        rule: label,
                        reason,
                    });
                }
            }
        }

        tracing::debug!("Rule set holds {} rules", self.rules.len());
        warnings
    }

    /// Drop rules by id
    pub fn disable(&mut self, ids: &[String]) {
        self.rules.retain(|r| !ids.contains(&r.id));
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, id: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_rules_load_cleanly() {
        let (set, warnings) = RuleSet::builtin();
        assert!(warnings.is_empty(), "{:?}", warnings);
        assert!(set.len() >= 10);
        assert!(set.get("redis-no-maxmemory").is_some());
    }

    #[test]
    fn test_duplicate_ids_are_reported() {
        let rule = json!({
            "id": "dup", "name": "x", "severity": "info", "category": "CONFIG",
            "detection": {"resources": [{"kind": "Pod"}], "conditions": [{"path": "spec", "operator": "exists"}]}
        });
        let (set, warnings) = RuleSet::from_values(vec![rule.clone(), rule]);
        assert_eq!(set.len(), 1);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_multi_document_yaml() {
        let text = r#"
id: a
name: A
severity: info
category: CONFIG
detection:
  resources: [{kind: Pod}]
  conditions: [{path: spec, operator: exists}]
---
- id: b
  name: B
  severity: critical
  category: STATE
  detection:
    resources: [{kind: Pod}]
    conditions: [{path: spec, operator: exists}]
---
42
"#;
        let (set, warnings) = RuleSet::from_yaml_str(text, "inline");
        assert_eq!(set.len(), 2);
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_disable() {
        let (mut set, _) = RuleSet::builtin();
        let before = set.len();
        set.disable(&["image-latest-tag".to_string()]);
        assert_eq!(set.len(), before - 1);
        assert!(set.get("image-latest-tag").is_none());
    }
}
