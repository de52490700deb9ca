//! Serialized rule shape
//!
//! Every field is optional at this level so a definition with missing
//! fields still deserializes and can be reported by name instead of
//! failing the whole file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDefinition {
    pub id: Option<String>,
    pub name: Option<String>,
    /// Accepts `1`, `"1.2"`, etc.
    pub version: Option<Value>,
    pub severity: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    /// Message template; `{kind}`, `{namespace}` and `{name}` are substituted
    pub message: Option<String>,
    pub detection: Option<DetectionDefinition>,
    pub remediation: Option<RemediationDefinition>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionDefinition {
    #[serde(default)]
    pub resources: Vec<ResourceSelectorDefinition>,
    #[serde(default)]
    pub conditions: Vec<ConditionDefinition>,
    pub stuck: Option<StuckDefinition>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSelectorDefinition {
    pub api_version: Option<String>,
    pub kind: Option<String>,
    #[serde(default)]
    pub label_selector: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConditionDefinition {
    pub path: Option<String>,
    pub operator: Option<String>,
    pub value: Option<Value>,
}

/// "Condition `condition` has held a non-success status for `threshold`"
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StuckDefinition {
    pub condition: Option<String>,
    /// Status that counts as stuck; any status other than "True" when unset
    pub status: Option<String>,
    pub threshold: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemediationDefinition {
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}
