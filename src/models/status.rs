//! Status summary extraction
//!
//! Reads `spec.suspend` and the `Ready` condition the way Flux objects
//! expose them. Works for any kind that follows the conditions convention.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Coarse readiness of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceStatus {
    Ready,
    NotReady,
    Suspended,
    /// No Ready condition reported
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Ready => "Ready",
            ResourceStatus::NotReady => "NotReady",
            ResourceStatus::Suspended => "Suspended",
            ResourceStatus::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Find a status condition by type
pub fn find_condition<'a>(obj: &'a Value, condition_type: &str) -> Option<&'a Value> {
    obj.get("status")?
        .get("conditions")?
        .as_array()?
        .iter()
        .find(|c| c.get("type").and_then(|t| t.as_str()) == Some(condition_type))
}

/// Summarize readiness from `spec.suspend` and `status.conditions[type=Ready]`
pub fn extract_status(obj: &Value) -> ResourceStatus {
    let suspended = obj
        .get("spec")
        .and_then(|s| s.get("suspend"))
        .and_then(|s| s.as_bool())
        .unwrap_or(false);
    if suspended {
        return ResourceStatus::Suspended;
    }

    match find_condition(obj, "Ready")
        .and_then(|c| c.get("status"))
        .and_then(|s| s.as_str())
    {
        Some("True") => ResourceStatus::Ready,
        Some(_) => ResourceStatus::NotReady,
        None => ResourceStatus::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ready_condition() {
        let obj = json!({"status": {"conditions": [
            {"type": "Reconciling", "status": "False"},
            {"type": "Ready", "status": "True", "message": "Applied revision"}
        ]}});
        assert_eq!(extract_status(&obj), ResourceStatus::Ready);
    }

    #[test]
    fn test_suspend_wins() {
        let obj = json!({
            "spec": {"suspend": true},
            "status": {"conditions": [{"type": "Ready", "status": "True"}]}
        });
        assert_eq!(extract_status(&obj), ResourceStatus::Suspended);
    }

    #[test]
    fn test_not_ready_and_unknown() {
        let obj = json!({"status": {"conditions": [{"type": "Ready", "status": "False"}]}});
        assert_eq!(extract_status(&obj), ResourceStatus::NotReady);
        assert_eq!(extract_status(&json!({})), ResourceStatus::Unknown);
    }
}
