//! Drift detection
//!
//! Compares the desired state recorded in an annotation (by default the
//! `kubectl apply` last-applied configuration) with the live object.
//! Only keys present in the desired document are compared, except for
//! user-owned maps (labels, annotations, ConfigMap and Secret data) where
//! extra live keys are reported as well.

mod diff;

pub use diff::diff_values;

use crate::models::ResourceRecord;
use crate::path::PathExpr;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

/// Paths controllers routinely mutate; never reported as drift
pub const DEFAULT_IGNORE_PATHS: &[&str] = &[
    "status",
    "metadata.resourceVersion",
    "metadata.uid",
    "metadata.managedFields",
    "metadata.generation",
    "metadata.creationTimestamp",
    "metadata.selfLink",
    "metadata.annotations['kubectl.kubernetes.io/last-applied-configuration']",
    "metadata.annotations['deployment.kubernetes.io/revision']",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Modified,
    Missing,
    Extra,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangeKind::Modified => "modified",
            ChangeKind::Missing => "missing",
            ChangeKind::Extra => "extra",
        })
    }
}

/// One difference between desired and live state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriftChange {
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desired: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub live: Option<Value>,
}

/// Drift outcome for one resource
///
/// `NotApplicable` (no usable desired state) and `NoDrift` (desired state
/// matches) are distinct and must not be merged.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum DriftResult {
    NotApplicable { reason: String },
    NoDrift,
    Drifted { changes: Vec<DriftChange> },
}

impl DriftResult {
    pub fn status(&self) -> &'static str {
        match self {
            DriftResult::NotApplicable { .. } => "not-applicable",
            DriftResult::NoDrift => "no-drift",
            DriftResult::Drifted { .. } => "drifted",
        }
    }

    pub fn is_drifted(&self) -> bool {
        matches!(self, DriftResult::Drifted { .. })
    }

    pub fn changes(&self) -> &[DriftChange] {
        match self {
            DriftResult::Drifted { changes } => changes,
            _ => &[],
        }
    }
}

/// Drift detector with its annotation name and ignore list
#[derive(Debug, Clone)]
pub struct DriftDetector {
    annotation: String,
    ignore: Vec<Vec<String>>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(LAST_APPLIED_ANNOTATION, &[])
    }
}

impl DriftDetector {
    /// `extra_ignore` paths are added to the built-in deny list; invalid ones
    /// are logged and dropped
    pub fn new(annotation: &str, extra_ignore: &[String]) -> Self {
        let mut ignore = Vec::new();
        let extra = extra_ignore.iter().map(|s| s.as_str());
        for source in DEFAULT_IGNORE_PATHS.iter().copied().chain(extra) {
            match ignore_prefix(source) {
                Some(prefix) => ignore.push(prefix),
                None => tracing::warn!("Ignoring unsupported drift ignore path '{}'", source),
            }
        }
        Self {
            annotation: annotation.to_string(),
            ignore,
        }
    }

    pub fn annotation(&self) -> &str {
        &self.annotation
    }

    /// Detect drift for one record
    pub fn detect(&self, record: &ResourceRecord) -> DriftResult {
        let Some(raw) = record.annotations().get(&self.annotation) else {
            return DriftResult::NotApplicable {
                reason: format!("annotation {} not present", self.annotation),
            };
        };

        let desired = match parse_desired(raw) {
            Ok(desired) => desired,
            Err(reason) => {
                tracing::warn!(
                    "Desired state of {} is not parseable: {}",
                    record.key_string(),
                    reason
                );
                return DriftResult::NotApplicable { reason };
            }
        };

        self.compare(&desired, record.body())
    }

    /// Diff two documents directly
    pub fn compare(&self, desired: &Value, live: &Value) -> DriftResult {
        let changes = diff_values(desired, live, &self.ignore);
        if changes.is_empty() {
            DriftResult::NoDrift
        } else {
            DriftResult::Drifted { changes }
        }
    }
}

/// Parse a desired-state document: JSON first, YAML as fallback
fn parse_desired(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Err("annotation is empty".to_string());
    }
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(v) => v,
        Err(json_err) => serde_yaml::from_str::<Value>(raw)
            .map_err(|_| format!("not valid JSON or YAML: {}", json_err))?,
    };
    if value.is_object() {
        Ok(value)
    } else {
        Err("desired state is not a mapping".to_string())
    }
}

/// Turn an ignore path into a field-name prefix; wildcards and filters are
/// not supported in ignore paths
fn ignore_prefix(source: &str) -> Option<Vec<String>> {
    use crate::path::Segment;

    let expr = PathExpr::parse(source).ok()?;
    expr.segments()
        .iter()
        .map(|s| match s {
            Segment::Field(name) => Some(name.clone()),
            Segment::Index(i) => Some(i.to_string()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_with(annotation: Option<&str>, spec: Value) -> ResourceRecord {
        let mut annotations = serde_json::Map::new();
        if let Some(a) = annotation {
            annotations.insert(LAST_APPLIED_ANNOTATION.to_string(), json!(a));
        }
        ResourceRecord::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod", "annotations": annotations},
            "spec": spec
        }))
        .unwrap()
    }

    #[test]
    fn test_absent_annotation_not_applicable() {
        let r = record_with(None, json!({"replicas": 1}));
        assert_eq!(DriftDetector::default().detect(&r).status(), "not-applicable");
    }

    #[test]
    fn test_unparseable_annotation_not_applicable() {
        let r = record_with(Some("{not: [valid"), json!({"replicas": 1}));
        let result = DriftDetector::default().detect(&r);
        assert!(matches!(result, DriftResult::NotApplicable { .. }));
        assert!(!result.is_drifted());
    }

    #[test]
    fn test_replica_drift() {
        let desired = r#"{"apiVersion":"apps/v1","kind":"Deployment","metadata":{"name":"web","namespace":"prod"},"spec":{"replicas":2}}"#;
        let r = record_with(Some(desired), json!({"replicas": 5}));
        let result = DriftDetector::default().detect(&r);
        assert_eq!(
            result.changes(),
            &[DriftChange {
                path: "spec.replicas".to_string(),
                kind: ChangeKind::Modified,
                desired: Some(json!(2)),
                live: Some(json!(5)),
            }]
        );
    }

    #[test]
    fn test_yaml_desired_state() {
        let desired = "apiVersion: apps/v1\nkind: Deployment\nspec:\n  replicas: 5\n";
        let r = record_with(Some(desired), json!({"replicas": 5}));
        assert_eq!(DriftDetector::default().detect(&r), DriftResult::NoDrift);
    }

    #[test]
    fn test_configured_ignore_path() {
        let detector = DriftDetector::new(LAST_APPLIED_ANNOTATION, &["spec.replicas".to_string()]);
        let result = detector.compare(
            &json!({"spec": {"replicas": 2}}),
            &json!({"spec": {"replicas": 9}}),
        );
        assert_eq!(result, DriftResult::NoDrift);
    }
}
