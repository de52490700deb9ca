//! Normalized cluster object
//!
//! A [`ResourceRecord`] is built once from the serialized object and never
//! mutated afterwards. Every analysis reads the same record through shared
//! references.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Errors raised while normalizing an object
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordError {
    #[error("Object is not a mapping")]
    NotAnObject,

    #[error("Object is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Failed to serialize object: {0}")]
    Serialize(String),
}

/// Entry of `metadata.ownerReferences`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

/// Identity of a resource inside one snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&resource_key(&self.namespace, &self.name, &self.kind))
    }
}

/// Generate the string key for a resource
pub fn resource_key(namespace: &str, name: &str, kind: &str) -> String {
    format!("{}:{}:{}", kind, namespace, name)
}

/// A single cluster object, normalized for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    kind: String,
    api_version: String,
    namespace: String,
    name: String,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    owner_references: Vec<OwnerRef>,
    body: Value,
}

impl ResourceRecord {
    /// Build a record from the object's serialized body
    ///
    /// `kind` and `metadata.name` are required. Non-string label and
    /// annotation values are dropped; malformed owner references are skipped.
    pub fn from_value(body: Value) -> Result<Self, RecordError> {
        if !body.is_object() {
            return Err(RecordError::NotAnObject);
        }

        let kind = str_field(&body, &["kind"]).ok_or(RecordError::MissingField("kind"))?;
        let name = str_field(&body, &["metadata", "name"])
            .ok_or(RecordError::MissingField("metadata.name"))?;
        let api_version = str_field(&body, &["apiVersion"]).unwrap_or_default();
        let namespace = str_field(&body, &["metadata", "namespace"]).unwrap_or_default();

        let labels = string_map(body.get("metadata").and_then(|m| m.get("labels")));
        let annotations = string_map(body.get("metadata").and_then(|m| m.get("annotations")));

        let owner_references = body
            .get("metadata")
            .and_then(|m| m.get("ownerReferences"))
            .and_then(|o| o.as_array())
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| serde_json::from_value::<OwnerRef>(r.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            kind,
            api_version,
            namespace,
            name,
            labels,
            annotations,
            owner_references,
            body,
        })
    }

    /// Build a record from a kube-rs dynamic object
    pub fn from_dynamic(obj: &kube::core::DynamicObject) -> Result<Self, RecordError> {
        let value = serde_json::to_value(obj).map_err(|e| RecordError::Serialize(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    /// Empty for cluster-scoped objects
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    pub fn owner_references(&self) -> &[OwnerRef] {
        &self.owner_references
    }

    /// Full serialized object
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.namespace, &self.name)
    }

    /// String form of [`ResourceRecord::key`]
    pub fn key_string(&self) -> String {
        resource_key(&self.namespace, &self.name, &self.kind)
    }
}

fn str_field(value: &Value, path: &[&str]) -> Option<String> {
    let mut current = value;
    for part in path {
        current = current.get(part)?;
    }
    current.as_str().map(|s| s.to_string())
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_key_generation() {
        let key = resource_key("default", "my-resource", "Kustomization");
        assert_eq!(key, "Kustomization:default:my-resource");

        let key2 = ResourceKey::new("Namespace", "", "prod");
        assert_eq!(key2.to_string(), "Namespace::prod");
    }

    #[test]
    fn test_from_value_normalizes_metadata() {
        let record = ResourceRecord::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "web",
                "namespace": "prod",
                "labels": {"app": "web", "replicas": 3},
                "annotations": {"note": "x"},
                "ownerReferences": [
                    {"kind": "Thing", "name": "parent", "uid": "u-1"},
                    {"broken": true}
                ]
            }
        }))
        .unwrap();

        assert_eq!(record.kind(), "Deployment");
        assert_eq!(record.api_version(), "apps/v1");
        assert_eq!(record.namespace(), "prod");
        assert_eq!(record.labels().len(), 1);
        assert_eq!(record.annotations().get("note"), Some(&"x".to_string()));
        assert_eq!(record.owner_references().len(), 1);
        assert_eq!(record.owner_references()[0].uid, "u-1");
        assert_eq!(record.key_string(), "Deployment:prod:web");
    }

    #[test]
    fn test_cluster_scoped_has_empty_namespace() {
        let record = ResourceRecord::from_value(json!({
            "apiVersion": "v1",
            "kind": "Namespace",
            "metadata": {"name": "prod"}
        }))
        .unwrap();
        assert_eq!(record.namespace(), "");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let err = ResourceRecord::from_value(json!({"metadata": {"name": "x"}})).unwrap_err();
        assert_eq!(err, RecordError::MissingField("kind"));

        let err = ResourceRecord::from_value(json!({"kind": "Pod", "metadata": {}})).unwrap_err();
        assert_eq!(err, RecordError::MissingField("metadata.name"));

        assert_eq!(
            ResourceRecord::from_value(json!([1, 2])).unwrap_err(),
            RecordError::NotAnObject
        );
    }
}
