//! Flattened per-resource view fed to the query language

use crate::drift::DriftResult;
use crate::models::{OwnerType, ResourceRecord, ResourceStatus, extract_status};
use crate::ownership::OwnershipResult;
use crate::query::{Field, QueryTarget};
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of the analysis output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatRecord {
    pub key: String,
    pub cluster: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub owner: OwnerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_ref: Option<String>,
    pub status: ResourceStatus,
    /// `not-applicable`, `no-drift` or `drifted`
    pub drift: &'static str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub findings: usize,
}

impl FlatRecord {
    pub fn new(
        cluster: &str,
        record: &ResourceRecord,
        ownership: Option<&OwnershipResult>,
        drift: Option<&DriftResult>,
        findings: usize,
    ) -> Self {
        Self {
            key: record.key_string(),
            cluster: cluster.to_string(),
            kind: record.kind().to_string(),
            namespace: record.namespace().to_string(),
            name: record.name().to_string(),
            owner: ownership.map_or(OwnerType::Unknown, |o| o.owner_type),
            owner_ref: ownership.and_then(|o| o.reference.clone()),
            status: extract_status(record.body()),
            drift: drift.map_or("not-applicable", |d| d.status()),
            labels: record.labels().clone(),
            findings,
        }
    }
}

impl QueryTarget for FlatRecord {
    fn field_value(&self, field: &Field) -> Option<&str> {
        match field {
            Field::Kind => Some(&self.kind),
            Field::Namespace => Some(&self.namespace),
            Field::Name => Some(&self.name),
            Field::Owner => Some(self.owner.as_str()),
            Field::Status => Some(self.status.as_str()),
            Field::Cluster => Some(&self.cluster),
            Field::Drift => Some(self.drift),
            Field::Label(key) => self.labels.get(key).map(String::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use serde_json::json;

    #[test]
    fn test_flat_record_answers_queries() {
        let record = ResourceRecord::from_value(json!({
            "apiVersion": "kustomize.toolkit.fluxcd.io/v1",
            "kind": "Kustomization",
            "metadata": {"name": "apps", "namespace": "flux-system", "labels": {"team": "core"}},
            "spec": {"suspend": true}
        }))
        .unwrap();
        let flat = FlatRecord::new("prod-east", &record, None, Some(&DriftResult::NoDrift), 2);

        assert_eq!(flat.owner, OwnerType::Unknown);
        assert_eq!(flat.drift, "no-drift");
        assert!(Query::parse("status=suspended AND labels[team]=core").unwrap().matches(&flat));
        assert!(Query::parse("cluster=prod-*").unwrap().matches(&flat));
        assert!(!Query::parse("drift=drifted").unwrap().matches(&flat));
    }
}
