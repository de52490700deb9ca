//! Lookup indices built once per snapshot
//!
//! Key lookups are O(1). Label selection goes through a per-namespace
//! posting list keyed by `(label, value)`, so a selector only visits the
//! records that carry its rarest label pair.

use crate::models::{ResourceKey, ResourceRecord, kinds};
use std::collections::{BTreeMap, HashMap};

type LabelPostings = HashMap<(String, String), Vec<usize>>;

/// Read-only indices over a slice of records
pub struct SnapshotIndex<'a> {
    records: &'a [ResourceRecord],
    by_key: HashMap<ResourceKey, usize>,
    by_kind: HashMap<String, Vec<usize>>,
    /// (kind, namespace) -> label postings
    by_label: HashMap<(String, String), LabelPostings>,
}

impl<'a> SnapshotIndex<'a> {
    pub fn new(records: &'a [ResourceRecord]) -> Self {
        let mut by_key = HashMap::with_capacity(records.len());
        let mut by_kind: HashMap<String, Vec<usize>> = HashMap::new();
        let mut by_label: HashMap<(String, String), LabelPostings> = HashMap::new();

        for (idx, record) in records.iter().enumerate() {
            by_key.insert(record.key(), idx);
            by_kind.entry(record.kind().to_string()).or_default().push(idx);

            if record.namespace().is_empty() || record.labels().is_empty() {
                continue;
            }
            let postings = by_label
                .entry((record.kind().to_string(), record.namespace().to_string()))
                .or_default();
            for (k, v) in record.labels() {
                postings.entry((k.clone(), v.clone())).or_default().push(idx);
            }
        }

        tracing::debug!(
            "Indexed {} records across {} kinds",
            records.len(),
            by_kind.len()
        );

        Self {
            records,
            by_key,
            by_kind,
            by_label,
        }
    }

    pub fn records(&self) -> &'a [ResourceRecord] {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&'a ResourceRecord> {
        self.by_key.get(key).map(|&idx| &self.records[idx])
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Records of one kind, in snapshot order
    pub fn by_kind(&self, kind: &str) -> impl Iterator<Item = &'a ResourceRecord> + '_ {
        let records = self.records;
        self.by_kind
            .get(kind)
            .into_iter()
            .flatten()
            .map(move |&idx| &records[idx])
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.by_kind.keys().map(|k| k.as_str())
    }

    /// Records of `kind` in `namespace` whose labels satisfy every selector pair
    ///
    /// An empty selector selects nothing, and so does a cluster-scoped
    /// namespace.
    pub fn select(
        &self,
        kind: &str,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Vec<&'a ResourceRecord> {
        if selector.is_empty() || namespace.is_empty() || kinds::is_cluster_scoped(kind) {
            return Vec::new();
        }
        let Some(postings) = self
            .by_label
            .get(&(kind.to_string(), namespace.to_string()))
        else {
            return Vec::new();
        };

        let mut smallest: Option<&Vec<usize>> = None;
        for (k, v) in selector {
            match postings.get(&(k.clone(), v.clone())) {
                Some(list) => {
                    if smallest.is_none_or(|s| list.len() < s.len()) {
                        smallest = Some(list);
                    }
                }
                None => return Vec::new(),
            }
        }

        smallest
            .into_iter()
            .flatten()
            .map(|&idx| &self.records[idx])
            .filter(|r| selector_matches(selector, r.labels()))
            .collect()
    }
}

/// Every selector pair is present in `labels`
pub fn selector_matches(
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod(ns: &str, name: &str, labels: serde_json::Value) -> ResourceRecord {
        ResourceRecord::from_value(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": name, "namespace": ns, "labels": labels}
        }))
        .unwrap()
    }

    fn selector(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_select_is_namespace_scoped() {
        let records = vec![
            pod("prod", "a", json!({"app": "web", "tier": "fe"})),
            pod("prod", "b", json!({"app": "web"})),
            pod("dev", "c", json!({"app": "web", "tier": "fe"})),
        ];
        let index = SnapshotIndex::new(&records);

        let found = index.select("Pod", "prod", &selector(&[("app", "web"), ("tier", "fe")]));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "a");

        assert_eq!(index.select("Pod", "prod", &selector(&[("app", "web")])).len(), 2);
        assert!(index.select("Pod", "prod", &selector(&[("app", "db")])).is_empty());
        assert!(index.select("Pod", "prod", &BTreeMap::new()).is_empty());
        assert!(index.select("Pod", "", &selector(&[("app", "web")])).is_empty());
    }

    #[test]
    fn test_key_and_kind_lookup() {
        let records = vec![pod("prod", "a", json!({})), pod("prod", "b", json!({}))];
        let index = SnapshotIndex::new(&records);
        assert!(index.contains(&ResourceKey::new("Pod", "prod", "a")));
        assert!(!index.contains(&ResourceKey::new("Pod", "dev", "a")));
        assert_eq!(index.by_kind("Pod").count(), 2);
        assert_eq!(index.by_kind("Service").count(), 0);
    }
}
