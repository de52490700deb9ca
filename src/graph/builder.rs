//! One-pass graph construction
//!
//! Every record is visited once. Per-record extraction only reads the
//! record and the shared index, so it fans out across the worker pool and
//! the per-record edge lists are merged afterwards.

use super::rules::{ExtractionRule, RefScope, SelectorRule, default_rules, default_selector_rules};
use super::{EdgeType, RelationshipEdge, ResourceGraph, SnapshotIndex, UnresolvedRef};
use crate::engine::{CancelToken, WorkerPool};
use crate::models::{ResourceKey, ResourceRecord, kinds};
use crate::path::PathExpr;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone)]
struct CompiledRule {
    path: PathExpr,
    rule: ExtractionRule,
}

#[derive(Clone)]
struct CompiledSelector {
    path: PathExpr,
    target_kind: &'static str,
}

#[derive(Default)]
struct RecordEdges {
    source: String,
    edges: Vec<RelationshipEdge>,
    unresolved: Vec<UnresolvedRef>,
}

/// Graph builder with its extraction tables compiled per source kind
#[derive(Clone)]
pub struct GraphBuilder {
    rules: HashMap<String, Vec<CompiledRule>>,
    selectors: HashMap<String, Vec<CompiledSelector>>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::with_rules(default_rules(), default_selector_rules())
    }

    pub fn with_rules(rules: Vec<ExtractionRule>, selectors: Vec<SelectorRule>) -> Self {
        let mut compiled: HashMap<String, Vec<CompiledRule>> = HashMap::new();
        for rule in rules {
            match rule.scope {
                RefScope::PodSpec => {
                    for kind in kinds::WORKLOAD_KINDS {
                        let Some(prefix) = kinds::pod_spec_prefix(kind) else {
                            continue;
                        };
                        for path in rule.paths {
                            let full = format!("{}.{}", prefix, path);
                            push_compiled(&mut compiled, kind, &full, &rule);
                        }
                    }
                }
                RefScope::Root => {
                    for kind in rule.source_kinds {
                        for path in rule.paths {
                            push_compiled(&mut compiled, kind, path, &rule);
                        }
                    }
                }
            }
        }

        let mut by_kind: HashMap<String, Vec<CompiledSelector>> = HashMap::new();
        for selector in selectors {
            match PathExpr::parse(selector.path) {
                Ok(path) => by_kind
                    .entry(selector.source_kind.to_string())
                    .or_default()
                    .push(CompiledSelector {
                        path,
                        target_kind: selector.target_kind,
                    }),
                Err(e) => tracing::warn!("Skipping selector rule for {}: {}", selector.source_kind, e),
            }
        }

        Self {
            rules: compiled,
            selectors: by_kind,
        }
    }

    /// Build the graph for every record in `index`
    ///
    /// On cancellation the edges of the records already visited are kept
    /// and the graph is marked partial.
    pub fn build(
        &self,
        index: &SnapshotIndex,
        pool: &WorkerPool,
        cancel: &CancelToken,
    ) -> ResourceGraph {
        let (parts, partial) = pool.run(index.records(), cancel, |record| {
            self.extract(record, index)
        });

        let mut graph = ResourceGraph::new();
        for part in parts {
            graph.mark_visited(part.source);
            for edge in part.edges {
                graph.add_edge(edge);
            }
            for unresolved in part.unresolved {
                graph.add_unresolved(unresolved);
            }
        }
        if partial {
            tracing::warn!("Graph build cancelled; returning partial graph");
            graph.mark_partial();
        }

        tracing::debug!(
            "Built graph: {} edges, {} unresolved references",
            graph.len(),
            graph.unresolved().len()
        );
        graph
    }

    fn extract(&self, record: &ResourceRecord, index: &SnapshotIndex) -> RecordEdges {
        let mut out = RecordEdges::default();
        let source = record.key_string();

        for owner in record.owner_references() {
            let namespace = kinds::target_namespace(&owner.kind, record.namespace(), None);
            let target = ResourceKey::new(&owner.kind, &namespace, &owner.name);
            if index.contains(&target) {
                out.edges.push(RelationshipEdge::new(
                    target.to_string(),
                    source.clone(),
                    EdgeType::Owns,
                ));
            } else {
                out.unresolved.push(UnresolvedRef {
                    source: source.clone(),
                    target,
                    edge_type: EdgeType::Owns,
                    field: "metadata.ownerReferences".to_string(),
                });
            }
        }

        for compiled in self.rules.get(record.kind()).into_iter().flatten() {
            let rule = &compiled.rule;
            for reference in compiled.path.select(record.body()) {
                let Some(target) = resolve_target(rule, reference, record.namespace()) else {
                    continue;
                };
                if index.contains(&target) {
                    out.edges.push(RelationshipEdge::new(
                        source.clone(),
                        target.to_string(),
                        rule.edge_type,
                    ));
                } else if !is_optional(reference) {
                    out.unresolved.push(UnresolvedRef {
                        source: source.clone(),
                        target,
                        edge_type: rule.edge_type,
                        field: compiled.path.to_string(),
                    });
                }
            }
        }

        for selector in self.selectors.get(record.kind()).into_iter().flatten() {
            let labels = label_map(selector.path.select(record.body()).next());
            for target in index.select(selector.target_kind, record.namespace(), &labels) {
                out.edges.push(RelationshipEdge::new(
                    source.clone(),
                    target.key_string(),
                    EdgeType::Selects,
                ));
            }
        }

        out.source = source;
        out
    }
}

fn push_compiled(
    compiled: &mut HashMap<String, Vec<CompiledRule>>,
    kind: &str,
    path: &str,
    rule: &ExtractionRule,
) {
    match PathExpr::parse(path) {
        Ok(path) => compiled
            .entry(kind.to_string())
            .or_default()
            .push(CompiledRule {
                path,
                rule: rule.clone(),
            }),
        Err(e) => tracing::warn!("Skipping extraction path '{}' for {}: {}", path, kind, e),
    }
}

fn resolve_target(rule: &ExtractionRule, reference: &Value, namespace: &str) -> Option<ResourceKey> {
    let name = match rule.name_field {
        Some(field) => reference.get(field)?.as_str()?,
        None => reference.as_str()?,
    };
    if name.is_empty() || rule.implicit_names.contains(&name) {
        return None;
    }

    let kind = rule
        .kind_field
        .and_then(|f| reference.get(f))
        .and_then(|k| k.as_str())
        .filter(|k| !k.is_empty())
        .unwrap_or(rule.target_kind);
    let explicit_ns = rule
        .namespace_field
        .and_then(|f| reference.get(f))
        .and_then(|n| n.as_str());

    let namespace = kinds::target_namespace(kind, namespace, explicit_ns);
    Some(ResourceKey::new(kind, &namespace, name))
}

/// `optional: true` references may legitimately be absent
fn is_optional(reference: &Value) -> bool {
    reference
        .get("optional")
        .and_then(|o| o.as_bool())
        .unwrap_or(false)
}

fn label_map(value: Option<&Value>) -> BTreeMap<String, String> {
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

    fn rec(value: Value) -> ResourceRecord {
        ResourceRecord::from_value(value).unwrap()
    }

    #[test]
    fn test_deployment_mounts_and_references() {
        let records = vec![
            rec(json!({
                "apiVersion": "apps/v1", "kind": "Deployment",
                "metadata": {"name": "web", "namespace": "prod"},
                "spec": {"template": {"spec": {
                    "serviceAccountName": "default",
                    "volumes": [{"name": "cfg", "configMap": {"name": "web-config"}}],
                    "containers": [{"name": "app", "envFrom": [{"secretRef": {"name": "web-env"}}]}]
                }}}
            })),
            rec(json!({"apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "web-config", "namespace": "prod"}})),
        ];
        let index = SnapshotIndex::new(&records);
        let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.edges()[0].edge_type, EdgeType::Mounts);
        assert_eq!(graph.edges()[0].to, "ConfigMap:prod:web-config");

        // the default service account is implicit and never unresolved
        assert_eq!(graph.unresolved().len(), 1);
        assert_eq!(graph.unresolved()[0].target.to_string(), "Secret:prod:web-env");
    }

    #[test]
    fn test_optional_reference_not_unresolved() {
        let records = vec![rec(json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "p", "namespace": "prod"},
            "spec": {"containers": [{"name": "c", "env": [
                {"name": "X", "valueFrom": {"configMapKeyRef": {"name": "maybe", "key": "x", "optional": true}}}
            ]}]}
        }))];
        let index = SnapshotIndex::new(&records);
        let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());
        assert!(graph.is_empty());
        assert!(graph.unresolved().is_empty());
    }

    #[test]
    fn test_cancelled_build_is_partial() {
        let records = vec![rec(json!({"kind": "Pod", "metadata": {"name": "p", "namespace": "a"}}))];
        let index = SnapshotIndex::new(&records);
        let cancel = CancelToken::new();
        cancel.cancel();
        let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &cancel);
        assert!(graph.is_partial());
        assert!(graph.is_empty());
    }
}
