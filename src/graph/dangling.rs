//! Dangling reference finder
//!
//! Reports declared references whose target is missing from the snapshot,
//! Services whose selector matches no Pod, and PersistentVolumeClaims that
//! no workload mounts.

use super::{EdgeType, ResourceGraph, SnapshotIndex};
use crate::models::ResourceKey;
use serde::Serialize;
use std::fmt;

/// Closed set of reasons a reference is dangling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DanglingReason {
    /// Declared reference to a resource that is not in the snapshot
    MissingTarget,
    /// Owner reference to a resource that is not in the snapshot
    MissingOwner,
    /// Service selector matches zero pods in its namespace
    NoMatchingPods,
    /// PersistentVolumeClaim with no inbound mount
    UnusedClaim,
}

impl DanglingReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DanglingReason::MissingTarget => "target not found",
            DanglingReason::MissingOwner => "owner not found",
            DanglingReason::NoMatchingPods => "no matching pods",
            DanglingReason::UnusedClaim => "claim not mounted",
        }
    }
}

impl fmt::Display for DanglingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    pub source_key: String,
    pub target_description: String,
    pub reason: DanglingReason,
    pub suggestion: String,
}

/// Walk the graph for unresolved and unused references
///
/// Results are sorted by source key, then reason, so repeated runs over the
/// same snapshot report in the same order.
///
/// On a partial graph the absence checks only cover what was extracted: a
/// Service is judged only if its own selector was evaluated, and unmounted
/// claims are not reported at all since any unvisited workload may mount them.
pub fn find_dangling(index: &SnapshotIndex, graph: &ResourceGraph) -> Vec<DanglingReference> {
    let mut found = Vec::new();

    for unresolved in graph.unresolved() {
        let target = describe(&unresolved.target);
        let (reason, suggestion) = if unresolved.edge_type == EdgeType::Owns {
            (
                DanglingReason::MissingOwner,
                format!(
                    "Owner {} no longer exists; the object may be orphaned and can be deleted",
                    target
                ),
            )
        } else {
            (
                DanglingReason::MissingTarget,
                format!(
                    "Create {} or fix the {} reference at {}",
                    target, unresolved.edge_type, unresolved.field
                ),
            )
        };
        found.push(DanglingReference {
            source_key: unresolved.source.clone(),
            target_description: target,
            reason,
            suggestion,
        });
    }

    for service in index.by_kind("Service") {
        let Some(selector) = service
            .body()
            .get("spec")
            .and_then(|s| s.get("selector"))
            .and_then(|s| s.as_object())
            .filter(|s| !s.is_empty())
        else {
            continue;
        };
        let key = service.key_string();
        if !graph.was_visited(&key) || graph.has_outbound(&key, EdgeType::Selects) {
            continue;
        }
        let selector = selector
            .iter()
            .map(|(k, v)| format!("{}={}", k, v.as_str().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join(",");
        found.push(DanglingReference {
            source_key: key,
            target_description: format!(
                "pods matching {} in namespace {}",
                selector,
                service.namespace()
            ),
            reason: DanglingReason::NoMatchingPods,
            suggestion: format!(
                "Check the selector {} or deploy workloads labeled to match it",
                selector
            ),
        });
    }

    let claims = if graph.is_partial() {
        None
    } else {
        Some(index.by_kind("PersistentVolumeClaim"))
    };
    for claim in claims.into_iter().flatten() {
        let key = claim.key_string();
        if graph.has_inbound(&key, EdgeType::Mounts) {
            continue;
        }
        found.push(DanglingReference {
            source_key: key,
            target_description: format!("workload mounting claim {}", claim.name()),
            reason: DanglingReason::UnusedClaim,
            suggestion: "Mount the claim from a workload or delete it if it is no longer needed"
                .to_string(),
        });
    }

    found.sort_by(|a, b| {
        a.source_key
            .cmp(&b.source_key)
            .then(a.reason.cmp(&b.reason))
            .then(a.target_description.cmp(&b.target_description))
    });
    tracing::debug!("Found {} dangling references", found.len());
    found
}

fn describe(key: &ResourceKey) -> String {
    if key.namespace.is_empty() {
        format!("{} {}", key.kind, key.name)
    } else {
        format!("{} {}/{}", key.kind, key.namespace, key.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{CancelToken, WorkerPool};
    use crate::graph::GraphBuilder;
    use crate::models::ResourceRecord;
    use serde_json::json;

    #[test]
    fn test_unmounted_claim() {
        let records = vec![ResourceRecord::from_value(json!({
            "apiVersion": "v1", "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "prod"}
        }))
        .unwrap()];
        let index = SnapshotIndex::new(&records);
        let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());
        let dangling = find_dangling(&index, &graph);
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].reason, DanglingReason::UnusedClaim);
        assert_eq!(dangling[0].source_key, "PersistentVolumeClaim:prod:data");
    }

    #[test]
    fn test_partial_graph_judges_visited_services_only() {
        let records: Vec<ResourceRecord> = ["judged", "skipped"]
            .iter()
            .map(|name| {
                ResourceRecord::from_value(json!({
                    "apiVersion": "v1", "kind": "Service",
                    "metadata": {"name": name, "namespace": "prod"},
                    "spec": {"selector": {"app": name}}
                }))
                .unwrap()
            })
            .chain(std::iter::once(
                ResourceRecord::from_value(json!({
                    "apiVersion": "v1", "kind": "PersistentVolumeClaim",
                    "metadata": {"name": "data", "namespace": "prod"}
                }))
                .unwrap(),
            ))
            .collect();
        let index = SnapshotIndex::new(&records);

        let mut graph = ResourceGraph::new();
        graph.mark_partial();
        graph.mark_visited("Service:prod:judged".to_string());
        graph.mark_visited("PersistentVolumeClaim:prod:data".to_string());

        let dangling = find_dangling(&index, &graph);
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].source_key, "Service:prod:judged");
        assert_eq!(dangling[0].reason, DanglingReason::NoMatchingPods);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(DanglingReason::NoMatchingPods.to_string(), "no matching pods");
    }
}
