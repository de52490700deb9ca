//! Graph functionality tests
//!
//! Edge extraction across kinds and the dangling-reference walk.

use kscout::engine::{CancelToken, WorkerPool};
use kscout::graph::{DanglingReason, EdgeType, GraphBuilder, SnapshotIndex, find_dangling};
use kscout::models::ResourceRecord;
use serde_json::{Value, json};

fn records(values: Vec<Value>) -> Vec<ResourceRecord> {
    values
        .into_iter()
        .map(|v| ResourceRecord::from_value(v).unwrap())
        .collect()
}

fn web_stack() -> Vec<ResourceRecord> {
    records(vec![
        json!({
            "apiVersion": "apps/v1", "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"template": {
                "metadata": {"labels": {"app": "web"}},
                "spec": {
                    "containers": [{
                        "name": "app",
                        "image": "nginx:1.25",
                        "envFrom": [{"configMapRef": {"name": "web-config"}}]
                    }],
                    "volumes": [{"name": "data", "persistentVolumeClaim": {"claimName": "web-data"}}]
                }
            }}
        }),
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "web-abc", "namespace": "prod", "labels": {"app": "web"}},
            "spec": {"containers": [{"name": "app", "image": "nginx:1.25"}]}
        }),
        json!({
            "apiVersion": "v1", "kind": "ConfigMap",
            "metadata": {"name": "web-config", "namespace": "prod"},
            "data": {"LOG_LEVEL": "info"}
        }),
        json!({
            "apiVersion": "v1", "kind": "PersistentVolumeClaim",
            "metadata": {"name": "web-data", "namespace": "prod"}
        }),
        json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {"selector": {"app": "web"}}
        }),
        json!({
            "apiVersion": "networking.k8s.io/v1", "kind": "Ingress",
            "metadata": {"name": "web", "namespace": "prod"},
            "spec": {
                "rules": [{"http": {"paths": [{"backend": {"service": {"name": "web"}}}]}}],
                "tls": [{"secretName": "web-tls"}]
            }
        }),
    ])
}

#[test]
fn test_web_stack_edges() {
    let records = web_stack();
    let index = SnapshotIndex::new(&records);
    let graph = GraphBuilder::new().build(&index, &WorkerPool::new(2), &CancelToken::new());

    assert!(!graph.is_partial());
    assert!(graph.has_outbound("Deployment:prod:web", EdgeType::Mounts));
    assert!(graph.has_outbound("Deployment:prod:web", EdgeType::References));
    assert!(graph.has_inbound("PersistentVolumeClaim:prod:web-data", EdgeType::Mounts));
    assert!(graph.has_outbound("Service:prod:web", EdgeType::Selects));
    assert!(graph.has_inbound("Service:prod:web", EdgeType::Backend));

    let selected: Vec<_> = graph
        .outbound("Service:prod:web")
        .map(|e| e.to.as_str())
        .collect();
    assert_eq!(selected, vec!["Pod:prod:web-abc"]);
}

#[test]
fn test_web_stack_dangling_tls_secret_only() {
    let records = web_stack();
    let index = SnapshotIndex::new(&records);
    let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());
    let dangling = find_dangling(&index, &graph);

    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].source_key, "Ingress:prod:web");
    assert_eq!(dangling[0].reason, DanglingReason::MissingTarget);
    assert!(dangling[0].target_description.contains("web-tls"));
}

#[test]
fn test_ghost_service_and_unmounted_claim() {
    let records = records(vec![
        json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "ghost", "namespace": "prod"},
            "spec": {"selector": {"app": "ghost"}}
        }),
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "other", "namespace": "prod", "labels": {"app": "other"}},
            "spec": {"containers": [{"name": "c", "image": "busybox"}]}
        }),
        // same labels, different namespace: must not satisfy the selector
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "ghost", "namespace": "staging", "labels": {"app": "ghost"}},
            "spec": {"containers": [{"name": "c", "image": "busybox"}]}
        }),
        json!({
            "apiVersion": "v1", "kind": "PersistentVolumeClaim",
            "metadata": {"name": "orphan-data", "namespace": "prod"}
        }),
    ]);
    let index = SnapshotIndex::new(&records);
    let graph = GraphBuilder::new().build(&index, &WorkerPool::new(4), &CancelToken::new());
    let dangling = find_dangling(&index, &graph);

    let no_pods: Vec<_> = dangling
        .iter()
        .filter(|d| d.reason == DanglingReason::NoMatchingPods)
        .collect();
    assert_eq!(no_pods.len(), 1);
    assert_eq!(no_pods[0].source_key, "Service:prod:ghost");

    let unused: Vec<_> = dangling
        .iter()
        .filter(|d| d.reason == DanglingReason::UnusedClaim)
        .collect();
    assert_eq!(unused.len(), 1);
    assert_eq!(unused[0].source_key, "PersistentVolumeClaim:prod:orphan-data");
}

fn healthy_service_and_claim() -> Vec<ResourceRecord> {
    records(vec![
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "a-1", "namespace": "x", "labels": {"app": "a"}},
            "spec": {
                "containers": [{"name": "c", "image": "busybox"}],
                "volumes": [{"name": "data", "persistentVolumeClaim": {"claimName": "data"}}]
            }
        }),
        json!({
            "apiVersion": "v1", "kind": "Service",
            "metadata": {"name": "svc", "namespace": "x"},
            "spec": {"selector": {"app": "a"}}
        }),
        json!({
            "apiVersion": "v1", "kind": "PersistentVolumeClaim",
            "metadata": {"name": "data", "namespace": "x"}
        }),
    ])
}

#[test]
fn test_cancelled_build_reports_no_absence_findings() {
    let records = healthy_service_and_claim();
    let index = SnapshotIndex::new(&records);

    let complete = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());
    assert!(!complete.is_partial());
    assert!(find_dangling(&index, &complete).is_empty());

    let cancel = CancelToken::new();
    cancel.cancel();
    let partial = GraphBuilder::new().build(&index, &WorkerPool::new(1), &cancel);
    assert!(partial.is_partial());
    assert!(find_dangling(&index, &partial).is_empty());
}

#[test]
fn test_owner_reference_edges_and_missing_owner() {
    let records = records(vec![
        json!({
            "apiVersion": "apps/v1", "kind": "ReplicaSet",
            "metadata": {"name": "web-5d9c", "namespace": "prod",
                "ownerReferences": [{"kind": "Deployment", "name": "web", "uid": "1"}]}
        }),
        json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "web-5d9c-x", "namespace": "prod",
                "ownerReferences": [{"kind": "ReplicaSet", "name": "web-5d9c", "uid": "2"}]},
            "spec": {"containers": [{"name": "c", "image": "nginx"}]}
        }),
    ]);
    let index = SnapshotIndex::new(&records);
    let graph = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());

    assert!(graph.has_outbound("ReplicaSet:prod:web-5d9c", EdgeType::Owns));

    let dangling = find_dangling(&index, &graph);
    assert_eq!(dangling.len(), 1);
    assert_eq!(dangling[0].source_key, "ReplicaSet:prod:web-5d9c");
    assert_eq!(dangling[0].reason, DanglingReason::MissingOwner);
}

#[test]
fn test_parallel_build_matches_sequential() {
    let records = web_stack();
    let index = SnapshotIndex::new(&records);
    let sequential = GraphBuilder::new().build(&index, &WorkerPool::new(1), &CancelToken::new());
    let parallel = GraphBuilder::new().build(&index, &WorkerPool::new(8), &CancelToken::new());

    let mut a = sequential.edges().to_vec();
    let mut b = parallel.edges().to_vec();
    a.sort_by(|x, y| (&x.from, &x.to, x.edge_type).cmp(&(&y.from, &y.to, y.edge_type)));
    b.sort_by(|x, y| (&x.from, &x.to, x.edge_type).cmp(&(&y.from, &y.to, y.edge_type)));
    assert_eq!(a, b);
}
