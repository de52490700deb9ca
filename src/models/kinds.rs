//! Well-known Kubernetes kinds
//!
//! Scope and pod-template locations for the built-in kinds the graph builder
//! and scanner need to know about. Everything else is treated as namespaced
//! and without a pod template.

/// Cluster-scoped kinds
const CLUSTER_SCOPED_KINDS: &[&str] = &[
    "Namespace",
    "Node",
    "PersistentVolume",
    "StorageClass",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "PriorityClass",
    "MutatingWebhookConfiguration",
    "ValidatingWebhookConfiguration",
    "APIService",
];

/// Check if a kind is cluster-scoped
pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// Kinds that embed a pod spec
pub const WORKLOAD_KINDS: &[&str] = &[
    "Pod",
    "Deployment",
    "StatefulSet",
    "DaemonSet",
    "ReplicaSet",
    "Job",
    "ReplicationController",
    "CronJob",
];

/// Path prefix of the pod spec embedded in a kind, if it has one
///
/// Bare pods carry the spec at `spec`; controllers embed it in a template.
pub fn pod_spec_prefix(kind: &str) -> Option<&'static str> {
    match kind {
        "Pod" => Some("spec"),
        "Deployment" | "StatefulSet" | "DaemonSet" | "ReplicaSet" | "Job"
        | "ReplicationController" => Some("spec.template.spec"),
        "CronJob" => Some("spec.jobTemplate.spec.template.spec"),
        _ => None,
    }
}

/// Namespace a reference from `source_namespace` to `target_kind` resolves in
///
/// An explicit namespace wins; cluster-scoped targets always resolve to "".
pub fn target_namespace(
    target_kind: &str,
    source_namespace: &str,
    explicit: Option<&str>,
) -> String {
    if is_cluster_scoped(target_kind) {
        return String::new();
    }
    match explicit {
        Some(ns) if !ns.is_empty() => ns.to_string(),
        _ => source_namespace.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope() {
        assert!(is_cluster_scoped("ClusterRole"));
        assert!(!is_cluster_scoped("Role"));
        assert!(!is_cluster_scoped("Kustomization"));
    }

    #[test]
    fn test_pod_spec_prefix() {
        assert_eq!(pod_spec_prefix("Pod"), Some("spec"));
        assert_eq!(pod_spec_prefix("Deployment"), Some("spec.template.spec"));
        assert_eq!(
            pod_spec_prefix("CronJob"),
            Some("spec.jobTemplate.spec.template.spec")
        );
        assert_eq!(pod_spec_prefix("Service"), None);
        for kind in WORKLOAD_KINDS {
            assert!(pod_spec_prefix(kind).is_some());
        }
    }

    #[test]
    fn test_target_namespace() {
        assert_eq!(target_namespace("ConfigMap", "prod", None), "prod");
        assert_eq!(
            target_namespace("GitRepository", "apps", Some("flux-system")),
            "flux-system"
        );
        assert_eq!(target_namespace("ClusterRole", "prod", Some("prod")), "");
        assert_eq!(target_namespace("Secret", "prod", Some("")), "prod");
    }
}
