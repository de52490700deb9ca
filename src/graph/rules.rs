//! Reference extraction table
//!
//! Each row names the source kinds it applies to, the path expressions
//! yielding reference objects (or bare names), and the target kind and
//! edge type those references produce. Adding a relationship means adding
//! a row, not a traversal method.

use super::EdgeType;

/// Where a rule's paths are rooted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefScope {
    /// Relative to the pod spec of any workload kind (see `kinds::pod_spec_prefix`)
    PodSpec,
    /// Relative to the object root of the listed source kinds
    Root,
}

#[derive(Debug, Clone)]
pub struct ExtractionRule {
    /// Ignored for `RefScope::PodSpec`, which applies to every workload kind
    pub source_kinds: &'static [&'static str],
    pub scope: RefScope,
    pub paths: &'static [&'static str],
    /// Field holding the target name; `None` when the match is the name itself
    pub name_field: Option<&'static str>,
    /// Field overriding `target_kind`, e.g. `scaleTargetRef.kind`
    pub kind_field: Option<&'static str>,
    pub namespace_field: Option<&'static str>,
    pub target_kind: &'static str,
    pub edge_type: EdgeType,
    /// Names that are implicit and never reported (e.g. the default service account)
    pub implicit_names: &'static [&'static str],
}

impl ExtractionRule {
    fn pod(
        paths: &'static [&'static str],
        name_field: Option<&'static str>,
        target_kind: &'static str,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            source_kinds: &[],
            scope: RefScope::PodSpec,
            paths,
            name_field,
            kind_field: None,
            namespace_field: None,
            target_kind,
            edge_type,
            implicit_names: &[],
        }
    }

    fn root(
        source_kinds: &'static [&'static str],
        paths: &'static [&'static str],
        target_kind: &'static str,
        edge_type: EdgeType,
    ) -> Self {
        Self {
            source_kinds,
            scope: RefScope::Root,
            paths,
            name_field: Some("name"),
            kind_field: None,
            namespace_field: None,
            target_kind,
            edge_type,
            implicit_names: &[],
        }
    }

    fn kind_from(mut self, field: &'static str) -> Self {
        self.kind_field = Some(field);
        self
    }

    fn namespace_from(mut self, field: &'static str) -> Self {
        self.namespace_field = Some(field);
        self
    }

    fn name_from(mut self, field: Option<&'static str>) -> Self {
        self.name_field = field;
        self
    }

    fn implicit(mut self, names: &'static [&'static str]) -> Self {
        self.implicit_names = names;
        self
    }
}

/// Selector-based edges: `path` holds a label map matched against `target_kind`
#[derive(Debug, Clone)]
pub struct SelectorRule {
    pub source_kind: &'static str,
    pub path: &'static str,
    pub target_kind: &'static str,
}

pub fn default_selector_rules() -> Vec<SelectorRule> {
    vec![
        SelectorRule {
            source_kind: "Service",
            path: "spec.selector",
            target_kind: "Pod",
        },
        SelectorRule {
            source_kind: "PodDisruptionBudget",
            path: "spec.selector.matchLabels",
            target_kind: "Pod",
        },
    ]
}

pub fn default_rules() -> Vec<ExtractionRule> {
    use EdgeType::*;

    vec![
        // Pod spec volumes
        ExtractionRule::pod(
            &["volumes[*].configMap", "volumes[*].projected.sources[*].configMap"],
            Some("name"),
            "ConfigMap",
            Mounts,
        ),
        ExtractionRule::pod(&["volumes[*].secret"], Some("secretName"), "Secret", Mounts),
        ExtractionRule::pod(
            &["volumes[*].projected.sources[*].secret"],
            Some("name"),
            "Secret",
            Mounts,
        ),
        ExtractionRule::pod(
            &["volumes[*].persistentVolumeClaim"],
            Some("claimName"),
            "PersistentVolumeClaim",
            Mounts,
        ),
        // Pod spec environment
        ExtractionRule::pod(
            &[
                "containers[*].envFrom[*].configMapRef",
                "initContainers[*].envFrom[*].configMapRef",
                "containers[*].env[*].valueFrom.configMapKeyRef",
                "initContainers[*].env[*].valueFrom.configMapKeyRef",
            ],
            Some("name"),
            "ConfigMap",
            References,
        ),
        ExtractionRule::pod(
            &[
                "containers[*].envFrom[*].secretRef",
                "initContainers[*].envFrom[*].secretRef",
                "containers[*].env[*].valueFrom.secretKeyRef",
                "initContainers[*].env[*].valueFrom.secretKeyRef",
            ],
            Some("name"),
            "Secret",
            References,
        ),
        ExtractionRule::pod(
            &["imagePullSecrets[*]"],
            Some("name"),
            "Secret",
            ImagePullSecret,
        ),
        ExtractionRule::pod(&["serviceAccountName"], None, "ServiceAccount", References)
            .implicit(&["default"]),
        // Autoscaling
        ExtractionRule::root(
            &["HorizontalPodAutoscaler"],
            &["spec.scaleTargetRef"],
            "Deployment",
            ScaleTarget,
        )
        .kind_from("kind"),
        // Ingress
        ExtractionRule::root(
            &["Ingress"],
            &[
                "spec.defaultBackend.service",
                "spec.rules[*].http.paths[*].backend.service",
            ],
            "Service",
            Backend,
        ),
        ExtractionRule::root(&["Ingress"], &["spec.tls[*]"], "Secret", TlsSecret)
            .name_from(Some("secretName")),
        // Service accounts
        ExtractionRule::root(
            &["ServiceAccount"],
            &["imagePullSecrets[*]"],
            "Secret",
            ImagePullSecret,
        ),
        ExtractionRule::root(&["ServiceAccount"], &["secrets[*]"], "Secret", References),
        // RBAC
        ExtractionRule::root(
            &["RoleBinding", "ClusterRoleBinding"],
            &["roleRef"],
            "ClusterRole",
            References,
        )
        .kind_from("kind"),
        // Flux sources and dependencies
        ExtractionRule::root(
            &["Kustomization"],
            &["spec.sourceRef"],
            "GitRepository",
            References,
        )
        .kind_from("kind")
        .namespace_from("namespace"),
        ExtractionRule::root(
            &["HelmRelease"],
            &["spec.chart.spec.sourceRef"],
            "HelmRepository",
            References,
        )
        .kind_from("kind")
        .namespace_from("namespace"),
        ExtractionRule::root(
            &["HelmRelease"],
            &["spec.chartRef"],
            "OCIRepository",
            References,
        )
        .kind_from("kind")
        .namespace_from("namespace"),
        ExtractionRule::root(
            &["HelmRelease"],
            &["spec.valuesFrom[*]"],
            "ConfigMap",
            References,
        )
        .kind_from("kind"),
        ExtractionRule::root(
            &["Kustomization"],
            &["spec.dependsOn[*]"],
            "Kustomization",
            References,
        )
        .namespace_from("namespace"),
        ExtractionRule::root(
            &["HelmRelease"],
            &["spec.dependsOn[*]"],
            "HelmRelease",
            References,
        )
        .namespace_from("namespace"),
    ]
}
