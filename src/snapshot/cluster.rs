//! Live cluster listing
//!
//! Lists a fixed set of built-in and GitOps kinds through kube-rs dynamic
//! APIs. Kinds whose CRD is not installed are skipped quietly; other list
//! failures are logged and the snapshot is built from what succeeded.

use super::{Snapshot, SnapshotSource};
use crate::engine::AnalysisWarning;
use crate::models::{ResourceRecord, kinds};
use anyhow::Context;
use async_trait::async_trait;
use k8s_openapi::api::{apps, autoscaling, batch, core, networking, policy, rbac};
use kube::api::{Api, ListParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind, TypeMeta};
use kube::{Client, Config};

/// Initialize a client using the default kubeconfig loading strategy
///
/// In-cluster config first, then `KUBECONFIG`, then `~/.kube/config`.
pub async fn create_client() -> anyhow::Result<Client> {
    let config = Config::infer()
        .await
        .context("Failed to infer Kubernetes configuration")?;
    tracing::debug!("Connecting to {}", config.cluster_url);
    Client::try_from(config).context("Failed to create Kubernetes client")
}

/// Name of the current kubeconfig context, used as the cluster name
pub fn current_context() -> Option<String> {
    kube::config::Kubeconfig::read().ok()?.current_context
}

/// Kinds listed by default
pub fn default_resources() -> Vec<ApiResource> {
    let mut resources = vec![
        ApiResource::erase::<core::v1::Pod>(&()),
        ApiResource::erase::<core::v1::Service>(&()),
        ApiResource::erase::<core::v1::ConfigMap>(&()),
        ApiResource::erase::<core::v1::Secret>(&()),
        ApiResource::erase::<core::v1::ServiceAccount>(&()),
        ApiResource::erase::<core::v1::PersistentVolumeClaim>(&()),
        ApiResource::erase::<apps::v1::Deployment>(&()),
        ApiResource::erase::<apps::v1::StatefulSet>(&()),
        ApiResource::erase::<apps::v1::DaemonSet>(&()),
        ApiResource::erase::<apps::v1::ReplicaSet>(&()),
        ApiResource::erase::<batch::v1::Job>(&()),
        ApiResource::erase::<batch::v1::CronJob>(&()),
        ApiResource::erase::<autoscaling::v2::HorizontalPodAutoscaler>(&()),
        ApiResource::erase::<networking::v1::Ingress>(&()),
        ApiResource::erase::<policy::v1::PodDisruptionBudget>(&()),
        ApiResource::erase::<rbac::v1::Role>(&()),
        ApiResource::erase::<rbac::v1::RoleBinding>(&()),
        ApiResource::erase::<rbac::v1::ClusterRole>(&()),
        ApiResource::erase::<rbac::v1::ClusterRoleBinding>(&()),
    ];

    let custom = [
        ("kustomize.toolkit.fluxcd.io", "v1", "Kustomization"),
        ("helm.toolkit.fluxcd.io", "v2", "HelmRelease"),
        ("source.toolkit.fluxcd.io", "v1", "GitRepository"),
        ("source.toolkit.fluxcd.io", "v1", "OCIRepository"),
        ("source.toolkit.fluxcd.io", "v1", "HelmRepository"),
        ("source.toolkit.fluxcd.io", "v1", "HelmChart"),
        ("source.toolkit.fluxcd.io", "v1", "Bucket"),
        ("argoproj.io", "v1alpha1", "Application"),
    ];
    for (group, version, kind) in custom {
        resources.push(ApiResource::from_gvk(&GroupVersionKind::gvk(
            group, version, kind,
        )));
    }

    resources
}

/// Lists resources from a live cluster
#[derive(Clone)]
pub struct ClusterSource {
    client: Client,
    cluster: String,
    namespace: Option<String>,
    resources: Vec<ApiResource>,
}

impl ClusterSource {
    pub fn new(client: Client, cluster: impl Into<String>) -> Self {
        Self {
            client,
            cluster: cluster.into(),
            namespace: None,
            resources: default_resources(),
        }
    }

    /// Restrict namespaced kinds to one namespace
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    pub fn with_resources(mut self, resources: Vec<ApiResource>) -> Self {
        self.resources = resources;
        self
    }

    async fn list(&self, ar: &ApiResource) -> anyhow::Result<Vec<DynamicObject>> {
        let api: Api<DynamicObject> = match (&self.namespace, kinds::is_cluster_scoped(&ar.kind)) {
            (Some(ns), false) => Api::namespaced_with(self.client.clone(), ns, ar),
            _ => Api::all_with(self.client.clone(), ar),
        };
        let list = api
            .list(&ListParams::default())
            .await
            .with_context(|| format!("Failed to list {}", ar.kind))?;

        // List items omit apiVersion/kind
        Ok(list
            .items
            .into_iter()
            .map(|mut obj| {
                obj.types = Some(TypeMeta {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                });
                obj
            })
            .collect())
    }
}

#[async_trait]
impl SnapshotSource for ClusterSource {
    fn describe(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("cluster {} (namespace {})", self.cluster, ns),
            None => format!("cluster {}", self.cluster),
        }
    }

    async fn load(&self) -> anyhow::Result<Snapshot> {
        let lists =
            futures::future::join_all(self.resources.iter().map(|ar| self.list(ar))).await;

        let mut snapshot = Snapshot::new(self.cluster.clone(), Vec::new());
        let mut index = 0;
        for (ar, result) in self.resources.iter().zip(lists) {
            let objects = match result {
                Ok(objects) => objects,
                Err(e) if is_not_found(&e) => {
                    tracing::debug!("{} not served by this cluster, skipping", ar.kind);
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    continue;
                }
            };
            tracing::debug!("Listed {} {} objects", objects.len(), ar.kind);

            for obj in &objects {
                match ResourceRecord::from_dynamic(obj) {
                    Ok(record) => snapshot.records.push(record),
                    Err(e) => snapshot.warnings.push(AnalysisWarning::SkippedDocument {
                        index,
                        reason: e.to_string(),
                    }),
                }
                index += 1;
            }
        }

        Ok(snapshot)
    }
}

/// 404 from the API server: the CRD is not installed
fn is_not_found(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        let text = cause.to_string();
        text.contains("404") || text.contains("NotFound") || text.contains("page not found")
    })
}
