//! Built-in ownership detectors
//!
//! Each detector is a pure function over a resource's labels, annotations
//! and owner references. Returning `None` passes the resource on to the
//! next detector in priority order.

use super::{Detection, DetectorInput};
use crate::models::OwnerType;

pub const CONFIGHUB_UNIT_LABEL: &str = "confighub.com/UnitSlug";
pub const CONFIGHUB_SPACE_LABEL: &str = "confighub.com/SpaceName";
pub const FLUX_KUSTOMIZE_NAME: &str = "kustomize.toolkit.fluxcd.io/name";
pub const FLUX_KUSTOMIZE_NAMESPACE: &str = "kustomize.toolkit.fluxcd.io/namespace";
pub const FLUX_HELM_NAME: &str = "helm.toolkit.fluxcd.io/name";
pub const FLUX_HELM_NAMESPACE: &str = "helm.toolkit.fluxcd.io/namespace";
pub const ARGO_INSTANCE_LABEL: &str = "argocd.argoproj.io/instance";
pub const ARGO_TRACKING_ANNOTATION: &str = "argocd.argoproj.io/tracking-id";
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const HELM_RELEASE_NAME: &str = "meta.helm.sh/release-name";
pub const HELM_RELEASE_NAMESPACE: &str = "meta.helm.sh/release-namespace";
pub const HELM_CHART_LABEL: &str = "helm.sh/chart";

pub(super) fn confighub(input: &DetectorInput) -> Option<Detection> {
    let unit = input.label(CONFIGHUB_UNIT_LABEL)?;
    let mut detection = Detection::new(OwnerType::ConfigHub, unit).with("unit", unit);
    if let Some(space) = input.label(CONFIGHUB_SPACE_LABEL) {
        detection = detection.with("space", space);
    }
    Some(detection)
}

pub(super) fn flux_kustomize(input: &DetectorInput) -> Option<Detection> {
    flux(input, FLUX_KUSTOMIZE_NAME, FLUX_KUSTOMIZE_NAMESPACE, "Kustomization")
}

pub(super) fn flux_helm(input: &DetectorInput) -> Option<Detection> {
    flux(input, FLUX_HELM_NAME, FLUX_HELM_NAMESPACE, "HelmRelease")
}

fn flux(
    input: &DetectorInput,
    name_label: &str,
    namespace_label: &str,
    kind: &str,
) -> Option<Detection> {
    let name = input.label(name_label)?;
    let namespace = input.label(namespace_label).unwrap_or("");
    let reference = if namespace.is_empty() {
        format!("{}/{}", kind, name)
    } else {
        format!("{}/{}/{}", kind, namespace, name)
    };
    let mut detection = Detection::new(OwnerType::Flux, &reference)
        .with("kind", kind)
        .with("name", name);
    if !namespace.is_empty() {
        detection = detection.with("namespace", namespace);
    }
    Some(detection)
}

pub(super) fn argocd(input: &DetectorInput) -> Option<Detection> {
    if let Some(app) = input.label(ARGO_INSTANCE_LABEL) {
        return Some(Detection::new(OwnerType::ArgoCD, app).with("application", app));
    }
    // tracking-id format: <app>:<group>/<kind>:<namespace>/<name>
    let tracking = input.annotation(ARGO_TRACKING_ANNOTATION)?;
    let app = tracking.split(':').next().unwrap_or(tracking);
    Some(
        Detection::new(OwnerType::ArgoCD, app)
            .with("application", app)
            .with("trackingId", tracking),
    )
}

pub(super) fn helm(input: &DetectorInput) -> Option<Detection> {
    if input.label(MANAGED_BY_LABEL)? != "Helm" {
        return None;
    }
    let release = input.annotation(HELM_RELEASE_NAME).unwrap_or("");
    let mut detection = Detection::new(OwnerType::Helm, release);
    if !release.is_empty() {
        detection = detection.with("release", release);
    }
    if let Some(ns) = input.annotation(HELM_RELEASE_NAMESPACE) {
        detection = detection.with("releaseNamespace", ns);
    }
    if let Some(chart) = input.label(HELM_CHART_LABEL) {
        detection = detection.with("chart", chart);
    }
    Some(detection)
}

pub(super) fn terraform(input: &DetectorInput) -> Option<Detection> {
    let managed_by = input.label(MANAGED_BY_LABEL)?;
    managed_by
        .eq_ignore_ascii_case("terraform")
        .then(|| Detection::new(OwnerType::Terraform, ""))
}

pub(super) fn native(input: &DetectorInput) -> Option<Detection> {
    let owner = input.owner_references.first()?;
    let reference = format!("{}/{}", owner.kind, owner.name);
    Some(
        Detection::new(OwnerType::Native, &reference)
            .with("kind", &owner.kind)
            .with("name", &owner.name),
    )
}
