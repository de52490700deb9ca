//! Ownership resolution
//!
//! Assigns exactly one [`OwnerType`] to each resource by running a fixed,
//! priority-ordered list of detectors and stopping at the first match.
//! When several owner markers coexist only the highest-priority owner is
//! reported.

mod detectors;

pub use detectors::{
    ARGO_INSTANCE_LABEL, ARGO_TRACKING_ANNOTATION, CONFIGHUB_UNIT_LABEL, FLUX_HELM_NAME,
    FLUX_KUSTOMIZE_NAME, HELM_RELEASE_NAME, MANAGED_BY_LABEL,
};

use crate::models::{OwnerRef, OwnerType, ResourceRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// View of a resource handed to each detector
pub struct DetectorInput<'a> {
    pub labels: &'a BTreeMap<String, String>,
    pub annotations: &'a BTreeMap<String, String>,
    pub owner_references: &'a [OwnerRef],
}

impl<'a> DetectorInput<'a> {
    pub fn from_record(record: &'a ResourceRecord) -> Self {
        Self {
            labels: record.labels(),
            annotations: record.annotations(),
            owner_references: record.owner_references(),
        }
    }

    pub fn label(&self, key: &str) -> Option<&'a str> {
        self.labels.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    pub fn annotation(&self, key: &str) -> Option<&'a str> {
        self.annotations
            .get(key)
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }
}

/// Positive result of a single detector
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub owner_type: OwnerType,
    pub reference: Option<String>,
    pub detail: BTreeMap<String, String>,
}

impl Detection {
    pub fn new(owner_type: OwnerType, reference: &str) -> Self {
        Self {
            owner_type,
            reference: (!reference.is_empty()).then(|| reference.to_string()),
            detail: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.detail.insert(key.to_string(), value.to_string());
        self
    }
}

/// Detector signature: a pure function of labels, annotations and owner refs
pub type DetectFn = fn(&DetectorInput) -> Option<Detection>;

/// Named detector with its priority (lower runs first)
#[derive(Clone)]
pub struct Detector {
    pub name: &'static str,
    pub priority: u8,
    pub detect: DetectFn,
}

/// Ownership of one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipResult {
    pub owner_type: OwnerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub detail: BTreeMap<String, String>,
}

impl OwnershipResult {
    pub fn unknown() -> Self {
        Self {
            owner_type: OwnerType::Unknown,
            reference: None,
            detail: BTreeMap::new(),
        }
    }
}

impl From<Detection> for OwnershipResult {
    fn from(d: Detection) -> Self {
        Self {
            owner_type: d.owner_type,
            reference: d.reference,
            detail: d.detail,
        }
    }
}

/// Priority chain of detectors
#[derive(Clone)]
pub struct OwnershipResolver {
    detectors: Vec<Detector>,
}

impl Default for OwnershipResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl OwnershipResolver {
    /// Resolver with the built-in detector table
    pub fn new() -> Self {
        let mut resolver = Self::empty();
        resolver.register("confighub", 1, detectors::confighub);
        resolver.register("flux-kustomize", 2, detectors::flux_kustomize);
        resolver.register("flux-helm", 2, detectors::flux_helm);
        resolver.register("argocd", 2, detectors::argocd);
        resolver.register("helm", 3, detectors::helm);
        resolver.register("terraform", 3, detectors::terraform);
        resolver.register("native", 4, detectors::native);
        resolver
    }

    /// Resolver without any detectors; everything resolves to Unknown
    pub fn empty() -> Self {
        Self {
            detectors: Vec::new(),
        }
    }

    /// Add a detector; equal priorities keep registration order
    pub fn register(&mut self, name: &'static str, priority: u8, detect: DetectFn) {
        self.detectors.push(Detector {
            name,
            priority,
            detect,
        });
        // stable sort keeps earlier registrations ahead on ties
        self.detectors.sort_by_key(|d| d.priority);
    }

    pub fn detectors(&self) -> impl Iterator<Item = (&'static str, u8)> + '_ {
        self.detectors.iter().map(|d| (d.name, d.priority))
    }

    pub fn resolve(&self, record: &ResourceRecord) -> OwnershipResult {
        self.resolve_input(&DetectorInput::from_record(record))
    }

    pub fn resolve_input(&self, input: &DetectorInput) -> OwnershipResult {
        self.detectors
            .iter()
            .find_map(|d| (d.detect)(input))
            .map(OwnershipResult::from)
            .unwrap_or_else(OwnershipResult::unknown)
    }
}
