//! Configuration schema definitions
//!
//! Defines the structure of the configuration file using serde. Every field
//! is defaulted so a partial file is always valid.

use crate::drift::LAST_APPLIED_ANNOTATION;
use crate::scan::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Cluster name recorded in flattened records; empty means "from the snapshot"
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub drift: DriftConfig,

    #[serde(default)]
    pub scan: ScanConfig,

    /// Saved queries, merged over the built-in ones
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub queries: BTreeMap<String, String>,
}

/// Worker pool and deadline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// 1 runs inline on the calling thread
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// 0 disables the deadline
    #[serde(default)]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DriftConfig {
    /// Annotation holding the desired-state document
    #[serde(default = "default_drift_annotation")]
    pub annotation: String,

    /// Paths ignored in addition to the built-in deny list
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default = "default_min_severity")]
    pub min_severity: Severity,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disabled_rules: Vec<String>,

    /// Load the embedded rule database
    #[serde(default = "default_true")]
    pub builtin_rules: bool,

    /// Additional rule files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_files: Vec<PathBuf>,
}

// Default value functions
fn default_workers() -> usize {
    4
}

fn default_drift_annotation() -> String {
    LAST_APPLIED_ANNOTATION.to_string()
}

fn default_min_severity() -> Severity {
    Severity::Info
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_seconds: 0,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            annotation: default_drift_annotation(),
            ignore_paths: Vec::new(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            min_severity: default_min_severity(),
            disabled_rules: Vec::new(),
            builtin_rules: default_true(),
            rule_files: Vec::new(),
        }
    }
}
