//! Snapshot loading
//!
//! A snapshot is the immutable input of one analysis run: the cluster name
//! and the records that were listed or read from disk. Documents that cannot
//! be normalized become `SkippedDocument` warnings and the rest still load.
//!
//! Structure:
//! - `file.rs` - YAML/JSON files (`kubectl get -o yaml` output, multi-doc manifests)
//! - `cluster.rs` - Live listing through kube-rs

mod cluster;
mod file;

pub use cluster::{ClusterSource, create_client, current_context, default_resources};
pub use file::FileSource;

use crate::engine::AnalysisWarning;
use crate::models::ResourceRecord;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Errors raised while reading a snapshot document as a whole
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Failed to parse snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Snapshot JSON must be an object or a list, found {0}")]
    UnexpectedShape(&'static str),
}

/// One immutable set of records
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub cluster: String,
    pub records: Vec<ResourceRecord>,
    /// Documents skipped while loading
    pub warnings: Vec<AnalysisWarning>,
}

impl Snapshot {
    pub fn new(cluster: impl Into<String>, records: Vec<ResourceRecord>) -> Self {
        Self {
            cluster: cluster.into(),
            records,
            warnings: Vec::new(),
        }
    }

    /// Load `---` separated YAML documents; `kind: List` documents are unwrapped
    pub fn from_yaml_str(cluster: &str, text: &str) -> Self {
        let mut loader = Loader::default();
        for document in serde_yaml::Deserializer::from_str(text) {
            match Value::deserialize(document) {
                Ok(value) => loader.push(value),
                Err(e) => loader.skip(format!("invalid YAML: {}", e)),
            }
        }
        loader.finish(cluster)
    }

    /// Load a JSON object, `List` object or array of objects
    pub fn from_json_str(cluster: &str, text: &str) -> Result<Self, SnapshotError> {
        let value: Value = serde_json::from_str(text)?;
        if !value.is_object() && !value.is_array() {
            return Err(SnapshotError::UnexpectedShape(json_type(&value)));
        }
        let mut loader = Loader::default();
        loader.push(value);
        Ok(loader.finish(cluster))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Producer of snapshots: files, a live cluster, or a test double
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Human-readable origin for log lines
    fn describe(&self) -> String;

    async fn load(&self) -> anyhow::Result<Snapshot>;
}

#[derive(Default)]
struct Loader {
    records: Vec<ResourceRecord>,
    warnings: Vec<AnalysisWarning>,
    index: usize,
}

impl Loader {
    fn push(&mut self, value: Value) {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    self.push(item);
                }
            }
            Value::Object(_) if is_list(&value) => {
                if let Some(Value::Array(items)) = value.get("items") {
                    for item in items.clone() {
                        self.push(item);
                    }
                }
            }
            other => {
                match ResourceRecord::from_value(other) {
                    Ok(record) => self.records.push(record),
                    Err(e) => self.skip(e.to_string()),
                }
                self.index += 1;
            }
        }
    }

    fn skip(&mut self, reason: String) {
        tracing::warn!("Skipping snapshot document {}: {}", self.index, reason);
        self.warnings.push(AnalysisWarning::SkippedDocument {
            index: self.index,
            reason,
        });
    }

    fn finish(self, cluster: &str) -> Snapshot {
        tracing::debug!(
            "Loaded {} records ({} skipped)",
            self.records.len(),
            self.warnings.len()
        );
        Snapshot {
            cluster: cluster.to_string(),
            records: self.records,
            warnings: self.warnings,
        }
    }
}

fn is_list(value: &Value) -> bool {
    value
        .get("kind")
        .and_then(|k| k.as_str())
        .is_some_and(|k| k == "List" || k.ends_with("List"))
        && value.get("items").is_some_and(|i| i.is_array())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
