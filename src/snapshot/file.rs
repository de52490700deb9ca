//! Snapshot files on disk

use super::{Snapshot, SnapshotSource};
use anyhow::Context;
use async_trait::async_trait;
use std::path::PathBuf;

/// One or more YAML/JSON files merged into a single snapshot
#[derive(Debug, Clone)]
pub struct FileSource {
    paths: Vec<PathBuf>,
    cluster: String,
}

impl FileSource {
    pub fn new(paths: Vec<PathBuf>, cluster: impl Into<String>) -> Self {
        Self {
            paths,
            cluster: cluster.into(),
        }
    }

    /// Read and parse synchronously
    pub fn load_blocking(&self) -> anyhow::Result<Snapshot> {
        let mut snapshot = Snapshot::new(self.cluster.clone(), Vec::new());

        for path in &self.paths {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read snapshot file {}", path.display()))?;

            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            let part = if is_json {
                Snapshot::from_json_str(&self.cluster, &text)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            } else {
                Snapshot::from_yaml_str(&self.cluster, &text)
            };

            tracing::debug!("Read {} records from {}", part.len(), path.display());
            snapshot.records.extend(part.records);
            snapshot.warnings.extend(part.warnings);
        }

        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    fn describe(&self) -> String {
        let names: Vec<String> = self.paths.iter().map(|p| p.display().to_string()).collect();
        format!("files {}", names.join(", "))
    }

    async fn load(&self) -> anyhow::Result<Snapshot> {
        let source = self.clone();
        tokio::task::spawn_blocking(move || source.load_blocking())
            .await
            .context("Snapshot loader task failed")?
    }
}
