//! One analysis invocation over one snapshot
//!
//! The [`Analyzer`] owns the read-only inputs of a run (detector table,
//! extraction rules, drift detector, rule set) and drives each engine over
//! the snapshot. Every step honours the same cancel token; a cancelled run
//! still returns whatever was computed, flagged partial.
//!
//! Structure:
//! - `record.rs` - `FlatRecord`, the row the query language filters

mod record;

pub use record::FlatRecord;

use crate::config::Config;
use crate::drift::{DriftDetector, DriftResult};
use crate::engine::{AnalysisWarning, CancelToken, EngineError, Outcome, WorkerPool};
use crate::graph::{
    DanglingReference, GraphBuilder, RelationshipEdge, ResourceGraph, SnapshotIndex,
    find_dangling,
};
use crate::models::{OwnerType, ResourceRecord};
use crate::ownership::{OwnershipResolver, OwnershipResult};
use crate::query::{Query, SavedQueries};
use crate::scan::{
    Finding, FindingSummary, RuleSet, Scanner, Severity, filter_min_severity, sort_findings,
    summarize,
};
use crate::snapshot::Snapshot;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Everything one run produced
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub cluster: String,
    pub records: Vec<FlatRecord>,
    pub ownership: BTreeMap<String, OwnershipResult>,
    pub edges: Vec<RelationshipEdge>,
    pub dangling: Vec<DanglingReference>,
    pub drift: BTreeMap<String, DriftResult>,
    /// Sorted by severity, rule id and resource key; filtered by the minimum severity
    pub findings: Vec<Finding>,
    pub summary: FindingSummary,
    pub warnings: Vec<AnalysisWarning>,
    pub partial: bool,
}

impl AnalysisReport {
    pub fn owner_of(&self, key: &str) -> OwnerType {
        self.ownership
            .get(key)
            .map_or(OwnerType::Unknown, |o| o.owner_type)
    }

    /// Flattened records matching `text` after saved-query expansion
    pub fn query(
        &self,
        text: &str,
        saved: &SavedQueries,
        pool: &WorkerPool,
        cancel: &CancelToken,
    ) -> Result<Outcome<&FlatRecord>, EngineError> {
        let query = Query::parse_with(text, saved)?;
        Ok(query.filter(&self.records, pool, cancel))
    }
}

/// Read-only inputs of a run
#[derive(Clone)]
pub struct Analyzer {
    resolver: OwnershipResolver,
    graph: GraphBuilder,
    drift: DriftDetector,
    rules: RuleSet,
    min_severity: Severity,
    pool: WorkerPool,
    now: Option<DateTime<Utc>>,
}

impl Analyzer {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            resolver: OwnershipResolver::new(),
            graph: GraphBuilder::new(),
            drift: DriftDetector::default(),
            rules,
            min_severity: Severity::Info,
            pool: WorkerPool::inline(),
            now: None,
        }
    }

    /// Analyzer configured from the loaded configuration
    ///
    /// Rules listed in `scan.disabledRules` are removed from `rules`.
    pub fn from_config(config: &Config, mut rules: RuleSet) -> Self {
        rules.disable(&config.scan.disabled_rules);
        Self::new(rules)
            .with_workers(config.analysis.workers)
            .with_min_severity(config.scan.min_severity)
            .with_drift_detector(DriftDetector::new(
                &config.drift.annotation,
                &config.drift.ignore_paths,
            ))
    }

    /// Build the worker pool every stage of a run shares
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.pool = WorkerPool::new(workers);
        self
    }

    pub fn with_min_severity(mut self, min: Severity) -> Self {
        self.min_severity = min;
        self
    }

    pub fn with_drift_detector(mut self, drift: DriftDetector) -> Self {
        self.drift = drift;
        self
    }

    pub fn with_resolver(mut self, resolver: OwnershipResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_graph_builder(mut self, graph: GraphBuilder) -> Self {
        self.graph = graph;
        self
    }

    /// Fix the reference time used by stuck-condition rules
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn workers(&self) -> usize {
        self.pool.workers()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Ownership per resource key
    pub fn ownership(
        &self,
        records: &[ResourceRecord],
        cancel: &CancelToken,
    ) -> Outcome<(String, OwnershipResult)> {
        let (items, partial) = self.pool.run(records, cancel, |record| {
            (record.key_string(), self.resolver.resolve(record))
        });
        let mut outcome = Outcome::new(items);
        outcome.partial = partial;
        outcome
    }

    pub fn graph(&self, index: &SnapshotIndex, cancel: &CancelToken) -> ResourceGraph {
        self.graph.build(index, &self.pool, cancel)
    }

    /// Drift per resource key
    ///
    /// A desired-state annotation that is present but unparseable yields a
    /// `DriftNotApplicable` warning next to the not-applicable result.
    pub fn drift(
        &self,
        records: &[ResourceRecord],
        cancel: &CancelToken,
    ) -> Outcome<(String, DriftResult)> {
        let (items, partial) = self.pool.run(records, cancel, |record| {
            let result = self.drift.detect(record);
            let warning = match &result {
                DriftResult::NotApplicable { reason }
                    if record.annotations().contains_key(self.drift.annotation()) =>
                {
                    Some(AnalysisWarning::DriftNotApplicable {
                        resource: record.key_string(),
                        reason: reason.clone(),
                    })
                }
                _ => None,
            };
            ((record.key_string(), result), warning)
        });

        let mut results = Vec::with_capacity(items.len());
        let mut warnings = Vec::new();
        for (result, warning) in items {
            results.push(result);
            warnings.extend(warning);
        }

        let mut outcome = Outcome::new(results).with_warnings(warnings);
        outcome.partial = partial;
        outcome
    }

    /// Findings at or above the minimum severity, sorted
    pub fn scan(&self, index: &SnapshotIndex, cancel: &CancelToken) -> Outcome<Finding> {
        let mut scanner = Scanner::new(&self.rules).with_pool(self.pool.clone());
        if let Some(now) = self.now {
            scanner = scanner.with_now(now);
        }
        let outcome = scanner.scan(index, cancel);

        let mut findings = filter_min_severity(outcome.items, self.min_severity);
        sort_findings(&mut findings);
        Outcome {
            items: findings,
            warnings: outcome.warnings,
            partial: outcome.partial,
        }
    }

    /// Run every engine over the snapshot
    pub fn run(&self, snapshot: &Snapshot, cancel: &CancelToken) -> AnalysisReport {
        let index = SnapshotIndex::new(&snapshot.records);
        tracing::debug!(
            "Analyzing {} resources ({} kinds) with {} workers",
            index.len(),
            index.kinds().count(),
            self.pool.workers()
        );

        let mut warnings = snapshot.warnings.clone();

        let ownership = self.ownership(&snapshot.records, cancel);
        let graph = self.graph(&index, cancel);
        let dangling = find_dangling(&index, &graph);
        let drift = self.drift(&snapshot.records, cancel);
        let findings = self.scan(&index, cancel);

        let partial = ownership.partial || graph.is_partial() || drift.partial || findings.partial;
        warnings.extend(ownership.warnings);
        warnings.extend(drift.warnings);
        warnings.extend(findings.warnings);

        let ownership: BTreeMap<String, OwnershipResult> = ownership.items.into_iter().collect();
        let drift: BTreeMap<String, DriftResult> = drift.items.into_iter().collect();

        let mut finding_counts: HashMap<&str, usize> = HashMap::new();
        for finding in &findings.items {
            *finding_counts.entry(finding.resource_key.as_str()).or_insert(0) += 1;
        }

        let records = snapshot
            .records
            .iter()
            .map(|record| {
                let key = record.key_string();
                FlatRecord::new(
                    &snapshot.cluster,
                    record,
                    ownership.get(&key),
                    drift.get(&key),
                    finding_counts.get(key.as_str()).copied().unwrap_or(0),
                )
            })
            .collect();

        let summary = summarize(&findings.items, |key| {
            ownership
                .get(key)
                .map_or(OwnerType::Unknown, |o| o.owner_type)
        });

        if partial {
            tracing::warn!("Analysis cancelled; report is partial");
        }
        tracing::debug!(
            "Analysis done: {} edges, {} dangling, {} findings, {} warnings",
            graph.len(),
            dangling.len(),
            findings.items.len(),
            warnings.len()
        );

        AnalysisReport {
            cluster: snapshot.cluster.clone(),
            records,
            ownership,
            edges: graph.edges().to_vec(),
            dangling,
            drift,
            findings: findings.items,
            summary,
            warnings,
            partial,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        let records = vec![
            json!({
                "apiVersion": "v1", "kind": "Service",
                "metadata": {"name": "ghost", "namespace": "prod",
                    "labels": {"kustomize.toolkit.fluxcd.io/name": "apps",
                               "kustomize.toolkit.fluxcd.io/namespace": "flux-system"}},
                "spec": {"selector": {"app": "ghost"}}
            }),
            json!({
                "apiVersion": "v1", "kind": "ConfigMap",
                "metadata": {"name": "cfg", "namespace": "prod",
                    "annotations": {"kubectl.kubernetes.io/last-applied-configuration": "{not json"}},
                "data": {"a": "1"}
            }),
        ];
        Snapshot::new(
            "test",
            records
                .into_iter()
                .map(|v| ResourceRecord::from_value(v).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_run_combines_engines() {
        let report = Analyzer::new(RuleSet::new()).run(&snapshot(), &CancelToken::new());
        assert!(!report.partial);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.owner_of("Service:prod:ghost"), OwnerType::Flux);
        assert_eq!(report.owner_of("ConfigMap:prod:cfg"), OwnerType::Unknown);
        assert_eq!(report.dangling.len(), 1);
        assert_eq!(report.warnings.len(), 1);
        assert!(matches!(
            report.warnings[0],
            AnalysisWarning::DriftNotApplicable { .. }
        ));
    }

    #[test]
    fn test_query_over_report() {
        let report = Analyzer::new(RuleSet::new()).run(&snapshot(), &CancelToken::new());
        let saved = SavedQueries::with_builtins();
        let hits = report
            .query("@gitops", &saved, &WorkerPool::new(1), &CancelToken::new())
            .unwrap();
        assert_eq!(hits.items.len(), 1);
        assert_eq!(hits.items[0].kind, "Service");

        let err = report
            .query("owner Flux", &saved, &WorkerPool::new(1), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::UnparseableQuery(_)));
    }

    #[test]
    fn test_cancelled_run_is_partial() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let report = Analyzer::new(RuleSet::builtin().0).run(&snapshot(), &cancel);
        assert!(report.partial);
        assert!(report.findings.is_empty());
    }
}
