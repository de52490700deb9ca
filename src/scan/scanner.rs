//! Rule execution
//!
//! Rules run independently of each other, so the scanner fans out per rule
//! over the worker pool. Candidates come from the kind index; a rule never
//! walks the whole snapshot unless it selects the `*` kind.

use super::rule::{Category, ResourceSelector, Rule, Severity, StuckCheck};
use super::ruleset::RuleSet;
use crate::engine::{CancelToken, Outcome, WorkerPool};
use crate::graph::{SnapshotIndex, selector_matches};
use crate::models::{OwnerType, ResourceRecord, find_condition};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One rule matched against one resource
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub rule_name: String,
    pub severity: Severity,
    pub category: Category,
    pub resource_key: String,
    pub message: String,
    pub remediation: String,
}

/// Runs a rule set against a snapshot index
pub struct Scanner<'r> {
    rules: &'r RuleSet,
    pool: WorkerPool,
    now: DateTime<Utc>,
}

impl<'r> Scanner<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        Self {
            rules,
            pool: WorkerPool::inline(),
            now: Utc::now(),
        }
    }

    pub fn with_workers(self, workers: usize) -> Self {
        self.with_pool(WorkerPool::new(workers))
    }

    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = pool;
        self
    }

    /// Reference time for stuck-condition thresholds
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn scan(&self, index: &SnapshotIndex, cancel: &CancelToken) -> Outcome<Finding> {
        self.scan_with(index, cancel, |_| {})
    }

    /// Like [`Scanner::scan`], calling `on_rule_done` after each rule finishes
    pub fn scan_with<F>(
        &self,
        index: &SnapshotIndex,
        cancel: &CancelToken,
        on_rule_done: F,
    ) -> Outcome<Finding>
    where
        F: Fn(&Rule) + Sync,
    {
        let (per_rule, partial) = self.pool.run(self.rules.rules(), cancel, |rule| {
            let findings = self.run_rule(rule, index);
            on_rule_done(rule);
            findings
        });

        let findings: Vec<Finding> = per_rule.into_iter().flatten().collect();
        if partial {
            tracing::warn!("Scan cancelled; returning {} findings", findings.len());
        }
        tracing::debug!(
            "Scanned {} rules over {} resources: {} findings",
            self.rules.len(),
            index.len(),
            findings.len()
        );

        let mut outcome = Outcome::new(findings);
        outcome.partial = partial;
        outcome
    }

    fn run_rule(&self, rule: &Rule, index: &SnapshotIndex) -> Vec<Finding> {
        let mut seen = HashSet::new();
        let mut findings = Vec::new();

        for selector in &rule.selectors {
            let candidates: Box<dyn Iterator<Item = &ResourceRecord> + '_> =
                if selector.is_wildcard() {
                    Box::new(index.records().iter())
                } else {
                    Box::new(index.by_kind(&selector.kind))
                };

            for record in candidates.filter(|r| selects(selector, r)) {
                if !seen.insert(record.key_string()) {
                    continue;
                }
                if !rule.conditions.iter().all(|c| c.holds(record.body())) {
                    continue;
                }
                let stuck_for = match &rule.stuck {
                    Some(check) => match stuck_duration(check, record, self.now) {
                        Some(duration) => Some(duration),
                        None => continue,
                    },
                    None => None,
                };
                findings.push(finding(rule, record, stuck_for));
            }
        }

        findings
    }
}

fn selects(selector: &ResourceSelector, record: &ResourceRecord) -> bool {
    if selector
        .api_version
        .as_deref()
        .is_some_and(|v| v != record.api_version())
    {
        return false;
    }
    selector_matches(&selector.label_selector, record.labels())
}

/// How long the check's condition has been stuck, if past the threshold
fn stuck_duration(
    check: &StuckCheck,
    record: &ResourceRecord,
    now: DateTime<Utc>,
) -> Option<chrono::Duration> {
    let condition = find_condition(record.body(), &check.condition)?;
    let status = condition.get("status").and_then(|s| s.as_str())?;
    let stuck = match &check.status {
        Some(expected) => status == expected,
        None => status != "True",
    };
    if !stuck {
        return None;
    }

    let since = condition
        .get("lastTransitionTime")
        .and_then(|t| t.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())?
        .with_timezone(&Utc);
    let elapsed = now.signed_duration_since(since);
    let threshold = chrono::Duration::from_std(check.threshold).ok()?;
    (elapsed > threshold).then_some(elapsed)
}

fn finding(rule: &Rule, record: &ResourceRecord, stuck_for: Option<chrono::Duration>) -> Finding {
    let mut message = match &rule.message {
        Some(template) => template
            .replace("{kind}", record.kind())
            .replace("{namespace}", record.namespace())
            .replace("{name}", record.name()),
        None => format!("{}: {}", rule.name, describe(record)),
    };
    if let Some(elapsed) = stuck_for {
        message.push_str(&format!(" (for {})", format_elapsed(elapsed)));
    }

    Finding {
        rule_id: rule.id.clone(),
        rule_name: rule.name.clone(),
        severity: rule.severity,
        category: rule.category,
        resource_key: record.key_string(),
        message,
        remediation: rule.remediation.clone(),
    }
}

fn describe(record: &ResourceRecord) -> String {
    if record.namespace().is_empty() {
        format!("{} {}", record.kind(), record.name())
    } else {
        format!("{} {}/{}", record.kind(), record.namespace(), record.name())
    }
}

fn format_elapsed(elapsed: chrono::Duration) -> String {
    let secs = elapsed.num_seconds();
    if secs >= 86400 {
        format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
    } else if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// Sort by severity (highest first), then rule id, then resource key
pub fn sort_findings(findings: &mut [Finding]) {
    findings.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| a.rule_id.cmp(&b.rule_id))
            .then_with(|| a.resource_key.cmp(&b.resource_key))
    });
}

/// Keep findings at or above `min`
pub fn filter_min_severity(findings: Vec<Finding>, min: Severity) -> Vec<Finding> {
    findings.into_iter().filter(|f| f.severity >= min).collect()
}

/// Counts handed to exporters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindingSummary {
    pub total: usize,
    pub by_severity: BTreeMap<Severity, usize>,
    pub by_category: BTreeMap<Category, usize>,
    pub by_owner: BTreeMap<OwnerType, usize>,
}

/// Summarize findings; `owner_of` maps a resource key to its owner
pub fn summarize<F>(findings: &[Finding], owner_of: F) -> FindingSummary
where
    F: Fn(&str) -> OwnerType,
{
    let mut summary = FindingSummary {
        total: findings.len(),
        ..Default::default()
    };
    for finding in findings {
        *summary.by_severity.entry(finding.severity).or_insert(0) += 1;
        *summary.by_category.entry(finding.category).or_insert(0) += 1;
        *summary
            .by_owner
            .entry(owner_of(&finding.resource_key))
            .or_insert(0) += 1;
    }
    summary
}
