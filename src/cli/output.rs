//! Plain-text and JSON rendering

use anyhow::{Context, Result};
use clap::ValueEnum;
use kscout::analysis::FlatRecord;
use kscout::drift::DriftResult;
use kscout::engine::AnalysisWarning;
use kscout::graph::{DanglingReference, EdgeType, RelationshipEdge};
use kscout::scan::{Finding, FindingSummary, Rule};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", text);
    Ok(())
}

pub fn print_records(records: &[&FlatRecord]) {
    if records.is_empty() {
        println!("No matching resources");
        return;
    }
    println!(
        "{:<50} {:<10} {:<40} {:<10} {:<15} {}",
        "RESOURCE", "OWNER", "REF", "STATUS", "DRIFT", "FINDINGS"
    );
    for r in records {
        println!(
            "{:<50} {:<10} {:<40} {:<10} {:<15} {}",
            r.key,
            r.owner.as_str(),
            r.owner_ref.as_deref().unwrap_or("-"),
            r.status.as_str(),
            r.drift,
            r.findings
        );
    }
}

pub fn print_edges(edges: &[&RelationshipEdge], totals: &BTreeMap<EdgeType, usize>) {
    if edges.is_empty() {
        println!("No relationships");
    }
    for edge in edges {
        println!("{}", edge);
    }

    let total: usize = totals.values().sum();
    let by_type: Vec<String> = totals
        .iter()
        .map(|(edge_type, n)| format!("{} {}", n, edge_type))
        .collect();
    println!();
    println!("{} edges in graph ({})", total, by_type.join(", "));
}

pub fn print_dangling(dangling: &[DanglingReference]) {
    if dangling.is_empty() {
        println!("No dangling references");
        return;
    }
    for d in dangling {
        println!("{} -> {} ({})", d.source_key, d.target_description, d.reason);
        println!("    {}", d.suggestion);
    }
}

pub fn print_drift(results: &[(String, DriftResult)]) {
    if results.is_empty() {
        println!("No drift");
        return;
    }
    for (key, result) in results {
        println!("{} [{}]", key, result.status());
        match result {
            DriftResult::NotApplicable { reason } => println!("    {}", reason),
            DriftResult::NoDrift => {}
            DriftResult::Drifted { changes } => {
                for change in changes {
                    println!(
                        "    {:<8} {}: {} -> {}",
                        change.kind.to_string(),
                        change.path,
                        render_value(change.desired.as_ref()),
                        render_value(change.live.as_ref())
                    );
                }
            }
        }
    }
}

pub fn print_findings(findings: &[Finding], summary: &FindingSummary) {
    if findings.is_empty() {
        println!("No findings");
        return;
    }
    for f in findings {
        println!(
            "[{}] {} {} {}",
            f.severity.as_str().to_uppercase(),
            f.category,
            f.rule_id,
            f.resource_key
        );
        println!("    {}", f.message);
        if !f.remediation.is_empty() {
            for line in f.remediation.lines() {
                println!("    > {}", line);
            }
        }
    }

    println!();
    let by_severity: Vec<String> = summary
        .by_severity
        .iter()
        .rev()
        .map(|(s, n)| format!("{} {}", n, s))
        .collect();
    println!("{} findings ({})", summary.total, by_severity.join(", "));
}

pub fn print_rules(rules: &[Rule]) {
    println!("{:<40} {:<9} {:<11} {}", "ID", "SEVERITY", "CATEGORY", "NAME");
    for rule in rules {
        println!(
            "{:<40} {:<9} {:<11} {}",
            rule.id,
            rule.severity.as_str(),
            rule.category.as_str(),
            rule.name
        );
    }
}

/// Warnings go to stderr so JSON on stdout stays parseable
pub fn print_warnings(warnings: &[AnalysisWarning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("Completed with {} warnings:", warnings.len());
    for warning in warnings {
        eprintln!("  - {}", warning);
    }
}

pub fn print_partial(partial: bool) {
    if partial {
        eprintln!("Run was cancelled before completion; results are partial");
    }
}

fn render_value(value: Option<&serde_json::Value>) -> String {
    match value {
        None => "<absent>".to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
