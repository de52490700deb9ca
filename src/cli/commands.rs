//! Analysis command handlers
//!
//! Each handler loads the snapshot, builds an [`Analyzer`] from the
//! configuration and prints the part of the analysis it was asked for.
//! Handlers return `Ok(false)` when the command succeeded but its failure
//! threshold was reached.

use super::config::ConfigSubcommand;
use super::output::{self, OutputFormat};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use kscout::analysis::{Analyzer, FlatRecord};
use kscout::config::{Config, paths};
use kscout::engine::{AnalysisWarning, CancelToken, EngineError};
use kscout::graph::{RelationshipEdge, SnapshotIndex, find_dangling};
use kscout::query::SavedQueries;
use kscout::scan::{RuleSet, Severity, summarize};
use kscout::snapshot::{
    ClusterSource, FileSource, Snapshot, SnapshotSource, create_client, current_context,
};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Where the snapshot comes from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Snapshot files (YAML or JSON); the live cluster is read when omitted
    #[arg(long = "snapshot", short = 'f', global = true)]
    pub snapshot: Vec<PathBuf>,

    /// Restrict a live listing to one namespace
    #[arg(long, short = 'n', global = true)]
    pub namespace: Option<String>,

    /// Cluster name recorded in the results
    #[arg(long = "cluster-name", global = true)]
    pub cluster_name: Option<String>,
}

/// Options shared by every analysis command
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output format
    #[arg(long, short = 'o', value_enum, default_value = "text", global = true)]
    pub output: OutputFormat,

    /// Worker threads (overrides analysis.workers)
    #[arg(long, global = true)]
    pub workers: Option<usize>,

    /// Deadline in seconds (overrides analysis.timeoutSeconds; 0 = none)
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Fail instead of printing partial results when the run is cancelled
    #[arg(long = "require-complete", global = true)]
    pub require_complete: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show who manages each resource
    Map {
        /// Only show resources matching this query
        #[arg(long, short = 'q')]
        query: Option<String>,
    },
    /// List relationships between resources
    Graph {
        /// Only edges touching this resource key (Kind:namespace:name)
        #[arg(long)]
        resource: Option<String>,
        /// Only edges of this type (e.g. owns, selects, mounts)
        #[arg(long = "type")]
        edge_type: Option<String>,
    },
    /// Report references that do not resolve
    Dangling,
    /// Compare live state against the last-applied desired state
    Drift {
        /// Include resources without drift
        #[arg(long)]
        all: bool,
    },
    /// Run the anti-pattern rules
    Scan {
        /// Additional rule files
        #[arg(long = "rules", short = 'r')]
        rules: Vec<PathBuf>,
        /// Hide findings below this severity
        #[arg(long)]
        min_severity: Option<Severity>,
        /// Exit with status 1 when a finding at or above this severity exists
        #[arg(long)]
        fail_on: Option<Severity>,
        /// Skip the built-in rule database
        #[arg(long)]
        no_builtin: bool,
    },
    /// Filter resources with a query such as `owner=Flux AND namespace=prod*`
    Query {
        /// Query text; `@name` expands saved queries
        expr: String,
    },
    /// Print the complete analysis
    Report,
    /// List loaded rules and rule-loading warnings
    Rules {
        /// Additional rule files
        #[arg(long = "rules", short = 'r')]
        rules: Vec<PathBuf>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Load the snapshot from files or the current kubeconfig context
pub async fn load_snapshot(args: &SourceArgs, config: &Config) -> Result<Snapshot> {
    let cluster = args
        .cluster_name
        .clone()
        .or_else(|| (!config.cluster.is_empty()).then(|| config.cluster.clone()));

    let source: Box<dyn SnapshotSource> = if args.snapshot.is_empty() {
        let client = create_client().await?;
        let name = cluster
            .or_else(current_context)
            .unwrap_or_else(|| "default".to_string());
        Box::new(ClusterSource::new(client, name).with_namespace(args.namespace.clone()))
    } else {
        Box::new(FileSource::new(
            args.snapshot.clone(),
            cluster.unwrap_or_default(),
        ))
    };

    tracing::debug!("Loading snapshot from {}", source.describe());
    source
        .load()
        .await
        .with_context(|| format!("Failed to load snapshot from {}", source.describe()))
}

/// Built-in rules, configured rule files, the rules directory and `extra`
pub fn load_rules(
    config: &Config,
    extra: &[PathBuf],
    builtin: bool,
) -> Result<(RuleSet, Vec<AnalysisWarning>)> {
    let (mut rules, mut warnings) = if builtin && config.scan.builtin_rules {
        RuleSet::builtin()
    } else {
        (RuleSet::new(), Vec::new())
    };

    let mut files: Vec<PathBuf> = config.scan.rule_files.clone();
    files.extend(rules_dir_files());
    files.extend(extra.iter().cloned());

    for path in files {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read rule file {}", path.display()))?;
        warnings.extend(rules.extend_from_yaml_str(&text, &path.display().to_string()));
    }

    tracing::debug!("Loaded {} rules ({} warnings)", rules.len(), warnings.len());
    Ok((rules, warnings))
}

fn rules_dir_files() -> Vec<PathBuf> {
    let dir = paths::rules_dir();
    let Ok(entries) = std::fs::read_dir(&dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "yaml" || e == "yml")
        })
        .collect();
    files.sort();
    files
}

fn saved_queries(config: &Config) -> SavedQueries {
    let mut saved = SavedQueries::with_builtins();
    saved.merge(&config.queries);
    saved
}

/// Cancel token honouring the configured deadline and Ctrl-C
fn cancel_token(config: &Config) -> CancelToken {
    let cancel = CancelToken::from_timeout_secs(config.analysis.timeout_seconds);
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing with partial results");
            handle.cancel();
        }
    });
    cancel
}

fn ensure_complete(strict: bool, partial: bool, stage: &str) -> Result<()> {
    if strict {
        EngineError::check_complete(partial, stage)?;
    }
    Ok(())
}

/// Run one analysis command
pub async fn run_command(command: Command, args: &RunArgs, mut config: Config) -> Result<bool> {
    if let Some(workers) = args.workers {
        config.analysis.workers = workers.max(1);
    }
    if let Some(timeout) = args.timeout {
        config.analysis.timeout_seconds = timeout;
    }
    let format = args.output;
    let strict = args.require_complete;

    let (rule_files, builtin) = match &command {
        Command::Scan {
            rules, no_builtin, ..
        } => (rules.clone(), !no_builtin),
        Command::Rules { rules } => (rules.clone(), true),
        _ => (Vec::new(), true),
    };
    let (rules, rule_warnings) = load_rules(&config, &rule_files, builtin)?;

    if let Command::Rules { .. } = command {
        match format {
            OutputFormat::Json => output::print_json(&serde_json::json!({
                "rules": rules.rules().iter().map(|r| serde_json::json!({
                    "id": r.id,
                    "name": r.name,
                    "severity": r.severity,
                    "category": r.category,
                    "description": r.description,
                })).collect::<Vec<_>>(),
                "warnings": rule_warnings,
            }))?,
            OutputFormat::Text => output::print_rules(rules.rules()),
        }
        output::print_warnings(&rule_warnings);
        return Ok(true);
    }

    let snapshot = load_snapshot(&args.source, &config).await?;
    let cancel = cancel_token(&config);
    let mut analyzer = Analyzer::from_config(&config, rules);
    let saved = saved_queries(&config);

    match command {
        Command::Map { query } => {
            let report = analyzer.run(&snapshot, &cancel);
            ensure_complete(strict, report.partial, "analysis")?;
            let records: Vec<&FlatRecord> = match query {
                Some(text) => {
                    report
                        .query(&text, &saved, analyzer.pool(), &cancel)?
                        .items
                }
                None => report.records.iter().collect(),
            };
            match format {
                OutputFormat::Json => output::print_json(&records)?,
                OutputFormat::Text => output::print_records(&records),
            }
            output::print_warnings(&report.warnings);
            output::print_partial(report.partial);
        }
        Command::Query { expr } => {
            let report = analyzer.run(&snapshot, &cancel);
            let hits = report.query(&expr, &saved, analyzer.pool(), &cancel)?;
            ensure_complete(strict, report.partial || hits.partial, "query")?;
            match format {
                OutputFormat::Json => output::print_json(&hits.items)?,
                OutputFormat::Text => output::print_records(&hits.items),
            }
            output::print_warnings(&report.warnings);
            output::print_partial(report.partial || hits.partial);
        }
        Command::Graph {
            resource,
            edge_type,
        } => {
            let index = SnapshotIndex::new(&snapshot.records);
            let graph = analyzer.graph(&index, &cancel);
            ensure_complete(strict, graph.is_partial(), "graph build")?;
            let edges: Vec<&RelationshipEdge> = graph
                .edges()
                .iter()
                .filter(|e| {
                    resource
                        .as_deref()
                        .is_none_or(|key| e.from == key || e.to == key)
                })
                .filter(|e| {
                    edge_type
                        .as_deref()
                        .is_none_or(|t| e.edge_type.as_str().eq_ignore_ascii_case(t))
                })
                .collect();
            match format {
                OutputFormat::Json => output::print_json(&edges)?,
                OutputFormat::Text => output::print_edges(&edges, &graph.count_by_type()),
            }
            output::print_warnings(&snapshot.warnings);
            output::print_partial(graph.is_partial());
        }
        Command::Dangling => {
            let index = SnapshotIndex::new(&snapshot.records);
            let graph = analyzer.graph(&index, &cancel);
            ensure_complete(strict, graph.is_partial(), "graph build")?;
            let dangling = find_dangling(&index, &graph);
            match format {
                OutputFormat::Json => output::print_json(&dangling)?,
                OutputFormat::Text => output::print_dangling(&dangling),
            }
            output::print_warnings(&snapshot.warnings);
            output::print_partial(graph.is_partial());
        }
        Command::Drift { all } => {
            let mut outcome = analyzer.drift(&snapshot.records, &cancel);
            if strict {
                outcome = outcome.require_complete("drift")?;
            }
            let results: Vec<_> = outcome
                .items
                .into_iter()
                .filter(|(_, result)| all || result.is_drifted())
                .collect();
            match format {
                OutputFormat::Json => {
                    let map: BTreeMap<&str, _> =
                        results.iter().map(|(k, r)| (k.as_str(), r)).collect();
                    output::print_json(&map)?
                }
                OutputFormat::Text => output::print_drift(&results),
            }
            output::print_warnings(&outcome.warnings);
            output::print_partial(outcome.partial);
        }
        Command::Scan {
            min_severity,
            fail_on,
            ..
        } => {
            if let Some(min) = min_severity {
                analyzer = analyzer.with_min_severity(min);
            }
            let index = SnapshotIndex::new(&snapshot.records);
            let ownership = analyzer.ownership(&snapshot.records, &cancel);
            let owners: BTreeMap<String, _> = ownership
                .items
                .into_iter()
                .map(|(key, o)| (key, o.owner_type))
                .collect();
            let mut outcome = analyzer.scan(&index, &cancel);
            if strict {
                outcome = outcome.require_complete("scan")?;
            }
            let summary = summarize(&outcome.items, |key| {
                owners
                    .get(key)
                    .copied()
                    .unwrap_or(kscout::models::OwnerType::Unknown)
            });

            match format {
                OutputFormat::Json => output::print_json(&serde_json::json!({
                    "findings": outcome.items,
                    "summary": summary,
                }))?,
                OutputFormat::Text => output::print_findings(&outcome.items, &summary),
            }
            let mut warnings = rule_warnings;
            warnings.extend(outcome.warnings.iter().cloned());
            output::print_warnings(&warnings);
            output::print_partial(outcome.partial);

            if let Some(threshold) = fail_on {
                if outcome.items.iter().any(|f| f.severity >= threshold) {
                    return Ok(false);
                }
            }
        }
        Command::Report => {
            let report = analyzer.run(&snapshot, &cancel);
            ensure_complete(strict, report.partial, "analysis")?;
            match format {
                OutputFormat::Json => output::print_json(&report)?,
                OutputFormat::Text => {
                    let refs: Vec<&FlatRecord> = report.records.iter().collect();
                    output::print_records(&refs);
                    println!();
                    output::print_dangling(&report.dangling);
                    println!();
                    output::print_findings(&report.findings, &report.summary);
                }
            }
            let mut warnings = rule_warnings;
            warnings.extend(report.warnings.iter().cloned());
            output::print_warnings(&warnings);
            output::print_partial(report.partial);
        }
        Command::Rules { .. } | Command::Config { .. } => {}
    }

    Ok(true)
}
