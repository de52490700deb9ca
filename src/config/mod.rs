//! Configuration system for kscout
//!
//! A single YAML file layered over built-in defaults and overridden by
//! `KSCOUT_*` environment variables.
//!
//! Structure:
//! - `schema.rs` - Serde schema with per-field defaults
//! - `loader.rs` - Loading, env overrides, validation, saving
//! - `paths.rs` - Platform directories

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AnalysisConfig, Config, DriftConfig, ScanConfig};

use crate::scan::Severity;
use anyhow::Context;
use std::path::PathBuf;

/// Keys accepted by [`get_config_value`] and [`set_config_value`]
pub const CONFIG_KEYS: &[&str] = &[
    "cluster",
    "analysis.workers",
    "analysis.timeoutSeconds",
    "drift.annotation",
    "drift.ignorePaths",
    "scan.minSeverity",
    "scan.disabledRules",
    "scan.builtinRules",
    "scan.ruleFiles",
];

/// Get a configuration value by key (dot notation)
///
/// `queries.<name>` reads a saved query.
pub fn get_config_value(config: &Config, key: &str) -> anyhow::Result<String> {
    if let Some(name) = key.strip_prefix("queries.") {
        return config
            .queries
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No saved query named '{}'", name));
    }

    match key {
        "cluster" => Ok(config.cluster.clone()),
        "analysis.workers" => Ok(config.analysis.workers.to_string()),
        "analysis.timeoutSeconds" => Ok(config.analysis.timeout_seconds.to_string()),
        "drift.annotation" => Ok(config.drift.annotation.clone()),
        "drift.ignorePaths" => Ok(config.drift.ignore_paths.join(",")),
        "scan.minSeverity" => Ok(config.scan.min_severity.to_string()),
        "scan.disabledRules" => Ok(config.scan.disabled_rules.join(",")),
        "scan.builtinRules" => Ok(config.scan.builtin_rules.to_string()),
        "scan.ruleFiles" => Ok(config
            .scan
            .rule_files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",")),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key (dot notation)
///
/// List values are comma-separated. `queries.<name>` stores a saved query;
/// an empty value removes it.
pub fn set_config_value(config: &mut Config, key: &str, value: &str) -> anyhow::Result<()> {
    if let Some(name) = key.strip_prefix("queries.") {
        if name.is_empty() {
            return Err(anyhow::anyhow!("Saved query name must not be empty"));
        }
        if value.is_empty() {
            config.queries.remove(name);
        } else {
            crate::query::Query::parse(value)
                .or_else(|_| {
                    let mut saved = crate::query::SavedQueries::with_builtins();
                    saved.merge(&config.queries);
                    crate::query::Query::parse_with(value, &saved)
                })
                .with_context(|| format!("Invalid query for '{}'", key))?;
            config.queries.insert(name.to_string(), value.to_string());
        }
        return Ok(());
    }

    match key {
        "cluster" => {
            config.cluster = value.to_string();
        }
        "analysis.workers" => {
            let workers: usize = value
                .parse()
                .context("analysis.workers must be a number")?;
            if workers == 0 {
                return Err(anyhow::anyhow!("analysis.workers must be at least 1"));
            }
            config.analysis.workers = workers;
        }
        "analysis.timeoutSeconds" => {
            config.analysis.timeout_seconds = value
                .parse()
                .context("analysis.timeoutSeconds must be a number")?;
        }
        "drift.annotation" => {
            if value.is_empty() {
                return Err(anyhow::anyhow!("drift.annotation must not be empty"));
            }
            config.drift.annotation = value.to_string();
        }
        "drift.ignorePaths" => {
            config.drift.ignore_paths = split_list(value);
        }
        "scan.minSeverity" => {
            config.scan.min_severity = Severity::from_str_case_insensitive(value)
                .ok_or_else(|| {
                    anyhow::anyhow!("scan.minSeverity must be one of info, warning, critical")
                })?;
        }
        "scan.disabledRules" => {
            config.scan.disabled_rules = split_list(value);
        }
        "scan.builtinRules" => {
            config.scan.builtin_rules = value
                .parse()
                .context("scan.builtinRules must be 'true' or 'false'")?;
        }
        "scan.ruleFiles" => {
            config.scan.rule_files = split_list(value).into_iter().map(PathBuf::from).collect();
        }
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
