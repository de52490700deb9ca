//! Configuration tests
//!
//! File loading, environment overrides and semantic validation through the
//! public API.

use kscout::config::{Config, ConfigLoader, get_config_value};
use kscout::drift::LAST_APPLIED_ANNOTATION;
use kscout::scan::Severity;
use std::collections::HashMap;
use std::io::Write;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".yaml")
        .tempfile()
        .unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_config(
        r#"
analysis:
  workers: 2
scan:
  minSeverity: critical
queries:
  prod: namespace=prod*
"#,
    );
    let config = ConfigLoader::load_file(file.path()).unwrap();

    assert_eq!(config.analysis.workers, 2);
    assert_eq!(config.analysis.timeout_seconds, 0);
    assert_eq!(config.scan.min_severity, Severity::Critical);
    assert!(config.scan.builtin_rules);
    assert_eq!(config.drift.annotation, LAST_APPLIED_ANNOTATION);
    assert_eq!(get_config_value(&config, "queries.prod").unwrap(), "namespace=prod*");
    ConfigLoader::check(&config).unwrap();
}

#[test]
fn test_invalid_yaml_reports_path() {
    let file = write_config("analysis: [workers");
    let err = ConfigLoader::load_file(file.path()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
}

#[test]
fn test_env_overrides_beat_file_values() {
    let file = write_config("analysis:\n  workers: 2\n");
    let config = ConfigLoader::load_file(file.path()).unwrap();

    let env: HashMap<&str, &str> = [
        ("KSCOUT_WORKERS", "16"),
        ("KSCOUT_TIMEOUT", "30"),
        ("KSCOUT_MIN_SEVERITY", "Warning"),
    ]
    .into_iter()
    .collect();
    let config =
        ConfigLoader::apply_env_overrides(config, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(config.analysis.workers, 16);
    assert_eq!(config.analysis.timeout_seconds, 30);
    assert_eq!(config.scan.min_severity, Severity::Warning);
}

#[test]
fn test_check_rejects_missing_rule_file_and_bad_query() {
    let mut config = Config::default();
    config.scan.rule_files = vec!["/nonexistent/kscout/rules.yaml".into()];
    assert!(ConfigLoader::check(&config).is_err());

    let mut config = Config::default();
    config
        .queries
        .insert("broken".to_string(), "owner Flux".to_string());
    assert!(ConfigLoader::check(&config).is_err());
}

#[test]
fn test_saved_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.yaml");

    let mut config = Config::default();
    config.cluster = "prod-eu".to_string();
    config.scan.disabled_rules = vec!["image-latest-tag".to_string()];
    ConfigLoader::save(&config, &path).unwrap();

    assert_eq!(ConfigLoader::load_file(&path).unwrap(), config);
}
