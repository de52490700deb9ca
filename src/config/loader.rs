//! Configuration loading and merging logic
//!
//! Precedence order (highest to lowest):
//! 1. Environment variable overrides
//! 2. Root config file
//! 3. Built-in defaults

use super::{paths, schema::Config};
use crate::scan::Severity;
use anyhow::{Context, Result};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    pub fn load() -> Result<Config> {
        let path = paths::root_config_path();
        let config = if path.exists() {
            Self::load_file(&path)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        Ok(Self::apply_env_overrides(config, |key| std::env::var(key).ok()))
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate the config file and the values it carries
    ///
    /// Fails on invalid YAML syntax, invalid value types, saved queries that
    /// do not parse, and rule files that do not exist.
    pub fn validate() -> Result<Config> {
        let config = Self::load().context("Failed to load configuration")?;
        Self::check(&config)?;
        Ok(config)
    }

    /// Semantic checks beyond what serde enforces
    pub fn check(config: &Config) -> Result<()> {
        if config.analysis.workers == 0 {
            return Err(anyhow::anyhow!("analysis.workers must be at least 1"));
        }

        let mut saved = crate::query::SavedQueries::with_builtins();
        saved.merge(&config.queries);
        for name in config.queries.keys() {
            crate::query::Query::parse_with(&format!("@{}", name), &saved)
                .with_context(|| format!("Saved query '{}' is invalid", name))?;
        }

        for path in &config.scan.rule_files {
            if !path.exists() {
                return Err(anyhow::anyhow!(
                    "Rule file does not exist: {}",
                    path.display()
                ));
            }
        }

        Ok(())
    }

    /// Apply environment variable overrides read through `lookup`
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(workers) = lookup("KSCOUT_WORKERS") {
            match workers.parse::<usize>() {
                Ok(n) if n > 0 => config.analysis.workers = n,
                _ => tracing::warn!("Ignoring invalid KSCOUT_WORKERS '{}'", workers),
            }
        }

        if let Some(timeout) = lookup("KSCOUT_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(secs) => config.analysis.timeout_seconds = secs,
                Err(_) => tracing::warn!("Ignoring invalid KSCOUT_TIMEOUT '{}'", timeout),
            }
        }

        if let Some(severity) = lookup("KSCOUT_MIN_SEVERITY") {
            match Severity::from_str_case_insensitive(&severity) {
                Some(s) => config.scan.min_severity = s,
                None => tracing::warn!("Ignoring invalid KSCOUT_MIN_SEVERITY '{}'", severity),
            }
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Save root configuration
    pub fn save_root(config: &Config) -> Result<()> {
        Self::save(config, &paths::root_config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("KSCOUT_WORKERS", "2"),
            ("KSCOUT_TIMEOUT", "30"),
            ("KSCOUT_MIN_SEVERITY", "Critical"),
        ]
        .into_iter()
        .collect();

        let config =
            ConfigLoader::apply_env_overrides(Config::default(), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.analysis.workers, 2);
        assert_eq!(config.analysis.timeout_seconds, 30);
        assert_eq!(config.scan.min_severity, Severity::Critical);
    }

    #[test]
    fn test_invalid_env_overrides_are_ignored() {
        let config = ConfigLoader::apply_env_overrides(Config::default(), |k| match k {
            "KSCOUT_WORKERS" => Some("zero".to_string()),
            "KSCOUT_MIN_SEVERITY" => Some("loud".to_string()),
            _ => None,
        });
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = Config::default();
        config.analysis.workers = 7;
        config
            .queries
            .insert("prod".to_string(), "namespace=prod*".to_string());

        ConfigLoader::save(&config, &path).unwrap();
        let loaded = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_check_rejects_bad_saved_query() {
        let mut config = Config::default();
        config
            .queries
            .insert("broken".to_string(), "owner Flux".to_string());
        assert!(ConfigLoader::check(&config).is_err());

        let mut config = Config::default();
        config.queries.insert("a".to_string(), "@b".to_string());
        config.queries.insert("b".to_string(), "@a".to_string());
        assert!(ConfigLoader::check(&config).is_err());
    }
}
