//! Compiled rules
//!
//! A [`RuleDefinition`] is validated once and compiled into a [`Rule`] whose
//! conditions are parsed path expressions. Compiled rules are read-only for
//! the rest of the run.

use super::definition::{DetectionDefinition, RuleDefinition, StuckDefinition};
use crate::path::{Condition, ConditionError, Operator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Finding severity, ordered `Info < Warning < Critical`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn all() -> &'static [Severity] {
        &[Severity::Critical, Severity::Warning, Severity::Info]
    }

    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(Severity::Info),
            "warning" | "warn" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_case_insensitive(s).ok_or_else(|| format!("Unknown severity: {}", s))
    }
}

/// Closed set of finding categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Source,
    Render,
    Apply,
    Drift,
    Depend,
    State,
    Orphan,
    Config,
    Silent,
    Timing,
    Unresolved,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Source => "SOURCE",
            Category::Render => "RENDER",
            Category::Apply => "APPLY",
            Category::Drift => "DRIFT",
            Category::Depend => "DEPEND",
            Category::State => "STATE",
            Category::Orphan => "ORPHAN",
            Category::Config => "CONFIG",
            Category::Silent => "SILENT",
            Category::Timing => "TIMING",
            Category::Unresolved => "UNRESOLVED",
        }
    }

    pub fn all() -> &'static [Category] {
        &[
            Category::Source,
            Category::Render,
            Category::Apply,
            Category::Drift,
            Category::Depend,
            Category::State,
            Category::Orphan,
            Category::Config,
            Category::Silent,
            Category::Timing,
            Category::Unresolved,
        ]
    }

    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule definition was rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("condition {index}: {source}")]
    InvalidCondition {
        index: usize,
        #[source]
        source: ConditionError,
    },

    #[error("not a rule definition: {0}")]
    Shape(String),
}

/// Which resources a rule applies to
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSelector {
    pub api_version: Option<String>,
    /// `*` matches every kind
    pub kind: String,
    pub label_selector: BTreeMap<String, String>,
}

impl ResourceSelector {
    pub fn is_wildcard(&self) -> bool {
        self.kind == "*"
    }
}

/// Stuck-reconciliation check on a status condition
#[derive(Debug, Clone, PartialEq)]
pub struct StuckCheck {
    pub condition: String,
    pub status: Option<String>,
    pub threshold: Duration,
}

/// A validated, compiled rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub version: Option<String>,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
    pub message: Option<String>,
    pub selectors: Vec<ResourceSelector>,
    pub conditions: Vec<Condition>,
    pub stuck: Option<StuckCheck>,
    pub remediation: String,
    pub references: Vec<String>,
    pub tags: Vec<String>,
}

impl Rule {
    /// Validate and compile a definition
    pub fn compile(def: RuleDefinition) -> Result<Self, RuleError> {
        let id = require_field(def.id, "id")?;
        let name = require_field(def.name, "name")?;

        let severity_text = require_field(def.severity, "severity")?;
        let severity = Severity::from_str_case_insensitive(&severity_text).ok_or_else(|| {
            RuleError::InvalidValue {
                field: "severity",
                message: format!("'{}' is not one of critical, warning, info", severity_text),
            }
        })?;

        let category_text = require_field(def.category, "category")?;
        let category = Category::from_str_case_insensitive(&category_text).ok_or_else(|| {
            RuleError::InvalidValue {
                field: "category",
                message: format!("unknown category '{}'", category_text),
            }
        })?;

        let detection = def.detection.ok_or(RuleError::MissingField("detection"))?;
        let (selectors, conditions, stuck) = compile_detection(detection)?;

        let remediation = def
            .remediation
            .map(|r| {
                let mut text = r.description.unwrap_or_default();
                for (i, step) in r.steps.iter().enumerate() {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&format!("{}. {}", i + 1, step));
                }
                text
            })
            .unwrap_or_default();

        let version = def.version.and_then(|v| match v {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            id,
            name,
            version,
            severity,
            category,
            description: def.description.unwrap_or_default(),
            message: def.message.filter(|m| !m.is_empty()),
            selectors,
            conditions,
            stuck,
            remediation,
            references: def.references,
            tags: def.tags,
        })
    }
}

type CompiledDetection = (Vec<ResourceSelector>, Vec<Condition>, Option<StuckCheck>);

fn compile_detection(detection: DetectionDefinition) -> Result<CompiledDetection, RuleError> {
    if detection.resources.is_empty() {
        return Err(RuleError::MissingField("detection.resources"));
    }
    let mut selectors = Vec::with_capacity(detection.resources.len());
    for resource in detection.resources {
        let kind = require_field(resource.kind, "detection.resources.kind")?;
        selectors.push(ResourceSelector {
            api_version: resource.api_version.filter(|v| !v.is_empty()),
            kind,
            label_selector: resource.label_selector,
        });
    }

    let mut conditions = Vec::with_capacity(detection.conditions.len());
    for (index, cond) in detection.conditions.into_iter().enumerate() {
        let path = require_field(cond.path, "detection.conditions.path")?;
        let op_text = require_field(cond.operator, "detection.conditions.operator")?;
        let operator = Operator::parse(&op_text).ok_or_else(|| RuleError::InvalidValue {
            field: "detection.conditions.operator",
            message: format!("unknown operator '{}'", op_text),
        })?;
        let condition = Condition::new(&path, operator, cond.value)
            .map_err(|source| RuleError::InvalidCondition { index, source })?;
        conditions.push(condition);
    }

    let stuck = detection.stuck.map(compile_stuck).transpose()?;

    if conditions.is_empty() && stuck.is_none() {
        return Err(RuleError::MissingField("detection.conditions"));
    }

    Ok((selectors, conditions, stuck))
}

fn compile_stuck(stuck: StuckDefinition) -> Result<StuckCheck, RuleError> {
    let condition = require_field(stuck.condition, "detection.stuck.condition")?;
    let threshold_text = require_field(stuck.threshold, "detection.stuck.threshold")?;
    let threshold = parse_duration(&threshold_text).map_err(|message| RuleError::InvalidValue {
        field: "detection.stuck.threshold",
        message,
    })?;
    Ok(StuckCheck {
        condition,
        status: stuck.status.filter(|s| !s.is_empty()),
        threshold,
    })
}

fn require_field(value: Option<String>, field: &'static str) -> Result<String, RuleError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RuleError::MissingField(field)),
    }
}

/// Parse duration string (e.g., "30s", "5m", "1h", "2d")
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let value: u64 = number
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", s))?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86400,
        _ => return Err(format!("Invalid duration unit in: {}", s)),
    };
    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("Duration out of range: {}", s))
}
