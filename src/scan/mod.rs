//! Rule-based anti-pattern scanner
//!
//! Structure:
//! - `definition.rs` - Serialized rule shape
//! - `rule.rs` - Validation and compilation, severity and category enums
//! - `ruleset.rs` - Loading with skip-and-warn semantics, built-in database
//! - `scanner.rs` - Rule execution, finding helpers

mod definition;
mod rule;
mod ruleset;
mod scanner;

pub use definition::{
    ConditionDefinition, DetectionDefinition, RemediationDefinition, ResourceSelectorDefinition,
    RuleDefinition, StuckDefinition,
};
pub use rule::{
    Category, ResourceSelector, Rule, RuleError, Severity, StuckCheck, parse_duration,
};
pub use ruleset::RuleSet;
pub use scanner::{
    Finding, FindingSummary, Scanner, filter_min_severity, sort_findings, summarize,
};
