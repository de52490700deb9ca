//! Condition operators
//!
//! An operator consumes the match sequence produced by a path expression.
//! Absent or mistyped data never raises: it simply makes a positive
//! operator false.

use super::{PathError, PathExpr, scalars_equal};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Closed set of condition operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Exists,
    NotExists,
    Equals,
    NotEquals,
    Contains,
    NotContains,
    Matches,
    GreaterThan,
    LessThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Exists => "exists",
            Operator::NotExists => "not_exists",
            Operator::Equals => "equals",
            Operator::NotEquals => "not_equals",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::Matches => "matches",
            Operator::GreaterThan => "greater_than",
            Operator::LessThan => "less_than",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exists" => Some(Operator::Exists),
            "not_exists" => Some(Operator::NotExists),
            "equals" => Some(Operator::Equals),
            "not_equals" => Some(Operator::NotEquals),
            "contains" => Some(Operator::Contains),
            "not_contains" => Some(Operator::NotContains),
            "matches" => Some(Operator::Matches),
            "greater_than" => Some(Operator::GreaterThan),
            "less_than" => Some(Operator::LessThan),
            _ => None,
        }
    }

    /// Whether the operator needs an expected value
    pub fn requires_value(&self) -> bool {
        !matches!(self, Operator::Exists | Operator::NotExists)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasons a condition cannot be compiled
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConditionError {
    #[error(transparent)]
    InvalidPath(#[from] PathError),

    #[error("operator '{0}' requires a value")]
    MissingValue(Operator),

    #[error("invalid regular expression: {0}")]
    InvalidPattern(String),
}

/// Compiled `path OP value` test
#[derive(Debug, Clone)]
pub struct Condition {
    path: PathExpr,
    operator: Operator,
    expected: Option<Value>,
    pattern: Option<Regex>,
    threshold: Option<f64>,
}

impl Condition {
    pub fn new(
        path: &str,
        operator: Operator,
        expected: Option<Value>,
    ) -> Result<Self, ConditionError> {
        let path = PathExpr::parse(path)?;

        if operator.requires_value() && expected.is_none() {
            return Err(ConditionError::MissingValue(operator));
        }

        let pattern = match (operator, expected.as_ref()) {
            (Operator::Matches, Some(value)) => Some(
                Regex::new(&stringify(value))
                    .map_err(|e| ConditionError::InvalidPattern(e.to_string()))?,
            ),
            _ => None,
        };

        // A non-numeric threshold leaves the comparison permanently false
        let threshold = match (operator, expected.as_ref()) {
            (Operator::GreaterThan | Operator::LessThan, Some(value)) => numeric(value),
            _ => None,
        };

        Ok(Self {
            path,
            operator,
            expected,
            pattern,
            threshold,
        })
    }

    pub fn path(&self) -> &PathExpr {
        &self.path
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn expected(&self) -> Option<&Value> {
        self.expected.as_ref()
    }

    /// Evaluate against a value tree
    ///
    /// Multi-match semantics: `equals`, `contains`, `matches` and the
    /// numeric comparisons hold when any match satisfies them;
    /// `not_equals` holds when every match differs (vacuously true when
    /// nothing matches); `not_contains` is the negation of `contains`.
    pub fn holds(&self, root: &Value) -> bool {
        let mut matches = self.path.select(root);
        match self.operator {
            Operator::Exists => matches.any(|v| !v.is_null()),
            Operator::NotExists => !matches.any(|v| !v.is_null()),
            Operator::Equals => matches.any(|v| self.equals_expected(v)),
            Operator::NotEquals => matches.all(|v| !self.equals_expected(v)),
            Operator::Contains => matches.any(|v| self.contains_expected(v)),
            Operator::NotContains => !matches.any(|v| self.contains_expected(v)),
            Operator::Matches => match &self.pattern {
                Some(re) => matches.any(|v| !v.is_null() && re.is_match(&stringify(v))),
                None => false,
            },
            Operator::GreaterThan => match self.threshold {
                Some(t) => matches.any(|v| numeric(v).is_some_and(|n| n > t)),
                None => false,
            },
            Operator::LessThan => match self.threshold {
                Some(t) => matches.any(|v| numeric(v).is_some_and(|n| n < t)),
                None => false,
            },
        }
    }

    fn equals_expected(&self, value: &Value) -> bool {
        let Some(expected) = &self.expected else {
            return false;
        };
        if scalars_equal(value, expected) {
            return true;
        }
        // "3" vs 3, "true" vs true: compare scalar renderings
        is_scalar(value) && is_scalar(expected) && stringify(value) == stringify(expected)
    }

    fn contains_expected(&self, value: &Value) -> bool {
        let Some(expected) = &self.expected else {
            return false;
        };
        match value {
            Value::String(s) => s.contains(stringify(expected).as_str()),
            Value::Array(items) => items
                .iter()
                .any(|item| scalars_equal(item, expected) || item.as_str() == expected.as_str()),
            Value::Object(map) => expected.as_str().is_some_and(|key| map.contains_key(key)),
            _ => false,
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// String form used by `matches` and substring tests
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cond(path: &str, op: Operator, value: Option<Value>) -> Condition {
        Condition::new(path, op, value).unwrap()
    }

    #[test]
    fn test_exists_ignores_null() {
        let obj = json!({"spec": {"a": null, "b": 1}});
        assert!(!cond("spec.a", Operator::Exists, None).holds(&obj));
        assert!(cond("spec.a", Operator::NotExists, None).holds(&obj));
        assert!(cond("spec.b", Operator::Exists, None).holds(&obj));
    }

    #[test]
    fn test_equals_any_match_not_equals_all_differ() {
        let obj = json!({"c": [{"image": "a"}, {"image": "b"}]});
        assert!(cond("c[*].image", Operator::Equals, Some(json!("b"))).holds(&obj));
        assert!(!cond("c[*].image", Operator::NotEquals, Some(json!("b"))).holds(&obj));
        assert!(cond("c[*].image", Operator::NotEquals, Some(json!("z"))).holds(&obj));
        // nothing matched: every (zero) match differs
        assert!(cond("missing", Operator::NotEquals, Some(json!("z"))).holds(&obj));
    }

    #[test]
    fn test_equals_compares_scalar_renderings() {
        let obj = json!({"spec": {"replicas": 3, "prune": false}});
        assert!(cond("spec.replicas", Operator::Equals, Some(json!("3"))).holds(&obj));
        assert!(cond("spec.prune", Operator::Equals, Some(json!(false))).holds(&obj));
        assert!(cond("spec.prune", Operator::Equals, Some(json!("false"))).holds(&obj));
    }

    #[test]
    fn test_contains_substring_and_membership() {
        let obj = json!({"args": ["--port=6379", "--save"], "image": "redis:7.2"});
        assert!(cond("image", Operator::Contains, Some(json!("redis"))).holds(&obj));
        assert!(cond("args", Operator::Contains, Some(json!("--save"))).holds(&obj));
        assert!(cond("args", Operator::NotContains, Some(json!("--maxmemory"))).holds(&obj));
    }

    #[test]
    fn test_matches_regex() {
        let obj = json!({"image": "nginx:latest"});
        assert!(cond("image", Operator::Matches, Some(json!(":latest$"))).holds(&obj));
        assert!(!cond("image", Operator::Matches, Some(json!("^redis"))).holds(&obj));
    }

    #[test]
    fn test_numeric_comparisons_false_on_non_numeric() {
        let obj = json!({"a": 5, "b": "7", "c": "lots"});
        assert!(cond("a", Operator::GreaterThan, Some(json!(3))).holds(&obj));
        assert!(cond("b", Operator::LessThan, Some(json!("10"))).holds(&obj));
        assert!(!cond("c", Operator::GreaterThan, Some(json!(1))).holds(&obj));
        assert!(!cond("c", Operator::LessThan, Some(json!(1))).holds(&obj));
    }

    #[test]
    fn test_non_numeric_threshold_compiles_and_never_holds() {
        let obj = json!({"a": 5});
        let gt = cond("a", Operator::GreaterThan, Some(json!("many")));
        let lt = cond("a", Operator::LessThan, Some(json!("few")));
        assert!(!gt.holds(&obj));
        assert!(!lt.holds(&obj));
    }

    #[test]
    fn test_compile_errors() {
        assert_eq!(
            Condition::new("a", Operator::Equals, None).unwrap_err(),
            ConditionError::MissingValue(Operator::Equals)
        );
        assert!(matches!(
            Condition::new("a", Operator::Matches, Some(json!("(unclosed"))).unwrap_err(),
            ConditionError::InvalidPattern(_)
        ));
        assert!(matches!(
            Condition::new("a..b", Operator::Exists, None).unwrap_err(),
            ConditionError::InvalidPath(_)
        ));
    }

    #[test]
    fn test_operator_serde_names() {
        let op: Operator = serde_json::from_value(json!("not_exists")).unwrap();
        assert_eq!(op, Operator::NotExists);
        assert_eq!(Operator::parse("greater_than"), Some(Operator::GreaterThan));
        assert_eq!(Operator::parse("bogus"), None);
    }
}
