//! Path expressions over nested values
//!
//! A restricted JSONPath dialect used by the scanner, the graph builder and
//! the drift reporter. Supports:
//! - `field.subfield` - object field access
//! - `['key.with.dots']` - quoted field access
//! - `[n]` - array index
//! - `[*]` - every array element (or object value)
//! - `[?(@.field=="literal")]` - array elements whose field equals a literal
//!
//! Evaluation is lazy and never fails: a missing field or a type mismatch
//! simply contributes no matches.

mod operator;
mod parser;

pub use operator::{Condition, ConditionError, Operator};

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Error raised for syntactically invalid path expressions
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid path at position {position}: {message}")]
pub struct PathError {
    pub position: usize,
    pub message: String,
}

/// One step of a path expression
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
    /// Array elements whose (dotted) `field` equals `literal`
    Filter { field: Vec<String>, literal: Value },
}

impl Segment {
    fn select<'a>(&'a self, value: &'a Value) -> Box<dyn Iterator<Item = &'a Value> + 'a> {
        match self {
            Segment::Field(name) => {
                Box::new(value.as_object().and_then(|o| o.get(name)).into_iter())
            }
            Segment::Index(index) => {
                Box::new(value.as_array().and_then(|a| a.get(*index)).into_iter())
            }
            Segment::Wildcard => match value {
                Value::Array(items) => Box::new(items.iter()),
                Value::Object(map) => Box::new(map.values()),
                _ => Box::new(std::iter::empty()),
            },
            Segment::Filter { field, literal } => match value {
                Value::Array(items) => Box::new(
                    items
                        .iter()
                        .filter(move |item| filter_holds(item, field, literal)),
                ),
                _ => Box::new(std::iter::empty()),
            },
        }
    }
}

fn filter_holds(item: &Value, field: &[String], literal: &Value) -> bool {
    let mut current = item;
    for part in field {
        match current.as_object().and_then(|o| o.get(part)) {
            Some(next) => current = next,
            None => return false,
        }
    }
    scalars_equal(current, literal)
}

/// Equality used by filters and operators: numbers compare numerically
pub(crate) fn scalars_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Parsed path expression
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    source: String,
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn parse(source: &str) -> Result<Self, PathError> {
        let segments = parser::parse(source)?;
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Lazily evaluate the expression against `root`
    pub fn select<'a>(&'a self, root: &'a Value) -> Matches<'a> {
        let mut inner: Box<dyn Iterator<Item = &'a Value> + 'a> =
            Box::new(std::iter::once(root));
        for segment in &self.segments {
            inner = Box::new(inner.flat_map(move |value| segment.select(value)));
        }
        Matches { inner }
    }

    /// First match as a string, if it is one
    pub fn first_str<'a>(&'a self, root: &'a Value) -> Option<&'a str> {
        self.select(root).find_map(|v| v.as_str())
    }
}

impl FromStr for PathExpr {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Lazy, possibly empty sequence of matched values
pub struct Matches<'a> {
    inner: Box<dyn Iterator<Item = &'a Value> + 'a>,
}

impl<'a> Iterator for Matches<'a> {
    type Item = &'a Value;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Append `key` to a rendered location, quoting keys that are not plain names
pub fn render_field(parent: &str, key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    match (parent.is_empty(), plain) {
        (true, true) => key.to_string(),
        (false, true) => format!("{}.{}", parent, key),
        (_, false) => format!("{}['{}']", parent, key.replace('\'', "\\'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_nested_field() {
        let obj = json!({"metadata": {"name": "test", "namespace": "default"}});
        let path = PathExpr::parse("metadata.name").unwrap();
        let matches: Vec<&Value> = path.select(&obj).collect();
        assert_eq!(matches, vec![&json!("test")]);
    }

    #[test]
    fn test_missing_and_mistyped_yield_nothing() {
        let obj = json!({"spec": {"replicas": 3}});
        for path in ["spec.missing", "spec.replicas[0]", "spec.replicas.x", "spec[*].x"] {
            assert_eq!(PathExpr::parse(path).unwrap().select(&obj).count(), 0);
        }
    }

    #[test]
    fn test_wildcard_over_object_values() {
        let obj = json!({"data": {"a": "1", "b": "2"}});
        let path = PathExpr::parse("data[*]").unwrap();
        assert_eq!(path.select(&obj).count(), 2);
    }

    #[test]
    fn test_filter_on_nested_field() {
        let obj = json!({"env": [
            {"name": "A", "valueFrom": {"secretKeyRef": {"name": "s1"}}},
            {"name": "B", "value": "x"}
        ]});
        let path =
            PathExpr::parse(r#"env[?(@.valueFrom.secretKeyRef.name=="s1")].name"#).unwrap();
        assert_eq!(path.first_str(&obj), Some("A"));
    }

    #[test]
    fn test_numeric_filter_literal() {
        let obj = json!({"ports": [{"port": 80.0}, {"port": 443}]});
        let path = PathExpr::parse("ports[?(@.port==80)]").unwrap();
        assert_eq!(path.select(&obj).count(), 1);
    }

    #[test]
    fn test_empty_path_selects_root() {
        let obj = json!({"a": 1});
        assert_eq!(PathExpr::parse("").unwrap().select(&obj).count(), 1);
    }

    #[test]
    fn test_render_field() {
        assert_eq!(render_field("", "spec"), "spec");
        assert_eq!(render_field("spec", "replicas"), "spec.replicas");
        assert_eq!(
            render_field("metadata.labels", "app.kubernetes.io/name"),
            "metadata.labels['app.kubernetes.io/name']"
        );
    }
}
