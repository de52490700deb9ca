//! Query expression tree
//!
//! The tree is immutable after parsing and evaluation is a pure function of
//! (tree, record), so one parsed query can be shared across threads.

use super::QueryTarget;
use regex::Regex;
use std::fmt;

/// Field a predicate reads from a record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field {
    Kind,
    Namespace,
    Name,
    Owner,
    Status,
    Cluster,
    Drift,
    Label(String),
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "kind" => Some(Field::Kind),
            "namespace" | "ns" => Some(Field::Namespace),
            "name" => Some(Field::Name),
            "owner" => Some(Field::Owner),
            "status" => Some(Field::Status),
            "cluster" => Some(Field::Cluster),
            "drift" => Some(Field::Drift),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Kind => f.write_str("kind"),
            Field::Namespace => f.write_str("namespace"),
            Field::Name => f.write_str("name"),
            Field::Owner => f.write_str("owner"),
            Field::Status => f.write_str("status"),
            Field::Cluster => f.write_str("cluster"),
            Field::Drift => f.write_str("drift"),
            Field::Label(key) => write!(f, "labels[{}]", render_value(key)),
        }
    }
}

/// One alternative of an `=` / `!=` list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Exact(String),
    /// Written with a trailing `*`
    Prefix(String),
}

impl Pattern {
    /// Case-insensitive match
    pub fn matches(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        match self {
            Pattern::Exact(expected) => value == expected.to_lowercase(),
            Pattern::Prefix(prefix) => value.starts_with(&prefix.to_lowercase()),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Exact(value) => f.write_str(&render_value(value)),
            Pattern::Prefix(prefix) => write!(f, "{}*", render_value(prefix)),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    /// Any pattern matches
    Equals(Vec<Pattern>),
    /// No pattern matches
    NotEquals(Vec<Pattern>),
    /// Case-sensitive regular expression
    Regex(Regex),
}

#[derive(Debug, Clone)]
pub struct Predicate {
    pub field: Field,
    pub matcher: Matcher,
}

impl Predicate {
    /// `value` is `None` when the record has no such field (e.g. a missing label)
    pub fn eval(&self, value: Option<&str>) -> bool {
        match (&self.matcher, value) {
            (Matcher::Equals(patterns), Some(v)) => patterns.iter().any(|p| p.matches(v)),
            (Matcher::Equals(_), None) => false,
            (Matcher::NotEquals(patterns), Some(v)) => !patterns.iter().any(|p| p.matches(v)),
            (Matcher::NotEquals(_), None) => true,
            (Matcher::Regex(re), Some(v)) => re.is_match(v),
            (Matcher::Regex(_), None) => false,
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.matcher {
            Matcher::Equals(patterns) => write!(f, "{}={}", self.field, join(patterns)),
            Matcher::NotEquals(patterns) => write!(f, "{}!={}", self.field, join(patterns)),
            Matcher::Regex(re) => write!(f, "{}~={}", self.field, render_value(re.as_str())),
        }
    }
}

/// Parsed query: `OR` of `AND`s of predicates
#[derive(Debug, Clone)]
pub enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Predicate(Predicate),
}

impl Expr {
    pub fn eval<T: QueryTarget + ?Sized>(&self, target: &T) -> bool {
        match self {
            Expr::Or(terms) => terms.iter().any(|t| t.eval(target)),
            Expr::And(terms) => terms.iter().all(|t| t.eval(target)),
            Expr::Predicate(p) => p.eval(target.field_value(&p.field)),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Or(terms) => write_joined(f, terms, " OR "),
            Expr::And(terms) => write_joined(f, terms, " AND "),
            Expr::Predicate(p) => write!(f, "{}", p),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, terms: &[Expr], sep: &str) -> fmt::Result {
    for (i, term) in terms.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", term)?;
    }
    Ok(())
}

fn join(patterns: &[Pattern]) -> String {
    patterns
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Quote values that would not survive re-parsing as a bare word
fn render_value(value: &str) -> String {
    let bare = !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '"' | '\'' | '*' | '[' | ']'));
    if bare {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}
