//! Query language over flattened resource records
//!
//! Structure:
//! - `ast.rs` - Expression tree, evaluation and canonical rendering
//! - `parser.rs` - Recursive-descent parser
//! - `saved.rs` - Named queries and `@name` expansion

mod ast;
mod parser;
mod saved;

pub use ast::{Expr, Field, Matcher, Pattern, Predicate};
pub use saved::SavedQueries;

use crate::engine::{CancelToken, Outcome, WorkerPool};
use std::fmt;

/// Errors raised while parsing or expanding a query
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("Invalid query at position {position}: {message}")]
    Syntax { position: usize, message: String },

    #[error("Unknown saved query '@{0}'")]
    UnknownSavedQuery(String),

    #[error("Saved query cycle: {0}")]
    SavedQueryCycle(String),
}

/// Anything a query can be evaluated against
pub trait QueryTarget {
    /// Value of `field`, or `None` when the record has no such field
    fn field_value(&self, field: &Field) -> Option<&str>;
}

/// A parsed query
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    pub fn parse(text: &str) -> Result<Self, QueryError> {
        let expr = parser::parse(text)?;
        Ok(Self {
            source: text.to_string(),
            expr,
        })
    }

    /// Expand `@name` references against `saved` before parsing
    pub fn parse_with(text: &str, saved: &SavedQueries) -> Result<Self, QueryError> {
        let expanded = saved.expand(text)?;
        if expanded != text {
            tracing::debug!("Expanded query '{}' to '{}'", text, expanded);
        }
        let expr = parser::parse(&expanded)?;
        Ok(Self {
            source: text.to_string(),
            expr,
        })
    }

    /// Text the query was parsed from, before expansion
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn matches<T: QueryTarget + ?Sized>(&self, target: &T) -> bool {
        self.expr.eval(target)
    }

    /// Records matching the query, in input order
    pub fn filter<'a, T>(
        &self,
        records: &'a [T],
        pool: &WorkerPool,
        cancel: &CancelToken,
    ) -> Outcome<&'a T>
    where
        T: QueryTarget + Sync,
    {
        let refs: Vec<&'a T> = records.iter().collect();
        let (hits, partial) = pool.run(&refs, cancel, |record: &&'a T| {
            let record = *record;
            self.matches(record).then_some(record)
        });

        let mut outcome = Outcome::new(hits.into_iter().flatten().collect());
        outcome.partial = partial;
        tracing::debug!(
            "Query '{}' matched {} of {} records",
            self,
            outcome.items.len(),
            records.len()
        );
        outcome
    }
}

/// Canonical form: keywords uppercased, values quoted only where needed
impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}
