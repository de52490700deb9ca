//! Run-level plumbing shared by every analysis entry point
//!
//! Each entry point runs synchronously against one immutable snapshot and
//! returns an [`Outcome`]: the items it produced, the warnings it contained,
//! and whether cancellation cut the run short.

mod cancel;
mod pool;

pub use cancel::CancelToken;
pub use pool::WorkerPool;

use crate::query::QueryError;
use serde::Serialize;

/// Non-fatal problems collected during a run
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AnalysisWarning {
    /// A rule definition failed structural validation and was skipped
    #[error("Malformed rule {rule}: {reason}")]
    MalformedRule { rule: String, reason: String },

    /// A desired-state annotation was present but could not be parsed
    #[error("Drift not applicable for {resource}: {reason}")]
    DriftNotApplicable { resource: String, reason: String },

    /// A snapshot document could not be turned into a resource record
    #[error("Skipped document {index}: {reason}")]
    SkippedDocument { index: usize, reason: String },
}

/// Failures that escalate to the caller instead of becoming warnings
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    UnparseableQuery(#[from] QueryError),

    #[error("Run cancelled before {stage} completed")]
    CancelledRun { stage: String },
}

impl EngineError {
    /// `CancelledRun` for `stage` when `partial` is set
    pub fn check_complete(partial: bool, stage: &str) -> Result<(), EngineError> {
        if partial {
            return Err(EngineError::CancelledRun {
                stage: stage.to_string(),
            });
        }
        Ok(())
    }
}

/// Result of one analysis invocation
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub items: Vec<T>,
    pub warnings: Vec<AnalysisWarning>,
    /// True when cancellation or a deadline skipped part of the work
    pub partial: bool,
}

impl<T> Outcome<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            warnings: Vec::new(),
            partial: false,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<AnalysisWarning>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    /// "Succeeded with N warnings" vs. a complete success
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Turn a partial outcome into a hard error for callers that need complete results
    pub fn require_complete(self, stage: &str) -> Result<Self, EngineError> {
        EngineError::check_complete(self.partial, stage)?;
        Ok(self)
    }
}

impl<T> Default for Outcome<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_complete_rejects_partial() {
        let mut outcome = Outcome::new(vec![1, 2]);
        outcome.partial = true;
        let err = outcome.require_complete("scan").unwrap_err();
        assert_eq!(err.to_string(), "Run cancelled before scan completed");

        let outcome = Outcome::new(vec![1, 2]).require_complete("scan").unwrap();
        assert_eq!(outcome.items, vec![1, 2]);
    }

    #[test]
    fn test_warnings_are_counted() {
        let outcome = Outcome::new(vec!["a"]).with_warnings(vec![AnalysisWarning::MalformedRule {
            rule: "r1".to_string(),
            reason: "missing id".to_string(),
        }]);
        assert_eq!(outcome.warning_count(), 1);
        assert!(!outcome.partial);
    }
}
