//! kscout library
//!
//! Offline analysis of a Kubernetes resource snapshot: who manages each
//! resource, how resources relate, which references dangle, what drifted
//! from its last-applied state and which anti-patterns are present.
//! The binary is a thin CLI over [`analysis::Analyzer`].

pub mod analysis;
pub mod config;
pub mod drift;
pub mod engine;
pub mod graph;
pub mod models;
pub mod ownership;
pub mod path;
pub mod query;
pub mod scan;
pub mod snapshot;

// Re-export commonly used types for convenience
pub use analysis::{AnalysisReport, Analyzer, FlatRecord};
pub use engine::{AnalysisWarning, CancelToken, EngineError, Outcome, WorkerPool};
pub use models::{OwnerType, ResourceRecord};
pub use snapshot::{Snapshot, SnapshotSource};
