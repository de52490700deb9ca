//! Relationship graph between resources
//!
//! Structure:
//! - `index.rs` - Key, kind and label indices over one snapshot
//! - `rules.rs` - Data-driven reference extraction table
//! - `builder.rs` - One-pass graph construction
//! - `dangling.rs` - Unresolved reference reporting

mod builder;
mod dangling;
mod index;
mod rules;

pub use builder::GraphBuilder;
pub use dangling::{DanglingReason, DanglingReference, find_dangling};
pub use index::{SnapshotIndex, selector_matches};
pub use rules::{ExtractionRule, RefScope, SelectorRule, default_rules, default_selector_rules};

use crate::models::ResourceKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Kind of relationship an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeType {
    Owns,
    Selects,
    Mounts,
    References,
    ScaleTarget,
    Backend,
    TlsSecret,
    ImagePullSecret,
}

impl EdgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::Owns => "owns",
            EdgeType::Selects => "selects",
            EdgeType::Mounts => "mounts",
            EdgeType::References => "references",
            EdgeType::ScaleTarget => "scale-target",
            EdgeType::Backend => "backend",
            EdgeType::TlsSecret => "tls-secret",
            EdgeType::ImagePullSecret => "image-pull-secret",
        }
    }

    pub fn all() -> &'static [EdgeType] {
        &[
            EdgeType::Owns,
            EdgeType::Selects,
            EdgeType::Mounts,
            EdgeType::References,
            EdgeType::ScaleTarget,
            EdgeType::Backend,
            EdgeType::TlsSecret,
            EdgeType::ImagePullSecret,
        ]
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed, typed edge between two resource keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipEdge {
    pub from: String,
    pub to: String,
    pub edge_type: EdgeType,
}

impl RelationshipEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>, edge_type: EdgeType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            edge_type,
        }
    }
}

impl fmt::Display for RelationshipEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -[{}]-> {}", self.from, self.edge_type, self.to)
    }
}

/// A reference declared by `source` whose target is not in the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnresolvedRef {
    pub source: String,
    pub target: ResourceKey,
    pub edge_type: EdgeType,
    /// Path the reference was read from
    pub field: String,
}

/// Deduplicated edge set plus the declared references that did not resolve
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    edges: Vec<RelationshipEdge>,
    seen: HashSet<RelationshipEdge>,
    /// key -> positions in `edges`
    outgoing: HashMap<String, Vec<usize>>,
    incoming: HashMap<String, Vec<usize>>,
    unresolved: Vec<UnresolvedRef>,
    unresolved_seen: HashSet<UnresolvedRef>,
    /// Sources whose extraction finished
    visited: HashSet<String>,
    partial: bool,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edge; returns false when (from, to, type) is already present
    pub fn add_edge(&mut self, edge: RelationshipEdge) -> bool {
        if self.seen.contains(&edge) {
            return false;
        }
        let position = self.edges.len();
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push(position);
        self.incoming.entry(edge.to.clone()).or_default().push(position);
        self.seen.insert(edge.clone());
        self.edges.push(edge);
        true
    }

    pub fn add_unresolved(&mut self, unresolved: UnresolvedRef) {
        if self.unresolved_seen.insert(unresolved.clone()) {
            self.unresolved.push(unresolved);
        }
    }

    pub fn edges(&self) -> &[RelationshipEdge] {
        &self.edges
    }

    pub fn unresolved(&self) -> &[UnresolvedRef] {
        &self.unresolved
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// True when cancellation stopped the build before every resource was visited
    pub fn is_partial(&self) -> bool {
        self.partial
    }

    pub(crate) fn mark_partial(&mut self) {
        self.partial = true;
    }

    pub(crate) fn mark_visited(&mut self, source: String) {
        self.visited.insert(source);
    }

    /// Whether `key`'s own references were extracted
    ///
    /// Always true for a complete graph.
    pub fn was_visited(&self, key: &str) -> bool {
        !self.partial || self.visited.contains(key)
    }

    pub fn outbound<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a RelationshipEdge> {
        self.positions(&self.outgoing, key)
    }

    pub fn inbound<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a RelationshipEdge> {
        self.positions(&self.incoming, key)
    }

    pub fn has_outbound(&self, key: &str, edge_type: EdgeType) -> bool {
        self.outbound(key).any(|e| e.edge_type == edge_type)
    }

    pub fn has_inbound(&self, key: &str, edge_type: EdgeType) -> bool {
        self.inbound(key).any(|e| e.edge_type == edge_type)
    }

    fn positions<'a>(
        &'a self,
        adjacency: &'a HashMap<String, Vec<usize>>,
        key: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipEdge> {
        adjacency
            .get(key)
            .into_iter()
            .flatten()
            .map(move |&idx| &self.edges[idx])
    }

    pub fn count_by_type(&self) -> BTreeMap<EdgeType, usize> {
        let mut counts = BTreeMap::new();
        for edge in &self.edges {
            *counts.entry(edge.edge_type).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_edges_collapse() {
        let mut graph = ResourceGraph::new();
        assert!(graph.add_edge(RelationshipEdge::new("a", "b", EdgeType::Mounts)));
        assert!(!graph.add_edge(RelationshipEdge::new("a", "b", EdgeType::Mounts)));
        assert!(graph.add_edge(RelationshipEdge::new("a", "b", EdgeType::References)));
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.count_by_type().get(&EdgeType::Mounts), Some(&1));
    }

    #[test]
    fn test_inbound_outbound() {
        let mut graph = ResourceGraph::new();
        graph.add_edge(RelationshipEdge::new("svc", "pod1", EdgeType::Selects));
        graph.add_edge(RelationshipEdge::new("svc", "pod2", EdgeType::Selects));
        graph.add_edge(RelationshipEdge::new("rs", "pod1", EdgeType::Owns));
        assert_eq!(graph.outbound("svc").count(), 2);
        assert_eq!(graph.inbound("pod1").count(), 2);
        assert!(graph.has_inbound("pod2", EdgeType::Selects));
        assert!(!graph.has_outbound("pod2", EdgeType::Selects));
        assert!(!graph.has_inbound("pod1", EdgeType::Mounts));
        assert_eq!(graph.inbound("missing").count(), 0);
    }

    #[test]
    fn test_adjacency_skips_duplicates() {
        let mut graph = ResourceGraph::new();
        graph.add_edge(RelationshipEdge::new("a", "b", EdgeType::Mounts));
        graph.add_edge(RelationshipEdge::new("a", "b", EdgeType::Mounts));
        graph.add_edge(RelationshipEdge::new("a", "c", EdgeType::Mounts));
        let targets: Vec<&str> = graph.outbound("a").map(|e| e.to.as_str()).collect();
        assert_eq!(targets, vec!["b", "c"]);
        assert_eq!(graph.inbound("b").count(), 1);
    }

    #[test]
    fn test_visited_only_matters_when_partial() {
        let mut graph = ResourceGraph::new();
        assert!(graph.was_visited("svc"));
        graph.mark_partial();
        assert!(!graph.was_visited("svc"));
        graph.mark_visited("svc".to_string());
        assert!(graph.was_visited("svc"));
    }

    #[test]
    fn test_edge_type_names() {
        assert_eq!(EdgeType::ScaleTarget.to_string(), "scale-target");
        assert_eq!(
            serde_json::to_value(EdgeType::ImagePullSecret).unwrap(),
            serde_json::json!("image-pull-secret")
        );
        assert_eq!(EdgeType::all().len(), 8);
    }
}
