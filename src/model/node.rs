//! Node in the category graph.

use std::fmt;

use serde::{Deserialize, Serialize};
use super::{Distance, DistanceMap};

/// Arena index of a node inside a storage backend.
///
/// Stable for the lifetime of the store; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The two node kinds of the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Category,
    Article,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Category => "Category",
            NodeKind::Article => "Article",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node snapshot as returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    /// Identifier from the source dump (page id). Unique per kind.
    pub external_id: i64,
    /// Unique per kind.
    pub name: String,
    pub kind: NodeKind,
    /// Always empty for articles.
    pub distances: DistanceMap,
}

impl Node {
    pub fn new(id: NodeId, external_id: i64, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            external_id,
            name: name.into(),
            kind,
            distances: DistanceMap::new(),
        }
    }

    pub fn is_category(&self) -> bool {
        self.kind == NodeKind::Category
    }

    /// Persisted distance from `seed`, `None` if unreached.
    pub fn distance(&self, seed: &str) -> Option<Distance> {
        self.distances.get(seed).copied()
    }
}
