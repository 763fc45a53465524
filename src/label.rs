//! Distance labels.
//!
//! A `DistanceLabel` says "this node is at distance D from seed S". It is a
//! pure value: it only becomes state when `mark()` manages to relax the
//! node's persisted distance.

use std::fmt;
use std::sync::Arc;

use crate::model::{Distance, NodeId};
use crate::storage::StorageBackend;
use crate::Result;

/// Cost of moving from a category to one of its sub-categories.
pub const DOWNWARD_COST: Distance = 1;

/// Cost of moving from a category to a category containing it.
pub const UPWARD_COST: Distance = 3;

/// `(seed, node, distance)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistanceLabel {
    seed: Arc<str>,
    node: NodeId,
    distance: Distance,
}

impl DistanceLabel {
    pub fn new(seed: Arc<str>, node: NodeId, distance: Distance) -> Self {
        Self { seed, node, distance }
    }

    /// The distance-zero label of a seed's own node.
    pub fn seed(seed: Arc<str>, node: NodeId) -> Self {
        Self::new(seed, node, 0)
    }

    pub fn seed_name(&self) -> &str {
        &self.seed
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn distance(&self) -> Distance {
        self.distance
    }

    /// Relax the target node's distance for this seed.
    ///
    /// Returns true if the node was unmarked or marked with a greater
    /// distance. Marking twice with the same label is a no-op the second
    /// time.
    pub async fn mark<B: StorageBackend>(&self, backend: &B, tx: &mut B::Tx) -> Result<bool> {
        backend.relax_distance(tx, self.node, &self.seed, self.distance).await
    }

    /// Label for a sub-category of this label's node.
    pub fn step_down(&self, neighbor: NodeId) -> Self {
        self.step(neighbor, DOWNWARD_COST)
    }

    /// Label for a category containing this label's node.
    pub fn step_up(&self, neighbor: NodeId) -> Self {
        self.step(neighbor, UPWARD_COST)
    }

    fn step(&self, neighbor: NodeId, cost: Distance) -> Self {
        Self {
            seed: Arc::clone(&self.seed),
            node: neighbor,
            distance: self.distance.saturating_add(cost),
        }
    }
}

impl fmt::Display for DistanceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} @ {}", self.seed, self.distance, self.node)
    }
}
