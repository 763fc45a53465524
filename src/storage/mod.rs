//! # Storage Backend Trait
//!
//! This is THE contract between the propagation core and whatever holds the
//! category graph. The core never touches nodes directly: it resolves seed
//! names, asks for neighbors, and relaxes distances, all through here.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | Arena-backed, for testing/embedding |

pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use smallvec::SmallVec;

use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::MemoryBackend;

// ============================================================================
// Backend Configuration
// ============================================================================

/// Selects the store a `CategoryGraph` is opened on.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum BackendConfig {
    /// In-memory arena, no persistence.
    #[default]
    Memory,
}

/// Neighbor list returned by adjacency queries. Most categories have only a
/// handful of parents and children.
pub type Neighbors = SmallVec<[NodeId; 8]>;

// ============================================================================
// Backend capabilities
// ============================================================================

/// What a backend can do. The engine sizes its worker pool from this.
#[derive(Debug, Clone, Default)]
pub struct BackendCapabilities {
    /// `relax_distance` may be called from several transactions at once.
    pub concurrent_relaxation: bool,
    /// Upper bound on concurrently open write transactions, if any.
    pub max_writers: Option<usize>,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The graph store contract.
///
/// Every method fails with `Error::StoreUnavailable` once the backend has
/// been shut down or cannot be reached.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shut down the backend, flushing any pending writes.
    async fn shutdown(&self) -> Result<()>;

    /// Wait until the name and external-id indexes can serve lookups.
    /// Fails with `StoreUnavailable` if they are not online within `timeout`.
    async fn await_indexes_online(&self, timeout: Duration) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction. Relaxations performed in it are durable once
    /// this returns.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node. Fails with `ConstraintViolation` if a node of the same
    /// kind already has this name or external id.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        kind: NodeKind,
        external_id: i64,
        name: &str,
    ) -> Result<NodeId>;

    /// Get a node snapshot by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Look up a node by kind and name. Fails with `NotFound`.
    async fn resolve(&self, tx: &Self::Tx, kind: NodeKind, name: &str) -> Result<NodeId>;

    /// Look up a node by kind and source-dump id.
    async fn resolve_external(
        &self,
        tx: &Self::Tx,
        kind: NodeKind,
        external_id: i64,
    ) -> Result<Option<NodeId>>;

    /// All nodes of a kind, in id order.
    async fn nodes_by_kind(&self, tx: &Self::Tx, kind: NodeKind) -> Result<Vec<Node>>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create an edge. `SubcategoryOf` must join two categories,
    /// `InCategory` an article to a category.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: RelType,
    ) -> Result<RelId>;

    /// Edges of a node, optionally filtered by type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<RelType>,
    ) -> Result<Vec<Relationship>>;

    /// Batch create relationships.
    ///
    /// Default falls back to sequential `create_relationship` calls.
    async fn create_relationships_batch(
        &self,
        tx: &mut Self::Tx,
        rels: Vec<(NodeId, NodeId, RelType)>,
    ) -> Result<Vec<RelId>> {
        let mut ids = Vec::with_capacity(rels.len());
        for (src, dst, rel_type) in rels {
            ids.push(self.create_relationship(tx, src, dst, rel_type).await?);
        }
        Ok(ids)
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Sub-categories of `node`: nodes with a `SubcategoryOf` edge into it.
    ///
    /// Default walks incoming relationships.
    async fn downward_neighbors(&self, tx: &Self::Tx, node: NodeId) -> Result<Neighbors> {
        let rels = self
            .get_relationships(tx, node, Direction::Incoming, Some(RelType::SubcategoryOf))
            .await?;
        Ok(rels.iter().filter_map(|r| r.other_node(node)).collect())
    }

    /// Containers of `node`: targets of its outgoing `SubcategoryOf` edges.
    ///
    /// Default walks outgoing relationships.
    async fn upward_neighbors(&self, tx: &Self::Tx, node: NodeId) -> Result<Neighbors> {
        let rels = self
            .get_relationships(tx, node, Direction::Outgoing, Some(RelType::SubcategoryOf))
            .await?;
        Ok(rels.iter().filter_map(|r| r.other_node(node)).collect())
    }

    // ========================================================================
    // Distances
    // ========================================================================

    /// Persisted distance of `node` from `seed`, `None` if unreached.
    async fn get_distance(&self, tx: &Self::Tx, node: NodeId, seed: &str) -> Result<Option<Distance>>;

    /// Store `candidate` if it is strictly smaller than the persisted
    /// distance (absent counts as infinity). Returns whether it was stored.
    ///
    /// Must be atomic per (node, seed): this is the only write path for
    /// distances.
    async fn relax_distance(
        &self,
        tx: &mut Self::Tx,
        node: NodeId,
        seed: &str,
        candidate: Distance,
    ) -> Result<bool>;

    // ========================================================================
    // Schema introspection
    // ========================================================================

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Capability negotiation
    // ========================================================================

    /// Report what this backend can do.
    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities::default()
    }
}
