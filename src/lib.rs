//! # catgraph-distance: macro-category distances over a category graph
//!
//! Assigns every category of a large hierarchical category graph a weighted
//! distance from a handful of "macro-category" roots. Descending to a
//! sub-category costs 1, ascending to a containing category costs 3, and
//! each category keeps, per root, the cheapest cost over any mix of both.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the engine and storage
//! 2. **Labels are values**: `DistanceLabel` only becomes state through `relax_distance`
//! 3. **Monotone writes**: a distance is only ever replaced by a strictly smaller one
//! 4. **Generation barrier**: every worker commits before the next frontier is read
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catgraph_distance::{CategoryGraph, SeedSet};
//!
//! # async fn example() -> catgraph_distance::Result<()> {
//! let graph = CategoryGraph::open_memory().await?;
//!
//! let mut loader = graph.loader();
//! loader.add_category(1, "History").await?;
//! loader.add_category(2, "Ancient_history").await?;
//! loader.link_subcategory(2, "History").await?;
//!
//! graph.compute_distances(&SeedSet::parse("History")?).await?;
//!
//! let report = graph.report().await?;
//! assert_eq!(report.get("Ancient_history").and_then(|c| c.distance("History")), Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | (default) | Arena-backed graph for testing/embedding |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod storage;
pub mod tx;
pub mod label;
pub mod propagation;
pub mod progress;
pub mod loader;
pub mod report;

use std::sync::Arc;

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{
    Node, NodeId, NodeKind, Relationship, RelId, RelType, Direction,
    Distance, DistanceMap,
};
pub use storage::{StorageBackend, BackendConfig, BackendCapabilities, MemoryBackend, Neighbors};
pub use tx::{Transaction, TxMode, TxId};
pub use label::{DistanceLabel, DOWNWARD_COST, UPWARD_COST};
pub use propagation::{Propagation, PropagationConfig, SeedSet, DEFAULT_SEEDS};
pub use progress::{
    GenerationReport, ProgressObserver, ProgressLog, PropagationSummary, TracingProgress,
};
pub use loader::{GraphLoader, LoadStats, is_internal_category};
pub use report::{CategoryDistances, DistanceReport};

// ============================================================================
// Top-level graph handle
// ============================================================================

/// The primary entry point. A `CategoryGraph` wraps a storage backend and
/// runs loading, propagation and reporting against it.
pub struct CategoryGraph<B: StorageBackend> {
    backend: Arc<B>,
}

impl<B: StorageBackend> CategoryGraph<B> {
    /// Create a graph with the given backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend: Arc::new(backend) }
    }

    /// Start loading already-parsed categories and links.
    pub fn loader(&self) -> GraphLoader<'_, B> {
        GraphLoader::new(&*self.backend)
    }

    /// A propagation engine over this graph.
    pub fn propagation(&self, config: PropagationConfig) -> Propagation<B> {
        Propagation::new(Arc::clone(&self.backend), config)
    }

    /// Compute distances from `seeds` with the default configuration.
    pub async fn compute_distances(&self, seeds: &SeedSet) -> Result<PropagationSummary> {
        self.propagation(PropagationConfig::default()).compute_distances(seeds).await
    }

    /// Read back every category with its distances.
    pub async fn report(&self) -> Result<DistanceReport> {
        DistanceReport::collect(&*self.backend).await
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.backend.shutdown().await
    }
}

/// In-memory graph for testing and embedding.
impl CategoryGraph<MemoryBackend> {
    /// Open a graph on the backend named by `config`.
    pub async fn open(config: BackendConfig) -> Result<Self> {
        match config {
            BackendConfig::Memory => Self::open_memory().await,
        }
    }

    pub async fn open_memory() -> Result<Self> {
        Ok(Self::with_backend(MemoryBackend::new()))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A seed name does not resolve to a category. Nothing was relaxed.
    #[error("Seed category not found: {0}")]
    SeedNotFound(String),

    /// The store cannot be reached or its indexes are not online.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid seed specification: {0}")]
    InvalidSeeds(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Propagation worker failed: {0}")]
    WorkerFailed(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
