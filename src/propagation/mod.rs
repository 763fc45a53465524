//! # Distance Propagation
//!
//! Generation-synchronous multi-source relaxation:
//!
//! ```text
//! seed names → resolve → mark (seed, node, 0) → frontier₀
//! frontierₙ → for each label: step_down each sub-category   (+1)
//!                             step_up   each container      (+3)
//!           → candidates that improve the store → frontierₙ₊₁
//! stop when a frontier is empty
//! ```
//!
//! Labels of one generation are split across workers, each running in its
//! own write transaction. A generation ends only when every worker has
//! committed, so the next generation always reads fully committed
//! distances. Intra-generation order never changes the final distances; it
//! may change how many generations it takes to get there.

pub mod config;
pub mod seeds;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::label::DistanceLabel;
use crate::model::NodeKind;
use crate::progress::{GenerationReport, ProgressObserver, PropagationSummary, TracingProgress};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

pub use config::PropagationConfig;
pub use seeds::{SeedSet, DEFAULT_SEEDS, SEED_DELIMITER};

/// The propagation engine, bound to one backend.
pub struct Propagation<B: StorageBackend> {
    backend: Arc<B>,
    config: PropagationConfig,
    observer: Arc<dyn ProgressObserver>,
}

/// Labels produced and relaxations attempted by one worker.
#[derive(Debug, Default)]
struct Expansion {
    next: Vec<DistanceLabel>,
    attempted: u64,
}

impl Expansion {
    fn merge(&mut self, other: Expansion) {
        self.next.extend(other.next);
        self.attempted += other.attempted;
    }
}

impl<B: StorageBackend> Propagation<B> {
    pub fn new(backend: Arc<B>, config: PropagationConfig) -> Self {
        Self {
            backend,
            config,
            observer: Arc::new(TracingProgress),
        }
    }

    /// Replace the default tracing observer.
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &PropagationConfig {
        &self.config
    }

    /// Run with the seeds named in the configuration.
    pub async fn run(&self) -> Result<PropagationSummary> {
        let seeds = self.config.seed_set()?;
        self.compute_distances(&seeds).await
    }

    /// Compute the distance of every reachable category from every seed.
    ///
    /// Fails with `SeedNotFound` before touching any distance if a seed
    /// does not name a category. Safe to re-run: distances only ever
    /// decrease, so a second run over converged state changes nothing and a
    /// run over partially propagated state completes it.
    pub async fn compute_distances(&self, seeds: &SeedSet) -> Result<PropagationSummary> {
        let started = Instant::now();
        self.backend.await_indexes_online(self.config.index_timeout()).await?;
        self.observer.on_start(seeds);

        let (mut frontier, mut improvements) = self.initialize(seeds).await?;
        let workers = self.worker_count();
        let mut generation = 0usize;
        let mut attempted = 0u64;

        while !frontier.is_empty() {
            let started_at = Utc::now();
            let generation_started = Instant::now();
            let frontier_size = frontier.len();

            let expansion = self.expand_generation(frontier, workers).await?;

            let report = GenerationReport {
                generation,
                frontier_size,
                relaxations_attempted: expansion.attempted,
                improvements: expansion.next.len(),
                workers,
                started_at,
                elapsed: generation_started.elapsed(),
            };
            self.observer.on_generation(&report);

            attempted += expansion.attempted;
            improvements += expansion.next.len() as u64;
            frontier = expansion.next;
            generation += 1;
        }

        let summary = PropagationSummary {
            seeds: seeds.to_vec(),
            generations: generation,
            improvements,
            relaxations_attempted: attempted,
            elapsed: started.elapsed(),
        };
        self.observer.on_finish(&summary);
        Ok(summary)
    }

    /// Resolve every seed first, then mark them all at distance 0.
    ///
    /// Seed labels enter generation 0 even when already marked, so a run
    /// over partially propagated state picks up where the last one stopped.
    async fn initialize(&self, seeds: &SeedSet) -> Result<(Vec<DistanceLabel>, u64)> {
        let backend = &*self.backend;

        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let mut labels = Vec::with_capacity(seeds.len());
        for name in seeds.iter() {
            match backend.resolve(&tx, NodeKind::Category, name).await {
                Ok(node) => labels.push(DistanceLabel::seed(Arc::clone(name), node)),
                Err(Error::NotFound(_)) => {
                    backend.rollback_tx(tx).await?;
                    return Err(Error::SeedNotFound(name.to_string()));
                }
                Err(e) => {
                    backend.rollback_tx(tx).await?;
                    return Err(e);
                }
            }
        }
        backend.commit_tx(tx).await?;

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let mut improvements = 0u64;
        for label in &labels {
            if label.mark(backend, &mut tx).await? {
                improvements += 1;
            } else {
                debug!(seed = label.seed_name(), "seed already marked");
            }
        }
        backend.commit_tx(tx).await?;

        Ok((labels, improvements))
    }

    fn worker_count(&self) -> usize {
        let caps = self.backend.capabilities();
        let requested = self.config.workers.max(1);
        if !caps.concurrent_relaxation {
            if requested > 1 {
                warn!(requested, "backend does not support concurrent relaxation, using 1 worker");
            }
            return 1;
        }
        caps.max_writers.map_or(requested, |max| requested.min(max.max(1)))
    }

    /// Expand one frontier. Returns after every worker has committed.
    async fn expand_generation(&self, frontier: Vec<DistanceLabel>, workers: usize) -> Result<Expansion> {
        if workers <= 1 || frontier.len() < 2 {
            return expand_labels(Arc::clone(&self.backend), frontier).await;
        }

        let chunk_size = frontier.len().div_ceil(workers);
        let mut labels = frontier.into_iter();
        let mut set = JoinSet::new();
        loop {
            let chunk: Vec<DistanceLabel> = labels.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            set.spawn(expand_labels(Arc::clone(&self.backend), chunk));
        }

        // Barrier. Dropping `set` on error aborts the remaining workers.
        let mut expansion = Expansion::default();
        while let Some(joined) = set.join_next().await {
            let part = joined.map_err(|e| Error::WorkerFailed(e.to_string()))??;
            expansion.merge(part);
        }
        Ok(expansion)
    }
}

/// One worker: relax every neighbor of every label inside a single
/// transaction, then commit it.
async fn expand_labels<B: StorageBackend>(backend: Arc<B>, labels: Vec<DistanceLabel>) -> Result<Expansion> {
    let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
    let mut expansion = Expansion::default();

    match relax_neighbors(&*backend, &mut tx, &labels, &mut expansion).await {
        Ok(()) => {
            backend.commit_tx(tx).await?;
            Ok(expansion)
        }
        Err(e) => {
            backend.rollback_tx(tx).await?;
            Err(e)
        }
    }
}

async fn relax_neighbors<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    labels: &[DistanceLabel],
    expansion: &mut Expansion,
) -> Result<()> {
    for label in labels {
        for neighbor in backend.downward_neighbors(tx, label.node()).await? {
            let candidate = label.step_down(neighbor);
            expansion.attempted += 1;
            if candidate.mark(backend, tx).await? {
                expansion.next.push(candidate);
            }
        }
        for neighbor in backend.upward_neighbors(tx, label.node()).await? {
            let candidate = label.step_up(neighbor);
            expansion.attempted += 1;
            if candidate.mark(backend, tx).await? {
                expansion.next.push(candidate);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::model::{Direction, Distance, Node, NodeId, RelId, RelType, Relationship};
    use crate::progress::ProgressLog;
    use crate::storage::memory::MemoryTx;
    use crate::storage::{BackendCapabilities, MemoryBackend};

    /// A memory store that reports restricted capabilities and serves
    /// adjacency through the trait's default relationship walk.
    struct Restricted {
        inner: MemoryBackend,
        caps: BackendCapabilities,
    }

    #[async_trait]
    impl StorageBackend for Restricted {
        type Tx = MemoryTx;

        async fn shutdown(&self) -> Result<()> {
            self.inner.shutdown().await
        }
        async fn await_indexes_online(&self, timeout: Duration) -> Result<()> {
            self.inner.await_indexes_online(timeout).await
        }
        async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
            self.inner.begin_tx(mode).await
        }
        async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
            self.inner.commit_tx(tx).await
        }
        async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
            self.inner.rollback_tx(tx).await
        }
        async fn create_node(&self, tx: &mut MemoryTx, kind: NodeKind, external_id: i64, name: &str) -> Result<NodeId> {
            self.inner.create_node(tx, kind, external_id, name).await
        }
        async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
            self.inner.get_node(tx, id).await
        }
        async fn resolve(&self, tx: &MemoryTx, kind: NodeKind, name: &str) -> Result<NodeId> {
            self.inner.resolve(tx, kind, name).await
        }
        async fn resolve_external(&self, tx: &MemoryTx, kind: NodeKind, external_id: i64) -> Result<Option<NodeId>> {
            self.inner.resolve_external(tx, kind, external_id).await
        }
        async fn nodes_by_kind(&self, tx: &MemoryTx, kind: NodeKind) -> Result<Vec<Node>> {
            self.inner.nodes_by_kind(tx, kind).await
        }
        async fn create_relationship(&self, tx: &mut MemoryTx, src: NodeId, dst: NodeId, rel_type: RelType) -> Result<RelId> {
            self.inner.create_relationship(tx, src, dst, rel_type).await
        }
        async fn get_relationships(
            &self,
            tx: &MemoryTx,
            node: NodeId,
            dir: Direction,
            rel_type: Option<RelType>,
        ) -> Result<Vec<Relationship>> {
            self.inner.get_relationships(tx, node, dir, rel_type).await
        }
        async fn get_distance(&self, tx: &MemoryTx, node: NodeId, seed: &str) -> Result<Option<Distance>> {
            self.inner.get_distance(tx, node, seed).await
        }
        async fn relax_distance(&self, tx: &mut MemoryTx, node: NodeId, seed: &str, candidate: Distance) -> Result<bool> {
            self.inner.relax_distance(tx, node, seed, candidate).await
        }
        async fn relationship_count(&self, tx: &MemoryTx) -> Result<u64> {
            self.inner.relationship_count(tx).await
        }
        fn capabilities(&self) -> BackendCapabilities {
            self.caps.clone()
        }
    }

    fn restricted(concurrent_relaxation: bool, max_writers: Option<usize>) -> Arc<Restricted> {
        Arc::new(Restricted {
            inner: MemoryBackend::new(),
            caps: BackendCapabilities { concurrent_relaxation, max_writers },
        })
    }

    async fn chain<B: StorageBackend>(db: &B, names: &[&str]) -> Vec<crate::model::NodeId> {
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let mut ids = Vec::new();
        for (i, name) in names.iter().enumerate() {
            ids.push(db.create_node(&mut tx, NodeKind::Category, i as i64, name).await.unwrap());
        }
        // names[i+1] is a sub-category of names[i]
        for pair in ids.windows(2) {
            db.create_relationship(&mut tx, pair[1], pair[0], crate::model::RelType::SubcategoryOf)
                .await
                .unwrap();
        }
        db.commit_tx(tx).await.unwrap();
        ids
    }

    #[tokio::test]
    async fn test_missing_seed_aborts_before_relaxing() {
        let db = Arc::new(MemoryBackend::new());
        chain(&*db, &["A", "B"]).await;

        let engine = Propagation::new(Arc::clone(&db), PropagationConfig::default());
        let err = engine.compute_distances(&SeedSet::parse("A|Nope").unwrap()).await.unwrap_err();

        assert!(matches!(err, Error::SeedNotFound(ref n) if n == "Nope"));
        assert!(db.distance_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_chain_generations() {
        let db = Arc::new(MemoryBackend::new());
        let ids = chain(&*db, &["A", "B", "C", "D"]).await;
        let log = Arc::new(ProgressLog::new());

        let engine = Propagation::new(Arc::clone(&db), PropagationConfig::default())
            .with_observer(log.clone());
        let summary = engine.compute_distances(&SeedSet::parse("A").unwrap()).await.unwrap();

        let snapshot = db.distance_snapshot();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(snapshot[&(*id, "A".to_string())], i as u32);
        }
        // B, C, D become reachable one generation at a time, then one empty
        // expansion of D.
        assert_eq!(summary.generations, 4);
        assert_eq!(summary.improvements, 4);
        let sizes: Vec<usize> = log.reports().iter().map(|r| r.frontier_size).collect();
        assert_eq!(sizes, vec![1, 1, 1, 1]);
    }

    #[tokio::test]
    async fn test_worker_count_respects_capabilities() {
        let db = Arc::new(MemoryBackend::new());
        let engine = Propagation::new(db, PropagationConfig::default().with_workers(0));
        assert_eq!(engine.worker_count(), 1);

        let db = Arc::new(MemoryBackend::new());
        let engine = Propagation::new(db, PropagationConfig::default().with_workers(6));
        assert_eq!(engine.worker_count(), 6);
    }

    #[tokio::test]
    async fn test_worker_count_without_concurrent_relaxation() {
        let engine = Propagation::new(restricted(false, None), PropagationConfig::default().with_workers(8));
        assert_eq!(engine.worker_count(), 1);

        let engine = Propagation::new(restricted(false, Some(4)), PropagationConfig::default().with_workers(8));
        assert_eq!(engine.worker_count(), 1);
    }

    #[tokio::test]
    async fn test_worker_count_clamped_to_max_writers() {
        let engine = Propagation::new(restricted(true, Some(3)), PropagationConfig::default().with_workers(8));
        assert_eq!(engine.worker_count(), 3);

        let engine = Propagation::new(restricted(true, Some(3)), PropagationConfig::default().with_workers(2));
        assert_eq!(engine.worker_count(), 2);

        let engine = Propagation::new(restricted(true, Some(0)), PropagationConfig::default().with_workers(8));
        assert_eq!(engine.worker_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_restricted_backend_uses_default_adjacency() {
        let db = restricted(false, None);
        let ids = chain(&*db, &["A", "B", "C"]).await;
        let log = Arc::new(ProgressLog::new());

        let engine = Propagation::new(Arc::clone(&db), PropagationConfig::default().with_workers(4))
            .with_observer(log.clone());
        engine.compute_distances(&SeedSet::parse("B").unwrap()).await.unwrap();

        let snapshot = db.inner.distance_snapshot();
        assert_eq!(snapshot[&(ids[0], "B".to_string())], 3);
        assert_eq!(snapshot[&(ids[1], "B".to_string())], 0);
        assert_eq!(snapshot[&(ids[2], "B".to_string())], 1);
        assert!(log.reports().iter().all(|r| r.workers == 1));
    }

    #[tokio::test]
    async fn test_run_uses_configured_seeds() {
        let db = Arc::new(MemoryBackend::new());
        chain(&*db, &["Root", "Leaf"]).await;

        let engine = Propagation::new(Arc::clone(&db), PropagationConfig::default().with_seeds("Leaf"));
        let summary = engine.run().await.unwrap();

        assert_eq!(summary.seeds, vec!["Leaf"]);
        assert_eq!(db.distance_snapshot().len(), 2);
    }
}
