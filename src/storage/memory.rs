//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! Nodes live in an arena (`Vec`) addressed by `NodeId`; adjacency is kept
//! as index lists on each node record. Each record owns its distance map
//! behind its own mutex, which is what makes `relax_distance` atomic while
//! relaxations of different nodes proceed in parallel.
//!
//! ## Limitations
//!
//! - **Writes are immediate**: `commit_tx()` only counts the commit; there is
//!   nothing to flush. `rollback_tx()` does NOT undo relaxations, which is
//!   harmless because a relaxation can only ever lower a distance.
//! - **Append-only**: nodes and relationships cannot be deleted.
//!
//! Use this backend for:
//! - Testing the propagation engine
//! - Embedding the engine in applications that don't need persistence

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use smallvec::SmallVec;
use tracing::debug;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::{Error, Result};
use super::{BackendCapabilities, Neighbors, StorageBackend};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory category graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    /// Arena: `NodeId(i)` lives at index `i`.
    nodes: RwLock<Vec<NodeRecord>>,
    relationships: RwLock<Vec<Relationship>>,
    names: RwLock<HashMap<(NodeKind, String), NodeId>>,
    external_ids: RwLock<HashMap<(NodeKind, i64), NodeId>>,
    open: AtomicBool,
    next_tx_id: AtomicU64,
    commits: AtomicU64,
}

struct NodeRecord {
    external_id: i64,
    name: String,
    kind: NodeKind,
    /// Outgoing `SubcategoryOf` targets.
    containers: SmallVec<[NodeId; 4]>,
    /// Sources of incoming `SubcategoryOf` edges.
    contained: Neighbors,
    /// Every relationship touching this node.
    rels: Vec<RelId>,
    distances: Mutex<DistanceMap>,
}

impl NodeRecord {
    fn snapshot(&self, id: NodeId) -> Node {
        Node {
            id,
            external_id: self.external_id,
            name: self.name.clone(),
            kind: self.kind,
            distances: self.distances.lock().clone(),
        }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(Vec::new()),
                relationships: RwLock::new(Vec::new()),
                names: RwLock::new(HashMap::new()),
                external_ids: RwLock::new(HashMap::new()),
                open: AtomicBool::new(true),
                next_tx_id: AtomicU64::new(1),
                commits: AtomicU64::new(0),
            }),
        }
    }

    /// Number of transactions committed so far.
    pub fn commit_count(&self) -> u64 {
        self.inner.commits.load(Ordering::Acquire)
    }

    /// Every persisted (node, seed) distance, read synchronously.
    ///
    /// Intended for observers and tests that need to look at the store
    /// between generations without going through a transaction.
    pub fn distance_snapshot(&self) -> BTreeMap<(NodeId, String), Distance> {
        let nodes = self.inner.nodes.read();
        let mut out = BTreeMap::new();
        for (idx, record) in nodes.iter().enumerate() {
            for (seed, dist) in record.distances.lock().iter() {
                out.insert((NodeId(idx as u64), seed.clone()), *dist);
            }
        }
        out
    }

    fn ensure_open(&self) -> Result<()> {
        if self.inner.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("memory backend has been shut down".into()))
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn index_of(id: NodeId) -> usize {
    id.0 as usize
}

fn node_not_found(id: NodeId) -> Error {
    Error::NotFound(format!("Node {id}"))
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction. Tracks how many relaxations went through it.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    relaxations: u64,
}

impl MemoryTx {
    /// Relaxations attempted through this transaction.
    pub fn relaxations(&self) -> u64 {
        self.relaxations
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

fn require_write(tx: &MemoryTx) -> Result<()> {
    if tx.is_read_only() {
        return Err(Error::TxError(format!("transaction {} is read-only", tx.id.0)));
    }
    Ok(())
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn shutdown(&self) -> Result<()> {
        self.inner.open.store(false, Ordering::Release);
        Ok(())
    }

    /// Indexes are maintained synchronously, so they are online as long as
    /// the backend is open.
    async fn await_indexes_online(&self, _timeout: Duration) -> Result<()> {
        self.ensure_open()
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.ensure_open()?;
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, relaxations: 0 })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        self.ensure_open()?;
        self.inner.commits.fetch_add(1, Ordering::AcqRel);
        if tx.relaxations > 0 {
            debug!(tx = tx.id.0, relaxations = tx.relaxations, "committed");
        }
        Ok(())
    }

    /// WARNING: does not revert relaxations; see module docs.
    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        kind: NodeKind,
        external_id: i64,
        name: &str,
    ) -> Result<NodeId> {
        self.ensure_open()?;
        require_write(tx)?;

        // Lock order: nodes, then names, then external ids.
        let mut nodes = self.inner.nodes.write();
        let mut names = self.inner.names.write();
        let mut external_ids = self.inner.external_ids.write();

        let name_key = (kind, name.to_string());
        if names.contains_key(&name_key) {
            return Err(Error::ConstraintViolation(format!("{kind} named '{name}' already exists")));
        }
        if external_ids.contains_key(&(kind, external_id)) {
            return Err(Error::ConstraintViolation(format!("{kind} with id {external_id} already exists")));
        }

        let id = NodeId(nodes.len() as u64);
        nodes.push(NodeRecord {
            external_id,
            name: name.to_string(),
            kind,
            containers: SmallVec::new(),
            contained: SmallVec::new(),
            rels: Vec::new(),
            distances: Mutex::new(DistanceMap::new()),
        });
        names.insert(name_key, id);
        external_ids.insert((kind, external_id), id);

        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        self.ensure_open()?;
        Ok(self.inner.nodes.read().get(index_of(id)).map(|r| r.snapshot(id)))
    }

    async fn resolve(&self, _tx: &MemoryTx, kind: NodeKind, name: &str) -> Result<NodeId> {
        self.ensure_open()?;
        self.inner
            .names
            .read()
            .get(&(kind, name.to_string()))
            .copied()
            .ok_or_else(|| Error::NotFound(format!("{kind} '{name}'")))
    }

    async fn resolve_external(
        &self,
        _tx: &MemoryTx,
        kind: NodeKind,
        external_id: i64,
    ) -> Result<Option<NodeId>> {
        self.ensure_open()?;
        Ok(self.inner.external_ids.read().get(&(kind, external_id)).copied())
    }

    async fn nodes_by_kind(&self, _tx: &MemoryTx, kind: NodeKind) -> Result<Vec<Node>> {
        self.ensure_open()?;
        let nodes = self.inner.nodes.read();
        Ok(nodes
            .iter()
            .enumerate()
            .filter(|(_, r)| r.kind == kind)
            .map(|(idx, r)| r.snapshot(NodeId(idx as u64)))
            .collect())
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: RelType,
    ) -> Result<RelId> {
        self.ensure_open()?;
        require_write(tx)?;

        let mut nodes = self.inner.nodes.write();
        let src_kind = nodes.get(index_of(src)).ok_or_else(|| node_not_found(src))?.kind;
        let dst_kind = nodes.get(index_of(dst)).ok_or_else(|| node_not_found(dst))?.kind;

        let expected_src = match rel_type {
            RelType::SubcategoryOf => NodeKind::Category,
            RelType::InCategory => NodeKind::Article,
        };
        if src_kind != expected_src || dst_kind != NodeKind::Category {
            return Err(Error::ConstraintViolation(format!(
                "{rel_type} cannot join {src_kind} {src} to {dst_kind} {dst}"
            )));
        }

        let mut rels = self.inner.relationships.write();
        let id = RelId(rels.len() as u64);
        rels.push(Relationship::new(id, src, dst, rel_type));

        if rel_type == RelType::SubcategoryOf {
            nodes[index_of(src)].containers.push(dst);
            nodes[index_of(dst)].contained.push(src);
        }
        nodes[index_of(src)].rels.push(id);
        if src != dst {
            nodes[index_of(dst)].rels.push(id);
        }

        Ok(id)
    }

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<RelType>,
    ) -> Result<Vec<Relationship>> {
        self.ensure_open()?;
        let nodes = self.inner.nodes.read();
        let rels = self.inner.relationships.read();
        let record = nodes.get(index_of(node)).ok_or_else(|| node_not_found(node))?;

        Ok(record
            .rels
            .iter()
            .filter_map(|rid| rels.get(rid.0 as usize))
            .filter(|rel| match dir {
                Direction::Outgoing => rel.src == node,
                Direction::Incoming => rel.dst == node,
            })
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Traversal (served from the adjacency lists)
    // ========================================================================

    async fn downward_neighbors(&self, _tx: &MemoryTx, node: NodeId) -> Result<Neighbors> {
        self.ensure_open()?;
        let nodes = self.inner.nodes.read();
        let record = nodes.get(index_of(node)).ok_or_else(|| node_not_found(node))?;
        Ok(record.contained.clone())
    }

    async fn upward_neighbors(&self, _tx: &MemoryTx, node: NodeId) -> Result<Neighbors> {
        self.ensure_open()?;
        let nodes = self.inner.nodes.read();
        let record = nodes.get(index_of(node)).ok_or_else(|| node_not_found(node))?;
        Ok(record.containers.iter().copied().collect())
    }

    // ========================================================================
    // Distances
    // ========================================================================

    async fn get_distance(&self, _tx: &MemoryTx, node: NodeId, seed: &str) -> Result<Option<Distance>> {
        self.ensure_open()?;
        let nodes = self.inner.nodes.read();
        let record = nodes.get(index_of(node)).ok_or_else(|| node_not_found(node))?;
        Ok(record.distances.lock().get(seed).copied())
    }

    async fn relax_distance(
        &self,
        tx: &mut MemoryTx,
        node: NodeId,
        seed: &str,
        candidate: Distance,
    ) -> Result<bool> {
        self.ensure_open()?;
        require_write(tx)?;
        tx.relaxations += 1;

        let nodes = self.inner.nodes.read();
        let record = nodes.get(index_of(node)).ok_or_else(|| node_not_found(node))?;
        if record.kind != NodeKind::Category {
            return Err(Error::ConstraintViolation(format!("Article {node} carries no distances")));
        }

        // Compare and store under the node's lock.
        let mut distances = record.distances.lock();
        match distances.get_mut(seed) {
            Some(current) if *current <= candidate => Ok(false),
            Some(current) => {
                *current = candidate;
                Ok(true)
            }
            None => {
                distances.insert(seed.to_string(), candidate);
                Ok(true)
            }
        }
    }

    // ========================================================================
    // Schema introspection
    // ========================================================================

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.inner.relationships.read().len() as u64)
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            concurrent_relaxation: true,
            max_writers: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn category(db: &MemoryBackend, tx: &mut MemoryTx, external_id: i64, name: &str) -> NodeId {
        db.create_node(tx, NodeKind::Category, external_id, name).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_resolve_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let id = category(&db, &mut tx, 10, "History").await;
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.name, "History");
        assert_eq!(node.external_id, 10);
        assert_eq!(db.resolve(&tx, NodeKind::Category, "History").await.unwrap(), id);
        assert_eq!(db.resolve_external(&tx, NodeKind::Category, 10).await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn test_resolve_is_kind_scoped() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.create_node(&mut tx, NodeKind::Article, 1, "Rome").await.unwrap();

        let err = db.resolve(&tx, NodeKind::Category, "Rome").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        category(&db, &mut tx, 1, "People").await;

        let err = db.create_node(&mut tx, NodeKind::Category, 2, "People").await.unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
        let err = db.create_node(&mut tx, NodeKind::Category, 1, "Persons").await.unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_adjacency_both_directions() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let parent = category(&db, &mut tx, 1, "Science").await;
        let child = category(&db, &mut tx, 2, "Physics").await;
        db.create_relationship(&mut tx, child, parent, RelType::SubcategoryOf).await.unwrap();

        assert_eq!(db.downward_neighbors(&tx, parent).await.unwrap().as_slice(), &[child]);
        assert_eq!(db.upward_neighbors(&tx, child).await.unwrap().as_slice(), &[parent]);
        assert!(db.upward_neighbors(&tx, parent).await.unwrap().is_empty());

        let outgoing = db
            .get_relationships(&tx, child, Direction::Outgoing, Some(RelType::SubcategoryOf))
            .await
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].other_node(child), Some(parent));
    }

    #[tokio::test]
    async fn test_article_edges_do_not_touch_adjacency() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let cat = category(&db, &mut tx, 1, "Science").await;
        let art = db.create_node(&mut tx, NodeKind::Article, 7, "Gravity").await.unwrap();

        db.create_relationship(&mut tx, art, cat, RelType::InCategory).await.unwrap();
        assert!(db.downward_neighbors(&tx, cat).await.unwrap().is_empty());
        assert_eq!(db.relationship_count(&tx).await.unwrap(), 1);

        // An article cannot be a sub-category.
        let err = db.create_relationship(&mut tx, art, cat, RelType::SubcategoryOf).await.unwrap_err();
        assert!(matches!(err, Error::ConstraintViolation(_)));
    }

    #[tokio::test]
    async fn test_relax_only_strictly_smaller() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let n = category(&db, &mut tx, 1, "Geography").await;

        assert_eq!(db.get_distance(&tx, n, "History").await.unwrap(), None);
        assert!(db.relax_distance(&mut tx, n, "History", 5).await.unwrap());
        assert!(!db.relax_distance(&mut tx, n, "History", 5).await.unwrap());
        assert!(!db.relax_distance(&mut tx, n, "History", 9).await.unwrap());
        assert!(db.relax_distance(&mut tx, n, "History", 2).await.unwrap());
        assert_eq!(db.get_distance(&tx, n, "History").await.unwrap(), Some(2));
        assert_eq!(tx.relaxations(), 4);
    }

    #[tokio::test]
    async fn test_seeds_use_independent_keys() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let n = category(&db, &mut tx, 1, "Geography").await;

        assert!(db.relax_distance(&mut tx, n, "History", 3).await.unwrap());
        assert!(db.relax_distance(&mut tx, n, "People", 7).await.unwrap());

        let node = db.get_node(&tx, n).await.unwrap().unwrap();
        assert_eq!(node.distance("History"), Some(3));
        assert_eq!(node.distance("People"), Some(7));
    }

    #[tokio::test]
    async fn test_relax_rejects_read_only_and_articles() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let cat = category(&db, &mut tx, 1, "Science").await;
        let art = db.create_node(&mut tx, NodeKind::Article, 7, "Gravity").await.unwrap();
        db.commit_tx(tx).await.unwrap();

        let mut ro = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert!(matches!(
            db.relax_distance(&mut ro, cat, "Science", 0).await.unwrap_err(),
            Error::TxError(_)
        ));

        let mut rw = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        assert!(matches!(
            db.relax_distance(&mut rw, art, "Science", 0).await.unwrap_err(),
            Error::ConstraintViolation(_)
        ));
    }

    #[tokio::test]
    async fn test_shutdown_makes_store_unavailable() {
        let db = MemoryBackend::new();
        db.await_indexes_online(Duration::from_secs(1)).await.unwrap();
        db.shutdown().await.unwrap();

        assert!(matches!(
            db.begin_tx(TxMode::ReadOnly).await.err(),
            Some(Error::StoreUnavailable(_))
        ));
        assert!(matches!(
            db.await_indexes_online(Duration::from_secs(1)).await.unwrap_err(),
            Error::StoreUnavailable(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_relaxation_keeps_minimum() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let n = category(&db, &mut tx, 1, "Geography").await;
        db.commit_tx(tx).await.unwrap();

        let mut handles = Vec::new();
        for worker in 0..8u32 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
                for candidate in (0..100u32).rev().filter(|c| c % 8 == worker) {
                    db.relax_distance(&mut tx, n, "History", candidate).await.unwrap();
                }
                db.commit_tx(tx).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snapshot = db.distance_snapshot();
        assert_eq!(snapshot.get(&(n, "History".to_string())), Some(&0));
        assert_eq!(db.commit_count(), 9);
    }
}
