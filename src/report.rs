//! Distance report: read converged distances back and bucket categories
//! into their macro-categories.
//!
//! ```text
//! store → DistanceReport::collect() → nearest() per category
//!       → write_json_lines() → one JSON object per category
//! ```

use std::collections::BTreeMap;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::model::{Distance, NodeId, NodeKind};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::Result;

/// One category and its distance from every seed that reaches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDistances {
    pub id: NodeId,
    pub external_id: i64,
    pub name: String,
    /// Seed → distance, ordered by seed name. Unreached seeds are absent.
    pub distances: BTreeMap<String, Distance>,
}

impl CategoryDistances {
    pub fn distance(&self, seed: &str) -> Option<Distance> {
        self.distances.get(seed).copied()
    }

    pub fn is_reached(&self) -> bool {
        !self.distances.is_empty()
    }

    /// The macro-category bucket: the smallest distance and every seed at
    /// that distance, in name order. No tie-breaking beyond that.
    pub fn nearest(&self) -> Option<(Distance, Vec<&str>)> {
        let best = *self.distances.values().min()?;
        let seeds = self
            .distances
            .iter()
            .filter(|(_, d)| **d == best)
            .map(|(s, _)| s.as_str())
            .collect();
        Some((best, seeds))
    }
}

/// Every category in the store, in id order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceReport {
    pub categories: Vec<CategoryDistances>,
}

impl DistanceReport {
    pub async fn collect<B: StorageBackend>(backend: &B) -> Result<Self> {
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let nodes = backend.nodes_by_kind(&tx, NodeKind::Category).await?;
        backend.commit_tx(tx).await?;

        let categories = nodes
            .into_iter()
            .map(|n| CategoryDistances {
                id: n.id,
                external_id: n.external_id,
                name: n.name,
                distances: n.distances.into_iter().collect(),
            })
            .collect();
        Ok(Self { categories })
    }

    pub fn get(&self, name: &str) -> Option<&CategoryDistances> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// Categories no seed reaches.
    pub fn unreached(&self) -> impl Iterator<Item = &CategoryDistances> {
        self.categories.iter().filter(|c| !c.is_reached())
    }

    /// Number of categories in each macro-category bucket. A category tied
    /// between several seeds counts towards each of them.
    pub fn bucket_sizes(&self) -> BTreeMap<String, usize> {
        let mut sizes = BTreeMap::new();
        for cat in &self.categories {
            if let Some((_, seeds)) = cat.nearest() {
                for seed in seeds {
                    *sizes.entry(seed.to_string()).or_insert(0) += 1;
                }
            }
        }
        sizes
    }

    /// One JSON object per line, per category.
    pub fn write_json_lines(&self, writer: &mut dyn Write) -> Result<()> {
        for cat in &self.categories {
            serde_json::to_writer(&mut *writer, cat)?;
            writeln!(writer)?;
        }
        Ok(())
    }
}
