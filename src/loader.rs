//! Graph loading from already-parsed records.
//!
//! Dump parsing lives outside this crate. Whatever reads the category and
//! category-link tables hands the loader one record at a time:
//!
//! ```text
//! category rows      → add_category(id, name)
//! ── await_indexes() ─────────────────────────────
//! subcat link rows   → link_subcategory(sub_id, container_name)
//! page link rows     → link_article(page_id, title, container_name)
//! ```
//!
//! Links whose endpoints are unknown (filtered or never loaded) are dropped
//! and counted, never reported as errors.

use std::time::Duration;

use hashbrown::HashMap;
use serde::Serialize;
use tracing::info;

use crate::model::{NodeId, NodeKind, RelId, RelType};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Progress is logged every this many processed records.
pub const LOG_EVERY: u64 = 100_000;

/// How long `link_*` waits for indexes when `await_indexes` was not called.
pub const DEFAULT_INDEX_TIMEOUT: Duration = Duration::from_secs(120);

/// Name prefixes of maintenance categories that are never loaded.
pub const INTERNAL_CATEGORY_PREFIXES: &[&str] = &[
    "Wikipedia_articles_",
    "Suspected_Wikipedia_sockpuppets",
    "Articles_with_",
    "Redirects_",
    "WikiProject_",
    "Articles_needing_",
    "Wikipedians_",
];

/// True for categories that track the encyclopedia itself rather than a
/// topic.
pub fn is_internal_category(name: &str) -> bool {
    INTERNAL_CATEGORY_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Counters for a load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    pub categories: u64,
    pub skipped_internal: u64,
    pub subcategory_links: u64,
    pub article_links: u64,
    pub articles_created: u64,
    /// Links dropped because an endpoint was unknown.
    pub dangling_links: u64,
}

impl LoadStats {
    fn links_seen(&self) -> u64 {
        self.subcategory_links + self.article_links + self.dangling_links
    }
}

/// Builds the category graph in a backend.
pub struct GraphLoader<'g, B: StorageBackend> {
    backend: &'g B,
    /// Article external id → node. Articles are only ever created here, so
    /// the cache is authoritative for this load.
    articles: HashMap<i64, NodeId>,
    stats: LoadStats,
    indexes_online: bool,
}

impl<'g, B: StorageBackend> GraphLoader<'g, B> {
    pub fn new(backend: &'g B) -> Self {
        Self {
            backend,
            articles: HashMap::new(),
            stats: LoadStats::default(),
            indexes_online: false,
        }
    }

    pub fn stats(&self) -> &LoadStats {
        &self.stats
    }

    /// Add a category node. Returns `None` for internal categories.
    pub async fn add_category(&mut self, external_id: i64, name: &str) -> Result<Option<NodeId>> {
        if is_internal_category(name) {
            self.stats.skipped_internal += 1;
            return Ok(None);
        }

        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;
        let id = match self.backend.create_node(&mut tx, NodeKind::Category, external_id, name).await {
            Ok(id) => id,
            Err(e) => {
                self.backend.rollback_tx(tx).await?;
                return Err(e);
            }
        };
        self.backend.commit_tx(tx).await?;

        self.stats.categories += 1;
        if self.stats.categories % LOG_EVERY == 0 {
            info!(categories = self.stats.categories, "loading categories");
        }
        Ok(Some(id))
    }

    /// Wait for the name and id indexes. Links need them to find their
    /// endpoints.
    pub async fn await_indexes(&mut self, timeout: Duration) -> Result<()> {
        info!(timeout_secs = timeout.as_secs(), "waiting for indexes to be online");
        self.backend.await_indexes_online(timeout).await?;
        self.indexes_online = true;
        Ok(())
    }

    async fn ensure_indexes(&mut self) -> Result<()> {
        if !self.indexes_online {
            self.await_indexes(DEFAULT_INDEX_TIMEOUT).await?;
        }
        Ok(())
    }

    /// Declare the category with `sub_external_id` a sub-category of
    /// `container_name`.
    pub async fn link_subcategory(&mut self, sub_external_id: i64, container_name: &str) -> Result<Option<RelId>> {
        self.ensure_indexes().await?;
        let backend = self.backend;

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let container = optional(backend.resolve(&tx, NodeKind::Category, container_name).await)?;
        let sub = backend.resolve_external(&tx, NodeKind::Category, sub_external_id).await?;

        let (Some(container), Some(sub)) = (container, sub) else {
            backend.rollback_tx(tx).await?;
            self.count_dangling();
            return Ok(None);
        };

        let rel = backend.create_relationship(&mut tx, sub, container, RelType::SubcategoryOf).await;
        let rel = self.finish_link(tx, rel).await?;
        self.stats.subcategory_links += 1;
        self.log_links();
        Ok(Some(rel))
    }

    /// Put an article into `container_name`, creating the article node the
    /// first time its id is seen.
    pub async fn link_article(
        &mut self,
        article_external_id: i64,
        article_name: &str,
        container_name: &str,
    ) -> Result<Option<RelId>> {
        self.ensure_indexes().await?;
        let backend = self.backend;

        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        let Some(container) = optional(backend.resolve(&tx, NodeKind::Category, container_name).await)? else {
            backend.rollback_tx(tx).await?;
            self.count_dangling();
            return Ok(None);
        };

        let cached = self.articles.get(&article_external_id).copied();
        let article = match cached {
            Some(id) => id,
            None => {
                match backend.create_node(&mut tx, NodeKind::Article, article_external_id, article_name).await {
                    Ok(id) => {
                        self.articles.insert(article_external_id, id);
                        self.stats.articles_created += 1;
                        id
                    }
                    Err(e) => {
                        backend.rollback_tx(tx).await?;
                        return Err(e);
                    }
                }
            }
        };

        let rel = backend.create_relationship(&mut tx, article, container, RelType::InCategory).await;
        let rel = self.finish_link(tx, rel).await?;
        self.stats.article_links += 1;
        self.log_links();
        Ok(Some(rel))
    }

    /// Finish the load and log the totals.
    pub fn finish(self) -> LoadStats {
        info!(
            categories = self.stats.categories,
            skipped = self.stats.skipped_internal,
            subcategory_links = self.stats.subcategory_links,
            article_links = self.stats.article_links,
            articles = self.stats.articles_created,
            dangling = self.stats.dangling_links,
            "graph loaded"
        );
        self.stats
    }

    async fn finish_link(&self, tx: B::Tx, rel: Result<RelId>) -> Result<RelId> {
        match rel {
            Ok(id) => {
                self.backend.commit_tx(tx).await?;
                Ok(id)
            }
            Err(e) => {
                self.backend.rollback_tx(tx).await?;
                Err(e)
            }
        }
    }

    fn count_dangling(&mut self) {
        self.stats.dangling_links += 1;
        self.log_links();
    }

    fn log_links(&self) {
        if self.stats.links_seen() % LOG_EVERY == 0 {
            info!(
                links = self.stats.links_seen(),
                articles = self.stats.article_links,
                categories = self.stats.subcategory_links,
                "parsing links"
            );
        }
    }
}

/// Turn `NotFound` into `None`.
fn optional<T>(res: Result<T>) -> Result<Option<T>> {
    match res {
        Ok(v) => Ok(Some(v)),
        Err(Error::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
