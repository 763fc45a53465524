//! Propagation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::seeds::{SeedSet, DEFAULT_SEEDS};
use crate::Result;

/// Knobs for a propagation run. Every field has a default, so a partial
/// JSON document (or `{}`) is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// `|`-separated macro-category names.
    pub seeds: String,
    /// Parallel workers per generation. Clamped to at least 1.
    pub workers: usize,
    /// How long to wait for the store's indexes before giving up.
    pub index_timeout_secs: u64,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            seeds: DEFAULT_SEEDS.to_string(),
            workers: 1,
            index_timeout_secs: 120,
        }
    }
}

impl PropagationConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_seeds(mut self, seeds: impl Into<String>) -> Self {
        self.seeds = seeds.into();
        self
    }

    pub fn seed_set(&self) -> Result<SeedSet> {
        SeedSet::parse(&self.seeds)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }
}
