//! Seed (macro-category) specification.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::warn;

use crate::{Error, Result};

/// Separator of the textual seed list.
pub const SEED_DELIMITER: char = '|';

/// The macro-categories used when none are configured.
pub const DEFAULT_SEEDS: &str = "History|Geography|People";

/// Ordered, duplicate-free list of seed category names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedSet {
    names: Vec<Arc<str>>,
}

impl SeedSet {
    /// Parse a `|`-separated list, e.g. `"History|Geography|People"`.
    /// Trailing delimiters are ignored; empty names elsewhere are not.
    pub fn parse(spec: &str) -> Result<Self> {
        if spec.is_empty() {
            return Err(Error::InvalidSeeds("empty seed list".into()));
        }
        Self::from_names(spec.trim_end_matches(SEED_DELIMITER).split(SEED_DELIMITER))
    }

    /// Build from individual names, keeping the first occurrence of each.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Arc<str>> = Vec::new();
        for name in names {
            let name = name.as_ref();
            if name.is_empty() {
                return Err(Error::InvalidSeeds("empty seed name".into()));
            }
            if out.iter().any(|n| &**n == name) {
                warn!(seed = name, "duplicate seed ignored");
                continue;
            }
            out.push(Arc::from(name));
        }
        if out.is_empty() {
            return Err(Error::InvalidSeeds("no seeds given".into()));
        }
        Ok(Self { names: out })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<str>> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.names.iter().map(|n| n.to_string()).collect()
    }
}

impl Default for SeedSet {
    fn default() -> Self {
        Self {
            names: DEFAULT_SEEDS.split(SEED_DELIMITER).map(Arc::from).collect(),
        }
    }
}

impl FromStr for SeedSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SeedSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEED_DELIMITER}")?;
            }
            f.write_str(name)?;
        }
        Ok(())
    }
}
