//! Sparse per-seed distance map.

use hashbrown::HashMap;

/// Weighted distance in hop-cost units.
pub type Distance = u32;

/// Seed name → persisted distance. Absent key means unreached.
pub type DistanceMap = HashMap<String, Distance>;
