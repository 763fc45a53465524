//! # Category Graph Model
//!
//! Plain DTOs for the category graph: nodes, relationships and the sparse
//! per-seed distance map carried by categories.
//! These types cross every boundary: storage ↔ propagation ↔ report ↔ user.
//!
//! Pure data: no I/O, no locks, no async.

pub mod node;
pub mod relationship;
pub mod distance;

pub use node::{Node, NodeId, NodeKind};
pub use relationship::{Relationship, RelId, RelType, Direction};
pub use distance::{Distance, DistanceMap};
