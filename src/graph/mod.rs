/*!
# Attributed Graph Engine

A payload-attributed graph whose mutations are gated by a configurable
[`GraphShape`]: directedness, cycles, parallel edges, self-loops and
forest constraints are enforced on every `add_edge`, with rejection
reported as an ordinary `None` outcome. On top of the [core](core) sit
iterative [traversals](traversal), [spanning-tree
derivation](spanning_tree) and the mean-score [subgraph partition
optimizer](partition).
*/

pub mod core;
pub mod partition;
pub mod shape;
pub mod spanning_tree;
pub mod traversal;

pub use self::core::{EdgeId, Graph, NodeId};
pub use self::partition::{PartitionMask, MAX_PARTITION_NODES};
pub use self::shape::GraphShape;
pub use self::traversal::{Bfs, Dfs};
