/*!
`docgraph` provides the two analysis cores of a document recognition
pipeline:

- an **attributed graph engine** whose mutations preserve a configurable
  structural shape (directedness, cycles, parallel edges, self-loops,
  forest constraints), with traversals, spanning trees and a subgraph
  partition optimizer on top,
- a **k-nearest-neighbor classifier** with pluggable weighted distance
  metrics, feature normalization, tie-broken majority voting, a family of
  confidence measures, and a binary serialization format for trained
  classifiers.

# Graphs

Nodes carry arbitrary hashable payloads and are addressed through opaque
[`NodeId`](graph::NodeId) handles that stay valid across unrelated
removals. Structural constraints are *expected* to be violated by callers
probing the graph, so a rejected mutation is an ordinary `None`/`false`
outcome rather than an error:

```
use docgraph::prelude::*;

let mut g: Graph<&str> = Graph::new(GraphShape::dag());
let a = g.add_node("a");
let b = g.add_node("b");
assert!(g.add_edge(a, b, 1.0, None).is_some());
// closing the cycle is rejected, the graph is untouched
assert!(g.add_edge(b, a, 1.0, None).is_none());
```

# Classification

A [`Classifier`](knn::Classifier) is built from labeled feature vectors,
normalizes them with per-feature statistics, and resolves queries through
a majority vote over the k nearest samples:

```
use docgraph::prelude::*;

let classifier = Classifier::from_samples(
    vec!["width".into(), "height".into()],
    vec![
        ("dot".to_string(), vec![1.0, 1.0]),
        ("dot".to_string(), vec![1.5, 1.2]),
        ("dash".to_string(), vec![9.0, 1.0]),
        ("dash".to_string(), vec![11.0, 1.3]),
    ],
)?;
assert_eq!(classifier.classify(&[1.2, 1.1])?.main_id(), "dot");
# Ok::<(), docgraph::KnnError>(())
```

Errors in the classification stack (wrong arities, operations in the
wrong state, malformed classifier files) are typed in
[`KnnError`](error::KnnError).
*/

pub mod error;
pub mod graph;
pub mod knn;

pub use error::{KnnError, KnnResult};

/// Re-exports of the types most callers need.
pub mod prelude {
    pub use crate::error::{KnnError, KnnResult};
    pub use crate::graph::{Bfs, Dfs, EdgeId, Graph, GraphShape, NodeId, PartitionMask};
    pub use crate::knn::{
        Classification, Classifier, ConfidenceKind, DistanceKind, Neighbors, Normalize,
    };
}
