/*!
# k-Nearest-Neighbor Classification

A small kNN stack: weighted [distance metrics](distance), a two-state
[feature normalizer](normalize), the per-query [neighbor engine](engine)
with majority voting and confidence measures, the [classifier](classifier)
tying them together over a training matrix, and a [binary file
format](serialize) for trained classifiers.
*/

pub mod classifier;
pub mod distance;
pub mod engine;
pub mod normalize;
pub mod serialize;

pub use classifier::{Classification, Classifier};
pub use distance::DistanceKind;
pub use engine::{ConfidenceKind, Neighbor, Neighbors};
pub use normalize::Normalize;
