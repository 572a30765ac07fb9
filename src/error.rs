/*!
# Error Types

Errors are split into two tiers. Shape-constraint violations on graph
mutations are *expected* outcomes and are reported through `Option`/`bool`
return values on [`Graph`](crate::graph::Graph) itself, never through this
module. Everything here covers the second tier: precondition violations in
the classification stack (mismatched vector arities, operations called in
the wrong state) and malformed serialized classifier files.
*/

use thiserror::Error;

/// Result type alias for classifier operations.
pub type KnnResult<T> = Result<T, KnnError>;

/// Errors raised by the normalizer, the neighbor engine and the classifier.
///
/// All variants abort the current operation and leave the object in its
/// pre-operation state.
#[derive(Error, Debug)]
pub enum KnnError {
    /// A feature vector did not have the configured number of features.
    #[error("feature count mismatch: expected {expected}, got {got}")]
    FeatureCountMismatch { expected: usize, got: usize },

    /// `add` was called on a normalizer after `compute_normalization`.
    #[error("normalization statistics are already finalized")]
    AlreadyFinalized,

    /// `apply` was called on a normalizer before `compute_normalization`.
    #[error("normalization statistics are not yet finalized")]
    NotFinalized,

    /// The sample variance is undefined for fewer than two samples.
    #[error("computing normalization requires at least 2 samples, got {0}")]
    NotEnoughSamples(usize),

    /// `majority` was called without any neighbor having been added.
    #[error("majority called without enough valid neighbors")]
    InsufficientNeighbors,

    /// A classification operation was requested before training data
    /// was loaded.
    #[error("classifier has no training data")]
    NotTrained,

    /// A configuration vector (selection or weights) had the wrong arity.
    #[error("{what} length {got} does not match feature count {expected}")]
    ConfigLengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    /// The serialized classifier file declares an unsupported version.
    #[error("unsupported classifier file version {0}")]
    UnsupportedVersion(u32),

    /// The serialized classifier file is structurally invalid.
    #[error("malformed classifier file: {0}")]
    Format(String),

    /// An underlying I/O operation failed (including short reads).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
