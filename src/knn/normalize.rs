/*!
# Feature Normalizer

Accumulates per-feature statistics over a training set and then applies a
z-score-like transform to feature vectors. The normalizer is a two-state
machine: while *collecting*, [`Normalize::add`] accumulates `Σx` and `Σx²`
per feature; [`Normalize::compute_normalization`] finalizes the statistics,
after which [`Normalize::apply`] subtracts the stored per-feature value.

The stored value is `mean / stdev` per feature — mean and scale folded into
a single offset which `apply` subtracts directly. This is *not* a textbook
two-parameter z-score; the folded form is what the serialized classifier
format stores and what all downstream distances were tuned against, so it
is preserved literally. The clamped standard deviations are retained
alongside so the on-disk two-array layout can be written.
*/

use crate::error::{KnnError, KnnResult};

/// Floor applied to the per-feature standard deviation before dividing.
const STDEV_FLOOR: f64 = 1e-5;

#[derive(Debug, Clone)]
enum State {
    Collecting {
        num_samples: usize,
        sum: Vec<f64>,
        sum2: Vec<f64>,
    },
    Finalized {
        /// Per-feature `mean / stdev`, subtracted directly by `apply`.
        norm: Vec<f64>,
        /// Per-feature clamped standard deviation, kept for serialization.
        stdev: Vec<f64>,
    },
}

/// Per-feature normalization statistics for a fixed number of features.
#[derive(Debug, Clone)]
pub struct Normalize {
    num_features: usize,
    state: State,
}

impl Normalize {
    /// Creates an empty normalizer in the collecting state.
    pub fn new(num_features: usize) -> Self {
        Normalize {
            num_features,
            state: State::Collecting {
                num_samples: 0,
                sum: vec![0.0; num_features],
                sum2: vec![0.0; num_features],
            },
        }
    }

    /// Number of features this normalizer was configured for.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Returns *true* once `compute_normalization` has run.
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, State::Finalized { .. })
    }

    /// Accumulates one training vector into the running statistics.
    ///
    /// # Errors
    /// [`KnnError::FeatureCountMismatch`] if `vector` has the wrong arity,
    /// [`KnnError::AlreadyFinalized`] once statistics are finalized.
    pub fn add(&mut self, vector: &[f64]) -> KnnResult<()> {
        if vector.len() != self.num_features {
            return Err(KnnError::FeatureCountMismatch {
                expected: self.num_features,
                got: vector.len(),
            });
        }
        match &mut self.state {
            State::Collecting {
                num_samples,
                sum,
                sum2,
            } => {
                for (i, &x) in vector.iter().enumerate() {
                    sum[i] += x;
                    sum2[i] += x * x;
                }
                *num_samples += 1;
                Ok(())
            }
            State::Finalized { .. } => Err(KnnError::AlreadyFinalized),
        }
    }

    /// Finalizes the statistics, transitioning to the finalized state.
    ///
    /// Per feature: `mean = Σx / n`, sample variance
    /// `var = (n·Σx² − (Σx)²) / (n·(n−1))`, `stdev = max(sqrt(var), 1e-5)`
    /// and the stored norm value is `mean / stdev`.
    ///
    /// # Errors
    /// [`KnnError::NotEnoughSamples`] when fewer than two vectors were
    /// added, [`KnnError::AlreadyFinalized`] on a repeated call.
    pub fn compute_normalization(&mut self) -> KnnResult<()> {
        let (n, sum, sum2) = match &self.state {
            State::Collecting {
                num_samples,
                sum,
                sum2,
            } => (*num_samples, sum, sum2),
            State::Finalized { .. } => return Err(KnnError::AlreadyFinalized),
        };
        if n < 2 {
            return Err(KnnError::NotEnoughSamples(n));
        }

        let nf = n as f64;
        let mut norm = Vec::with_capacity(self.num_features);
        let mut stdev_vec = Vec::with_capacity(self.num_features);
        for i in 0..self.num_features {
            let mean = sum[i] / nf;
            let var = (nf * sum2[i] - sum[i] * sum[i]) / (nf * (nf - 1.0));
            let stdev = var.sqrt().max(STDEV_FLOOR);
            norm.push(mean / stdev);
            stdev_vec.push(stdev);
        }

        self.state = State::Finalized {
            norm,
            stdev: stdev_vec,
        };
        Ok(())
    }

    /// Normalizes `vector` in place by subtracting the stored per-feature
    /// value.
    ///
    /// # Errors
    /// [`KnnError::NotFinalized`] before finalization,
    /// [`KnnError::FeatureCountMismatch`] on wrong arity.
    pub fn apply(&self, vector: &mut [f64]) -> KnnResult<()> {
        let norm = self.norm_vector()?;
        if vector.len() != self.num_features {
            return Err(KnnError::FeatureCountMismatch {
                expected: self.num_features,
                got: vector.len(),
            });
        }
        for (x, n) in vector.iter_mut().zip(norm) {
            *x -= n;
        }
        Ok(())
    }

    /// Out-of-place variant of [`Normalize::apply`]: writes the normalized
    /// vector into `out` without touching the input.
    pub fn apply_into(&self, vector: &[f64], out: &mut [f64]) -> KnnResult<()> {
        let norm = self.norm_vector()?;
        if vector.len() != self.num_features || out.len() != self.num_features {
            return Err(KnnError::FeatureCountMismatch {
                expected: self.num_features,
                got: vector.len().min(out.len()),
            });
        }
        for ((o, x), n) in out.iter_mut().zip(vector).zip(norm) {
            *o = x - n;
        }
        Ok(())
    }

    /// The per-feature `mean / stdev` vector.
    ///
    /// # Errors
    /// [`KnnError::NotFinalized`] before finalization.
    pub fn norm_vector(&self) -> KnnResult<&[f64]> {
        match &self.state {
            State::Finalized { norm, .. } => Ok(norm),
            State::Collecting { .. } => Err(KnnError::NotFinalized),
        }
    }

    /// The per-feature clamped standard deviations.
    ///
    /// # Errors
    /// [`KnnError::NotFinalized`] before finalization.
    pub fn stdev_vector(&self) -> KnnResult<&[f64]> {
        match &self.state {
            State::Finalized { stdev, .. } => Ok(stdev),
            State::Collecting { .. } => Err(KnnError::NotFinalized),
        }
    }

    /// Restores a finalized normalizer from previously stored vectors
    /// (used when unserializing a classifier).
    ///
    /// # Errors
    /// [`KnnError::ConfigLengthMismatch`] if either vector has the wrong
    /// arity.
    pub fn from_stored_vectors(norm: Vec<f64>, stdev: Vec<f64>) -> KnnResult<Self> {
        if norm.len() != stdev.len() {
            return Err(KnnError::ConfigLengthMismatch {
                what: "stdev vector",
                expected: norm.len(),
                got: stdev.len(),
            });
        }
        Ok(Normalize {
            num_features: norm.len(),
            state: State::Finalized { norm, stdev },
        })
    }
}
