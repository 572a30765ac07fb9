/*!
# Distance Metrics

Weighted distance functions between a *known* and an *unknown* feature
vector of equal length. Each metric comes in two forms: a full variant
iterating over every feature, and a `_skip` variant that accumulates only
over an explicit, ordered list of feature indices. The skip form is what
leave-one-out feature-selection experiments use to exclude features; it is
deliberately an index list rather than a boolean mask multiply so that
excluded features cost nothing.

Note on `euclidean_distance`: the formula is `Σ w·sqrt(diff²)`, which is
numerically identical to the city-block metric. This is a known discrepancy
inherited from the reference implementation; it is kept literally because
classifier behavior (and serialized classifier files) depend on it.
*/

/// Selector for the distance function used by the classifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum DistanceKind {
    /// `Σ w·|u − k|`
    #[default]
    CityBlock,
    /// `Σ w·sqrt((u − k)²)` — see the module docs for the known
    /// discrepancy with the textbook definition.
    Euclidean,
    /// `Σ w·(u − k)²` — squared distance, ordering-equivalent to the
    /// true Euclidean metric and cheaper to compute.
    FastEuclidean,
}

impl DistanceKind {
    /// Computes the distance between `known` and `unknown` under `self`.
    pub fn compute(&self, known: &[f64], unknown: &[f64], weight: &[f64]) -> f64 {
        match self {
            DistanceKind::CityBlock => city_block_distance(known, unknown, weight),
            DistanceKind::Euclidean => euclidean_distance(known, unknown, weight),
            DistanceKind::FastEuclidean => fast_euclidean_distance(known, unknown, weight),
        }
    }

    /// Computes the distance between `known` and `unknown` under `self`,
    /// accumulating only over the features listed in `indexes`.
    pub fn compute_skip(
        &self,
        known: &[f64],
        unknown: &[f64],
        weight: &[f64],
        indexes: &[usize],
    ) -> f64 {
        match self {
            DistanceKind::CityBlock => city_block_distance_skip(known, unknown, weight, indexes),
            DistanceKind::Euclidean => euclidean_distance_skip(known, unknown, weight, indexes),
            DistanceKind::FastEuclidean => {
                fast_euclidean_distance_skip(known, unknown, weight, indexes)
            }
        }
    }
}

/// Weighted city-block distance: `Σ w·|u − k|`.
pub fn city_block_distance(known: &[f64], unknown: &[f64], weight: &[f64]) -> f64 {
    debug_assert_eq!(known.len(), unknown.len());
    debug_assert_eq!(known.len(), weight.len());
    known
        .iter()
        .zip(unknown)
        .zip(weight)
        .map(|((k, u), w)| w * (u - k).abs())
        .sum()
}

/// Weighted "euclidean" distance: `Σ w·sqrt((u − k)²)`, kept literally.
pub fn euclidean_distance(known: &[f64], unknown: &[f64], weight: &[f64]) -> f64 {
    debug_assert_eq!(known.len(), unknown.len());
    debug_assert_eq!(known.len(), weight.len());
    known
        .iter()
        .zip(unknown)
        .zip(weight)
        .map(|((k, u), w)| w * ((u - k) * (u - k)).sqrt())
        .sum()
}

/// Weighted fast (squared) euclidean distance: `Σ w·(u − k)²`.
pub fn fast_euclidean_distance(known: &[f64], unknown: &[f64], weight: &[f64]) -> f64 {
    debug_assert_eq!(known.len(), unknown.len());
    debug_assert_eq!(known.len(), weight.len());
    known
        .iter()
        .zip(unknown)
        .zip(weight)
        .map(|((k, u), w)| w * (u - k) * (u - k))
        .sum()
}

/// City-block distance over the features listed in `indexes` only.
pub fn city_block_distance_skip(
    known: &[f64],
    unknown: &[f64],
    weight: &[f64],
    indexes: &[usize],
) -> f64 {
    indexes
        .iter()
        .map(|&i| weight[i] * (unknown[i] - known[i]).abs())
        .sum()
}

/// "Euclidean" distance over the features listed in `indexes` only.
pub fn euclidean_distance_skip(
    known: &[f64],
    unknown: &[f64],
    weight: &[f64],
    indexes: &[usize],
) -> f64 {
    indexes
        .iter()
        .map(|&i| {
            let diff = unknown[i] - known[i];
            weight[i] * (diff * diff).sqrt()
        })
        .sum()
}

/// Fast euclidean distance over the features listed in `indexes` only.
pub fn fast_euclidean_distance_skip(
    known: &[f64],
    unknown: &[f64],
    weight: &[f64],
    indexes: &[usize],
) -> f64 {
    indexes
        .iter()
        .map(|&i| {
            let diff = unknown[i] - known[i];
            weight[i] * diff * diff
        })
        .sum()
}
