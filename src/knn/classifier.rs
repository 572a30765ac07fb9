/*!
# kNN Classifier

Owns the training data (a flat feature matrix plus per-sample labels), the
fitted [`Normalize`] statistics and the query configuration (`k`, metric,
feature selection, weights, confidence kinds). Classification runs every
training sample through a [`Neighbors`] engine and resolves the majority.

Training vectors are normalized *in place* at construction time: the matrix
stores normalized values, and every incoming unknown vector is normalized
with the same statistics before distances are computed.
*/

use crate::error::{KnnError, KnnResult};
use crate::knn::distance::DistanceKind;
use crate::knn::engine::{ConfidenceKind, Neighbors};
use crate::knn::normalize::Normalize;

/// Result of classifying one unknown vector.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Ranked class list: the winning label first, then every other label
    /// present among the k nearest neighbors. The value is the label's
    /// transformed distance (see [`Neighbors::calculate_confidences`]).
    pub answers: Vec<(String, f64)>,
    /// The requested confidence measures for the winning label, in the
    /// order they were configured.
    pub confidences: Vec<(ConfidenceKind, f64)>,
}

impl Classification {
    /// The winning label.
    pub fn main_id(&self) -> &str {
        &self.answers[0].0
    }
}

/// A k-nearest-neighbor classifier over a fixed feature arity.
#[derive(Debug, Clone)]
pub struct Classifier {
    pub(crate) num_features: usize,
    pub(crate) feature_names: Vec<String>,
    /// One label per training sample, parallel to the matrix rows.
    pub(crate) id_names: Vec<String>,
    /// Row-major `num_samples × num_features` matrix of normalized vectors.
    pub(crate) feature_vectors: Vec<f64>,
    pub(crate) selection: Vec<bool>,
    pub(crate) weights: Vec<f64>,
    pub(crate) normalize: Option<Normalize>,
    pub(crate) num_k: usize,
    pub(crate) distance_kind: DistanceKind,
    pub(crate) confidence_kinds: Vec<ConfidenceKind>,
}

impl Classifier {
    /// Builds a classifier from labeled samples, fitting the normalizer
    /// over the raw vectors and normalizing the stored matrix in place.
    ///
    /// `feature_names` fixes the feature arity; every sample vector must
    /// match it. Defaults: `k = 1`, city-block metric, all features
    /// selected with weight `1.0`, [`ConfidenceKind::Default`] only.
    ///
    /// # Errors
    /// [`KnnError::NotTrained`] on an empty sample set,
    /// [`KnnError::FeatureCountMismatch`] on a ragged row,
    /// [`KnnError::NotEnoughSamples`] when normalization statistics cannot
    /// be computed (fewer than two samples).
    pub fn from_samples<I>(feature_names: Vec<String>, samples: I) -> KnnResult<Self>
    where
        I: IntoIterator<Item = (String, Vec<f64>)>,
    {
        let num_features = feature_names.len();
        let mut id_names = Vec::new();
        let mut feature_vectors = Vec::new();

        let mut normalize = Normalize::new(num_features);
        for (label, vector) in samples {
            if vector.len() != num_features {
                return Err(KnnError::FeatureCountMismatch {
                    expected: num_features,
                    got: vector.len(),
                });
            }
            normalize.add(&vector)?;
            id_names.push(label);
            feature_vectors.extend_from_slice(&vector);
        }
        if id_names.is_empty() {
            return Err(KnnError::NotTrained);
        }
        normalize.compute_normalization()?;
        for row in feature_vectors.chunks_exact_mut(num_features) {
            normalize.apply(row)?;
        }

        Ok(Classifier {
            num_features,
            feature_names,
            id_names,
            feature_vectors,
            selection: vec![true; num_features],
            weights: vec![1.0; num_features],
            normalize: Some(normalize),
            num_k: 1,
            distance_kind: DistanceKind::CityBlock,
            confidence_kinds: vec![ConfidenceKind::Default],
        })
    }

    /// Number of features per vector.
    pub fn num_features(&self) -> usize {
        self.num_features
    }

    /// Number of training samples.
    pub fn num_samples(&self) -> usize {
        self.id_names.len()
    }

    /// Configured feature names, in matrix column order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Per-sample labels, in matrix row order.
    pub fn id_names(&self) -> &[String] {
        &self.id_names
    }

    /// Configured number of neighbors.
    pub fn num_k(&self) -> usize {
        self.num_k
    }

    /// Configured distance metric.
    pub fn distance_kind(&self) -> DistanceKind {
        self.distance_kind
    }

    /// Per-feature selection mask.
    pub fn selection_vector(&self) -> &[bool] {
        &self.selection
    }

    /// Per-feature weights.
    pub fn weight_vector(&self) -> &[f64] {
        &self.weights
    }

    /// Sets the number of neighbors considered per query (`k = 0` is
    /// treated as `1`).
    pub fn set_num_k(&mut self, k: usize) {
        self.num_k = k.max(1);
    }

    /// Sets the distance metric.
    pub fn set_distance_kind(&mut self, kind: DistanceKind) {
        self.distance_kind = kind;
    }

    /// Sets the confidence measures computed per query.
    pub fn set_confidence_kinds(&mut self, kinds: Vec<ConfidenceKind>) {
        self.confidence_kinds = kinds;
    }

    /// Replaces the feature-selection mask.
    ///
    /// # Errors
    /// [`KnnError::ConfigLengthMismatch`] on wrong arity.
    pub fn set_selection_vector(&mut self, selection: Vec<bool>) -> KnnResult<()> {
        if selection.len() != self.num_features {
            return Err(KnnError::ConfigLengthMismatch {
                what: "selection vector",
                expected: self.num_features,
                got: selection.len(),
            });
        }
        self.selection = selection;
        Ok(())
    }

    /// Replaces the per-feature weights.
    ///
    /// # Errors
    /// [`KnnError::ConfigLengthMismatch`] on wrong arity.
    pub fn set_weight_vector(&mut self, weights: Vec<f64>) -> KnnResult<()> {
        if weights.len() != self.num_features {
            return Err(KnnError::ConfigLengthMismatch {
                what: "weight vector",
                expected: self.num_features,
                got: weights.len(),
            });
        }
        self.weights = weights;
        Ok(())
    }

    /// Index list of the selected features, or `None` when all features
    /// are selected (the full-vector metric variants skip the indirection).
    fn selected_indexes(&self) -> Option<Vec<usize>> {
        if self.selection.iter().all(|&s| s) {
            None
        } else {
            Some(
                self.selection
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &s)| s.then_some(i))
                    .collect(),
            )
        }
    }

    fn row(&self, i: usize) -> &[f64] {
        &self.feature_vectors[i * self.num_features..(i + 1) * self.num_features]
    }

    /// Classifies one unknown vector against the training set.
    ///
    /// The unknown is normalized with the training statistics, then every
    /// training sample is fed to a [`Neighbors`] engine under the
    /// configured metric (skip variant when not all features are
    /// selected).
    ///
    /// # Errors
    /// [`KnnError::NotTrained`] without training data,
    /// [`KnnError::FeatureCountMismatch`] on wrong arity.
    pub fn classify(&self, unknown: &[f64]) -> KnnResult<Classification> {
        if self.id_names.is_empty() {
            return Err(KnnError::NotTrained);
        }
        if unknown.len() != self.num_features {
            return Err(KnnError::FeatureCountMismatch {
                expected: self.num_features,
                got: unknown.len(),
            });
        }

        let mut normalized = vec![0.0; self.num_features];
        match &self.normalize {
            Some(norm) => norm.apply_into(unknown, &mut normalized)?,
            None => normalized.copy_from_slice(unknown),
        }

        self.classify_normalized(&normalized)
    }

    /// Classifies `unknown` against caller-supplied `(label, vector)`
    /// pairs instead of the training matrix. No normalization is applied
    /// to either side; the configured metric, `k`, selection and weights
    /// are used.
    ///
    /// # Errors
    /// [`KnnError::NotTrained`] on an empty `known` list,
    /// [`KnnError::FeatureCountMismatch`] on any wrong arity.
    pub fn classify_with_known(
        &self,
        known: &[(String, Vec<f64>)],
        unknown: &[f64],
    ) -> KnnResult<Classification> {
        if known.is_empty() {
            return Err(KnnError::NotTrained);
        }
        if unknown.len() != self.num_features {
            return Err(KnnError::FeatureCountMismatch {
                expected: self.num_features,
                got: unknown.len(),
            });
        }

        let indexes = self.selected_indexes();
        let mut knn: Neighbors<&str> = Neighbors::new(self.num_k);
        knn.confidence_kinds = self.confidence_kinds.clone();
        for (label, vector) in known {
            if vector.len() != self.num_features {
                return Err(KnnError::FeatureCountMismatch {
                    expected: self.num_features,
                    got: vector.len(),
                });
            }
            let distance = match &indexes {
                Some(idx) => self
                    .distance_kind
                    .compute_skip(vector, unknown, &self.weights, idx),
                None => self.distance_kind.compute(vector, unknown, &self.weights),
            };
            knn.add(label, distance);
        }
        Self::resolve(knn)
    }

    /// Leave-one-out evaluation: classifies every training sample against
    /// all the others and returns the fraction whose majority answer
    /// matches their own label.
    ///
    /// # Errors
    /// [`KnnError::NotTrained`] without training data,
    /// [`KnnError::NotEnoughSamples`] with fewer than two samples.
    pub fn leave_one_out(&self) -> KnnResult<f64> {
        let n = self.num_samples();
        if n == 0 {
            return Err(KnnError::NotTrained);
        }
        if n < 2 {
            return Err(KnnError::NotEnoughSamples(n));
        }

        let indexes = self.selected_indexes();
        let mut correct = 0usize;
        let mut knn: Neighbors<&str> = Neighbors::new(self.num_k);
        for i in 0..n {
            knn.reset();
            let unknown = self.row(i);
            for j in 0..n {
                if j == i {
                    continue;
                }
                let distance = match &indexes {
                    Some(idx) => {
                        self.distance_kind
                            .compute_skip(self.row(j), unknown, &self.weights, idx)
                    }
                    None => self.distance_kind.compute(self.row(j), unknown, &self.weights),
                };
                knn.add(&self.id_names[j], distance);
            }
            knn.majority()?;
            if knn.answer[0].0 == self.id_names[i] {
                correct += 1;
            }
        }
        Ok(correct as f64 / n as f64)
    }

    /// Runs the engine over the training matrix for a pre-normalized
    /// unknown vector.
    fn classify_normalized(&self, unknown: &[f64]) -> KnnResult<Classification> {
        let indexes = self.selected_indexes();
        let mut knn: Neighbors<&str> = Neighbors::new(self.num_k);
        knn.confidence_kinds = self.confidence_kinds.clone();
        for i in 0..self.num_samples() {
            let distance = match &indexes {
                Some(idx) => {
                    self.distance_kind
                        .compute_skip(self.row(i), unknown, &self.weights, idx)
                }
                None => self.distance_kind.compute(self.row(i), unknown, &self.weights),
            };
            knn.add(&self.id_names[i], distance);
        }
        Self::resolve(knn)
    }

    fn resolve(mut knn: Neighbors<&str>) -> KnnResult<Classification> {
        knn.majority()?;
        knn.calculate_confidences();
        let confidences = knn
            .confidence_kinds
            .iter()
            .copied()
            .zip(knn.confidences.iter().copied())
            .collect();
        let answers = knn
            .answer
            .iter()
            .map(|(id, d)| (id.to_string(), *d))
            .collect();
        Ok(Classification {
            answers,
            confidences,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn two_cluster_classifier() -> Classifier {
        // two well separated clusters on the first feature
        let samples = vec![
            ("low".to_string(), vec![0.0, 5.0]),
            ("low".to_string(), vec![1.0, 5.5]),
            ("low".to_string(), vec![0.5, 4.5]),
            ("high".to_string(), vec![10.0, 5.0]),
            ("high".to_string(), vec![11.0, 5.5]),
            ("high".to_string(), vec![10.5, 4.5]),
        ];
        Classifier::from_samples(vec!["x".to_string(), "y".to_string()], samples).unwrap()
    }

    #[test]
    fn classify_picks_nearest_cluster() {
        let mut classifier = two_cluster_classifier();
        classifier.set_num_k(3);
        let result = classifier.classify(&[0.7, 5.0]).unwrap();
        assert_eq!(result.main_id(), "low");
        let result = classifier.classify(&[10.2, 5.2]).unwrap();
        assert_eq!(result.main_id(), "high");
    }

    #[test]
    fn leave_one_out_on_separable_clusters() {
        let mut classifier = two_cluster_classifier();
        classifier.set_num_k(2);
        assert_eq!(classifier.leave_one_out().unwrap(), 1.0);
    }

    #[test]
    fn selection_vector_restricts_features() {
        let mut classifier = two_cluster_classifier();
        // only the second feature selected: clusters are inseparable on
        // it, so the nearest neighbor is decided by y alone
        classifier
            .set_selection_vector(vec![false, true])
            .unwrap();
        let result = classifier.classify(&[0.0, 4.5]).unwrap();
        // nearest on y among training rows at y=4.5 (rows of both labels
        // exist); just assert it resolves without using feature x
        assert!(!result.answers.is_empty());

        // full-x query no longer separates clusters
        let near_high = classifier.classify(&[10.0, 5.0]).unwrap();
        let near_low = classifier.classify(&[0.0, 5.0]).unwrap();
        assert_eq!(near_high.main_id(), near_low.main_id());
    }

    #[test]
    fn ragged_row_is_rejected() {
        let samples = vec![
            ("a".to_string(), vec![1.0, 2.0]),
            ("b".to_string(), vec![1.0]),
        ];
        let result = Classifier::from_samples(vec!["x".to_string(), "y".to_string()], samples);
        assert!(matches!(
            result,
            Err(KnnError::FeatureCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let result = Classifier::from_samples(vec!["x".to_string()], Vec::new());
        assert!(matches!(result, Err(KnnError::NotTrained)));
    }

    #[test]
    fn classify_arity_is_checked() {
        let classifier = two_cluster_classifier();
        assert!(matches!(
            classifier.classify(&[1.0]),
            Err(KnnError::FeatureCountMismatch {
                expected: 2,
                got: 1
            })
        ));
    }

    #[test]
    fn config_setters_validate_arity() {
        let mut classifier = two_cluster_classifier();
        assert!(classifier.set_weight_vector(vec![1.0, 2.0]).is_ok());
        assert!(matches!(
            classifier.set_weight_vector(vec![1.0]),
            Err(KnnError::ConfigLengthMismatch { got: 1, .. })
        ));
        assert!(matches!(
            classifier.set_selection_vector(vec![true]),
            Err(KnnError::ConfigLengthMismatch { got: 1, .. })
        ));
    }

    #[test]
    fn classify_with_known_skips_normalization() {
        let classifier = two_cluster_classifier();
        let known = vec![
            ("near".to_string(), vec![1.0, 1.0]),
            ("far".to_string(), vec![100.0, 100.0]),
        ];
        let result = classifier.classify_with_known(&known, &[2.0, 2.0]).unwrap();
        assert_eq!(result.main_id(), "near");
    }

    #[test]
    fn confidences_follow_configured_kinds() {
        let mut classifier = two_cluster_classifier();
        classifier.set_num_k(3);
        classifier.set_confidence_kinds(vec![
            ConfidenceKind::KnnFraction,
            ConfidenceKind::AvgDistance,
        ]);
        let result = classifier.classify(&[0.5, 5.0]).unwrap();
        assert_eq!(result.confidences.len(), 2);
        assert_eq!(result.confidences[0].0, ConfidenceKind::KnnFraction);
        assert_eq!(result.confidences[0].1, 1.0);
    }
}
