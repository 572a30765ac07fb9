/*!
# k-Nearest-Neighbor Engine

Single-query engine: call [`Neighbors::add`] once per training sample, then
[`Neighbors::majority`] to resolve the winning class and
[`Neighbors::calculate_confidences`] for the requested confidence scores.
After `majority` the engine is spent for that query; call
[`Neighbors::reset`] before reusing it.

The engine keeps the k closest `(id, distance)` pairs in ascending distance
order, tracks the *nearest unlike neighbor* (closest sample whose id differs
from the current best — updated retroactively whenever the best changes),
and remembers the maximum distance over *all* additions, not just the
retained k.
*/

use std::collections::BTreeMap;

use crate::error::{KnnError, KnnResult};

/// One retained neighbor: id of the training sample's class and its
/// distance to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor<Id> {
    pub id: Id,
    pub distance: f64,
}

/// Confidence measures that can be computed for the winning class.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfidenceKind {
    /// `(1 − d/(max_distance+ε))^10` on the winner's distance.
    Default,
    /// Fraction of the k retained neighbors with the winner's id.
    KnnFraction,
    /// 1/distance-weighted vote share for the winner; degrades to the
    /// zero-distance fraction when the nearest neighbor sits at distance
    /// (numerically) zero.
    InverseWeight,
    /// Linearly decreasing weighted vote share; degrades to
    /// [`ConfidenceKind::KnnFraction`] when all k distances are equal.
    LinearWeight,
    /// Nearest-unlike-neighbor ratio `1 − d_win/(d_nun+ε)`; `1.0` when
    /// only one class was ever seen.
    Nun,
    /// Raw distance to the winner's nearest neighbor (pre-transform).
    NnDistance,
    /// Mean distance across the k retained neighbors.
    AvgDistance,
}

/// Per-id aggregate used while resolving the majority vote.
#[derive(Debug, Clone)]
struct IdStat {
    min_distance: f64,
    total_distance: f64,
    count: usize,
}

/// Holds the k nearest neighbors seen so far and resolves the majority.
#[derive(Debug, Clone)]
pub struct Neighbors<Id> {
    k: usize,
    nn: Vec<Neighbor<Id>>,
    nun: Option<Neighbor<Id>>,
    max_distance: f64,
    /// Ranked answer list: winner first, then every other distinct id
    /// among the k neighbors with its own min-distance. Populated by
    /// [`Neighbors::majority`]; distances are rewritten by
    /// [`Neighbors::calculate_confidences`].
    pub answer: Vec<(Id, f64)>,
    /// Confidence measures to compute, in order.
    pub confidence_kinds: Vec<ConfidenceKind>,
    /// One value per entry of `confidence_kinds`.
    pub confidences: Vec<f64>,
}

impl<Id: Clone + Ord> Neighbors<Id> {
    /// Creates an engine retaining at most `k` neighbors (`k >= 1`).
    pub fn new(k: usize) -> Self {
        Neighbors {
            k: k.max(1),
            nn: Vec::new(),
            nun: None,
            max_distance: 0.0,
            answer: Vec::new(),
            confidence_kinds: Vec::new(),
            confidences: Vec::new(),
        }
    }

    /// Resets the engine to its initial state for a new query. The
    /// requested confidence kinds are kept.
    pub fn reset(&mut self) {
        self.nn.clear();
        self.nun = None;
        self.max_distance = 0.0;
        self.answer.clear();
        self.confidences.clear();
    }

    /// Attempts to add a neighbor to the list of the k closest.
    ///
    /// The retained list stays sorted ascending by distance (stable sort,
    /// so equal distances keep insertion order). The nearest unlike
    /// neighbor is maintained incrementally: it must also be updated when
    /// the current best itself is displaced by a closer sample.
    pub fn add(&mut self, id: Id, distance: f64) {
        if let Some(best) = self.nn.first() {
            if best.id != id {
                match &mut self.nun {
                    None => {
                        self.nun = Some(if distance < best.distance {
                            best.clone()
                        } else {
                            Neighbor { id: id.clone(), distance }
                        });
                    }
                    Some(nun) => {
                        if distance < best.distance {
                            // the old best becomes unlike relative to the
                            // new best-to-be
                            *nun = best.clone();
                        } else if distance < nun.distance {
                            nun.id = id.clone();
                            nun.distance = distance;
                        }
                    }
                }
            }
        }

        if self.nn.len() < self.k {
            self.nn.push(Neighbor { id, distance });
            self.sort_neighbors();
        } else if let Some(worst) = self.nn.last_mut() {
            if distance < worst.distance {
                worst.id = id;
                worst.distance = distance;
                self.sort_neighbors();
            }
        }

        if distance > self.max_distance {
            self.max_distance = distance;
        }
    }

    fn sort_neighbors(&mut self) {
        self.nn.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    }

    /// The k retained neighbors, ascending by distance.
    pub fn neighbors(&self) -> &[Neighbor<Id>] {
        &self.nn
    }

    /// Resolves the majority of the k nearest neighbors into
    /// [`Neighbors::answer`].
    ///
    /// The winner is the id with the highest count among the retained
    /// neighbors; count ties are broken by the lowest *total* distance
    /// (rewarding consistently close clusters over one lucky close hit).
    /// The answer lists the winner first with its min-distance, followed
    /// by every other distinct id present among the k neighbors with its
    /// own min-distance — all classes among the kNN are reported, not only
    /// runners-up below some distance threshold.
    ///
    /// # Errors
    /// [`KnnError::InsufficientNeighbors`] when nothing was added.
    pub fn majority(&mut self) -> KnnResult<()> {
        self.answer.clear();

        if self.nn.is_empty() {
            return Err(KnnError::InsufficientNeighbors);
        }
        if self.nn.len() == 1 {
            self.answer
                .push((self.nn[0].id.clone(), self.nn[0].distance));
            return Ok(());
        }

        let mut histogram: BTreeMap<Id, IdStat> = BTreeMap::new();
        for n in &self.nn {
            histogram
                .entry(n.id.clone())
                .and_modify(|stat| {
                    stat.count += 1;
                    stat.total_distance += n.distance;
                    if stat.min_distance > n.distance {
                        stat.min_distance = n.distance;
                    }
                })
                .or_insert(IdStat {
                    min_distance: n.distance,
                    total_distance: n.distance,
                    count: 1,
                });
        }

        let max_count = histogram.values().map(|s| s.count).max().unwrap_or(0);
        let winner = histogram
            .iter()
            .filter(|(_, s)| s.count == max_count)
            .min_by(|(_, a), (_, b)| a.total_distance.total_cmp(&b.total_distance))
            .map(|(id, s)| (id.clone(), s.min_distance));

        if let Some((winner_id, winner_min)) = winner {
            self.answer.push((winner_id.clone(), winner_min));
            for (id, stat) in &histogram {
                if *id != winner_id {
                    self.answer.push((id.clone(), stat.min_distance));
                }
            }
        }
        Ok(())
    }

    /// Computes the requested confidence values for the winning class and
    /// stores them in [`Neighbors::confidences`].
    ///
    /// Afterwards, *every* answer entry's distance field is replaced by
    /// the [`ConfidenceKind::Default`] transform of that distance — even
    /// when `Default` was not requested. Downstream consumers depend on
    /// reading confidences rather than raw distances out of the answer
    /// list, so this rewrite is unconditional.
    pub fn calculate_confidences(&mut self) {
        let epsilon_min = f64::MIN_POSITIVE;
        let epsilon = f64::EPSILON;

        self.confidences.clear();
        if self.answer.is_empty() {
            return;
        }
        let main_id = self.answer[0].0.clone();
        let main_distance = self.answer[0].1;

        for kind in self.confidence_kinds.clone() {
            let value = match kind {
                ConfidenceKind::Default => self.default_confidence(main_distance),
                ConfidenceKind::KnnFraction => self.knn_fraction(&main_id),
                ConfidenceKind::InverseWeight => {
                    if self.nn[0].distance < 256.0 * epsilon_min {
                        // zero distance: report the fraction among the
                        // zero-distance neighbors instead of dividing
                        let mut matching = 0usize;
                        let mut zero = 0usize;
                        for n in &self.nn {
                            if n.distance < 256.0 * epsilon_min {
                                zero += 1;
                                if n.id == main_id {
                                    matching += 1;
                                }
                            }
                        }
                        matching as f64 / zero as f64
                    } else {
                        let mut numerator = 0.0;
                        let mut denominator = 0.0;
                        for n in &self.nn {
                            let weight = 1.0 / n.distance;
                            denominator += weight;
                            if n.id == main_id {
                                numerator += weight;
                            }
                        }
                        numerator / denominator
                    }
                }
                ConfidenceKind::LinearWeight => {
                    let max_dist = self.nn[self.nn.len() - 1].distance;
                    if max_dist == 0.0 || 1.0 - self.nn[0].distance / max_dist < 8.0 * epsilon {
                        self.knn_fraction(&main_id)
                    } else {
                        let scale = max_dist - self.nn[0].distance;
                        let mut numerator = 0.0;
                        let mut denominator = 0.0;
                        for n in &self.nn {
                            let weight = (max_dist - n.distance) / scale;
                            denominator += weight;
                            if n.id == main_id {
                                numerator += weight;
                            }
                        }
                        numerator / denominator
                    }
                }
                ConfidenceKind::Nun => match &self.nun {
                    Some(nun) => 1.0 - main_distance / (nun.distance + epsilon_min),
                    // only one class present in the data
                    None => 1.0,
                },
                ConfidenceKind::NnDistance => main_distance,
                ConfidenceKind::AvgDistance => {
                    self.nn.iter().map(|n| n.distance).sum::<f64>() / self.nn.len() as f64
                }
            };
            self.confidences.push(value);
        }

        for entry in &mut self.answer {
            entry.1 = Self::default_confidence_with(self.max_distance, entry.1);
        }
    }

    fn knn_fraction(&self, main_id: &Id) -> f64 {
        let matching = self.nn.iter().filter(|n| n.id == *main_id).count();
        matching as f64 / self.nn.len() as f64
    }

    fn default_confidence(&self, distance: f64) -> f64 {
        Self::default_confidence_with(self.max_distance, distance)
    }

    fn default_confidence_with(max_distance: f64, distance: f64) -> f64 {
        (1.0 - distance / (max_distance + f64::MIN_POSITIVE)).powi(10)
    }
}
