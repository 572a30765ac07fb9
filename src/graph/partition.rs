/*!
# Subgraph Partition Optimizer

Searches for the partition of a connected component into small connected
parts that maximizes the mean of a caller-supplied score over the parts.

The optimizer works on a dense 64-bit mask representation: the component's
nodes are renumbered by a BFS from a canonical root (the node with the
fewest incident edges) and each node becomes one bit of a
[`PartitionMask`]. That puts a hard ceiling of [`MAX_PARTITION_NODES`]
nodes on the exact search; larger components (and trivial single-node
ones) degrade to a singleton partition instead of failing.

Candidate parts are every connected subset of up to `max_part_size` nodes.
Each distinct part is scored exactly once. The exhaustive cover search is
pruned through per-part `begin`/`end` windows over the mask-sorted part
list: any disjoint selection taken in ascending mask order can only
continue at or after the `begin` index of its latest part.
*/

use std::hash::Hash;

use fxhash::{FxHashMap, FxHashSet};

use crate::graph::core::{Graph, NodeId};

/// Hard ceiling on the component size the exact search handles.
pub const MAX_PARTITION_NODES: usize = 64;

/// A set of up to 64 component nodes, one bit per BFS traversal number.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PartitionMask(u64);

impl PartitionMask {
    pub const EMPTY: Self = PartitionMask(0);

    fn single(bit: usize) -> Self {
        PartitionMask(1 << bit)
    }

    /// Mask with the lowest `n` bits set.
    fn full(n: usize) -> Self {
        if n >= 64 {
            PartitionMask(u64::MAX)
        } else {
            PartitionMask((1u64 << n) - 1)
        }
    }

    pub fn contains(self, bit: usize) -> bool {
        self.0 & (1 << bit) != 0
    }

    fn with(self, bit: usize) -> Self {
        PartitionMask(self.0 | (1 << bit))
    }

    pub fn union(self, other: Self) -> Self {
        PartitionMask(self.0 | other.0)
    }

    pub fn is_disjoint(self, other: Self) -> bool {
        self.0 & other.0 == 0
    }

    fn shifted_left(self) -> Self {
        PartitionMask(self.0 << 1)
    }

    /// Number of nodes in the set.
    pub fn count(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Iterates over the set bits in ascending order.
    fn bits(self) -> impl Iterator<Item = usize> {
        let mut rest = self.0;
        std::iter::from_fn(move || {
            if rest == 0 {
                None
            } else {
                let bit = rest.trailing_zeros() as usize;
                rest &= rest - 1;
                Some(bit)
            }
        })
    }
}

/// One scored candidate part with its search-window indices.
#[derive(Debug, Clone)]
struct Part {
    mask: PartitionMask,
    score: f64,
    /// First later index in the mask-sorted part list whose mask is
    /// disjoint from this part.
    begin: usize,
    /// First later index disjoint from this part *and* its left-shift;
    /// a tighter window kept alongside `begin`.
    #[allow(dead_code)]
    end: usize,
}

impl<P: Hash + Eq + Clone, L> Graph<P, L> {
    /// Partitions the connected component of `root` (ignoring edge
    /// directions) into connected parts of at most `max_part_size` nodes
    /// such that the mean of `score` over the parts is maximal.
    ///
    /// `score` is called once per distinct candidate part, with the
    /// payloads of the part's nodes in component traversal order.
    ///
    /// Components with a single node, or with more than
    /// [`MAX_PARTITION_NODES`] nodes, return the singleton partition.
    /// A dead `root` returns an empty partition.
    pub fn optimize_partition<F>(
        &self,
        root: NodeId,
        max_part_size: usize,
        mut score: F,
    ) -> Vec<Vec<NodeId>>
    where
        F: FnMut(&[&P]) -> f64,
    {
        let component = self.undirected_component(root);
        let n = component.len();
        if n == 0 {
            return Vec::new();
        }
        if n == 1 || max_part_size <= 1 {
            return component.into_iter().map(|u| vec![u]).collect();
        }
        if n > MAX_PARTITION_NODES {
            tracing::debug!(
                nodes = n,
                ceiling = MAX_PARTITION_NODES,
                "component exceeds the partition ceiling, using singletons"
            );
            return component.into_iter().map(|u| vec![u]).collect();
        }

        // canonical root: fewest incident edges, first-discovered on ties
        let canonical = component
            .iter()
            .copied()
            .min_by_key(|&u| self.out_edges(u).count() + self.in_edges(u).count())
            .unwrap_or(root);

        // renumber the component by BFS from the canonical root
        let order = self.undirected_component(canonical);
        debug_assert_eq!(order.len(), n);
        let number: FxHashMap<NodeId, usize> = order
            .iter()
            .enumerate()
            .map(|(i, &u)| (u, i))
            .collect();

        // dense adjacency in traversal-number space, directions dropped
        let mut adj: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, &u) in order.iter().enumerate() {
            for v in self.undirected_neighbors(u) {
                if let Some(&j) = number.get(&v) {
                    if j != i && !adj[i].contains(&j) {
                        adj[i].push(j);
                    }
                }
            }
        }

        // enumerate every connected subset of size <= max_part_size whose
        // minimum traversal number is the start node
        let mut seen: FxHashSet<PartitionMask> = FxHashSet::default();
        let mut parts: Vec<Part> = Vec::new();
        for start in 0..n {
            let mut stack = vec![PartitionMask::single(start)];
            while let Some(mask) = stack.pop() {
                if !seen.insert(mask) {
                    continue;
                }
                let payloads: Vec<&P> = mask
                    .bits()
                    .filter_map(|bit| self.node_payload(order[bit]))
                    .collect();
                parts.push(Part {
                    mask,
                    score: score(&payloads),
                    begin: 0,
                    end: 0,
                });
                if mask.count() < max_part_size {
                    for bit in mask.bits() {
                        for &next in &adj[bit] {
                            if next > start && !mask.contains(next) {
                                stack.push(mask.with(next));
                            }
                        }
                    }
                }
            }
        }

        parts.sort_by_key(|p| p.mask);
        for i in 0..parts.len() {
            let mask = parts[i].mask;
            let widened = mask.union(mask.shifted_left());
            parts[i].begin = (i + 1..parts.len())
                .find(|&j| parts[j].mask.is_disjoint(mask))
                .unwrap_or(parts.len());
            parts[i].end = (i + 1..parts.len())
                .find(|&j| parts[j].mask.is_disjoint(widened))
                .unwrap_or(parts.len());
        }

        let full = PartitionMask::full(n);
        let mut best: Option<(f64, Vec<usize>)> = None;
        let mut chosen: Vec<usize> = Vec::new();
        search_cover(
            &parts,
            full,
            0,
            PartitionMask::EMPTY,
            0.0,
            &mut chosen,
            &mut best,
        );

        match best {
            Some((_, indices)) => indices
                .into_iter()
                .map(|idx| parts[idx].mask.bits().map(|bit| order[bit]).collect())
                .collect(),
            // singletons always form a cover, so this is unreachable in
            // practice; degrade the same way the ceiling does
            None => order.into_iter().map(|u| vec![u]).collect(),
        }
    }

    /// [`Graph::optimize_partition`] with the result mapped onto cloned
    /// payload groups.
    pub fn optimize_partition_groups<F>(
        &self,
        root: NodeId,
        max_part_size: usize,
        score: F,
    ) -> Vec<Vec<P>>
    where
        F: FnMut(&[&P]) -> f64,
    {
        self.optimize_partition(root, max_part_size, score)
            .into_iter()
            .map(|part| {
                part.into_iter()
                    .filter_map(|u| self.node_payload(u).cloned())
                    .collect()
            })
            .collect()
    }

    /// BFS over the undirected view of the edges, returning the nodes of
    /// the component of `root` in discovery order.
    fn undirected_component(&self, root: NodeId) -> Vec<NodeId> {
        if !self.has_node(root) {
            return Vec::new();
        }
        let mut visited = vec![false; self.node_slot_capacity()];
        visited[root.index()] = true;
        let mut order = vec![root];
        let mut head = 0;
        while head < order.len() {
            let u = order[head];
            head += 1;
            for v in self.undirected_neighbors(u) {
                if !visited[v.index()] {
                    visited[v.index()] = true;
                    order.push(v);
                }
            }
        }
        order
    }

    fn undirected_neighbors(&self, u: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges(u)
            .filter_map(|e| self.edge_endpoints(e).map(|(_, to)| to))
            .chain(
                self.in_edges(u)
                    .filter_map(|e| self.edge_endpoints(e).map(|(from, _)| from)),
            )
    }
}

/// Exhaustive cover search over the mask-sorted parts. At every level
/// the lowest uncovered traversal number must be covered by the chosen
/// part; the scan continues at the previous part's `begin` window.
fn search_cover(
    parts: &[Part],
    full: PartitionMask,
    start: usize,
    covered: PartitionMask,
    total: f64,
    chosen: &mut Vec<usize>,
    best: &mut Option<(f64, Vec<usize>)>,
) {
    if covered == full {
        let mean = total / chosen.len() as f64;
        let improves = match best {
            Some((best_mean, _)) => mean > *best_mean,
            None => true,
        };
        if improves {
            *best = Some((mean, chosen.clone()));
        }
        return;
    }

    let next_bit = (!covered.0 & full.0).trailing_zeros() as usize;
    for idx in start..parts.len() {
        let part = &parts[idx];
        if part.mask.contains(next_bit) && part.mask.is_disjoint(covered) {
            chosen.push(idx);
            search_cover(
                parts,
                full,
                part.begin,
                covered.union(part.mask),
                total + part.score,
                chosen,
                best,
            );
            chosen.pop();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::shape::GraphShape;

    fn path(n: u32) -> (Graph<u32>, Vec<NodeId>) {
        let mut g: Graph<u32> = Graph::new(GraphShape::undirected());
        let ids: Vec<NodeId> = (0..n).map(|i| g.add_node(i)).collect();
        for w in ids.windows(2) {
            g.add_edge(w[0], w[1], 1.0, None).unwrap();
        }
        (g, ids)
    }

    #[test]
    fn three_node_path_prefers_one_pair() {
        let (g, ids) = path(3);
        // score = part size: pairing two nodes gives mean 1.5, all
        // singletons only 1.0
        let partition = g.optimize_partition(ids[0], 2, |part| part.len() as f64);
        assert_eq!(partition.len(), 2);
        let total: usize = partition.iter().map(Vec::len).sum();
        assert_eq!(total, 3);
        assert!(partition.iter().any(|p| p.len() == 2));
    }

    #[test]
    fn singleton_favoring_score_keeps_everything_apart() {
        let (g, ids) = path(4);
        let partition = g.optimize_partition(ids[0], 3, |part| 1.0 / part.len() as f64);
        assert_eq!(partition.len(), 4);
        assert!(partition.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn parts_are_connected() {
        // star: pairing two leaves is impossible, every multi-node part
        // must contain the center
        let mut g: Graph<&str> = Graph::new(GraphShape::undirected());
        let center = g.add_node("center");
        let leaves = ["l1", "l2", "l3"].map(|p| g.add_node(p));
        for &leaf in &leaves {
            g.add_edge(center, leaf, 1.0, None).unwrap();
        }
        let partition = g.optimize_partition(center, 2, |part| part.len() as f64);
        for part in &partition {
            if part.len() > 1 {
                assert!(part.contains(&center));
            }
        }
        let total: usize = partition.iter().map(Vec::len).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn oversized_component_degrades_to_singletons() {
        let (g, ids) = path(65);
        let partition = g.optimize_partition(ids[0], 4, |part| part.len() as f64);
        assert_eq!(partition.len(), 65);
        assert!(partition.iter().all(|p| p.len() == 1));
    }

    #[test]
    fn single_node_component_is_its_own_part() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        assert_eq!(g.optimize_partition(a, 4, |_| 1.0), vec![vec![a]]);
    }

    #[test]
    fn dead_root_yields_an_empty_partition() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        g.remove_node_and_edges(a);
        assert!(g.optimize_partition(a, 4, |_| 1.0).is_empty());
    }

    #[test]
    fn partition_ignores_other_components() {
        let mut g: Graph<u32> = Graph::new(GraphShape::undirected());
        let a = g.add_node(0);
        let b = g.add_node(1);
        let c = g.add_node(2);
        g.add_edge(a, b, 1.0, None).unwrap();
        let partition = g.optimize_partition(a, 2, |part| part.len() as f64);
        let members: Vec<NodeId> = partition.into_iter().flatten().collect();
        assert!(members.contains(&a) && members.contains(&b));
        assert!(!members.contains(&c));
    }

    #[test]
    fn payload_groups_wrapper() {
        let (g, ids) = path(2);
        let groups = g.optimize_partition_groups(ids[0], 2, |part| part.len() as f64);
        assert_eq!(groups, vec![vec![0, 1]]);
    }

    #[test]
    fn each_candidate_part_is_scored_once() {
        let (g, ids) = path(3);
        let mut calls: Vec<usize> = Vec::new();
        g.optimize_partition(ids[0], 2, |part| {
            calls.push(part.len());
            part.len() as f64
        });
        // parts of a 3-path with max size 2: three singletons, two pairs
        assert_eq!(calls.len(), 5);
    }
}
