/*!
# Spanning Trees

Derives tree-shaped graphs from an existing graph: a BFS spanning tree of
everything reachable from a chosen root, and a minimum spanning tree over
the edge costs (Kruskal). Both return a *new* graph with
[`GraphShape::tree`] and cloned payloads; the source graph is untouched.
*/

use std::hash::Hash;

use itertools::Itertools;

use crate::graph::core::{Graph, NodeId};
use crate::graph::shape::GraphShape;

impl<P: Hash + Eq + Clone, L> Graph<P, L> {
    /// Builds the BFS spanning tree of all nodes reachable from `root`
    /// along outgoing edges. Tree edges keep the cost of the graph edge
    /// they were discovered through. An empty graph is returned if
    /// `root` is dead.
    pub fn create_spanning_tree(&self, root: NodeId) -> Graph<P> {
        let mut tree: Graph<P> = Graph::new(GraphShape::tree());
        let Some(payload) = self.node_payload(root) else {
            return tree;
        };
        tree.add_node(payload.clone());

        // BFS, but tracking the discovering edge so its cost survives
        let mut visited = vec![false; self.node_slot_capacity()];
        visited[root.index()] = true;
        let mut queue = std::collections::VecDeque::from(vec![root]);
        while let Some(u) = queue.pop_front() {
            for e in self.out_edges(u) {
                let Some((_, v)) = self.edge_endpoints(e) else {
                    continue;
                };
                if !visited[v.index()] {
                    visited[v.index()] = true;
                    if let (Some(pu), Some(pv), Some(cost)) = (
                        self.node_payload(u),
                        self.node_payload(v),
                        self.edge_cost(e),
                    ) {
                        tree.add_edge_between(pu.clone(), pv.clone(), cost);
                    }
                    queue.push_back(v);
                }
            }
        }
        tree
    }

    /// Builds a minimum spanning tree (or forest, if the graph is
    /// disconnected) over the edge costs using Kruskal's algorithm.
    /// Directions are ignored; every node of the graph appears in the
    /// result, isolated ones included.
    pub fn create_minimum_spanning_tree(&self) -> Graph<P> {
        let mut tree: Graph<P> = Graph::new(GraphShape::tree());
        for u in self.nodes() {
            if let Some(p) = self.node_payload(u) {
                tree.add_node(p.clone());
            }
        }

        // ascending by cost; the tree shape itself rejects edges that
        // would reconnect a component
        let by_cost = self
            .edges()
            .filter(|&e| match self.edge_endpoints(e) {
                Some((from, to)) => from != to,
                None => false,
            })
            .sorted_by(|&a, &b| {
                let ca = self.edge_cost(a).unwrap_or(f64::INFINITY);
                let cb = self.edge_cost(b).unwrap_or(f64::INFINITY);
                ca.total_cmp(&cb)
            });
        for e in by_cost {
            if let (Some((from, to)), Some(cost)) = (self.edge_endpoints(e), self.edge_cost(e)) {
                if let (Some(pf), Some(pt)) = (self.node_payload(from), self.node_payload(to)) {
                    tree.add_edge_between(pf.clone(), pt.clone(), cost);
                }
            }
        }
        tree
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spanning_tree_covers_the_reachable_subgraph() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        let d = g.add_node("d");
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(a, c, 2.0, None).unwrap();
        g.add_edge(b, c, 3.0, None).unwrap();
        g.add_edge(d, a, 4.0, None).unwrap();

        let tree = g.create_spanning_tree(a);
        // d is unreachable from a
        assert_eq!(tree.number_of_nodes(), 3);
        // a tree on 3 nodes has 2 undirected edges (4 slots)
        assert_eq!(tree.number_of_edges(), 4);
        assert!(tree.find_node(&"d").is_none());
    }

    #[test]
    fn spanning_tree_keeps_discovery_costs() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, 7.5, None).unwrap();
        let tree = g.create_spanning_tree(a);
        let ta = tree.find_node(&"a").unwrap();
        let e = tree.out_edges(ta).next().unwrap();
        assert_eq!(tree.edge_cost(e), Some(7.5));
    }

    #[test]
    fn dead_root_gives_an_empty_tree() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        g.remove_node_and_edges(a);
        let tree = g.create_spanning_tree(a);
        assert!(tree.is_empty());
    }

    #[test]
    fn minimum_spanning_tree_picks_the_cheap_edges() {
        let mut g: Graph<&str> = Graph::new(GraphShape::undirected());
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(b, c, 2.0, None).unwrap();
        g.add_edge(a, c, 10.0, None).unwrap();

        let mst = g.create_minimum_spanning_tree();
        assert_eq!(mst.number_of_nodes(), 3);
        let total: f64 = mst
            .edges()
            .filter_map(|e| mst.edge_cost(e))
            .sum::<f64>()
            / 2.0; // each undirected edge counts twice
        assert_eq!(total, 3.0);
        let (ta, tc) = (mst.find_node(&"a").unwrap(), mst.find_node(&"c").unwrap());
        assert_eq!(mst.has_edge(ta, tc), 0);
    }

    #[test]
    fn minimum_spanning_tree_keeps_isolated_nodes() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        let b = g.add_node(1);
        g.add_node(2);
        g.add_edge(a, b, 1.0, None).unwrap();
        let mst = g.create_minimum_spanning_tree();
        assert_eq!(mst.number_of_nodes(), 3);
        assert_eq!(mst.number_of_edges(), 2);
    }
}
