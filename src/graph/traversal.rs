/*!
# Traversal

Iterative breadth-first and depth-first iterators over the arena graph.
The frontier is an explicit queue or stack and nodes are marked visited
when pushed, so a node is yielded at most once and recursion depth never
depends on the graph. Both iterators follow outgoing edges; in an
undirected graph the paired reverse edges make that equivalent to
traversing both directions.

The mutation protocol in [`core`](crate::graph::core) leans on these
iterators for its genuine-cycle checks.
*/

use std::collections::VecDeque;
use std::hash::Hash;

use crate::graph::core::{Graph, NodeId};

/// Breadth-first iterator over the nodes reachable from a start node.
pub struct Bfs<'a, P, L> {
    graph: &'a Graph<P, L>,
    queue: VecDeque<NodeId>,
    visited: Vec<bool>,
}

/// Depth-first iterator over the nodes reachable from a start node.
pub struct Dfs<'a, P, L> {
    graph: &'a Graph<P, L>,
    stack: Vec<NodeId>,
    visited: Vec<bool>,
}

impl<P: Hash + Eq + Clone, L> Iterator for Bfs<'_, P, L> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let u = self.queue.pop_front()?;
        for v in self.graph.neighbors(u) {
            if !self.visited[v.index()] {
                self.visited[v.index()] = true;
                self.queue.push_back(v);
            }
        }
        Some(u)
    }
}

impl<P: Hash + Eq + Clone, L> Iterator for Dfs<'_, P, L> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let u = self.stack.pop()?;
        for v in self.graph.neighbors(u) {
            if !self.visited[v.index()] {
                self.visited[v.index()] = true;
                self.stack.push(v);
            }
        }
        Some(u)
    }
}

impl<P: Hash + Eq + Clone, L> Graph<P, L> {
    /// Returns a BFS iterator over the nodes reachable from `start`
    /// (empty if `start` is dead).
    pub fn bfs(&self, start: NodeId) -> Bfs<'_, P, L> {
        let mut visited = vec![false; self.node_slot_capacity()];
        let mut queue = VecDeque::new();
        if self.has_node(start) {
            visited[start.index()] = true;
            queue.push_back(start);
        }
        Bfs {
            graph: self,
            queue,
            visited,
        }
    }

    /// Returns a DFS iterator over the nodes reachable from `start`
    /// (empty if `start` is dead).
    pub fn dfs(&self, start: NodeId) -> Dfs<'_, P, L> {
        let mut visited = vec![false; self.node_slot_capacity()];
        let mut stack = Vec::new();
        if self.has_node(start) {
            visited[start.index()] = true;
            stack.push(start);
        }
        Dfs {
            graph: self,
            stack,
            visited,
        }
    }

    /// Returns *true* if a non-trivial directed path from `start` to
    /// `target` exists. `start` itself does not count as reached, so for
    /// `start == target` this asks whether `start` lies on a cycle.
    pub(crate) fn reaches(&self, start: NodeId, target: NodeId) -> bool {
        self.dfs(start).skip(1).any(|u| u == target)
    }
}
