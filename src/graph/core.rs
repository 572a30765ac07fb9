/*!
# Graph Core

An attributed graph over arbitrary payloads with an invariant-preserving
mutation protocol. The active [`GraphShape`] decides which mutations are
accepted: every `add_edge` runs through a gate sequence (self-loop gate,
parallel gate, component check, cycle check) and reports rejection as
`None` without touching the graph. Shape violations are expected outcomes
here, not errors.

Nodes and edges live in slot arenas addressed by opaque [`NodeId`] /
[`EdgeId`] handles. Removals free a slot and recycle it later; live
handles are never renumbered, so ids held by callers stay valid across
unrelated removals.

For shapes that constrain connectivity (undirected or acyclic), a
disjoint-set forest over the nodes answers "are these endpoints already
connected" in near-constant time. Edge removal has no cheap disjoint-set
counterpart, so it re-floods the affected component from both endpoints
(the O(n·m) cost the original protocol accepts).

Each node carries a *subgraph root* mark: it starts set and is cleared
once the node gains an incoming edge that did not close a cycle. The set
of marked nodes is the set of entry points from which every node of the
graph can be reached.
*/

use std::hash::Hash;

use fxhash::FxHashMap;
use smallvec::SmallVec;

use crate::graph::shape::GraphShape;

/// Opaque handle to a live node. Stable across unrelated removals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

/// Opaque handle to a live edge. Stable across unrelated removals.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl EdgeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
struct NodeSlot<P> {
    payload: P,
    /// Disjoint-set parent; `None` marks a set root.
    parent: Option<NodeId>,
    /// Rank of a set root (unused while `parent` is set).
    rank: u32,
    is_subgraph_root: bool,
    out_edges: SmallVec<[EdgeId; 4]>,
    in_edges: SmallVec<[EdgeId; 4]>,
}

#[derive(Debug, Clone)]
struct EdgeSlot<L> {
    from: NodeId,
    to: NodeId,
    cost: f64,
    label: Option<L>,
    /// The reverse edge of an undirected pair.
    other: Option<EdgeId>,
}

/// Attributed graph with shape-gated mutations.
///
/// `P` is the node payload (must be hashable, payloads are unique per
/// graph), `L` an optional edge label.
#[derive(Debug, Clone)]
pub struct Graph<P, L = ()> {
    shape: GraphShape,
    nodes: Vec<Option<NodeSlot<P>>>,
    edges: Vec<Option<EdgeSlot<L>>>,
    free_nodes: Vec<NodeId>,
    free_edges: Vec<EdgeId>,
    payload_to_node: FxHashMap<P, NodeId>,
    num_nodes: usize,
    num_edges: usize,
}

impl<P: Hash + Eq + Clone, L> Default for Graph<P, L> {
    fn default() -> Self {
        Self::new(GraphShape::default())
    }
}

impl<P: Hash + Eq + Clone, L> Graph<P, L> {
    /// Creates an empty graph with the given shape.
    pub fn new(shape: GraphShape) -> Self {
        Graph {
            shape,
            nodes: Vec::new(),
            edges: Vec::new(),
            free_nodes: Vec::new(),
            free_edges: Vec::new(),
            payload_to_node: FxHashMap::default(),
            num_nodes: 0,
            num_edges: 0,
        }
    }

    /// The active shape.
    pub fn shape(&self) -> GraphShape {
        self.shape
    }

    /// Number of live nodes.
    pub fn number_of_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Number of live edges. An undirected edge counts as two (one per
    /// direction).
    pub fn number_of_edges(&self) -> usize {
        self.num_edges
    }

    /// Returns *true* if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.num_nodes == 0
    }

    // --- internal slot access ------------------------------------------

    /// ** Panics if `u` is not a live node **
    fn node(&self, u: NodeId) -> &NodeSlot<P> {
        self.nodes[u.index()].as_ref().expect("live node id")
    }

    /// ** Panics if `u` is not a live node **
    fn node_mut(&mut self, u: NodeId) -> &mut NodeSlot<P> {
        self.nodes[u.index()].as_mut().expect("live node id")
    }

    /// ** Panics if `e` is not a live edge **
    fn edge(&self, e: EdgeId) -> &EdgeSlot<L> {
        self.edges[e.index()].as_ref().expect("live edge id")
    }

    /// ** Panics if `e` is not a live edge **
    fn edge_mut(&mut self, e: EdgeId) -> &mut EdgeSlot<L> {
        self.edges[e.index()].as_mut().expect("live edge id")
    }

    /// Upper bound on node slot indices, for visited arrays.
    pub(crate) fn node_slot_capacity(&self) -> usize {
        self.nodes.len()
    }

    fn alloc_node(&mut self, slot: NodeSlot<P>) -> NodeId {
        match self.free_nodes.pop() {
            Some(id) => {
                self.nodes[id.index()] = Some(slot);
                id
            }
            None => {
                self.nodes.push(Some(slot));
                NodeId((self.nodes.len() - 1) as u32)
            }
        }
    }

    fn alloc_edge(&mut self, slot: EdgeSlot<L>) -> EdgeId {
        match self.free_edges.pop() {
            Some(id) => {
                self.edges[id.index()] = Some(slot);
                id
            }
            None => {
                self.edges.push(Some(slot));
                EdgeId((self.edges.len() - 1) as u32)
            }
        }
    }

    // --- queries -------------------------------------------------------

    /// Returns *true* if `u` refers to a live node.
    pub fn has_node(&self, u: NodeId) -> bool {
        self.nodes
            .get(u.index())
            .is_some_and(|slot| slot.is_some())
    }

    /// Returns *true* if `e` refers to a live edge.
    pub fn has_edge_id(&self, e: EdgeId) -> bool {
        self.edges
            .get(e.index())
            .is_some_and(|slot| slot.is_some())
    }

    /// Looks up the node holding `payload`.
    pub fn find_node(&self, payload: &P) -> Option<NodeId> {
        self.payload_to_node.get(payload).copied()
    }

    /// The payload of a live node.
    pub fn node_payload(&self, u: NodeId) -> Option<&P> {
        self.nodes.get(u.index())?.as_ref().map(|slot| &slot.payload)
    }

    /// Number of parallel edges from `from` to `to` (0 if either node is
    /// dead).
    pub fn has_edge(&self, from: NodeId, to: NodeId) -> usize {
        if !self.has_node(from) || !self.has_node(to) {
            return 0;
        }
        self.node(from)
            .out_edges
            .iter()
            .filter(|&&e| self.edge(e).to == to)
            .count()
    }

    /// Endpoints `(from, to)` of a live edge.
    pub fn edge_endpoints(&self, e: EdgeId) -> Option<(NodeId, NodeId)> {
        self.edges
            .get(e.index())?
            .as_ref()
            .map(|slot| (slot.from, slot.to))
    }

    /// Cost of a live edge.
    pub fn edge_cost(&self, e: EdgeId) -> Option<f64> {
        self.edges.get(e.index())?.as_ref().map(|slot| slot.cost)
    }

    /// Label of a live edge, if it carries one.
    pub fn edge_label(&self, e: EdgeId) -> Option<&L> {
        self.edges.get(e.index())?.as_ref()?.label.as_ref()
    }

    /// Iterates over all live nodes.
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| NodeId(i as u32)))
    }

    /// Iterates over all live edges (both directions of undirected pairs).
    pub fn edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| EdgeId(i as u32)))
    }

    /// Iterates over the outgoing edges of `u` (empty if `u` is dead).
    pub fn out_edges(&self, u: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes
            .get(u.index())
            .and_then(|slot| slot.as_ref())
            .into_iter()
            .flat_map(|slot| slot.out_edges.iter().copied())
    }

    /// Iterates over the incoming edges of `u` (empty if `u` is dead).
    pub fn in_edges(&self, u: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.nodes
            .get(u.index())
            .and_then(|slot| slot.as_ref())
            .into_iter()
            .flat_map(|slot| slot.in_edges.iter().copied())
    }

    /// Iterates over the out-neighbors of `u`.
    pub fn neighbors(&self, u: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.out_edges(u).map(|e| self.edge(e).to)
    }

    /// Returns *true* if `u` is a live node marked as a subgraph root.
    pub fn is_subgraph_root(&self, u: NodeId) -> bool {
        self.nodes
            .get(u.index())
            .and_then(|slot| slot.as_ref())
            .is_some_and(|slot| slot.is_subgraph_root)
    }

    /// Iterates over all subgraph roots.
    pub fn subgraph_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref()
                .and_then(|s| s.is_subgraph_root.then_some(NodeId(i as u32)))
        })
    }

    /// Number of nodes reachable from `root` along outgoing edges
    /// (including `root`; 0 if `root` is dead).
    pub fn size_of_subgraph(&self, root: NodeId) -> usize {
        self.bfs(root).count()
    }

    // --- disjoint-set forest -------------------------------------------

    /// Finds the set root of `u` with path compression.
    ///
    /// ** Panics if `u` is not a live node **
    pub(crate) fn find_root(&mut self, u: NodeId) -> NodeId {
        let mut root = u;
        while let Some(p) = self.node(root).parent {
            root = p;
        }
        let mut cur = u;
        while let Some(p) = self.node(cur).parent {
            self.node_mut(cur).parent = Some(root);
            cur = p;
        }
        root
    }

    /// Unions two distinct set roots by rank; `a` wins ties.
    fn union_roots(&mut self, a: NodeId, b: NodeId) {
        let rank_a = self.node(a).rank;
        let rank_b = self.node(b).rank;
        if rank_b > rank_a {
            self.node_mut(a).parent = Some(b);
        } else {
            if rank_a == rank_b {
                self.node_mut(a).rank += 1;
            }
            self.node_mut(b).parent = Some(a);
        }
    }

    /// Discards the disjoint-set forest and rebuilds it from the current
    /// edges. Needed after a shape transition changes which constraints
    /// the forest backs.
    pub(crate) fn rebuild_disjoint_sets(&mut self) {
        for slot in self.nodes.iter_mut().flatten() {
            slot.parent = None;
            slot.rank = 0;
        }
        let edge_ids: Vec<EdgeId> = self.logical_edges().collect();
        for e in edge_ids {
            let (from, to) = {
                let slot = self.edge(e);
                (slot.from, slot.to)
            };
            if from == to {
                continue;
            }
            let root_to = self.find_root(to);
            let root_from = self.find_root(from);
            if root_from != root_to {
                self.union_roots(root_to, root_from);
            }
        }
    }

    /// Iterates over each logical edge once: undirected pairs yield only
    /// the member with the smaller id.
    fn logical_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges()
            .filter(|&e| match self.edge(e).other {
                Some(other) => e < other,
                None => true,
            })
    }

    /// Re-floods the weak component(s) around a removed edge, rebuilding
    /// a flat disjoint-set forest rooted at each endpoint.
    fn reseed_components(&mut self, a: NodeId, b: NodeId) {
        let mut visited = vec![false; self.node_slot_capacity()];
        self.flood_from(a, &mut visited);
        if !visited[b.index()] {
            self.flood_from(b, &mut visited);
        }
    }

    fn flood_from(&mut self, root: NodeId, visited: &mut [bool]) {
        visited[root.index()] = true;
        {
            let slot = self.node_mut(root);
            slot.parent = None;
            slot.rank = 0;
        }
        let mut stack = vec![root];
        while let Some(u) = stack.pop() {
            let mut next: SmallVec<[NodeId; 8]> = SmallVec::new();
            {
                let slot = self.node(u);
                for &e in &slot.out_edges {
                    next.push(self.edge(e).to);
                }
                for &e in &slot.in_edges {
                    next.push(self.edge(e).from);
                }
            }
            for v in next {
                if !visited[v.index()] {
                    visited[v.index()] = true;
                    let slot = self.node_mut(v);
                    slot.parent = Some(root);
                    slot.rank = 0;
                    stack.push(v);
                }
            }
        }
    }

    // --- mutation ------------------------------------------------------

    /// Adds a node holding `payload` and returns its handle. Payloads are
    /// unique: if a node with this payload exists, its handle is returned
    /// and the graph is unchanged. Fresh nodes start as their own set
    /// root and as subgraph roots.
    pub fn add_node(&mut self, payload: P) -> NodeId {
        if let Some(&id) = self.payload_to_node.get(&payload) {
            return id;
        }
        let id = self.alloc_node(NodeSlot {
            payload: payload.clone(),
            parent: None,
            rank: 0,
            is_subgraph_root: true,
            out_edges: SmallVec::new(),
            in_edges: SmallVec::new(),
        });
        self.payload_to_node.insert(payload, id);
        self.num_nodes += 1;
        id
    }

    /// Adds an edge from `from` to `to`, subject to the shape gates, and
    /// returns its handle. `None` means the edge was rejected (dead
    /// endpoint, forbidden self-loop, forbidden parallel edge, or a
    /// forbidden cycle/connection); the graph is unchanged in that case.
    ///
    /// In an undirected graph an accepted edge also inserts the paired
    /// reverse edge, so the edge count grows by two.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, cost: f64, label: Option<L>) -> Option<EdgeId>
    where
        L: Clone,
    {
        if !self.has_node(from) || !self.has_node(to) {
            return None;
        }
        if !self.shape.self_loops && from == to {
            return None;
        }
        if !self.shape.multi && self.has_edge(from, to) > 0 {
            return None;
        }

        let edge = self.insert_edge(from, to, cost, label.clone(), true)?;
        if !self.shape.directed {
            if let Some(other) = self.insert_edge(to, from, cost, label, false) {
                self.edge_mut(edge).other = Some(other);
                self.edge_mut(other).other = Some(edge);
            }
        }
        Some(edge)
    }

    /// Convenience for payload-level callers: adds missing endpoint nodes,
    /// then the edge.
    pub fn add_edge_between(&mut self, from: P, to: P, cost: f64) -> Option<EdgeId>
    where
        L: Clone,
    {
        let from = self.add_node(from);
        let to = self.add_node(to);
        self.add_edge(from, to, cost, None)
    }

    /// Inserts one directed edge slot. With `check` set this runs the
    /// component/cycle gates and the subgraph-root update; the paired
    /// reverse edge of an undirected insert passes `check = false` and is
    /// inserted unconditionally.
    fn insert_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        cost: f64,
        label: Option<L>,
        check: bool,
    ) -> Option<EdgeId> {
        let mut found_cycle = false;
        if check {
            let mut possibly_connected = true;
            if self.shape.tracks_components() {
                let root_to = self.find_root(to);
                let root_from = self.find_root(from);
                if root_from != root_to {
                    possibly_connected = false;
                    self.union_roots(root_to, root_from);
                }
            }
            if possibly_connected {
                if !self.shape.blob {
                    // forest shape: an edge may only join two components
                    return None;
                }
                // Endpoints may share a component without a directed path
                // to -> from existing, so a genuine cycle needs a search.
                if !self.shape.cyclic
                    || (self.shape.directed && self.node(to).is_subgraph_root)
                {
                    found_cycle = self.reaches(to, from);
                }
                if !self.shape.cyclic && found_cycle {
                    return None;
                }
            }
        }

        let edge = self.alloc_edge(EdgeSlot {
            from,
            to,
            cost,
            label,
            other: None,
        });
        self.node_mut(from).out_edges.push(edge);
        self.node_mut(to).in_edges.push(edge);
        self.num_edges += 1;
        // `to` stays a root if the new edge closed a cycle back into it
        if check && !found_cycle {
            self.node_mut(to).is_subgraph_root = false;
        }
        Some(edge)
    }

    /// Removes a live edge (and, in an undirected graph, its paired
    /// reverse edge). Returns *false* if `e` is dead.
    pub fn remove_edge(&mut self, e: EdgeId) -> bool {
        if !self.has_edge_id(e) {
            return false;
        }
        if !self.shape.directed {
            if let Some(other) = self.edge(e).other {
                // break the pairing before removing either direction
                self.edge_mut(other).other = None;
                self.edge_mut(e).other = None;
                self.remove_edge0(other, false);
            }
        }
        self.remove_edge0(e, true);
        true
    }

    /// Removes every edge from `from` to `to`. Returns *false* if there
    /// was none.
    pub fn remove_edge_between(&mut self, from: NodeId, to: NodeId) -> bool {
        let doomed: Vec<EdgeId> = self
            .out_edges(from)
            .filter(|&e| self.edge(e).to == to)
            .collect();
        let mut found_any = false;
        for e in doomed {
            // a paired removal may already have taken this id
            found_any |= self.remove_edge(e);
        }
        found_any
    }

    fn remove_edge0(&mut self, e: EdgeId, check: bool) {
        let (from, to) = {
            let slot = self.edge(e);
            (slot.from, slot.to)
        };
        let from_was_root = self.node(from).is_subgraph_root;

        // unlink first so the recomputations below see the edge gone
        self.node_mut(from).out_edges.retain(|id| *id != e);
        self.node_mut(to).in_edges.retain(|id| *id != e);
        self.edges[e.index()] = None;
        self.free_edges.push(e);
        self.num_edges -= 1;

        if check && self.shape.tracks_components() && from != to {
            self.reseed_components(from, to);
        }
        if check && self.shape.directed && from_was_root {
            // the root designation moves onto the cycle remnant
            if self.reaches(to, from) {
                self.node_mut(to).is_subgraph_root = true;
                self.node_mut(from).is_subgraph_root = false;
            }
        }
    }

    /// Removes a node together with all its incident edges. Returns
    /// *false* if `u` is dead.
    pub fn remove_node_and_edges(&mut self, u: NodeId) -> bool {
        if !self.has_node(u) {
            return false;
        }
        while let Some(&e) = self.node(u).out_edges.first() {
            self.remove_edge(e);
        }
        while let Some(&e) = self.node(u).in_edges.first() {
            self.remove_edge(e);
        }
        self.detach_from_disjoint_set(u);

        let slot = self.nodes[u.index()].take();
        if let Some(slot) = slot {
            self.payload_to_node.remove(&slot.payload);
        }
        self.free_nodes.push(u);
        self.num_nodes -= 1;
        true
    }

    /// Removes a node but keeps its through-traffic: every (in-edge,
    /// out-edge) pair is stitched into a direct edge with the summed
    /// cost, then the node and its own edges are removed. Returns *false*
    /// if `u` is dead.
    pub fn remove_node(&mut self, u: NodeId) -> bool
    where
        L: Clone,
    {
        if !self.has_node(u) {
            return false;
        }
        let mut stitches: Vec<(NodeId, NodeId, f64)> = Vec::new();
        for &in_edge in &self.node(u).in_edges {
            for &out_edge in &self.node(u).out_edges {
                stitches.push((
                    self.edge(in_edge).from,
                    self.edge(out_edge).to,
                    self.edge(in_edge).cost + self.edge(out_edge).cost,
                ));
            }
        }
        for (from, to, cost) in stitches {
            self.add_edge(from, to, cost, None);
        }
        self.remove_node_and_edges(u)
    }

    /// Re-points stale disjoint-set parent references onto a live
    /// representative before the node slot is freed.
    fn detach_from_disjoint_set(&mut self, u: NodeId) {
        let orphans: Vec<NodeId> = self
            .nodes()
            .filter(|&v| v != u && self.node(v).parent == Some(u))
            .collect();
        if let Some((&rep, rest)) = orphans.split_first() {
            let rank = self.node(u).rank;
            {
                let slot = self.node_mut(rep);
                slot.parent = None;
                slot.rank = rank;
            }
            for &v in rest {
                self.node_mut(v).parent = Some(rep);
            }
        }
    }

    /// Drops every edge; all nodes become isolated subgraph roots and set
    /// roots again.
    pub fn remove_all_edges(&mut self) {
        for slot in self.nodes.iter_mut().flatten() {
            slot.out_edges.clear();
            slot.in_edges.clear();
            slot.is_subgraph_root = true;
            slot.parent = None;
            slot.rank = 0;
        }
        self.edges.clear();
        self.free_edges.clear();
        self.num_edges = 0;
    }

    // --- shape transitions ---------------------------------------------

    /// Allows cycles from now on. Always succeeds.
    pub fn make_cyclic(&mut self) -> bool {
        self.shape.cyclic = true;
        true
    }

    /// Forbids cycles from now on. Fails (leaving the shape unchanged)
    /// if the current structure already contains a cycle; self-loops are
    /// not counted, matching the edge gates.
    pub fn make_acyclic(&mut self) -> bool {
        if self.has_cycle() {
            return false;
        }
        self.shape.cyclic = false;
        self.rebuild_disjoint_sets();
        true
    }

    /// Allows arbitrary connectivity. Always succeeds.
    pub fn make_blob(&mut self) -> bool {
        self.shape.blob = true;
        true
    }

    /// Constrains the graph to forest shape. Fails (leaving the shape
    /// unchanged) unless the current structure already is a forest:
    /// no self-loops, no parallel edges, every edge bridging two
    /// components, and (if directed) in-degree at most one.
    pub fn make_tree(&mut self) -> bool {
        if !self.is_forest() {
            return false;
        }
        self.shape.cyclic = false;
        self.shape.blob = false;
        self.shape.multi = false;
        self.shape.self_loops = false;
        self.rebuild_disjoint_sets();
        true
    }

    /// Allows parallel edges. Always succeeds.
    pub fn make_multi_connected(&mut self) -> bool {
        self.shape.multi = true;
        true
    }

    /// Collapses parallel edges, keeping per ordered pair the edge with
    /// the maximum cost (`keep_max_cost`) or the minimum cost, then
    /// forbids parallels. Always succeeds.
    pub fn make_singly_connected(&mut self, keep_max_cost: bool) -> bool {
        let node_ids: Vec<NodeId> = self.nodes().collect();
        for u in node_ids {
            let mut best: FxHashMap<NodeId, EdgeId> = FxHashMap::default();
            let mut doomed: Vec<EdgeId> = Vec::new();
            for e in self.out_edges(u) {
                let to = self.edge(e).to;
                match best.get(&to) {
                    None => {
                        best.insert(to, e);
                    }
                    Some(&kept) => {
                        let (a, b) = (self.edge(e).cost, self.edge(kept).cost);
                        let replace = if keep_max_cost { a > b } else { a < b };
                        if replace {
                            doomed.push(kept);
                            best.insert(to, e);
                        } else {
                            doomed.push(e);
                        }
                    }
                }
            }
            for e in doomed {
                self.remove_edge(e);
            }
        }
        self.shape.multi = false;
        true
    }

    /// Allows self-loops. Always succeeds.
    pub fn make_self_connected(&mut self) -> bool {
        self.shape.self_loops = true;
        true
    }

    /// Removes all self-loops, then forbids them. Always succeeds.
    pub fn make_not_self_connected(&mut self) -> bool {
        let loops: Vec<EdgeId> = self
            .edges()
            .filter(|&e| {
                let slot = self.edge(e);
                slot.from == slot.to
            })
            .collect();
        for e in loops {
            self.remove_edge(e);
        }
        self.shape.self_loops = false;
        true
    }

    /// Makes all edges one-way: undirected pairs stay as two independent
    /// directed edges. Always succeeds.
    pub fn make_directed(&mut self) -> bool {
        for slot in self.edges.iter_mut().flatten() {
            slot.other = None;
        }
        self.shape.directed = true;
        true
    }

    /// Pairs every directed edge with a fresh reverse edge. Always
    /// succeeds.
    pub fn make_undirected(&mut self) -> bool
    where
        L: Clone,
    {
        if !self.shape.directed {
            return true;
        }
        let unpaired: Vec<EdgeId> = self
            .edges()
            .filter(|&e| self.edge(e).other.is_none())
            .collect();
        for e in unpaired {
            let (from, to, cost, label) = {
                let slot = self.edge(e);
                (slot.from, slot.to, slot.cost, slot.label.clone())
            };
            if let Some(other) = self.insert_edge(to, from, cost, label, false) {
                self.edge_mut(e).other = Some(other);
                self.edge_mut(other).other = Some(e);
            }
        }
        self.shape.directed = false;
        self.rebuild_disjoint_sets();
        true
    }

    // --- cycle / forest validation -------------------------------------

    /// Returns *true* if the current structure contains a cycle under the
    /// current directedness; self-loops are ignored.
    fn has_cycle(&self) -> bool {
        if self.shape.directed {
            self.has_directed_cycle()
        } else {
            self.has_undirected_cycle()
        }
    }

    /// Iterative three-color DFS over the out-edges.
    fn has_directed_cycle(&self) -> bool {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;
        let mut color = vec![WHITE; self.node_slot_capacity()];

        for start in self.nodes() {
            if color[start.index()] != WHITE {
                continue;
            }
            // stack entries are (node, next out-edge offset)
            let mut stack: Vec<(NodeId, usize)> = vec![(start, 0)];
            color[start.index()] = GRAY;
            while let Some(top) = stack.last_mut() {
                let u = top.0;
                let next = self.node(u).out_edges.get(top.1).copied();
                top.1 += 1;
                match next {
                    None => {
                        color[u.index()] = BLACK;
                        stack.pop();
                    }
                    Some(e) => {
                        let v = self.edge(e).to;
                        if v == u {
                            continue;
                        }
                        match color[v.index()] {
                            GRAY => return true,
                            WHITE => {
                                color[v.index()] = GRAY;
                                stack.push((v, 0));
                            }
                            _ => {}
                        }
                    }
                }
            }
        }
        false
    }

    /// Union-find replay over the logical edges: a cycle exists iff some
    /// edge joins two already-connected nodes.
    fn has_undirected_cycle(&self) -> bool {
        let mut parent: Vec<usize> = (0..self.node_slot_capacity()).collect();
        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }
        for e in self.logical_edges() {
            let slot = self.edge(e);
            if slot.from == slot.to {
                continue;
            }
            let a = find(&mut parent, slot.from.index());
            let b = find(&mut parent, slot.to.index());
            if a == b {
                return true;
            }
            parent[a] = b;
        }
        false
    }

    /// Forest validation for [`Graph::make_tree`].
    fn is_forest(&self) -> bool {
        for e in self.logical_edges() {
            let slot = self.edge(e);
            if slot.from == slot.to {
                return false;
            }
        }
        for u in self.nodes() {
            let mut seen: SmallVec<[NodeId; 8]> = SmallVec::new();
            for e in self.out_edges(u) {
                let to = self.edge(e).to;
                if seen.contains(&to) {
                    return false;
                }
                seen.push(to);
            }
            if self.shape.directed && self.node(u).in_edges.len() > 1 {
                return false;
            }
        }
        !self.has_undirected_cycle()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::prelude::*;
    use rand_pcg::Pcg64Mcg;

    #[test]
    fn duplicate_payloads_return_the_same_node() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        assert_ne!(a, b);
        assert_eq!(g.add_node("a"), a);
        assert_eq!(g.number_of_nodes(), 2);
        assert_eq!(g.find_node(&"b"), Some(b));
    }

    #[test]
    fn fresh_nodes_are_subgraph_roots() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(1);
        let b = g.add_node(2);
        assert!(g.is_subgraph_root(a) && g.is_subgraph_root(b));
        g.add_edge(a, b, 1.0, None).unwrap();
        assert!(g.is_subgraph_root(a));
        assert!(!g.is_subgraph_root(b));
        assert_eq!(g.subgraph_roots().collect::<Vec<_>>(), vec![a]);
    }

    #[test]
    fn undirected_edges_come_in_pairs() {
        let mut g: Graph<&str> = Graph::new(GraphShape::undirected());
        let a = g.add_node("a");
        let b = g.add_node("b");
        let e = g.add_edge(a, b, 2.5, None).unwrap();
        assert_eq!(g.number_of_edges(), 2);
        assert_eq!(g.has_edge(a, b), 1);
        assert_eq!(g.has_edge(b, a), 1);

        // removing either direction removes both
        assert!(g.remove_edge(e));
        assert_eq!(g.number_of_edges(), 0);
        assert_eq!(g.has_edge(a, b), 0);
        assert_eq!(g.has_edge(b, a), 0);
    }

    #[test]
    fn removing_the_reverse_direction_removes_the_pair() {
        let mut g: Graph<&str> = Graph::new(GraphShape::undirected());
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, 1.0, None).unwrap();
        let reverse = g.out_edges(b).next().unwrap();
        assert!(g.remove_edge(reverse));
        assert_eq!(g.number_of_edges(), 0);
    }

    #[test]
    fn cycle_rejection_leaves_the_graph_unchanged() {
        let mut g: Graph<&str> = Graph::new(GraphShape::dag());
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(b, c, 1.0, None).unwrap();
        let before = g.number_of_edges();
        assert!(g.add_edge(c, a, 1.0, None).is_none());
        assert_eq!(g.number_of_edges(), before);
        // a diamond shares components without a directed cycle
        assert!(g.add_edge(a, c, 1.0, None).is_some());
    }

    #[test]
    fn tree_shape_rejects_any_reconnection() {
        let mut g: Graph<u32> = Graph::new(GraphShape::tree());
        let a = g.add_node(0);
        let b = g.add_node(1);
        let c = g.add_node(2);
        assert!(g.add_edge(a, b, 1.0, None).is_some());
        assert!(g.add_edge(b, c, 1.0, None).is_some());
        assert!(g.add_edge(a, c, 1.0, None).is_none());
    }

    #[test]
    fn self_loop_and_parallel_gates() {
        let mut g: Graph<&str> = Graph::new(GraphShape {
            self_loops: false,
            multi: false,
            ..GraphShape::free()
        });
        let a = g.add_node("a");
        let b = g.add_node("b");
        assert!(g.add_edge(a, a, 1.0, None).is_none());
        assert!(g.add_edge(a, b, 1.0, None).is_some());
        assert!(g.add_edge(a, b, 1.0, None).is_none());

        assert!(g.make_self_connected());
        assert!(g.make_multi_connected());
        assert!(g.add_edge(a, a, 1.0, None).is_some());
        assert!(g.add_edge(a, b, 1.0, None).is_some());
        assert_eq!(g.has_edge(a, b), 2);
    }

    #[test]
    fn handles_stay_valid_across_removals() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        assert!(g.remove_node_and_edges(b));
        assert_eq!(g.node_payload(a), Some(&"a"));
        assert_eq!(g.node_payload(c), Some(&"c"));
        assert_eq!(g.node_payload(b), None);
        assert!(!g.has_node(b));

        // the freed slot is recycled, the old handle stays dead semantics
        let d = g.add_node("d");
        assert_eq!(g.node_payload(d), Some(&"d"));
        assert_eq!(g.number_of_nodes(), 3);
    }

    #[test]
    fn remove_node_stitches_through_traffic() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        g.add_edge(a, b, 2.0, None).unwrap();
        g.add_edge(b, c, 3.0, None).unwrap();
        assert!(g.remove_node(b));
        assert_eq!(g.has_edge(a, c), 1);
        let e = g.out_edges(a).next().unwrap();
        assert_eq!(g.edge_cost(e), Some(5.0));
    }

    #[test]
    fn remove_all_edges_resets_roots_and_sets() {
        let mut g: Graph<u32> = Graph::new(GraphShape::undirected());
        let a = g.add_node(0);
        let b = g.add_node(1);
        let c = g.add_node(2);
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(b, c, 1.0, None).unwrap();
        g.remove_all_edges();
        assert_eq!(g.number_of_edges(), 0);
        assert_eq!(g.subgraph_roots().count(), 3);
        // the components split again
        assert_ne!(g.find_root(a), g.find_root(c));
    }

    #[test]
    fn edge_removal_splits_components() {
        let mut g: Graph<u32> = Graph::new(GraphShape::undirected());
        let ids: Vec<NodeId> = (0..4).map(|i| g.add_node(i)).collect();
        g.add_edge(ids[0], ids[1], 1.0, None).unwrap();
        g.add_edge(ids[1], ids[2], 1.0, None).unwrap();
        g.add_edge(ids[2], ids[3], 1.0, None).unwrap();
        assert_eq!(g.find_root(ids[0]), g.find_root(ids[3]));

        let middle = g
            .out_edges(ids[1])
            .find(|&e| g.edge_endpoints(e) == Some((ids[1], ids[2])))
            .unwrap();
        assert!(g.remove_edge(middle));
        assert_eq!(g.find_root(ids[0]), g.find_root(ids[1]));
        assert_eq!(g.find_root(ids[2]), g.find_root(ids[3]));
        assert_ne!(g.find_root(ids[1]), g.find_root(ids[2]));

        // and rejoining works again
        assert!(g.add_edge(ids[1], ids[2], 1.0, None).is_some());
    }

    #[test]
    fn size_of_subgraph_follows_out_edges() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let c = g.add_node("c");
        let d = g.add_node("d");
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(b, c, 1.0, None).unwrap();
        g.add_edge(d, a, 1.0, None).unwrap();
        assert_eq!(g.size_of_subgraph(a), 3);
        assert_eq!(g.size_of_subgraph(d), 4);
    }

    #[test]
    fn make_acyclic_revalidates() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        let b = g.add_node(1);
        g.add_edge(a, b, 1.0, None).unwrap();
        let back = g.add_edge(b, a, 1.0, None).unwrap();
        assert!(!g.make_acyclic());
        assert!(g.shape().cyclic);

        g.remove_edge(back);
        assert!(g.make_acyclic());
        assert!(!g.shape().cyclic);
        assert!(g.add_edge(b, a, 1.0, None).is_none());
    }

    #[test]
    fn make_tree_requires_a_forest() {
        let mut g: Graph<u32> = Graph::default();
        let a = g.add_node(0);
        let b = g.add_node(1);
        let c = g.add_node(2);
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(a, c, 1.0, None).unwrap();
        assert!(g.make_tree());

        let mut h: Graph<u32> = Graph::default();
        let a = h.add_node(0);
        let b = h.add_node(1);
        let c = h.add_node(2);
        h.add_edge(a, b, 1.0, None).unwrap();
        h.add_edge(b, c, 1.0, None).unwrap();
        h.add_edge(c, a, 1.0, None).unwrap();
        assert!(!h.make_tree());
        assert!(h.shape().blob);
    }

    #[test]
    fn make_singly_connected_keeps_the_extreme_cost() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, 1.0, None).unwrap();
        g.add_edge(a, b, 5.0, None).unwrap();
        g.add_edge(a, b, 3.0, None).unwrap();
        assert!(g.make_singly_connected(true));
        assert_eq!(g.has_edge(a, b), 1);
        let e = g.out_edges(a).next().unwrap();
        assert_eq!(g.edge_cost(e), Some(5.0));
        assert!(g.add_edge(a, b, 9.0, None).is_none());
    }

    #[test]
    fn make_not_self_connected_drops_loops() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, a, 1.0, None).unwrap();
        g.add_edge(a, b, 1.0, None).unwrap();
        assert!(g.make_not_self_connected());
        assert_eq!(g.has_edge(a, a), 0);
        assert_eq!(g.has_edge(a, b), 1);
        assert!(g.add_edge(b, b, 1.0, None).is_none());
    }

    #[test]
    fn make_undirected_pairs_existing_edges() {
        let mut g: Graph<&str> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        g.add_edge(a, b, 4.0, None).unwrap();
        assert_eq!(g.number_of_edges(), 1);
        assert!(g.make_undirected());
        assert_eq!(g.number_of_edges(), 2);
        assert_eq!(g.has_edge(b, a), 1);
        // removing one direction now removes the pair
        let e = g.out_edges(a).next().unwrap();
        g.remove_edge(e);
        assert_eq!(g.number_of_edges(), 0);
    }

    #[test]
    fn edge_labels_are_stored() {
        let mut g: Graph<&str, String> = Graph::default();
        let a = g.add_node("a");
        let b = g.add_node("b");
        let e = g
            .add_edge(a, b, 1.0, Some("join".to_string()))
            .unwrap();
        assert_eq!(g.edge_label(e).map(String::as_str), Some("join"));
    }

    #[test]
    fn random_tree_additions_match_reference_union_find() {
        let rng = &mut Pcg64Mcg::seed_from_u64(1234);
        let n = 40usize;

        for _ in 0..10 {
            let mut g: Graph<usize> = Graph::new(GraphShape::tree());
            let ids: Vec<NodeId> = (0..n).map(|i| g.add_node(i)).collect();
            let mut reference: Vec<usize> = (0..n).collect();
            fn find(p: &mut Vec<usize>, mut x: usize) -> usize {
                while p[x] != x {
                    p[x] = p[p[x]];
                    x = p[x];
                }
                x
            }

            for _ in 0..4 * n {
                let a = rng.random_range(0..n);
                let b = rng.random_range(0..n);
                let accepted = g.add_edge(ids[a], ids[b], 1.0, None).is_some();
                let (ra, rb) = (find(&mut reference, a), find(&mut reference, b));
                if a == b {
                    assert!(!accepted);
                } else if ra == rb {
                    assert!(!accepted, "edge {a} -> {b} must not reconnect");
                } else {
                    assert!(accepted, "edge {a} -> {b} must join components");
                    reference[ra] = rb;
                }
            }
        }
    }
}
