/*!
# Graph Shape

The structural constraints a [`Graph`](crate::graph::Graph) enforces on
every mutation, bundled into one config struct instead of a flag word.
Each field names the *permission* it grants; a cleared field is a
constraint the mutation protocol upholds:

- `directed` — edges are one-way; cleared, every accepted edge gets a
  paired reverse edge.
- `cyclic` — cycles are allowed; cleared, edges that would close a cycle
  are rejected.
- `blob` — arbitrary connectivity; cleared, an edge may only join two
  previously unconnected components (forest shape).
- `multi` — parallel edges between the same ordered pair are allowed.
- `self_loops` — an edge from a node to itself is allowed.

Shape *transitions* live on the graph itself (`make_acyclic`, `make_tree`,
...) because loosening or tightening a constraint has to re-validate and
possibly rewrite the existing structure; see
[`Graph`](crate::graph::Graph).
*/

/// Structural constraints enforced on every mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GraphShape {
    pub directed: bool,
    pub cyclic: bool,
    pub blob: bool,
    pub multi: bool,
    pub self_loops: bool,
}

impl GraphShape {
    /// Everything allowed: directed, cyclic, parallel edges, self-loops.
    pub fn free() -> Self {
        GraphShape {
            directed: true,
            cyclic: true,
            blob: true,
            multi: true,
            self_loops: true,
        }
    }

    /// Undirected free graph.
    pub fn undirected() -> Self {
        GraphShape {
            directed: false,
            ..Self::free()
        }
    }

    /// Undirected forest: acyclic, single edges, no self-loops, and every
    /// edge must join two previously unconnected components.
    pub fn tree() -> Self {
        GraphShape {
            directed: false,
            cyclic: false,
            blob: false,
            multi: false,
            self_loops: false,
        }
    }

    /// Directed acyclic graph with single edges and no self-loops.
    pub fn dag() -> Self {
        GraphShape {
            directed: true,
            cyclic: false,
            blob: true,
            multi: false,
            self_loops: false,
        }
    }

    /// Returns *true* if the disjoint-set machinery is maintained for
    /// this shape (it backs the cycle gates for undirected and for
    /// acyclic graphs).
    pub(crate) fn tracks_components(&self) -> bool {
        !self.directed || !self.cyclic
    }
}

impl Default for GraphShape {
    fn default() -> Self {
        Self::free()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(GraphShape::default(), GraphShape::free());
        assert!(!GraphShape::tree().blob);
        assert!(!GraphShape::dag().cyclic);
        assert!(GraphShape::dag().directed);
        assert!(!GraphShape::undirected().directed);
    }

    #[test]
    fn component_tracking() {
        assert!(!GraphShape::free().tracks_components());
        assert!(GraphShape::undirected().tracks_components());
        assert!(GraphShape::dag().tracks_components());
        assert!(GraphShape::tree().tracks_components());
    }
}
