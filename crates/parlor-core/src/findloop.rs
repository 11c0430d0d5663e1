//! Loop detection in undirected graphs via Tarjan's bridge-finding
//! algorithm.
//!
//! A bridge is an edge whose removal disconnects its component; an edge lies
//! on some simple cycle iff it is not a bridge. The finder builds a rooted
//! spanning forest, numbers vertices in preorder so every subtree owns a
//! contiguous index range, then computes for each subtree the index range
//! reachable without using the subtree's parent edge. The parent edge is a
//! bridge iff that range stays inside the subtree's own range.
//!
//! Since a bridge is always a spanning-tree edge, each bridge can be recorded
//! at its child endpoint, so one `Option<usize>` per vertex captures the
//! whole answer.

/// Per-vertex scratch and output of a [`LoopFinder`] run.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    parent: usize,
    child: Option<usize>,
    sibling: Option<usize>,
    component_root: usize,
    in_tree: bool,
    visited: bool,
    index: usize,
    maxindex: usize,
    minreachable: usize,
    maxreachable: usize,
    /// The parent endpoint, if this vertex's parent edge is a bridge.
    bridge: Option<usize>,
}

impl Vertex {
    fn new(root: usize) -> Self {
        Self {
            parent: root,
            child: None,
            sibling: None,
            component_root: root,
            in_tree: false,
            visited: false,
            index: 0,
            maxindex: 0,
            minreachable: 0,
            maxreachable: 0,
            bridge: None,
        }
    }
}

/// Result of a bridge-finding pass over one graph.
///
/// # Examples
///
/// ```
/// use parlor_core::LoopFinder;
///
/// // A triangle with a tail: 0-1, 1-2, 2-0, 2-3.
/// let adj: Vec<Vec<usize>> = vec![vec![1, 2], vec![0, 2], vec![0, 1, 3], vec![2]];
/// let finder = LoopFinder::run(4, |v| adj[v].iter().copied());
/// assert!(finder.has_loops());
/// assert!(finder.is_loop_edge(0, 1));
/// assert!(!finder.is_loop_edge(2, 3));
/// assert_eq!(finder.is_bridge(2, 3), Some((3, 1)));
/// ```
#[derive(Debug, Clone)]
pub struct LoopFinder {
    vertices: Vec<Vertex>,
    nedges: usize,
    nbridges: usize,
}

impl LoopFinder {
    /// Runs the bridge finder over a graph of `nvertices` vertices.
    ///
    /// `neighbours` must enumerate the neighbours of any vertex; each
    /// undirected edge must appear from both endpoints. It is called more
    /// than once per vertex across the passes.
    pub fn run<F, I>(nvertices: usize, neighbours: F) -> Self
    where
        F: Fn(usize) -> I,
        I: IntoIterator<Item = usize>,
    {
        // One extra vertex acts as the super-root linking every connected
        // component, so all passes are single traversals.
        let root = nvertices;
        let mut pv = vec![Vertex::new(root); nvertices + 1];
        pv[root].in_tree = true;

        // First pass: organise the graph into a rooted spanning forest and
        // count edges.
        let mut nedges = 0;
        for v in 0..nvertices {
            if pv[v].in_tree {
                continue;
            }
            // New connected component rooted at v.
            pv[v].in_tree = true;
            pv[v].sibling = pv[root].child;
            pv[root].child = Some(v);
            pv[v].component_root = v;

            let mut u = v;
            loop {
                if !pv[u].visited {
                    pv[u].visited = true;
                    for w in neighbours(u) {
                        if !pv[w].in_tree {
                            pv[w].in_tree = true;
                            pv[w].sibling = pv[u].child;
                            pv[w].parent = u;
                            pv[w].component_root = pv[u].component_root;
                            pv[u].child = Some(w);
                        }
                        // Count each edge from one endpoint only.
                        if w > u {
                            nedges += 1;
                        }
                    }
                    if let Some(child) = pv[u].child {
                        u = child;
                        continue;
                    }
                }
                if u == v {
                    break;
                } else if let Some(sibling) = pv[u].sibling {
                    u = sibling;
                } else {
                    u = pv[u].parent;
                }
            }
        }

        // Second pass: preorder-index the forest so each subtree owns the
        // contiguous range [index, maxindex].
        for v in pv.iter_mut().take(nvertices) {
            v.visited = false;
        }
        let mut index = 0;
        let mut u = root;
        loop {
            if !pv[u].visited {
                pv[u].visited = true;
                if u != root {
                    pv[u].index = index;
                    index += 1;
                }
                if let Some(child) = pv[u].child {
                    u = child;
                    continue;
                }
            }
            if u == root {
                break;
            }
            pv[u].maxindex = index - 1;
            if let Some(sibling) = pv[u].sibling {
                u = sibling;
            } else {
                u = pv[u].parent;
            }
        }

        // Final pass: for each subtree, the min/max index reachable without
        // the parent edge. Postorder accumulation over children, then the
        // bridge criterion.
        for v in pv.iter_mut().take(nvertices) {
            v.visited = false;
        }
        let mut nbridges = 0;
        let mut u = root;
        loop {
            if !pv[u].visited {
                pv[u].visited = true;
                if u != root {
                    pv[u].minreachable = pv[u].index;
                    pv[u].maxreachable = pv[u].index;
                    for w in neighbours(u) {
                        if w != pv[u].parent {
                            let i = pv[w].index;
                            pv[u].minreachable = pv[u].minreachable.min(i);
                            pv[u].maxreachable = pv[u].maxreachable.max(i);
                        }
                    }
                }
                if let Some(child) = pv[u].child {
                    u = child;
                    continue;
                }
            }
            if u == root {
                break;
            }

            let mut child = pv[u].child;
            while let Some(v) = child {
                pv[u].minreachable = pv[u].minreachable.min(pv[v].minreachable);
                pv[u].maxreachable = pv[u].maxreachable.max(pv[v].maxreachable);
                child = pv[v].sibling;
            }

            let parent = pv[u].parent;
            if parent != root
                && pv[u].minreachable >= pv[u].index
                && pv[u].maxreachable <= pv[u].maxindex
            {
                pv[u].bridge = Some(parent);
                nbridges += 1;
            }

            if let Some(sibling) = pv[u].sibling {
                u = sibling;
            } else {
                u = parent;
            }
        }

        Self {
            vertices: pv,
            nedges,
            nbridges,
        }
    }

    /// Returns whether the graph contains at least one cycle.
    #[must_use]
    pub fn has_loops(&self) -> bool {
        self.nbridges < self.nedges
    }

    /// Returns whether the edge `(u, v)` lies on some simple cycle.
    ///
    /// The edge must exist in the graph the finder ran over.
    #[must_use]
    pub fn is_loop_edge(&self, u: usize, v: usize) -> bool {
        !(self.vertices[u].bridge == Some(v) || self.vertices[v].bridge == Some(u))
    }

    /// If `(u, v)` is a bridge, returns the vertex counts of the two
    /// components its removal would separate, `(u side, v side)`.
    #[must_use]
    pub fn is_bridge(&self, u: usize, v: usize) -> Option<(usize, usize)> {
        self.bridge_oneway(u, v)
            .or_else(|| self.bridge_oneway(v, u).map(|(a, b)| (b, a)))
    }

    fn bridge_oneway(&self, u: usize, v: usize) -> Option<(usize, usize)> {
        if self.vertices[u].bridge != Some(v) {
            return None;
        }
        let r = self.vertices[u].component_root;
        let total = self.vertices[r].maxindex - self.vertices[r].index + 1;
        let below = self.vertices[u].maxindex - self.vertices[u].index + 1;
        Some((below, total - below))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn run_adj(adj: &[Vec<usize>]) -> LoopFinder {
        LoopFinder::run(adj.len(), |v| adj[v].iter().copied())
    }

    fn add_edge(adj: &mut [Vec<usize>], u: usize, v: usize) {
        adj[u].push(v);
        adj[v].push(u);
    }

    #[test]
    fn test_empty_graph() {
        let finder = run_adj(&[]);
        assert!(!finder.has_loops());
    }

    #[test]
    fn test_tree_has_no_loops() {
        let mut adj = vec![Vec::new(); 6];
        add_edge(&mut adj, 0, 1);
        add_edge(&mut adj, 0, 2);
        add_edge(&mut adj, 2, 3);
        add_edge(&mut adj, 2, 4);
        add_edge(&mut adj, 4, 5);
        let finder = run_adj(&adj);
        assert!(!finder.has_loops());
        assert!(!finder.is_loop_edge(0, 2));
        assert_eq!(finder.is_bridge(2, 0), Some((4, 2)));
    }

    #[test]
    fn test_cycle_with_tail() {
        let mut adj = vec![Vec::new(); 5];
        add_edge(&mut adj, 0, 1);
        add_edge(&mut adj, 1, 2);
        add_edge(&mut adj, 2, 0);
        add_edge(&mut adj, 2, 3);
        add_edge(&mut adj, 3, 4);
        let finder = run_adj(&adj);
        assert!(finder.has_loops());
        assert!(finder.is_loop_edge(0, 1));
        assert!(finder.is_loop_edge(1, 2));
        assert!(finder.is_loop_edge(2, 0));
        assert!(!finder.is_loop_edge(2, 3));
        assert!(!finder.is_loop_edge(3, 4));
        assert_eq!(finder.is_bridge(3, 4), Some((4, 1)));
        assert_eq!(finder.is_bridge(4, 3), Some((1, 4)));
        assert_eq!(finder.is_bridge(0, 1), None);
    }

    #[test]
    fn test_two_components() {
        let mut adj = vec![Vec::new(); 7];
        // Component A: triangle 0-1-2.
        add_edge(&mut adj, 0, 1);
        add_edge(&mut adj, 1, 2);
        add_edge(&mut adj, 2, 0);
        // Component B: path 3-4-5-6.
        add_edge(&mut adj, 3, 4);
        add_edge(&mut adj, 4, 5);
        add_edge(&mut adj, 5, 6);
        let finder = run_adj(&adj);
        assert!(finder.has_loops());
        assert!(finder.is_loop_edge(0, 2));
        assert!(!finder.is_loop_edge(4, 5));
        assert_eq!(finder.is_bridge(4, 5), Some((2, 2)));
    }

    #[test]
    fn test_two_cycles_sharing_a_bridge() {
        // Triangles 0-1-2 and 3-4-5 joined by the bridge 2-3.
        let mut adj = vec![Vec::new(); 6];
        add_edge(&mut adj, 0, 1);
        add_edge(&mut adj, 1, 2);
        add_edge(&mut adj, 2, 0);
        add_edge(&mut adj, 3, 4);
        add_edge(&mut adj, 4, 5);
        add_edge(&mut adj, 5, 3);
        add_edge(&mut adj, 2, 3);
        let finder = run_adj(&adj);
        assert!(finder.has_loops());
        assert!(!finder.is_loop_edge(2, 3));
        assert_eq!(finder.is_bridge(2, 3), Some((3, 3)));
    }

    /// Brute-force check: an edge is on a cycle iff removing it leaves its
    /// endpoints connected.
    fn on_cycle_brute(adj: &[Vec<usize>], u: usize, v: usize) -> bool {
        let n = adj.len();
        let mut seen = vec![false; n];
        let mut stack = vec![u];
        seen[u] = true;
        while let Some(x) = stack.pop() {
            for &y in &adj[x] {
                // Skip one copy of the u-v edge in each direction.
                if (x == u && y == v) || (x == v && y == u) {
                    continue;
                }
                if !seen[y] {
                    seen[y] = true;
                    stack.push(y);
                }
            }
        }
        seen[v]
    }

    proptest! {
        #[test]
        fn prop_matches_brute_force(
            edges in prop::collection::vec((0usize..10, 0usize..10), 0..25)
        ) {
            let n = 10;
            let mut adj = vec![Vec::new(); n];
            let mut unique = Vec::new();
            for &(u, v) in &edges {
                if u != v && !unique.contains(&(u.min(v), u.max(v))) {
                    unique.push((u.min(v), u.max(v)));
                    add_edge(&mut adj, u, v);
                }
            }
            let finder = run_adj(&adj);
            let mut any_loop = false;
            for &(u, v) in &unique {
                let expect = on_cycle_brute(&adj, u, v);
                any_loop |= expect;
                prop_assert_eq!(finder.is_loop_edge(u, v), expect, "edge {}-{}", u, v);
                prop_assert_eq!(finder.is_bridge(u, v).is_some(), !expect);
            }
            prop_assert_eq!(finder.has_loops(), any_loop);
        }
    }
}
