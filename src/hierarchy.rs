//! Immutable feature hierarchy.
//!
//! A [`Hierarchy`] is a directed acyclic graph whose edges point from a more
//! general feature to a more specific one. It is validated once at
//! construction and never mutated afterwards: every normalization step in
//! [`crate::normalize`] returns a new value.
//!
//! [`AncestorIndex`] precomputes the transitive closure so the inference loop
//! can ask for a feature's ancestors without walking the graph per test row.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

use crate::errors::{HfsError, Result};

#[derive(Debug, Clone, Default)]
pub struct Hierarchy {
    graph: DiGraphMap<u32, ()>,
    /// Topological order (general before specific), fixed at construction.
    order: Vec<u32>,
}

impl Hierarchy {
    /// Build a hierarchy from an explicit node list plus edges.
    ///
    /// Nodes mentioned only in `edges` are added as well, so isolated nodes are
    /// the only reason to pass `nodes` at all.
    ///
    /// # Errors
    /// - `CycleDetected` if the edges contain a cycle or a self loop
    pub fn new(nodes: impl IntoIterator<Item = u32>, edges: &[(u32, u32)]) -> Result<Self> {
        let mut graph = DiGraphMap::new();
        for node in nodes {
            graph.add_node(node);
        }
        for &(src, dst) in edges {
            if src == dst {
                return Err(HfsError::CycleDetected(src));
            }
            graph.add_edge(src, dst, ());
        }
        Self::from_graph(graph)
    }

    /// Build a hierarchy from edges alone.
    pub fn from_edges(edges: &[(u32, u32)]) -> Result<Self> {
        Self::new(std::iter::empty(), edges)
    }

    pub(crate) fn from_graph(graph: DiGraphMap<u32, ()>) -> Result<Self> {
        let order = toposort(&graph, None).map_err(|cycle| HfsError::CycleDetected(cycle.node_id()))?;
        Ok(Self { graph, order })
    }

    pub(crate) fn graph(&self) -> &DiGraphMap<u32, ()> {
        &self.graph
    }

    pub fn contains(&self, node: u32) -> bool {
        self.graph.contains_node(node)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// All nodes, sorted ascending.
    pub fn nodes(&self) -> Vec<u32> {
        let mut nodes: Vec<u32> = self.graph.nodes().collect();
        nodes.sort_unstable();
        nodes
    }

    /// All edges as (general, specific) pairs, sorted ascending.
    pub fn edges(&self) -> Vec<(u32, u32)> {
        let mut edges: Vec<(u32, u32)> = self.graph.all_edges().map(|(a, b, _)| (a, b)).collect();
        edges.sort_unstable();
        edges
    }

    pub fn parents(&self, node: u32) -> Vec<u32> {
        self.neighbors(node, Direction::Incoming)
    }

    pub fn children(&self, node: u32) -> Vec<u32> {
        self.neighbors(node, Direction::Outgoing)
    }

    fn neighbors(&self, node: u32, dir: Direction) -> Vec<u32> {
        if !self.contains(node) {
            return vec![];
        }
        let mut out: Vec<u32> = self.graph.neighbors_directed(node, dir).collect();
        out.sort_unstable();
        out
    }

    /// Nodes with in-degree 0.
    pub fn roots(&self) -> Vec<u32> {
        self.nodes()
            .into_iter()
            .filter(|&n| self.graph.neighbors_directed(n, Direction::Incoming).next().is_none())
            .collect()
    }

    /// Nodes with out-degree 0.
    pub fn leaves(&self) -> Vec<u32> {
        self.nodes()
            .into_iter()
            .filter(|&n| self.graph.neighbors_directed(n, Direction::Outgoing).next().is_none())
            .collect()
    }

    /// The single root, if the hierarchy has exactly one.
    pub fn root(&self) -> Option<u32> {
        match self.roots().as_slice() {
            [root] => Some(*root),
            _ => None,
        }
    }

    /// Every node with a path to `node`.
    pub fn ancestors(&self, node: u32) -> FxHashSet<u32> {
        bfs(&self.graph, node, Direction::Incoming)
    }

    /// Every node reachable from `node`.
    pub fn descendants(&self, node: u32) -> FxHashSet<u32> {
        bfs(&self.graph, node, Direction::Outgoing)
    }

    pub fn is_ancestor(&self, ancestor: u32, node: u32) -> bool {
        ancestor != node && self.descendants(ancestor).contains(&node)
    }

    /// Nodes ordered so every edge goes from an earlier to a later node.
    pub fn topological_order(&self) -> &[u32] {
        &self.order
    }
}

impl PartialEq for Hierarchy {
    fn eq(&self, other: &Self) -> bool {
        self.nodes() == other.nodes() && self.edges() == other.edges()
    }
}

impl Eq for Hierarchy {}

fn bfs(graph: &DiGraphMap<u32, ()>, start: u32, dir: Direction) -> FxHashSet<u32> {
    let mut visited = FxHashSet::default();
    if !graph.contains_node(start) {
        return visited;
    }
    let mut queue = VecDeque::new();
    queue.push_back(start);

    while let Some(node) = queue.pop_front() {
        for next in graph.neighbors_directed(node, dir) {
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    visited
}

/// Transitive closure of a hierarchy, in both directions.
///
/// Built with one BFS per node in parallel; lookups afterwards are O(1).
#[derive(Debug, Clone, Default)]
pub struct AncestorIndex {
    ancestors: FxHashMap<u32, FxHashSet<u32>>,
    descendants: FxHashMap<u32, FxHashSet<u32>>,
}

impl AncestorIndex {
    pub fn build(hierarchy: &Hierarchy) -> Self {
        let graph = hierarchy.graph();
        let nodes: Vec<u32> = graph.nodes().collect();

        let ancestors: FxHashMap<u32, FxHashSet<u32>> = nodes
            .par_iter()
            .map(|&node| (node, bfs(graph, node, Direction::Incoming)))
            .collect();

        let mut descendants: FxHashMap<u32, FxHashSet<u32>> =
            nodes.iter().map(|&n| (n, FxHashSet::default())).collect();
        for (&node, ups) in &ancestors {
            for &up in ups {
                descendants.entry(up).or_default().insert(node);
            }
        }

        Self {
            ancestors,
            descendants,
        }
    }

    /// Ancestors of `node`; `None` if the node is not in the hierarchy.
    pub fn ancestors(&self, node: u32) -> Option<&FxHashSet<u32>> {
        self.ancestors.get(&node)
    }

    pub fn descendants(&self, node: u32) -> Option<&FxHashSet<u32>> {
        self.descendants.get(&node)
    }

    #[inline]
    pub fn is_ancestor(&self, ancestor: u32, node: u32) -> bool {
        self.ancestors
            .get(&node)
            .map(|set| set.contains(&ancestor))
            .unwrap_or(false)
    }
}
