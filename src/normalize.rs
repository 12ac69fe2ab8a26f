//! Hierarchy normalization.
//!
//! Pure functions that take a [`Hierarchy`] and return a new one:
//!
//! - [`shrink`] removes nodes that have no matching feature column
//! - [`connect`] re-derives direct edges for a subset chosen elsewhere
//! - [`add_virtual_root_node`] gives the hierarchy a single source
//!
//! plus [`compute_aggregated_values`], which OR-propagates binary feature
//! values from specific to general nodes.

use ndarray::{Array1, Array2, ArrayView2};
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::dataset::first_non_binary;
use crate::errors::{HfsError, Result};
use crate::hierarchy::Hierarchy;

fn kept_nodes(identifiers: &[u32], graph: &Hierarchy) -> FxHashSet<u32> {
    let keep: FxHashSet<u32> = identifiers.iter().copied().filter(|&n| graph.contains(n)).collect();
    let missing = identifiers.iter().filter(|&&n| !graph.contains(n)).count();
    if missing > 0 {
        debug!(missing, "identifiers absent from hierarchy ignored");
    }
    keep
}

/// Remove every node not listed in `retained`.
///
/// Removed leaves are dropped. Removed inner nodes are contracted: each of
/// their parents gets an edge to each of their children, so two retained
/// nodes are ancestor and descendant afterwards exactly when they were before.
pub fn shrink(retained: &[u32], graph: &Hierarchy) -> Result<Hierarchy> {
    let keep = kept_nodes(retained, graph);
    let mut g = graph.graph().clone();
    let mut dropped_leaves = 0usize;
    let mut contracted = 0usize;

    // Leaves first, so chains of removable leaves disappear without edge churn.
    for &node in graph.topological_order().iter().rev() {
        if keep.contains(&node) {
            continue;
        }
        let parents: Vec<u32> = g.neighbors_directed(node, Direction::Incoming).collect();
        let children: Vec<u32> = g.neighbors_directed(node, Direction::Outgoing).collect();
        g.remove_node(node);

        if children.is_empty() {
            dropped_leaves += 1;
            continue;
        }
        contracted += 1;
        for &parent in &parents {
            for &child in &children {
                g.add_edge(parent, child, ());
            }
        }
    }

    debug!(
        before = graph.node_count(),
        after = g.node_count(),
        dropped_leaves,
        contracted,
        "shrunk hierarchy"
    );
    Hierarchy::from_graph(g)
}

/// Induced sub-hierarchy on `identifiers`.
///
/// Edge `a -> b` exists iff the original hierarchy has a path from `a` to `b`
/// whose interior nodes are all outside the kept set. A kept node with no
/// kept ancestor becomes a root.
pub fn connect(identifiers: &[u32], graph: &Hierarchy) -> Result<Hierarchy> {
    let keep = kept_nodes(identifiers, graph);
    let source = graph.graph();

    let mut sources: Vec<u32> = keep.iter().copied().collect();
    sources.sort_unstable();

    let edges: Vec<(u32, u32)> = sources
        .par_iter()
        .flat_map_iter(|&src| {
            nearest_kept_descendants(source, src, &keep)
                .into_iter()
                .map(move |dst| (src, dst))
        })
        .collect();

    let mut g = DiGraphMap::new();
    for &node in &sources {
        g.add_node(node);
    }
    for &(src, dst) in &edges {
        g.add_edge(src, dst, ());
    }

    debug!(nodes = g.node_count(), edges = g.edge_count(), "connected sub-hierarchy");
    Hierarchy::from_graph(g)
}

/// Kept nodes reachable from `start` without passing through another kept node.
fn nearest_kept_descendants(graph: &DiGraphMap<u32, ()>, start: u32, keep: &FxHashSet<u32>) -> Vec<u32> {
    let mut visited = FxHashSet::default();
    let mut found = Vec::new();
    let mut stack: Vec<u32> = graph.neighbors_directed(start, Direction::Outgoing).collect();

    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if keep.contains(&node) {
            found.push(node);
        } else {
            stack.extend(graph.neighbors_directed(node, Direction::Outgoing));
        }
    }

    found.sort_unstable();
    found
}

/// Give the hierarchy a single source.
///
/// A hierarchy that already has exactly one root is returned unchanged.
/// Otherwise a new node (one past the largest id, or 0 when empty) is added
/// with an edge to every current root.
///
/// # Errors
/// - `InvalidParameter` if the largest id is `u32::MAX`
pub fn add_virtual_root_node(graph: &Hierarchy) -> Result<Hierarchy> {
    let roots = graph.roots();
    if roots.len() == 1 {
        return Ok(graph.clone());
    }

    let root = match graph.nodes().last() {
        Some(&max) => max
            .checked_add(1)
            .ok_or_else(|| HfsError::InvalidParameter("no free id for virtual root".to_string()))?,
        None => 0,
    };

    let mut g = graph.graph().clone();
    g.add_node(root);
    for &r in &roots {
        g.add_edge(root, r, ());
    }
    debug!(root, children = roots.len(), "added virtual root");
    Hierarchy::from_graph(g)
}

/// OR-aggregate binary values up the hierarchy.
///
/// `columns[k]` is the node carried by column `k` of `x`. The output has the
/// same shape as `x`; a cell is 1 when the node or any of its descendants is 1
/// in that row. Nodes without a column still pass values upward.
///
/// # Errors
/// - `ShapeMismatch` if `columns.len() != x.ncols()`
/// - `UnknownNode` / `DuplicateColumn` for a bad column mapping
/// - `NonBinaryValue` for any value outside {0, 1}
pub fn compute_aggregated_values(x: ArrayView2<'_, u8>, graph: &Hierarchy, columns: &[u32]) -> Result<Array2<u8>> {
    if columns.len() != x.ncols() {
        return Err(HfsError::ShapeMismatch {
            what: "column mapping length vs matrix columns",
            expected: x.ncols(),
            actual: columns.len(),
        });
    }

    let mut column_of: FxHashMap<u32, usize> = FxHashMap::default();
    for (col, &node) in columns.iter().enumerate() {
        if !graph.contains(node) {
            return Err(HfsError::UnknownNode(node));
        }
        if column_of.insert(node, col).is_some() {
            return Err(HfsError::DuplicateColumn(node));
        }
    }

    if let Some((row, column, value)) = first_non_binary(x) {
        return Err(HfsError::NonBinaryValue { row, column, value });
    }

    let n_rows = x.nrows();
    let mut out = x.to_owned();
    let mut aggregated: FxHashMap<u32, Array1<u8>> = FxHashMap::default();

    for &node in graph.topological_order().iter().rev() {
        let mut values = match column_of.get(&node) {
            Some(&col) => out.column(col).to_owned(),
            None => Array1::zeros(n_rows),
        };
        for child in graph.children(node) {
            if let Some(child_values) = aggregated.get(&child) {
                values.zip_mut_with(child_values, |a, &b| *a |= b);
            }
        }
        if let Some(&col) = column_of.get(&node) {
            out.column_mut(col).assign(&values);
        }
        aggregated.insert(node, values);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Kept set {0, 1, 2, 5, 6, 7, 8}; nodes 3, 4, 9 are inner nodes to
    /// contract, 10 is a leaf to drop.
    fn big_dag() -> Hierarchy {
        Hierarchy::from_edges(&[
            (0, 1),
            (0, 2),
            (1, 3),
            (3, 6),
            (3, 7),
            (1, 5),
            (0, 4),
            (4, 7),
            (5, 9),
            (9, 8),
            (2, 10),
        ])
        .unwrap()
    }

    const KEPT: [u32; 7] = [0, 1, 2, 5, 6, 7, 8];

    fn expected_small_dag() -> Hierarchy {
        Hierarchy::from_edges(&[(0, 1), (0, 2), (1, 6), (1, 5), (1, 7), (0, 7), (5, 8)]).unwrap()
    }

    #[test]
    fn test_connect_rederives_direct_edges() {
        let result = connect(&KEPT, &big_dag()).unwrap();
        assert_eq!(result, expected_small_dag());
    }

    #[test]
    fn test_shrink_contracts_and_drops() {
        let result = shrink(&KEPT, &big_dag()).unwrap();
        assert_eq!(result, expected_small_dag());
        assert!(!result.contains(10));
        assert!(!result.contains(3));
    }

    #[test]
    fn test_shrink_only_leaves() {
        // Removing only leaves never adds edges
        let h = Hierarchy::from_edges(&[(0, 1), (0, 2), (1, 3), (1, 4)]).unwrap();
        let result = shrink(&[0, 1, 2], &h).unwrap();
        assert_eq!(result.node_count(), 3);
        assert_eq!(result.edges(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_shrink_ignores_unknown_identifiers() {
        let h = Hierarchy::from_edges(&[(0, 1)]).unwrap();
        let result = shrink(&[0, 1, 99], &h).unwrap();
        assert_eq!(result, h);
    }

    #[test]
    fn test_connect_isolated_kept_node_becomes_root() {
        let h = Hierarchy::from_edges(&[(0, 1), (1, 2)]).unwrap();
        let result = connect(&[2], &h).unwrap();
        assert_eq!(result.nodes(), vec![2]);
        assert_eq!(result.roots(), vec![2]);
    }

    #[test]
    fn test_virtual_root_added_for_forest() {
        let h = Hierarchy::from_edges(&[(0, 1), (2, 3)]).unwrap();
        let rooted = add_virtual_root_node(&h).unwrap();
        assert_eq!(rooted.root(), Some(4));
        assert_eq!(rooted.children(4), vec![0, 2]);
    }

    #[test]
    fn test_virtual_root_idempotent() {
        let h = Hierarchy::from_edges(&[(0, 1), (2, 3)]).unwrap();
        let once = add_virtual_root_node(&h).unwrap();
        let twice = add_virtual_root_node(&once).unwrap();
        assert_eq!(once, twice);

        let single = Hierarchy::from_edges(&[(0, 1), (0, 2)]).unwrap();
        assert_eq!(add_virtual_root_node(&single).unwrap(), single);
    }

    #[test]
    fn test_virtual_root_on_empty() {
        let rooted = add_virtual_root_node(&Hierarchy::default()).unwrap();
        assert_eq!(rooted.nodes(), vec![0]);
    }

    #[test]
    fn test_virtual_root_id_overflow() {
        let h = Hierarchy::new([0, u32::MAX], &[]).unwrap();
        assert!(matches!(add_virtual_root_node(&h), Err(HfsError::InvalidParameter(_))));
    }

    #[test]
    fn test_aggregation_chain() {
        // root -> mid -> leaf, only the leaf set in the raw data
        let h = Hierarchy::from_edges(&[(0, 1), (1, 2)]).unwrap();
        let x = array![[0u8, 0, 1], [0, 0, 0]];
        let out = compute_aggregated_values(x.view(), &h, &[0, 1, 2]).unwrap();
        assert_eq!(out, array![[1u8, 1, 1], [0, 0, 0]]);
    }

    #[test]
    fn test_aggregation_with_virtual_root_and_permuted_columns() {
        // Two trees 0 -> {1, 2}, 3 -> 4; columns hold nodes in a shuffled order
        let h = add_virtual_root_node(&Hierarchy::from_edges(&[(0, 1), (0, 2), (3, 4)]).unwrap()).unwrap();
        let columns = [4, 2, 0, 1, 3];
        let x = array![
            [1u8, 0, 0, 0, 0],
            [0, 1, 0, 0, 0],
            [0, 0, 0, 0, 0],
        ];
        let out = compute_aggregated_values(x.view(), &h, &columns).unwrap();
        assert_eq!(
            out,
            array![
                [1u8, 0, 0, 0, 1],
                [0, 1, 1, 0, 0],
                [0, 0, 0, 0, 0],
            ]
        );
    }

    #[test]
    fn test_aggregation_diamond_keeps_raw_ones() {
        let h = Hierarchy::from_edges(&[(0, 1), (0, 2), (1, 3), (2, 3)]).unwrap();
        let x = array![[0u8, 1, 0, 0], [0, 0, 0, 1]];
        let out = compute_aggregated_values(x.view(), &h, &[0, 1, 2, 3]).unwrap();
        assert_eq!(out, array![[1u8, 1, 0, 0], [1, 1, 1, 1]]);
    }

    #[test]
    fn test_aggregation_errors() {
        let h = Hierarchy::from_edges(&[(0, 1)]).unwrap();
        let x = array![[0u8, 1]];
        assert!(matches!(
            compute_aggregated_values(x.view(), &h, &[0]),
            Err(HfsError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            compute_aggregated_values(x.view(), &h, &[0, 5]),
            Err(HfsError::UnknownNode(5))
        ));
        assert!(matches!(
            compute_aggregated_values(x.view(), &h, &[1, 1]),
            Err(HfsError::DuplicateColumn(1))
        ));
        let bad = array![[0u8, 2]];
        assert!(matches!(
            compute_aggregated_values(bad.view(), &h, &[0, 1]),
            Err(HfsError::NonBinaryValue { row: 0, column: 1, value: 2 })
        ));
    }
}
