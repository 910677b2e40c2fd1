//! Mesh data representations shared across the toolkit.
//!
//! Node features are plain `ndarray::Array2<f32>` in mesh-node-index row
//! order; the order is established once per mesh build and held fixed for the
//! whole forward/backward pass. The types here carry the sparse side of the
//! representation: which nodes are adjacent, and how raw source elements
//! (pixels, projected points) place onto mesh node rows.

use crate::errors::{Result, VisualMeshError};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Per-node neighbor indices defining convolution locality.
///
/// Row `n` lists the `degree()` mesh nodes adjacent to node `n`, in a fixed
/// order the dense projection's weight layout implicitly learns. By
/// convention index 0 of each row is the node itself. Immutable for the
/// duration of a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborTable {
    indices: Array2<usize>,
}

impl NeighborTable {
    /// Wrap a raw index table, validating that every entry is a valid row
    /// index into a feature tensor with `indices.nrows()` rows and that the
    /// degree is non-zero.
    pub fn new(indices: Array2<usize>) -> Result<Self> {
        let num_nodes = indices.nrows();
        if indices.ncols() == 0 {
            return Err(VisualMeshError::shape(
                "NeighborTable::new",
                "neighbor table degree must be at least 1",
            ));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= num_nodes) {
            return Err(VisualMeshError::shape(
                "NeighborTable::new",
                format!("neighbor index {} out of range for {} nodes", bad, num_nodes),
            ));
        }
        Ok(Self { indices })
    }

    /// Number of mesh nodes (table rows).
    pub fn num_nodes(&self) -> usize {
        self.indices.nrows()
    }

    /// Fixed neighbor count per node, the graph degree K.
    pub fn degree(&self) -> usize {
        self.indices.ncols()
    }

    /// Borrow the underlying index matrix.
    pub fn view(&self) -> ArrayView2<'_, usize> {
        self.indices.view()
    }

    /// Neighbor `k` of node `n`.
    #[inline]
    pub fn get(&self, n: usize, k: usize) -> usize {
        self.indices[[n, k]]
    }
}

/// Placement of raw source elements onto mesh node rows.
///
/// `node_for_source[s]` is the mesh node that source element `s` (a pixel or
/// projected point) lands on; `map` aggregates source values into node rows
/// and `unmap` reads them back out. Produced alongside the neighbor table by
/// the operator's lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshPlacement {
    node_for_source: Vec<usize>,
    num_nodes: usize,
}

impl MeshPlacement {
    pub fn new(node_for_source: Vec<usize>, num_nodes: usize) -> Result<Self> {
        if let Some(&bad) = node_for_source.iter().find(|&&n| n >= num_nodes) {
            return Err(VisualMeshError::shape(
                "MeshPlacement::new",
                format!("placement node {} out of range for {} nodes", bad, num_nodes),
            ));
        }
        Ok(Self {
            node_for_source,
            num_nodes,
        })
    }

    /// Identity placement: source element `s` is mesh node `s`.
    pub fn identity(num_nodes: usize) -> Self {
        Self {
            node_for_source: (0..num_nodes).collect(),
            num_nodes,
        }
    }

    /// Number of source elements.
    pub fn num_sources(&self) -> usize {
        self.node_for_source.len()
    }

    /// Number of mesh nodes targeted by the placement.
    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    /// Node index for each source element, in source order.
    pub fn nodes(&self) -> &[usize] {
        &self.node_for_source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn neighbor_table_rejects_out_of_range_indices() {
        let bad = array![[0usize, 1], [1, 3]];
        assert!(NeighborTable::new(bad).is_err());
    }

    #[test]
    fn neighbor_table_reports_degree_and_size() {
        let table = NeighborTable::new(array![[0usize, 1, 2], [1, 0, 2], [2, 1, 0]]).unwrap();
        assert_eq!(table.num_nodes(), 3);
        assert_eq!(table.degree(), 3);
        assert_eq!(table.get(1, 2), 2);
    }

    #[test]
    fn placement_identity_is_bijective() {
        let p = MeshPlacement::identity(4);
        assert_eq!(p.num_sources(), 4);
        assert_eq!(p.nodes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn placement_rejects_bad_nodes() {
        assert!(MeshPlacement::new(vec![0, 5], 3).is_err());
    }
}
