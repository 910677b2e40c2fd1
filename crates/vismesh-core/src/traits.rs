//! The mesh operator boundary.
//!
//! The four mesh operations (lookup, map, unmap, difference) are an opaque
//! numerical kernel with no library equivalent. Everything above them, from
//! the graph-convolution layers to the training and resampling drivers, only
//! sees this trait, so the native kernel can be swapped for the in-tree CPU
//! reimplementation (or the reverse) without touching network logic.

use crate::errors::Result;
use crate::types::{MeshPlacement, NeighborTable};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Mesh-generation parameters handed to `lookup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupParams {
    /// Graph degree K: neighbor count per mesh node, self included.
    pub degree: usize,
    /// Compute device index, forwarded to kernels that place work on an
    /// accelerator. The CPU reference kernel ignores it.
    pub device: u32,
}

impl Default for LookupParams {
    fn default() -> Self {
        Self {
            degree: 7,
            device: 0,
        }
    }
}

/// Output of a mesh lookup: seed features, topology, and the placement that
/// projects raw source data onto the mesh.
#[derive(Debug, Clone)]
pub struct MeshLookup {
    /// Per-node seed feature vectors, one row per mesh node.
    pub seed: Array2<f32>,
    /// Adjacency of the built mesh.
    pub table: NeighborTable,
    /// Placement of the raw source elements onto mesh node rows.
    pub placement: MeshPlacement,
}

/// The native operator boundary: four pure functions over mesh-structured
/// data, plus the gradient of `difference` needed by the training driver.
///
/// Implementations must be deterministic. Failures are contract violations
/// (malformed shapes) or fatal kernel conditions; nothing is retried.
pub trait MeshOperator: Send + Sync {
    /// Build mesh topology and seed features from per-image node coordinates.
    ///
    /// `points` has one row per source element (already projected into mesh
    /// coordinate space; projection itself is upstream of this boundary).
    fn lookup(&self, points: &Array2<f32>, params: &LookupParams) -> Result<MeshLookup>;

    /// Project per-source values onto mesh node rows.
    fn map(&self, values: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>>;

    /// Inverse of `map`: read node-indexed data back into source order.
    fn unmap(&self, features: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>>;

    /// Topology-aware discrepancy between two node-indexed quantities.
    ///
    /// Guarantees: deterministic, anti-symmetric
    /// (`difference(a, b) == -difference(b, a)`), and zero when `a == b`.
    fn difference(
        &self,
        a: &Array2<f32>,
        b: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>>;

    /// Pull a gradient back through `difference` with respect to its first
    /// argument. The gradient with respect to the second argument is the
    /// negation, by anti-symmetry.
    fn difference_grad(
        &self,
        grad_delta: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>>;
}
