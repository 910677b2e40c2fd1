//! Pure-Rust reference implementation of the mesh operator contract.
//!
//! This is the swappable CPU reimplementation of the native kernel: same
//! semantics, no accelerator, O(P²) neighbor search. Tests and CPU-only runs
//! use it directly; it also documents the exact numeric contract the native
//! kernel is held to.
//!
//! The `difference` kernel computes, for node n with neighbors g_1..g_{K-1}:
//!
//! ```text
//! delta[n] = (1 + γ)·(a[n] - b[n]) - γ/(K-1) · Σ_k (a[g_k] - b[g_k])
//! ```
//!
//! which is linear in (a - b), anti-symmetric, zero when a == b, and couples
//! each node's residual to its mesh neighborhood instead of comparing nodes
//! elementwise.

use ndarray::Array2;
use vismesh_core::{
    LookupParams, MeshLookup, MeshOperator, MeshPlacement, NeighborTable, Result, VisualMeshError,
};

/// Neighborhood coupling strength in the difference kernel.
const NEIGHBORHOOD_GAMMA: f32 = 0.5;

/// CPU reference mesh operator.
#[derive(Debug, Clone)]
pub struct ReferenceOperator {
    gamma: f32,
}

impl ReferenceOperator {
    pub fn new() -> Self {
        Self {
            gamma: NEIGHBORHOOD_GAMMA,
        }
    }
}

impl Default for ReferenceOperator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_same_shape(context: &str, a: &Array2<f32>, b: &Array2<f32>) -> Result<()> {
    if a.dim() != b.dim() {
        return Err(VisualMeshError::shape(
            context,
            format!("operand shapes differ: {:?} vs {:?}", a.dim(), b.dim()),
        ));
    }
    Ok(())
}

impl MeshOperator for ReferenceOperator {
    fn lookup(&self, points: &Array2<f32>, params: &LookupParams) -> Result<MeshLookup> {
        let num_points = points.nrows();
        if num_points == 0 {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::lookup",
                "cannot build a mesh from zero points",
            ));
        }
        if params.degree == 0 || params.degree > num_points {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::lookup",
                format!(
                    "degree {} invalid for a mesh of {} nodes",
                    params.degree, num_points
                ),
            ));
        }

        // Every projected point becomes a mesh node; adjacency is the
        // degree-1 nearest other nodes, self first by convention.
        let mut indices = Array2::<usize>::zeros((num_points, params.degree));
        let mut order: Vec<(f32, usize)> = Vec::with_capacity(num_points);
        for i in 0..num_points {
            order.clear();
            for j in 0..num_points {
                if j == i {
                    continue;
                }
                let dist: f32 = points
                    .row(i)
                    .iter()
                    .zip(points.row(j).iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum();
                order.push((dist, j));
            }
            // ties broken by node index so the table is deterministic
            order.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

            indices[[i, 0]] = i;
            for (k, &(_, j)) in order.iter().take(params.degree - 1).enumerate() {
                indices[[i, k + 1]] = j;
            }
        }

        Ok(MeshLookup {
            seed: points.clone(),
            table: NeighborTable::new(indices)?,
            placement: MeshPlacement::identity(num_points),
        })
    }

    fn map(&self, values: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>> {
        if values.nrows() != placement.num_sources() {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::map",
                format!(
                    "{} value rows for a placement of {} sources",
                    values.nrows(),
                    placement.num_sources()
                ),
            ));
        }
        let channels = values.ncols();
        let mut out = Array2::<f32>::zeros((placement.num_nodes(), channels));
        let mut counts = vec![0usize; placement.num_nodes()];
        for (s, &node) in placement.nodes().iter().enumerate() {
            let mut row = out.row_mut(node);
            row += &values.row(s);
            counts[node] += 1;
        }
        for (node, &count) in counts.iter().enumerate() {
            if count > 1 {
                let mut row = out.row_mut(node);
                row /= count as f32;
            }
        }
        Ok(out)
    }

    fn unmap(&self, features: &Array2<f32>, placement: &MeshPlacement) -> Result<Array2<f32>> {
        if features.nrows() != placement.num_nodes() {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::unmap",
                format!(
                    "{} feature rows for a placement onto {} nodes",
                    features.nrows(),
                    placement.num_nodes()
                ),
            ));
        }
        let mut out = Array2::<f32>::zeros((placement.num_sources(), features.ncols()));
        for (s, &node) in placement.nodes().iter().enumerate() {
            out.row_mut(s).assign(&features.row(node));
        }
        Ok(out)
    }

    fn difference(
        &self,
        a: &Array2<f32>,
        b: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>> {
        check_same_shape("ReferenceOperator::difference", a, b)?;
        if a.nrows() != table.num_nodes() {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::difference",
                format!(
                    "{} rows against a table of {} nodes",
                    a.nrows(),
                    table.num_nodes()
                ),
            ));
        }
        let residual = a - b;
        let degree = table.degree();
        if degree == 1 {
            return Ok(residual);
        }
        let coupling = self.gamma / (degree - 1) as f32;
        let mut delta = &residual * (1.0 + self.gamma);
        for n in 0..table.num_nodes() {
            for k in 1..degree {
                let neighbor = residual.row(table.get(n, k)).to_owned();
                let mut row = delta.row_mut(n);
                row.scaled_add(-coupling, &neighbor);
            }
        }
        Ok(delta)
    }

    fn difference_grad(
        &self,
        grad_delta: &Array2<f32>,
        table: &NeighborTable,
    ) -> Result<Array2<f32>> {
        if grad_delta.nrows() != table.num_nodes() {
            return Err(VisualMeshError::shape(
                "ReferenceOperator::difference_grad",
                format!(
                    "{} gradient rows against a table of {} nodes",
                    grad_delta.nrows(),
                    table.num_nodes()
                ),
            ));
        }
        let degree = table.degree();
        if degree == 1 {
            return Ok(grad_delta.clone());
        }
        // Transpose of the linear difference kernel: the scale term stays
        // per-node, the neighborhood term scatters instead of gathering.
        let coupling = self.gamma / (degree - 1) as f32;
        let mut grad = grad_delta * (1.0 + self.gamma);
        for n in 0..table.num_nodes() {
            let incoming = grad_delta.row(n).to_owned();
            for k in 1..degree {
                let mut row = grad.row_mut(table.get(n, k));
                row.scaled_add(-coupling, &incoming);
            }
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn toy_lookup(num_points: usize, degree: usize) -> MeshLookup {
        let points =
            Array2::from_shape_fn((num_points, 2), |(i, j)| (i * 2 + j) as f32 * 0.37 - 1.0);
        ReferenceOperator::new()
            .lookup(
                &points,
                &LookupParams {
                    degree,
                    ..Default::default()
                },
            )
            .unwrap()
    }

    #[test]
    fn lookup_puts_self_first() {
        let lookup = toy_lookup(10, 4);
        assert_eq!(lookup.table.num_nodes(), 10);
        assert_eq!(lookup.table.degree(), 4);
        for n in 0..10 {
            assert_eq!(lookup.table.get(n, 0), n);
        }
    }

    #[test]
    fn lookup_rejects_bad_degree() {
        let op = ReferenceOperator::new();
        let points = Array2::<f32>::zeros((3, 2));
        assert!(op
            .lookup(
                &points,
                &LookupParams {
                    degree: 0,
                    ..Default::default()
                }
            )
            .is_err());
        assert!(op
            .lookup(
                &points,
                &LookupParams {
                    degree: 4,
                    ..Default::default()
                }
            )
            .is_err());
    }

    #[test]
    fn map_unmap_round_trips_identity_placement() {
        let op = ReferenceOperator::new();
        let placement = MeshPlacement::identity(5);
        let values = Array2::from_shape_fn((5, 3), |(i, j)| i as f32 + j as f32 * 0.1);
        let mapped = op.map(&values, &placement).unwrap();
        let back = op.unmap(&mapped, &placement).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn map_averages_collapsed_sources() {
        let op = ReferenceOperator::new();
        let placement = MeshPlacement::new(vec![0, 0, 1], 2).unwrap();
        let values = array![[2.0f32], [4.0], [7.0]];
        let mapped = op.map(&values, &placement).unwrap();
        assert!((mapped[[0, 0]] - 3.0).abs() < 1e-6);
        assert!((mapped[[1, 0]] - 7.0).abs() < 1e-6);
    }

    #[test]
    fn difference_is_zero_on_equal_inputs() {
        let op = ReferenceOperator::new();
        let lookup = toy_lookup(8, 3);
        let a = Array2::from_shape_fn((8, 2), |(i, j)| (i + j) as f32 * 0.5);
        let delta = op.difference(&a, &a, &lookup.table).unwrap();
        assert!(delta.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn difference_is_anti_symmetric() {
        let op = ReferenceOperator::new();
        let lookup = toy_lookup(6, 3);
        let a = Array2::from_shape_fn((6, 2), |(i, j)| (i as f32).sin() + j as f32);
        let b = Array2::from_shape_fn((6, 2), |(i, j)| (j as f32).cos() - i as f32 * 0.2);
        let ab = op.difference(&a, &b, &lookup.table).unwrap();
        let ba = op.difference(&b, &a, &lookup.table).unwrap();
        for (x, y) in ab.iter().zip(ba.iter()) {
            assert!((x + y).abs() < 1e-5);
        }
    }

    #[test]
    fn difference_grad_is_the_adjoint() {
        // <D(a, 0), v> must equal <a, D^T v> since difference is linear.
        let op = ReferenceOperator::new();
        let lookup = toy_lookup(7, 4);
        let a = Array2::from_shape_fn((7, 3), |(i, j)| ((i * 3 + j) as f32 * 0.731).sin());
        let v = Array2::from_shape_fn((7, 3), |(i, j)| ((i + 2 * j) as f32 * 0.417).cos());
        let zero = Array2::<f32>::zeros((7, 3));

        let forward = op.difference(&a, &zero, &lookup.table).unwrap();
        let adjoint = op.difference_grad(&v, &lookup.table).unwrap();

        let lhs: f32 = forward.iter().zip(v.iter()).map(|(x, y)| x * y).sum();
        let rhs: f32 = a.iter().zip(adjoint.iter()).map(|(x, y)| x * y).sum();
        assert!((lhs - rhs).abs() < 1e-4, "lhs={} rhs={}", lhs, rhs);
    }
}
