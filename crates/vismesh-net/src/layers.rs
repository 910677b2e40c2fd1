//! Graph convolution over irregular mesh topology.
//!
//! The layer gathers each node's K neighbor feature vectors in table order,
//! concatenates them into a `K * F_in` vector, and applies a learned dense
//! projection plus nonlinearity. Neighbor order is significant: the dense
//! weight layout learns it, so the order must be identical between training
//! and inference.
//!
//! Parameters are materialized on the first forward pass, once the fan-in
//! `K * F_in` is known from the supplied tensors (the table's degree is not
//! baked in at construction, so one built network can serve meshes of
//! different degree until its weights exist). After materialization a
//! mismatched degree or feature width is a fatal shape error.

use crate::activation::Activation;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use vismesh_core::{NeighborTable, Result, VisualMeshError};

/// Learnable affine parameters of one graph-convolution layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseParams {
    /// Shape `[K * F_in, F_out]`.
    pub weight: Array2<f32>,
    /// Shape `[F_out]`.
    pub bias: Array1<f32>,
}

/// Gradients matching [`DenseParams`], produced by a backward pass.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weight: Array2<f32>,
    pub bias: Array1<f32>,
}

/// Forward-pass tensors retained for backpropagation.
#[derive(Debug, Clone)]
pub struct ConvCache {
    gathered: Array2<f32>,
    pre: Array2<f32>,
    out: Array2<f32>,
    table: NeighborTable,
    input_width: usize,
}

/// One graph-convolution layer: gather → dense → nonlinearity.
///
/// Purely functional over `(X, G)` apart from its learnable parameters; all
/// failure modes are `Result`s, never partial output.
#[derive(Debug, Clone)]
pub struct GraphConvolution {
    width: usize,
    activation: Activation,
    params: Option<DenseParams>,
}

impl GraphConvolution {
    pub fn new(width: usize, activation: Activation) -> Self {
        debug_assert!(width > 0, "layer width validated at descriptor parse");
        Self {
            width,
            activation,
            params: None,
        }
    }

    /// Configured output feature width.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn activation(&self) -> Activation {
        self.activation
    }

    /// Materialized parameters, if the layer has seen a forward pass or a
    /// checkpoint load.
    pub fn params(&self) -> Option<&DenseParams> {
        self.params.as_ref()
    }

    pub fn params_mut(&mut self) -> Option<&mut DenseParams> {
        self.params.as_mut()
    }

    /// Install parameters from a checkpoint.
    pub fn set_params(&mut self, params: DenseParams) -> Result<()> {
        if params.weight.ncols() != self.width || params.bias.len() != self.width {
            return Err(VisualMeshError::shape(
                "GraphConvolution::set_params",
                format!(
                    "parameters sized for width {} installed in a width-{} layer",
                    params.weight.ncols(),
                    self.width
                ),
            ));
        }
        self.params = Some(params);
        Ok(())
    }

    fn materialize(&mut self, fan_in: usize, rng: &mut StdRng) -> Result<&DenseParams> {
        match self.params {
            Some(ref params) => {
                if params.weight.nrows() != fan_in {
                    return Err(VisualMeshError::shape(
                        "GraphConvolution::forward",
                        format!(
                            "layer built for fan-in {} fed fan-in {}",
                            params.weight.nrows(),
                            fan_in
                        ),
                    ));
                }
            }
            None => {
                // LeCun-uniform init, the standard pairing with SELU
                let limit = (3.0 / fan_in as f32).sqrt();
                let weight =
                    Array2::from_shape_fn((fan_in, self.width), |_| rng.gen_range(-limit..limit));
                let bias = Array1::zeros(self.width);
                self.params = Some(DenseParams { weight, bias });
            }
        }
        Ok(self.params.as_ref().expect("just materialized"))
    }

    /// Gather the K neighbor rows of every node into `(N, K * F_in)`.
    fn gather(x: &Array2<f32>, table: &NeighborTable) -> Result<Array2<f32>> {
        let (num_nodes, f_in) = x.dim();
        if table.num_nodes() != num_nodes {
            return Err(VisualMeshError::shape(
                "GraphConvolution::forward",
                format!(
                    "feature tensor has {} rows but neighbor table covers {} nodes",
                    num_nodes,
                    table.num_nodes()
                ),
            ));
        }
        let degree = table.degree();
        let mut gathered = Array2::<f32>::zeros((num_nodes, degree * f_in));
        for n in 0..num_nodes {
            for k in 0..degree {
                let neighbor = table.get(n, k);
                gathered
                    .slice_mut(ndarray::s![n, k * f_in..(k + 1) * f_in])
                    .assign(&x.row(neighbor));
            }
        }
        Ok(gathered)
    }

    /// Forward pass: `(N, F_in) × (N, K) → (N, F_out)`.
    pub fn forward(
        &mut self,
        x: &Array2<f32>,
        table: &NeighborTable,
        rng: &mut StdRng,
    ) -> Result<Array2<f32>> {
        let (out, _) = self.forward_with_cache(x, table, rng)?;
        Ok(out)
    }

    /// Forward pass retaining the tensors needed for [`Self::backward`].
    pub fn forward_with_cache(
        &mut self,
        x: &Array2<f32>,
        table: &NeighborTable,
        rng: &mut StdRng,
    ) -> Result<(Array2<f32>, ConvCache)> {
        let input_width = x.ncols();
        let gathered = Self::gather(x, table)?;
        let params = self.materialize(gathered.ncols(), rng)?;
        let pre = gathered.dot(&params.weight) + &params.bias;
        let out = self.activation.apply(&pre);
        let cache = ConvCache {
            gathered,
            pre,
            out: out.clone(),
            table: table.clone(),
            input_width,
        };
        Ok((out, cache))
    }

    /// Backward pass: output-space gradient in, parameter gradients plus the
    /// gradient with respect to the layer input out (scatter-add through the
    /// gather).
    pub fn backward(
        &self,
        cache: &ConvCache,
        grad_out: &Array2<f32>,
    ) -> Result<(LayerGradients, Array2<f32>)> {
        let params = self.params.as_ref().ok_or_else(|| {
            VisualMeshError::shape(
                "GraphConvolution::backward",
                "backward pass on a layer that never ran forward",
            )
        })?;
        if grad_out.dim() != cache.out.dim() {
            return Err(VisualMeshError::shape(
                "GraphConvolution::backward",
                format!(
                    "gradient shape {:?} does not match output shape {:?}",
                    grad_out.dim(),
                    cache.out.dim()
                ),
            ));
        }

        let grad_pre = self.activation.backward(&cache.pre, &cache.out, grad_out);
        let grad_weight = cache.gathered.t().dot(&grad_pre);
        let grad_bias = grad_pre.sum_axis(Axis(0));
        let grad_gathered = grad_pre.dot(&params.weight.t());

        let num_nodes = cache.table.num_nodes();
        let degree = cache.table.degree();
        let f_in = cache.input_width;
        let mut grad_x = Array2::<f32>::zeros((num_nodes, f_in));
        for n in 0..num_nodes {
            for k in 0..degree {
                let neighbor = cache.table.get(n, k);
                let slice = grad_gathered.slice(ndarray::s![n, k * f_in..(k + 1) * f_in]);
                let mut row = grad_x.row_mut(neighbor);
                row += &slice;
            }
        }

        Ok((
            LayerGradients {
                weight: grad_weight,
                bias: grad_bias,
            },
            grad_x,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    fn ring_table(num_nodes: usize, degree: usize) -> NeighborTable {
        let indices = Array2::from_shape_fn((num_nodes, degree), |(n, k)| (n + k) % num_nodes);
        NeighborTable::new(indices).unwrap()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn output_shape_is_nodes_by_width() {
        for num_nodes in [3usize, 10, 25] {
            let mut layer = GraphConvolution::new(6, Activation::Selu);
            let x = Array2::from_shape_fn((num_nodes, 4), |(i, j)| (i + j) as f32 * 0.1);
            let table = ring_table(num_nodes, 3);
            let out = layer.forward(&x, &table, &mut rng()).unwrap();
            assert_eq!(out.dim(), (num_nodes, 6));
        }
    }

    #[test]
    fn neighbor_order_is_not_invariant() {
        let mut layer = GraphConvolution::new(4, Activation::Selu);
        let x = Array2::from_shape_fn((5, 3), |(i, j)| ((i * 3 + j) as f32).sin());
        let table = NeighborTable::new(array![
            [0usize, 1, 2],
            [1, 2, 3],
            [2, 3, 4],
            [3, 4, 0],
            [4, 0, 1]
        ])
        .unwrap();
        let mut r = rng();
        let baseline = layer.forward(&x, &table, &mut r).unwrap();

        // Swap the two non-self neighbors of row 0; only row 0 may change,
        // and it must change.
        let permuted = NeighborTable::new(array![
            [0usize, 2, 1],
            [1, 2, 3],
            [2, 3, 4],
            [3, 4, 0],
            [4, 0, 1]
        ])
        .unwrap();
        let out = layer.forward(&x, &permuted, &mut r).unwrap();

        let row0_delta: f32 = (&baseline.row(0) - &out.row(0)).mapv(f32::abs).sum();
        assert!(row0_delta > 1e-6, "neighbor order must carry meaning");
        for n in 1..5 {
            let delta: f32 = (&baseline.row(n) - &out.row(n)).mapv(f32::abs).sum();
            assert!(delta < 1e-6, "row {} depends only on its own neighbors", n);
        }
    }

    #[test]
    fn self_only_weights_reduce_to_per_node_dense() {
        // With every weight row zeroed except the index-0 slice, the layer
        // must equal a plain dense transform of each node's own features.
        let mut layer = GraphConvolution::new(3, Activation::Selu);
        let x = Array2::from_shape_fn((6, 2), |(i, j)| (i as f32) * 0.3 + j as f32);
        let table = ring_table(6, 4);
        let mut r = rng();
        layer.forward(&x, &table, &mut r).unwrap();

        let f_in = 2;
        {
            let params = layer.params_mut().unwrap();
            for row in f_in..params.weight.nrows() {
                params.weight.row_mut(row).fill(0.0);
            }
        }
        let params = layer.params().unwrap();
        let self_weight = params.weight.slice(ndarray::s![0..f_in, ..]).to_owned();
        let bias = params.bias.clone();

        let out = layer.forward(&x, &table, &mut r).unwrap();
        let dense = Activation::Selu.apply(&(x.dot(&self_weight) + &bias));
        for (a, b) in out.iter().zip(dense.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn degree_mismatch_after_materialization_is_fatal() {
        let mut layer = GraphConvolution::new(4, Activation::Selu);
        let x = Array2::<f32>::zeros((5, 3));
        let mut r = rng();
        layer.forward(&x, &ring_table(5, 3), &mut r).unwrap();
        let err = layer.forward(&x, &ring_table(5, 2), &mut r).unwrap_err();
        assert!(matches!(err, VisualMeshError::Shape { .. }));
    }

    #[test]
    fn analytic_gradient_matches_numerical() {
        let mut layer = GraphConvolution::new(2, Activation::Selu);
        let x = Array2::from_shape_fn((4, 2), |(i, j)| ((i * 2 + j) as f32 * 0.59).sin());
        let table = ring_table(4, 2);
        let mut r = rng();

        let (out, cache) = layer.forward_with_cache(&x, &table, &mut r).unwrap();
        // Loss: sum of outputs, so grad_out is all ones.
        let grad_out = Array2::<f32>::ones(out.dim());
        let (grads, grad_x) = layer.backward(&cache, &grad_out).unwrap();

        let eps = 1e-3f32;
        // Weight gradient check on a few entries
        for &(r_idx, c_idx) in &[(0usize, 0usize), (1, 1), (3, 0)] {
            let mut plus = layer.clone();
            plus.params_mut().unwrap().weight[[r_idx, c_idx]] += eps;
            let mut minus = layer.clone();
            minus.params_mut().unwrap().weight[[r_idx, c_idx]] -= eps;
            let lp: f32 = plus.forward(&x, &table, &mut r).unwrap().sum();
            let lm: f32 = minus.forward(&x, &table, &mut r).unwrap().sum();
            let numeric = (lp - lm) / (2.0 * eps);
            assert!(
                (grads.weight[[r_idx, c_idx]] - numeric).abs() < 1e-2,
                "weight[{},{}]: analytic {} vs numeric {}",
                r_idx,
                c_idx,
                grads.weight[[r_idx, c_idx]],
                numeric
            );
        }

        // Input gradient check
        for &(n, f) in &[(0usize, 0usize), (2, 1)] {
            let mut plus = x.clone();
            plus[[n, f]] += eps;
            let mut minus = x.clone();
            minus[[n, f]] -= eps;
            let lp: f32 = layer.forward(&plus, &table, &mut r).unwrap().sum();
            let lm: f32 = layer.forward(&minus, &table, &mut r).unwrap().sum();
            let numeric = (lp - lm) / (2.0 * eps);
            assert!(
                (grad_x[[n, f]] - numeric).abs() < 1e-2,
                "x[{},{}]: analytic {} vs numeric {}",
                n,
                f,
                grad_x[[n, f]],
                numeric
            );
        }
    }
}
