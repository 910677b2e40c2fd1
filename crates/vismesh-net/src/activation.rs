//! Layer nonlinearities.
//!
//! Hidden graph-convolution layers use SELU; the final layer uses a rowwise
//! softmax over the output categories.

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

// Self-normalizing ELU constants (Klambauer et al. 2017)
const SELU_LAMBDA: f32 = 1.050_701;
const SELU_ALPHA: f32 = 1.673_263_2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Selu,
    Softmax,
}

impl Activation {
    /// Apply the nonlinearity to a pre-activation tensor.
    pub fn apply(&self, pre: &Array2<f32>) -> Array2<f32> {
        match self {
            Activation::Selu => pre.mapv(|x| {
                if x > 0.0 {
                    SELU_LAMBDA * x
                } else {
                    SELU_LAMBDA * SELU_ALPHA * (x.exp() - 1.0)
                }
            }),
            Activation::Softmax => {
                let mut out = pre.clone();
                for mut row in out.axis_iter_mut(Axis(0)) {
                    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                    row.mapv_inplace(|x| (x - max).exp());
                    let sum: f32 = row.sum();
                    if sum > 0.0 {
                        row.mapv_inplace(|x| x / sum);
                    }
                }
                out
            }
        }
    }

    /// Pull an output-space gradient back to pre-activation space.
    ///
    /// `pre` and `out` are the cached forward tensors for this layer.
    pub fn backward(
        &self,
        pre: &Array2<f32>,
        out: &Array2<f32>,
        grad_out: &Array2<f32>,
    ) -> Array2<f32> {
        match self {
            Activation::Selu => {
                let deriv = pre.mapv(|x| {
                    if x > 0.0 {
                        SELU_LAMBDA
                    } else {
                        SELU_LAMBDA * SELU_ALPHA * x.exp()
                    }
                });
                grad_out * &deriv
            }
            Activation::Softmax => {
                // Rowwise softmax Jacobian: g_pre = p ⊙ (g - <g, p>)
                let mut grad_pre = grad_out * out;
                for (mut row, p_row) in grad_pre
                    .axis_iter_mut(Axis(0))
                    .zip(out.axis_iter(Axis(0)))
                {
                    let inner: f32 = row.sum();
                    row.zip_mut_with(&p_row, |g, &p| *g -= inner * p);
                }
                grad_pre
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn softmax_rows_sum_to_one() {
        let pre = array![[1.0f32, 2.0, 3.0], [-5.0, 0.0, 5.0]];
        let out = Activation::Softmax.apply(&pre);
        for row in out.axis_iter(Axis(0)) {
            let sum: f32 = row.sum();
            assert!((sum - 1.0).abs() < 1e-5);
            assert!(row.iter().all(|&p| p >= 0.0));
        }
    }

    #[test]
    fn selu_is_identity_scaled_for_positive_inputs() {
        let pre = array![[2.0f32]];
        let out = Activation::Selu.apply(&pre);
        assert!((out[[0, 0]] - 2.0 * SELU_LAMBDA).abs() < 1e-5);
    }

    #[test]
    fn selu_backward_matches_numerical_derivative() {
        let pre = array![[0.7f32, -0.3, -2.1, 1.4]];
        let grad_out = array![[1.0f32, 1.0, 1.0, 1.0]];
        let analytic = Activation::Selu.backward(&pre, &Activation::Selu.apply(&pre), &grad_out);

        let eps = 1e-3f32;
        for j in 0..4 {
            let mut plus = pre.clone();
            plus[[0, j]] += eps;
            let mut minus = pre.clone();
            minus[[0, j]] -= eps;
            let numeric = (Activation::Selu.apply(&plus)[[0, j]]
                - Activation::Selu.apply(&minus)[[0, j]])
                / (2.0 * eps);
            assert!(
                (analytic[[0, j]] - numeric).abs() < 1e-2,
                "col {}: analytic {} vs numeric {}",
                j,
                analytic[[0, j]],
                numeric
            );
        }
    }

    #[test]
    fn softmax_backward_is_orthogonal_to_constant_shifts() {
        // Adding a constant to every logit leaves softmax unchanged, so the
        // pulled-back gradient of any loss must sum to zero per row.
        let pre = array![[0.2f32, -1.0, 0.5]];
        let out = Activation::Softmax.apply(&pre);
        let grad_out = array![[0.3f32, -0.8, 1.1]];
        let grad_pre = Activation::Softmax.backward(&pre, &out, &grad_out);
        let sum: f32 = grad_pre.row(0).sum();
        assert!(sum.abs() < 1e-5);
    }
}
