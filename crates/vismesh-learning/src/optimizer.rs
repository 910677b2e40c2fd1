//! Momentum SGD over a network's layer parameters.

use ndarray::{Array1, Array2};
use vismesh_core::{Result, VisualMeshError};
use vismesh_net::{LayerGradients, Network};

struct LayerVelocity {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

/// Stochastic gradient descent with classical momentum.
///
/// Velocity buffers are allocated lazily on the first step, once layer
/// parameter shapes exist.
pub struct Sgd {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<Option<LayerVelocity>>,
}

impl Sgd {
    pub fn new(learning_rate: f32, momentum: f32, num_layers: usize) -> Self {
        let mut velocity = Vec::with_capacity(num_layers);
        velocity.resize_with(num_layers, || None);
        Self {
            learning_rate,
            momentum,
            velocity,
        }
    }

    /// Apply one update: `v = μ·v − η·g`, `w += v`, per layer.
    pub fn step(&mut self, network: &mut Network, grads: &[LayerGradients]) -> Result<()> {
        if grads.len() != self.velocity.len() {
            return Err(VisualMeshError::shape(
                "Sgd::step",
                format!(
                    "{} gradients for a {}-layer optimizer",
                    grads.len(),
                    self.velocity.len()
                ),
            ));
        }
        for ((layer, grad), velocity) in network
            .layers_mut()
            .iter_mut()
            .zip(grads.iter())
            .zip(self.velocity.iter_mut())
        {
            let params = layer.params_mut().ok_or_else(|| {
                VisualMeshError::shape("Sgd::step", "update on a layer that never ran forward")
            })?;
            let v = velocity.get_or_insert_with(|| LayerVelocity {
                weight: Array2::zeros(grad.weight.dim()),
                bias: Array1::zeros(grad.bias.len()),
            });
            v.weight *= self.momentum;
            v.weight.scaled_add(-self.learning_rate, &grad.weight);
            v.bias *= self.momentum;
            v.bias.scaled_add(-self.learning_rate, &grad.bias);
            params.weight += &v.weight;
            params.bias += &v.bias;
        }
        Ok(())
    }
}
