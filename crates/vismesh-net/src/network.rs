//! Descriptor-driven network assembly.
//!
//! The builder turns a validated [`StructureDescriptor`] into an ordered
//! stack of graph-convolution layers: one layer per width, SELU on hidden
//! layers, softmax on the final layer. Each layer takes its own neighbor
//! table at call time; passing a single table reuses it for every layer,
//! which is the common case.

use crate::activation::Activation;
use crate::layers::{ConvCache, DenseParams, GraphConvolution, LayerGradients};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use vismesh_core::{NeighborTable, Result, StructureDescriptor, VisualMeshError};

/// Serialized model state, keyed externally by the canonical network name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkCheckpoint {
    pub name: String,
    pub structure: StructureDescriptor,
    /// One entry per layer; `None` for layers never materialized.
    pub layers: Vec<Option<DenseParams>>,
    pub trained_batches: u64,
}

/// A built visual mesh network: the composed callable `X, G → Y`.
pub struct Network {
    name: String,
    descriptor: StructureDescriptor,
    layers: Vec<GraphConvolution>,
    trained_batches: u64,
    rng: StdRng,
}

impl Network {
    /// Assemble a layer stack from a descriptor. Parameters are materialized
    /// lazily on the first forward pass; `seed` makes that initialization
    /// reproducible.
    pub fn build(descriptor: &StructureDescriptor, seed: u64) -> Self {
        let num_layers = descriptor.num_layers();
        let layers: Vec<GraphConvolution> = descriptor
            .widths()
            .enumerate()
            .map(|(i, width)| {
                let activation = if i + 1 == num_layers {
                    Activation::Softmax
                } else {
                    Activation::Selu
                };
                GraphConvolution::new(width, activation)
            })
            .collect();
        log::debug!(
            "built network '{}' with {} layers",
            descriptor.canonical_name(),
            layers.len()
        );
        Self {
            name: descriptor.canonical_name(),
            descriptor: descriptor.clone(),
            layers,
            trained_batches: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Canonical topology name used for output-path disambiguation.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn descriptor(&self) -> &StructureDescriptor {
        &self.descriptor
    }

    pub fn layers(&self) -> &[GraphConvolution] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [GraphConvolution] {
        &mut self.layers
    }

    /// Batches this model has been trained on, carried through checkpoints.
    pub fn trained_batches(&self) -> u64 {
        self.trained_batches
    }

    pub fn record_trained_batches(&mut self, batches: u64) {
        self.trained_batches += batches;
    }

    /// Resolve the per-layer neighbor tables: either one table reused for
    /// every layer, or exactly one per layer.
    fn resolve_tables<'a>(&self, tables: &[&'a NeighborTable]) -> Result<Vec<&'a NeighborTable>> {
        match tables.len() {
            1 => Ok(vec![tables[0]; self.layers.len()]),
            n if n == self.layers.len() => Ok(tables.to_vec()),
            n => Err(VisualMeshError::shape(
                "Network::forward",
                format!(
                    "{} neighbor tables supplied for a {}-layer network (expected 1 or {})",
                    n,
                    self.layers.len(),
                    self.layers.len()
                ),
            )),
        }
    }

    /// Run the full stack, threading each layer's output into the next.
    pub fn forward(&mut self, x: &Array2<f32>, tables: &[&NeighborTable]) -> Result<Array2<f32>> {
        let per_layer = self.resolve_tables(tables)?;
        let Self { layers, rng, .. } = self;
        let mut features = x.clone();
        for (layer, table) in layers.iter_mut().zip(per_layer) {
            features = layer.forward(&features, table, rng)?;
        }
        Ok(features)
    }

    /// Forward pass retaining per-layer caches for [`Self::backward`].
    pub fn forward_with_caches(
        &mut self,
        x: &Array2<f32>,
        tables: &[&NeighborTable],
    ) -> Result<(Array2<f32>, Vec<ConvCache>)> {
        let per_layer = self.resolve_tables(tables)?;
        let Self { layers, rng, .. } = self;
        let mut features = x.clone();
        let mut caches = Vec::with_capacity(layers.len());
        for (layer, table) in layers.iter_mut().zip(per_layer) {
            let (out, cache) = layer.forward_with_cache(&features, table, rng)?;
            features = out;
            caches.push(cache);
        }
        Ok((features, caches))
    }

    /// Backpropagate an output-space gradient through the stack, returning
    /// parameter gradients in layer order.
    pub fn backward(
        &self,
        caches: &[ConvCache],
        grad_out: &Array2<f32>,
    ) -> Result<Vec<LayerGradients>> {
        if caches.len() != self.layers.len() {
            return Err(VisualMeshError::shape(
                "Network::backward",
                format!(
                    "{} caches for a {}-layer network",
                    caches.len(),
                    self.layers.len()
                ),
            ));
        }
        let mut grad = grad_out.clone();
        let mut grads_rev = Vec::with_capacity(self.layers.len());
        for (layer, cache) in self.layers.iter().zip(caches.iter()).rev() {
            let (layer_grads, grad_x) = layer.backward(cache, &grad)?;
            grads_rev.push(layer_grads);
            grad = grad_x;
        }
        grads_rev.reverse();
        Ok(grads_rev)
    }

    /// Snapshot the current parameters.
    pub fn checkpoint(&self) -> NetworkCheckpoint {
        NetworkCheckpoint {
            name: self.name.clone(),
            structure: self.descriptor.clone(),
            layers: self.layers.iter().map(|l| l.params().cloned()).collect(),
            trained_batches: self.trained_batches,
        }
    }

    /// Rebuild a network from a checkpoint, restoring parameters.
    pub fn from_checkpoint(checkpoint: &NetworkCheckpoint, seed: u64) -> Result<Self> {
        let mut network = Self::build(&checkpoint.structure, seed);
        if checkpoint.layers.len() != network.layers.len() {
            return Err(VisualMeshError::config(format!(
                "checkpoint '{}' has {} layer entries for a {}-layer structure",
                checkpoint.name,
                checkpoint.layers.len(),
                network.layers.len()
            )));
        }
        for (layer, params) in network.layers.iter_mut().zip(checkpoint.layers.iter()) {
            if let Some(params) = params {
                layer.set_params(params.clone())?;
            }
        }
        network.trained_batches = checkpoint.trained_batches;
        Ok(network)
    }

    /// Write the checkpoint as JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.checkpoint())?;
        fs::write(path, json)?;
        log::info!("model saved to {:?}", path);
        Ok(())
    }

    /// Load a network from a JSON checkpoint.
    pub fn load(path: &Path, seed: u64) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let checkpoint: NetworkCheckpoint = serde_json::from_str(&text)?;
        let network = Self::from_checkpoint(&checkpoint, seed)?;
        log::info!("model '{}' loaded from {:?}", network.name(), path);
        Ok(network)
    }

    /// Write the human-readable YAML export of the model.
    pub fn export_yaml(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(&self.checkpoint())?;
        fs::write(path, yaml)?;
        log::info!("YAML model exported to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn table(num_nodes: usize, degree: usize) -> NeighborTable {
        let indices = Array2::from_shape_fn((num_nodes, degree), |(n, k)| (n + k) % num_nodes);
        NeighborTable::new(indices).unwrap()
    }

    #[test]
    fn builder_creates_one_layer_per_width() {
        let d: StructureDescriptor = "4-4-4_8-8".parse().unwrap();
        let network = Network::build(&d, 1);
        assert_eq!(network.layers().len(), 5);
        let widths: Vec<usize> = network.layers().iter().map(|l| l.width()).collect();
        assert_eq!(widths, vec![4, 4, 4, 8, 8]);
        assert_eq!(network.layers()[4].activation(), Activation::Softmax);
        assert_eq!(network.layers()[0].activation(), Activation::Selu);
        assert_eq!(network.name(), "4-4-4_8-8");
    }

    #[test]
    fn wrong_table_count_is_rejected() {
        let d: StructureDescriptor = "4_4".parse().unwrap();
        let mut network = Network::build(&d, 1);
        let x = Array2::<f32>::zeros((6, 3));
        let t = table(6, 3);
        let err = network.forward(&x, &[&t, &t, &t]).unwrap_err();
        assert!(matches!(err, VisualMeshError::Shape { .. }));
    }

    #[test]
    fn checkpoint_round_trips_parameters() {
        let d: StructureDescriptor = "3-2".parse().unwrap();
        let mut network = Network::build(&d, 7);
        let x = Array2::from_shape_fn((5, 4), |(i, j)| (i + j) as f32 * 0.25);
        let t = table(5, 3);
        let before = network.forward(&x, &[&t]).unwrap();

        let checkpoint = network.checkpoint();
        let mut restored = Network::from_checkpoint(&checkpoint, 99).unwrap();
        let after = restored.forward(&x, &[&t]).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn save_and_load_preserve_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");

        let d: StructureDescriptor = "4_2".parse().unwrap();
        let mut network = Network::build(&d, 3);
        let x = Array2::from_shape_fn((6, 3), |(i, j)| ((i * 3 + j) as f32).cos());
        let t = table(6, 4);
        let before = network.forward(&x, &[&t]).unwrap();
        network.save(&path).unwrap();

        let mut loaded = Network::load(&path, 0).unwrap();
        let after = loaded.forward(&x, &[&t]).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
