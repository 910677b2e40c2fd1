//! Training driver.
//!
//! Feeds batches of mesh-structured examples through the network, scores
//! them with the mesh-aware loss built on the operator's difference kernel,
//! backpropagates, applies momentum SGD, and periodically exports the model:
//! a JSON checkpoint in the run directory plus the human-readable YAML copy
//! under `yaml_models/`.

use crate::dataset::NamedSample;
use crate::optimizer::Sgd;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use vismesh_core::{LookupParams, MeshOperator, Result, VisualMeshError};
use vismesh_net::{LayerGradients, Network};

/// Training hyperparameters and schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Samples per optimizer step.
    pub batch_size: usize,
    /// Total optimizer steps to run.
    pub max_batches: usize,
    pub learning_rate: f32,
    pub momentum: f32,
    /// Batches between checkpoint exports.
    pub checkpoint_interval: usize,
    /// Mesh graph degree requested from lookup.
    pub degree: usize,
    /// Compute device index forwarded to the operator.
    pub device: u32,
    /// Seed for reproducible weight initialization.
    pub seed: u64,
}

impl TrainingConfig {
    /// Reject degenerate schedules before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(VisualMeshError::config("batch size must be at least 1"));
        }
        if self.checkpoint_interval == 0 {
            return Err(VisualMeshError::config(
                "checkpoint interval must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_batches: 1000,
            learning_rate: 0.1,
            momentum: 0.9,
            checkpoint_interval: 100,
            degree: 7,
            device: 0,
            seed: 42,
        }
    }
}

/// Result of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub network_name: String,
    pub batches_run: usize,
    pub first_loss: f32,
    pub final_loss: f32,
    pub best_loss: f32,
}

/// The training driver: owns the network for the duration of the run.
pub struct Trainer {
    network: Network,
    operator: Arc<dyn MeshOperator>,
    config: TrainingConfig,
    category: String,
    size_label: String,
    output_dir: PathBuf,
}

impl Trainer {
    pub fn new(
        network: Network,
        operator: Arc<dyn MeshOperator>,
        config: TrainingConfig,
        category: impl Into<String>,
        size_label: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            network,
            operator,
            config,
            category: category.into(),
            size_label: size_label.into(),
            output_dir: output_dir.into(),
        }
    }

    /// Forward/backward one sample; returns its loss contribution and
    /// per-layer gradients.
    fn sample_pass(&mut self, sample: &NamedSample) -> Result<(f32, Vec<LayerGradients>)> {
        let params = LookupParams {
            degree: self.config.degree,
            device: self.config.device,
        };
        let points = sample.sample.points_array()?;
        let lookup = self.operator.lookup(&points, &params)?;

        let features = self
            .operator
            .map(&sample.sample.pixels_array()?, &lookup.placement)?;
        let targets = self
            .operator
            .map(&sample.sample.labels_array()?, &lookup.placement)?;

        let (prediction, caches) = self.network.forward_with_caches(&features, &[&lookup.table])?;
        if prediction.dim() != targets.dim() {
            return Err(VisualMeshError::shape(
                "Trainer::sample_pass",
                format!(
                    "network output {:?} does not match label field {:?}; \
                     final descriptor width must equal the category count",
                    prediction.dim(),
                    targets.dim()
                ),
            ));
        }

        // Mesh-aware loss: squared norm of the topology-aware discrepancy,
        // averaged over entries and scaled by the sample's resampling weight.
        let delta = self.operator.difference(&prediction, &targets, &lookup.table)?;
        let entries = delta.len() as f32;
        let loss = sample.sample.weight * 0.5 * delta.iter().map(|d| d * d).sum::<f32>() / entries;

        let grad_delta: Array2<f32> = &delta * (sample.sample.weight / entries);
        let grad_prediction = self.operator.difference_grad(&grad_delta, &lookup.table)?;
        let grads = self.network.backward(&caches, &grad_prediction)?;
        Ok((loss, grads))
    }

    /// Run the configured number of batches over the dataset.
    pub fn train(&mut self, dataset: &[NamedSample]) -> Result<TrainingSummary> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(VisualMeshError::config("training dataset is empty"));
        }
        let start = Instant::now();
        let mut optimizer = Sgd::new(
            self.config.learning_rate,
            self.config.momentum,
            self.network.layers().len(),
        );

        log::info!(
            "training '{}' ({}{}): {} samples, {} batches of {}",
            self.network.name(),
            self.size_label,
            self.category,
            dataset.len(),
            self.config.max_batches,
            self.config.batch_size
        );

        let mut first_loss = f32::NAN;
        let mut final_loss = f32::NAN;
        let mut best_loss = f32::INFINITY;

        for batch in 0..self.config.max_batches {
            let mut accumulated: Option<Vec<LayerGradients>> = None;
            let mut batch_loss = 0.0f32;

            for i in 0..self.config.batch_size {
                let sample = &dataset[(batch * self.config.batch_size + i) % dataset.len()];
                let (loss, grads) = self.sample_pass(sample)?;
                batch_loss += loss;
                accumulated = Some(match accumulated {
                    None => grads,
                    Some(mut acc) => {
                        for (a, g) in acc.iter_mut().zip(grads.iter()) {
                            a.weight += &g.weight;
                            a.bias += &g.bias;
                        }
                        acc
                    }
                });
            }

            let mut grads = accumulated.expect("batch_size >= 1");
            let scale = 1.0 / self.config.batch_size as f32;
            for g in grads.iter_mut() {
                g.weight *= scale;
                g.bias *= scale;
            }
            batch_loss *= scale;

            if batch_loss.is_nan() {
                return Err(VisualMeshError::numerical(format!(
                    "loss diverged to NaN at batch {}",
                    batch
                )));
            }

            optimizer.step(&mut self.network, &grads)?;
            self.network.record_trained_batches(1);

            if batch == 0 {
                first_loss = batch_loss;
            }
            final_loss = batch_loss;
            best_loss = best_loss.min(batch_loss);

            if (batch + 1) % self.config.checkpoint_interval == 0 {
                log::info!(
                    "batch {}/{} | loss {:.6} (best {:.6})",
                    batch + 1,
                    self.config.max_batches,
                    batch_loss,
                    best_loss
                );
                self.export_model()?;
            } else {
                log::debug!("batch {} | loss {:.6}", batch + 1, batch_loss);
            }
        }

        self.export_model()?;
        let summary = TrainingSummary {
            network_name: self.network.name().to_string(),
            batches_run: self.config.max_batches,
            first_loss,
            final_loss,
            best_loss,
        };
        self.write_summary(&summary, start.elapsed().as_secs_f64())?;
        log::info!(
            "training complete in {:.1}s | final loss {:.6}",
            start.elapsed().as_secs_f64(),
            final_loss
        );
        Ok(summary)
    }

    /// Checkpoint the model: JSON in the run directory, YAML under
    /// `yaml_models/`.
    fn export_model(&self) -> Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;
        self.network.save(&self.output_dir.join("model.json"))?;

        let yaml_dir = self.output_dir.join("yaml_models");
        std::fs::create_dir_all(&yaml_dir)?;
        self.network
            .export_yaml(&yaml_dir.join(format!("{}.yaml", self.network.name())))?;
        Ok(())
    }

    fn write_summary(&self, summary: &TrainingSummary, elapsed_secs: f64) -> Result<()> {
        let results = serde_json::json!({
            "network": summary.network_name,
            "category": self.category,
            "size": self.size_label,
            "config": self.config,
            "batches_run": summary.batches_run,
            "first_loss": summary.first_loss,
            "final_loss": summary.final_loss,
            "best_loss": summary.best_loss,
            "elapsed_secs": elapsed_secs,
            "completion_time": chrono::Utc::now(),
        });
        let path = self.output_dir.join("training_results.json");
        std::fs::write(&path, serde_json::to_string_pretty(&results)?)?;
        log::info!("results saved to {:?}", path);
        Ok(())
    }

    /// Hand the trained network back to the caller.
    pub fn into_network(self) -> Network {
        self.network
    }
}
