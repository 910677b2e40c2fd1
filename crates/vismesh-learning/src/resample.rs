//! Resampling driver.
//!
//! Runs a trained network over a dataset via map → forward → unmap and
//! re-derives each sample's weight from how hard the network finds it:
//! sources whose true category gets low predicted probability pull the
//! sample weight up, so the next training round sees hard examples more
//! often.

use crate::dataset::{save_sample, NamedSample};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use vismesh_core::{LookupParams, MeshOperator, Result, VisualMeshError};
use vismesh_net::Network;

/// Resampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Mesh graph degree requested from lookup.
    pub degree: usize,
    /// Compute device index forwarded to the operator.
    pub device: u32,
    /// Lower clamp for re-derived weights, so no sample vanishes entirely.
    pub min_weight: f32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            degree: 7,
            device: 0,
            min_weight: 0.05,
        }
    }
}

/// Result of a resampling run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResampleSummary {
    pub network_name: String,
    pub samples_written: usize,
    pub mean_weight: f32,
}

/// The resampling driver: a loaded network plus an operator.
pub struct Resampler {
    network: Network,
    operator: Arc<dyn MeshOperator>,
    config: ResampleConfig,
}

impl Resampler {
    pub fn new(network: Network, operator: Arc<dyn MeshOperator>, config: ResampleConfig) -> Self {
        Self {
            network,
            operator,
            config,
        }
    }

    /// Per-source hardness: one minus the probability assigned to the true
    /// category.
    fn hardness(predictions: &Array2<f32>, labels: &Array2<f32>) -> Result<f32> {
        if predictions.dim() != labels.dim() {
            return Err(VisualMeshError::shape(
                "Resampler::hardness",
                format!(
                    "prediction shape {:?} does not match labels {:?}",
                    predictions.dim(),
                    labels.dim()
                ),
            ));
        }
        let num_sources = predictions.nrows() as f32;
        let hit: f32 = predictions
            .iter()
            .zip(labels.iter())
            .map(|(p, y)| p * y)
            .sum();
        Ok(1.0 - hit / num_sources)
    }

    /// Run the network over every sample and write the re-weighted dataset.
    pub fn resample(
        &mut self,
        dataset: &[NamedSample],
        output_dir: &Path,
    ) -> Result<ResampleSummary> {
        if dataset.is_empty() {
            return Err(VisualMeshError::config("resampling dataset is empty"));
        }
        std::fs::create_dir_all(output_dir)?;

        let params = LookupParams {
            degree: self.config.degree,
            device: self.config.device,
        };
        let mut total_weight = 0.0f32;

        for named in dataset {
            let points = named.sample.points_array()?;
            let lookup = self.operator.lookup(&points, &params)?;

            let features = self
                .operator
                .map(&named.sample.pixels_array()?, &lookup.placement)?;
            let prediction = self.network.forward(&features, &[&lookup.table])?;
            let unmapped = self.operator.unmap(&prediction, &lookup.placement)?;

            let weight = Self::hardness(&unmapped, &named.sample.labels_array()?)?
                .max(self.config.min_weight);
            total_weight += weight;

            let mut refined = named.sample.clone();
            refined.weight = weight;
            save_sample(output_dir, &named.name, &refined)?;
            log::debug!("resampled '{}' -> weight {:.4}", named.name, weight);
        }

        let summary = ResampleSummary {
            network_name: self.network.name().to_string(),
            samples_written: dataset.len(),
            mean_weight: total_weight / dataset.len() as f32,
        };
        log::info!(
            "resampled {} samples | mean weight {:.4}",
            summary.samples_written,
            summary.mean_weight
        );
        Ok(summary)
    }

    /// Write a run summary next to the model (never into the refined
    /// dataset directory, which must stay loadable as a dataset).
    pub fn write_summary(&self, summary: &ResampleSummary, dir: &Path) -> Result<()> {
        let results = serde_json::json!({
            "network": summary.network_name,
            "config": self.config,
            "samples_written": summary.samples_written,
            "mean_weight": summary.mean_weight,
            "completion_time": chrono::Utc::now(),
        });
        let path = dir.join("resample_results.json");
        std::fs::write(&path, serde_json::to_string_pretty(&results)?)?;
        log::info!("results saved to {:?}", path);
        Ok(())
    }
}
