//! Mesh example loading.
//!
//! A dataset is a directory of JSON sample files. Each sample carries the
//! projected per-source coordinates (the mesh build input), the raw
//! per-source channel values, per-source one-hot labels, and a resampling
//! weight. Files are loaded in parallel and returned sorted by file name so
//! batch order is deterministic.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vismesh_core::{Result, VisualMeshError};

fn default_weight() -> f32 {
    1.0
}

/// One training/resampling example in source-element space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshSample {
    /// Projected mesh coordinates, one row per source element.
    pub points: Vec<Vec<f32>>,
    /// Raw channel values per source element.
    pub pixels: Vec<Vec<f32>>,
    /// One-hot category labels per source element.
    pub labels: Vec<Vec<f32>>,
    /// Resampling weight; refined by the resampling driver.
    #[serde(default = "default_weight")]
    pub weight: f32,
}

impl MeshSample {
    /// Validate that the per-source row counts line up and rows are uniform.
    pub fn validate(&self) -> Result<()> {
        if self.points.is_empty() {
            return Err(VisualMeshError::shape("MeshSample", "sample has no points"));
        }
        if self.pixels.len() != self.points.len() || self.labels.len() != self.points.len() {
            return Err(VisualMeshError::shape(
                "MeshSample",
                format!(
                    "row counts differ: {} points, {} pixels, {} labels",
                    self.points.len(),
                    self.pixels.len(),
                    self.labels.len()
                ),
            ));
        }
        Ok(())
    }

    pub fn points_array(&self) -> Result<Array2<f32>> {
        rows_to_array(&self.points, "points")
    }

    pub fn pixels_array(&self) -> Result<Array2<f32>> {
        rows_to_array(&self.pixels, "pixels")
    }

    pub fn labels_array(&self) -> Result<Array2<f32>> {
        rows_to_array(&self.labels, "labels")
    }
}

fn rows_to_array(rows: &[Vec<f32>], field: &str) -> Result<Array2<f32>> {
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    if width == 0 {
        return Err(VisualMeshError::shape(
            "MeshSample",
            format!("{} rows are empty", field),
        ));
    }
    if let Some(bad) = rows.iter().position(|r| r.len() != width) {
        return Err(VisualMeshError::shape(
            "MeshSample",
            format!("{} row {} has ragged width", field, bad),
        ));
    }
    let flat: Vec<f32> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), width), flat)
        .map_err(|e| VisualMeshError::shape("MeshSample", e.to_string()))
}

/// A sample paired with its file stem, used to key resampled output.
#[derive(Debug, Clone)]
pub struct NamedSample {
    pub name: String,
    pub sample: MeshSample,
}

/// Load every `.json` sample in a directory, in parallel, sorted by name.
pub fn load_dataset(dir: &Path) -> Result<Vec<NamedSample>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(VisualMeshError::config(format!(
            "no .json samples found in {:?}",
            dir
        )));
    }

    let samples = paths
        .par_iter()
        .map(|path| {
            let text = fs::read_to_string(path)?;
            let sample: MeshSample = serde_json::from_str(&text)?;
            sample.validate()?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            Ok(NamedSample { name, sample })
        })
        .collect::<Result<Vec<NamedSample>>>()?;

    log::info!("loaded {} samples from {:?}", samples.len(), dir);
    Ok(samples)
}

/// Write a sample back out as JSON.
pub fn save_sample(dir: &Path, name: &str, sample: &MeshSample) -> Result<()> {
    let path = dir.join(format!("{}.json", name));
    fs::write(&path, serde_json::to_string(sample)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_sample(n: usize) -> MeshSample {
        MeshSample {
            points: (0..n).map(|i| vec![i as f32, 0.0]).collect(),
            pixels: (0..n).map(|i| vec![i as f32 * 0.1]).collect(),
            labels: (0..n).map(|i| vec![(i % 2) as f32, ((i + 1) % 2) as f32]).collect(),
            weight: 1.0,
        }
    }

    #[test]
    fn sample_arrays_have_expected_shapes() {
        let s = toy_sample(4);
        s.validate().unwrap();
        assert_eq!(s.points_array().unwrap().dim(), (4, 2));
        assert_eq!(s.pixels_array().unwrap().dim(), (4, 1));
        assert_eq!(s.labels_array().unwrap().dim(), (4, 2));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let mut s = toy_sample(3);
        s.pixels[1] = vec![1.0, 2.0];
        assert!(s.pixels_array().is_err());
    }

    #[test]
    fn dataset_round_trips_through_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        save_sample(dir.path(), "b", &toy_sample(3)).unwrap();
        save_sample(dir.path(), "a", &toy_sample(5)).unwrap();

        let loaded = load_dataset(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        // sorted by file name
        assert_eq!(loaded[0].name, "a");
        assert_eq!(loaded[1].name, "b");
        assert_eq!(loaded[0].sample.points.len(), 5);
    }

    #[test]
    fn empty_directory_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_dataset(dir.path()),
            Err(VisualMeshError::Config(_))
        ));
    }
}
