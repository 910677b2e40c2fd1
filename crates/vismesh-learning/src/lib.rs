//! # vismesh-learning
//!
//! Training and resampling drivers for visual mesh networks. Both drivers
//! are thin orchestration around the core: the operator builds the mesh and
//! projects data, the network does the learnable work, and everything here
//! is batching, loss plumbing, parameter updates, and export.

pub mod dataset;
pub mod optimizer;
pub mod resample;
pub mod trainer;

pub use dataset::{load_dataset, save_sample, MeshSample, NamedSample};
pub use optimizer::Sgd;
pub use resample::{ResampleConfig, ResampleSummary, Resampler};
pub use trainer::{Trainer, TrainingConfig, TrainingSummary};
