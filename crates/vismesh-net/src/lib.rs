//! # vismesh-net
//!
//! The learnable-model half of the visual mesh toolkit: graph-convolution
//! layers over irregular mesh topology and the builder that assembles them
//! into a network from a structure descriptor.
//!
//! A network is a pure data-flow composition: no internal threading, no
//! shared mutable state beyond the learnable parameters, which only the
//! optimizer touches between passes. A forward pass either completes or
//! fails with a shape error; there are no partial results.

pub mod activation;
pub mod layers;
pub mod network;

pub use activation::Activation;
pub use layers::{ConvCache, DenseParams, GraphConvolution, LayerGradients};
pub use network::{Network, NetworkCheckpoint};
