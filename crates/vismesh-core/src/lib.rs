//! # vismesh-core
//!
//! Core types, traits, and errors for the vismesh visual mesh network
//! toolkit.
//!
//! This crate defines the fundamental abstractions used across all vismesh
//! components:
//! - **Types**: neighbor-index tables, source-to-node placements
//! - **Traits**: the `MeshOperator` boundary around the native kernel
//! - **Structure**: descriptor parsing and canonical network naming
//! - **Errors**: unified error handling with `VisualMeshError`
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ vismesh-core │  ← types / traits / errors
//! └──────────────┘
//!        ▲
//!   ┌────┴─────────────┐
//!   │                  │
//! ┌─▼──────────┐  ┌────▼───────┐
//! │ vismesh-op │  │ vismesh-net│
//! └────────────┘  └────────────┘
//!        ▲                ▲
//!        └───────┬────────┘
//!                │
//!     ┌──────────▼───────┐
//!     │ vismesh-learning │
//!     └──────────────────┘
//! ```

pub mod errors;
pub mod structure;
pub mod traits;
pub mod types;

// Re-export commonly used items
pub use errors::{Result, VisualMeshError};
pub use structure::StructureDescriptor;
pub use traits::{LookupParams, MeshLookup, MeshOperator};
pub use types::{MeshPlacement, NeighborTable};
